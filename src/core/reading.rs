//! Soil and climate readings as delivered by the field hardware.
//!
//! A reading is one sampled instant of seven values in a fixed order.
//! Payloads arrive as text (one notification per line) and are validated
//! strictly: exactly seven finite numbers in a JSON array.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of values in every reading.
pub const READING_ARITY: usize = 7;

/// Field names in wire order.
pub const FIELD_NAMES: [&str; READING_ARITY] = [
    "Nitrogen",
    "Phosphorus",
    "Potassium",
    "Temperature",
    "Humidity",
    "pH",
    "Rainfall",
];

/// One sampled instant of the seven sensor fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Reading([f64; READING_ARITY]);

/// Errors raised while validating a reading payload.
#[derive(Debug, Error, PartialEq)]
pub enum ReadingError {
    #[error("expected 7 values, got {0}")]
    Arity(usize),

    #[error("value {index} is not a number: {value}")]
    NotNumeric { index: usize, value: String },

    #[error("value {index} ({name}) is not finite")]
    NotFinite { index: usize, name: &'static str },

    #[error("payload is not a JSON array: {0}")]
    Syntax(String),
}

impl Reading {
    /// Build a reading, rejecting NaN and infinities.
    pub fn new(values: [f64; READING_ARITY]) -> Result<Self, ReadingError> {
        for (index, value) in values.iter().enumerate() {
            if !value.is_finite() {
                return Err(ReadingError::NotFinite {
                    index,
                    name: FIELD_NAMES[index],
                });
            }
        }
        Ok(Self(values))
    }

    /// Parse one notification payload, e.g. `[90, 42, 43, 20.8, 82, 6.5, 202.9]`.
    pub fn parse(payload: &str) -> Result<Self, ReadingError> {
        let items: Vec<serde_json::Value> = serde_json::from_str(payload.trim())
            .map_err(|e| ReadingError::Syntax(e.to_string()))?;
        Self::from_json_values(&items)
    }

    /// Validate an already-decoded JSON array.
    pub fn from_json_values(items: &[serde_json::Value]) -> Result<Self, ReadingError> {
        if items.len() != READING_ARITY {
            return Err(ReadingError::Arity(items.len()));
        }

        let mut values = [0.0; READING_ARITY];
        for (index, item) in items.iter().enumerate() {
            values[index] = item.as_f64().ok_or_else(|| ReadingError::NotNumeric {
                index,
                value: item.to_string(),
            })?;
        }
        Self::new(values)
    }

    pub fn values(&self) -> &[f64; READING_ARITY] {
        &self.0
    }

    pub fn nitrogen(&self) -> f64 {
        self.0[0]
    }

    pub fn phosphorus(&self) -> f64 {
        self.0[1]
    }

    pub fn potassium(&self) -> f64 {
        self.0[2]
    }

    pub fn temperature(&self) -> f64 {
        self.0[3]
    }

    pub fn humidity(&self) -> f64 {
        self.0[4]
    }

    pub fn ph(&self) -> f64 {
        self.0[5]
    }

    pub fn rainfall(&self) -> f64 {
        self.0[6]
    }

    /// Signed sum of the element-wise differences `self - base`.
    pub fn total_deviation_from(&self, base: &Reading) -> f64 {
        self.0.iter().zip(base.0.iter()).map(|(v, b)| v - b).sum()
    }

    /// `(name, value)` pairs in wire order.
    pub fn named_fields(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FIELD_NAMES.iter().copied().zip(self.0.iter().copied())
    }
}

impl TryFrom<Vec<f64>> for Reading {
    type Error = ReadingError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        let arr: [f64; READING_ARITY] = values
            .as_slice()
            .try_into()
            .map_err(|_| ReadingError::Arity(values.len()))?;
        Self::new(arr)
    }
}

impl From<Reading> for Vec<f64> {
    fn from(reading: Reading) -> Self {
        reading.0.to_vec()
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "]")
    }
}
