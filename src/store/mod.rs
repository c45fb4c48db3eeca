//! Persistence for hardware readings and crop recommendations.
//!
//! Two document collections are written:
//! - `hardwaremessages`: the reading behind each detected change
//! - `croprecommendations`: the predicted crop plus generated advice
//!
//! Backends: JSON-lines files (default), in-memory, and MongoDB behind the
//! `mongo` feature.

pub mod jsonl;
pub mod memory;

#[cfg(feature = "mongo")]
pub mod mongo;

use crate::config::StoreConfig;
use crate::core::reading::{Reading, ReadingError};
use crate::model::CropPrediction;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

#[cfg(feature = "mongo")]
pub use mongo::MongoStore;

/// Collection holding raw readings.
pub const READINGS_COLLECTION: &str = "hardwaremessages";

/// Collection holding recommendations.
pub const RECOMMENDATIONS_COLLECTION: &str = "croprecommendations";

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(String),

    #[error("stored reading is invalid: {0}")]
    InvalidReading(#[from] ReadingError),

    #[error("store backend not supported: {0}")]
    Unsupported(String),
}

/// A reading as stored in `hardwaremessages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareMessage {
    #[serde(rename = "Nitrogen")]
    pub nitrogen: f64,
    #[serde(rename = "Phosphorus")]
    pub phosphorus: f64,
    #[serde(rename = "Potassium")]
    pub potassium: f64,
    #[serde(rename = "Temperature")]
    pub temperature: f64,
    #[serde(rename = "Humidity")]
    pub humidity: f64,
    #[serde(rename = "pH")]
    pub ph: f64,
    #[serde(rename = "Rainfall")]
    pub rainfall: f64,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl HardwareMessage {
    pub fn new(reading: &Reading, device_id: impl Into<String>) -> Self {
        Self {
            nitrogen: reading.nitrogen(),
            phosphorus: reading.phosphorus(),
            potassium: reading.potassium(),
            temperature: reading.temperature(),
            humidity: reading.humidity(),
            ph: reading.ph(),
            rainfall: reading.rainfall(),
            device_id: device_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Rebuild the validated reading.
    pub fn reading(&self) -> Result<Reading, ReadingError> {
        Reading::new([
            self.nitrogen,
            self.phosphorus,
            self.potassium,
            self.temperature,
            self.humidity,
            self.ph,
            self.rainfall,
        ])
    }
}

/// A recommendation as stored in `croprecommendations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRecommendation {
    pub recommendations: CropPrediction,
    #[serde(rename = "generalRecommendations")]
    pub general_recommendations: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl CropRecommendation {
    pub fn new(prediction: CropPrediction, advice: impl Into<String>) -> Self {
        Self {
            recommendations: prediction,
            general_recommendations: advice.into(),
            created_at: Utc::now(),
        }
    }
}

/// Document store used by the dispatch pipeline and the HTTP layer.
#[async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn save_reading(&self, message: &HardwareMessage) -> Result<(), StoreError>;

    async fn save_recommendation(&self, recommendation: &CropRecommendation) -> Result<(), StoreError>;

    /// Most recently stored reading, if any.
    async fn latest_reading(&self) -> Result<Option<HardwareMessage>, StoreError>;

    fn backend_name(&self) -> &'static str;
}

/// Open the configured backend.
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn RecommendationStore>, StoreError> {
    match config {
        StoreConfig::Jsonl { dir } => Ok(Arc::new(JsonlStore::open(dir.clone()).await?)),
        StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "mongo")]
        StoreConfig::Mongo { uri, database } => {
            let uri = uri
                .as_deref()
                .ok_or_else(|| StoreError::Database("MONGODB_URI is not set".to_string()))?;
            Ok(Arc::new(MongoStore::connect(uri, database).await?))
        }
        #[cfg(not(feature = "mongo"))]
        StoreConfig::Mongo { .. } => Err(StoreError::Unsupported(
            "mongo (rebuild with --features mongo)".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_message_document_keys() {
        let reading = Reading::new([90.0, 42.0, 43.0, 20.8, 82.0, 6.5, 202.9]).unwrap();
        let doc = serde_json::to_value(HardwareMessage::new(&reading, "sensor-1")).unwrap();

        assert_eq!(doc["Nitrogen"], 90.0);
        assert_eq!(doc["pH"], 6.5);
        assert_eq!(doc["Rainfall"], 202.9);
        assert_eq!(doc["deviceId"], "sensor-1");
        assert!(doc["createdAt"].is_string());
    }

    #[test]
    fn test_hardware_message_round_trips_reading() {
        let reading = Reading::new([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]).unwrap();
        let message = HardwareMessage::new(&reading, "sensor-1");
        assert_eq!(message.reading().unwrap(), reading);
    }

    #[test]
    fn test_recommendation_document_keys() {
        let rec = CropRecommendation::new(
            CropPrediction {
                crop_name: "Jute".to_string(),
                suitability: 0.7,
            },
            "- Keep fields moist",
        );
        let doc = serde_json::to_value(rec).unwrap();
        assert_eq!(doc["recommendations"]["crop_name"], "Jute");
        assert_eq!(doc["generalRecommendations"], "- Keep fields moist");
    }

    #[cfg(not(feature = "mongo"))]
    #[tokio::test]
    async fn test_mongo_requires_feature() {
        let config = StoreConfig::Mongo {
            uri: Some("mongodb://localhost".to_string()),
            database: "annadata".to_string(),
        };
        assert!(matches!(
            open(&config).await,
            Err(StoreError::Unsupported(_))
        ));
    }
}
