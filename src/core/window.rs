//! Sliding window over the most recent readings.
//!
//! Readings are collected into a fixed-capacity FIFO (default 10). Once the
//! window is full, the reading that deviates most from the oldest one is
//! selected as the candidate for change detection.

use crate::core::reading::Reading;
use std::collections::VecDeque;

/// Default number of readings kept in the window.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// The reading selected as the most significant change in a full window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deviant {
    /// Position in the window (always >= 1)
    pub index: usize,
    /// The selected reading
    pub reading: Reading,
    /// Signed sum of its differences from the oldest reading
    pub total: f64,
}

/// Fixed-capacity window of readings, oldest first.
#[derive(Debug, Clone)]
pub struct SensorWindow {
    readings: VecDeque<Reading>,
    capacity: usize,
}

impl SensorWindow {
    /// Create a window holding at most `capacity` readings.
    ///
    /// A capacity below 2 leaves no candidate besides the oldest reading and
    /// is raised to 2.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a reading, evicting the oldest one when at capacity.
    ///
    /// Returns true if the window is full after the push.
    pub fn push(&mut self, reading: Reading) -> bool {
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.readings.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The oldest reading, used as the deviation baseline.
    pub fn oldest(&self) -> Option<&Reading> {
        self.readings.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }

    /// Total signed deviation of every non-oldest reading.
    ///
    /// Opposite field overflows (`inf - inf`) cancel to 0 like any other
    /// opposite changes; a one-sided overflow stays infinite.
    pub fn deviations(&self) -> Vec<f64> {
        let Some(base) = self.oldest() else {
            return Vec::new();
        };
        self.readings
            .iter()
            .skip(1)
            .map(|r| r.total_deviation_from(base))
            .map(|total| if total.is_nan() { 0.0 } else { total })
            .collect()
    }

    /// Select the reading with the largest absolute total deviation from the
    /// oldest reading. Ties go to the earliest position.
    ///
    /// Returns `None` until the window is full.
    pub fn select_deviant(&self) -> Option<Deviant> {
        if !self.is_full() {
            return None;
        }

        let mut best: Option<Deviant> = None;
        for (offset, total) in self.deviations().into_iter().enumerate() {
            let beats = match best {
                Some(ref b) => total.abs() > b.total.abs(),
                None => true,
            };
            if beats {
                let index = offset + 1;
                best = Some(Deviant {
                    index,
                    reading: self.readings[index],
                    total,
                });
            }
        }
        best
    }

    /// Drop all readings.
    pub fn clear(&mut self) {
        self.readings.clear();
    }
}

impl Default for SensorWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}
