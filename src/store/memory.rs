//! In-memory store, used in tests and when persistence is disabled.

use super::{CropRecommendation, HardwareMessage, RecommendationStore, StoreError};
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryStore {
    readings: Mutex<Vec<HardwareMessage>>,
    recommendations: Mutex<Vec<CropRecommendation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn readings(&self) -> Vec<HardwareMessage> {
        self.readings.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn recommendations(&self) -> Vec<CropRecommendation> {
        self.recommendations
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Database("memory store lock poisoned".to_string())
}

#[async_trait]
impl RecommendationStore for MemoryStore {
    async fn save_reading(&self, message: &HardwareMessage) -> Result<(), StoreError> {
        self.readings.lock().map_err(poisoned)?.push(message.clone());
        Ok(())
    }

    async fn save_recommendation(&self, recommendation: &CropRecommendation) -> Result<(), StoreError> {
        self.recommendations
            .lock()
            .map_err(poisoned)?
            .push(recommendation.clone());
        Ok(())
    }

    async fn latest_reading(&self) -> Result<Option<HardwareMessage>, StoreError> {
        Ok(self.readings.lock().map_err(poisoned)?.last().cloned())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
