//! Dispatch pipeline run for every detected change.
//!
//! classify -> generate advice -> persist reading -> persist recommendation.
//! Any failing step aborts the cycle so the monitor can retry it.

use crate::advice::AdviceGenerator;
use crate::core::monitor::{ChangeHandler, DispatchError};
use crate::core::reading::Reading;
use crate::model::CropClassifier;
use crate::store::{CropRecommendation, HardwareMessage, RecommendationStore};
use async_trait::async_trait;
use std::sync::Arc;

/// Device id derived from the hostname plus a short random suffix.
pub fn default_device_id() -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!(
        "sensor-{}-{}",
        hostname,
        &uuid::Uuid::new_v4().to_string()[..8]
    )
}

pub struct AdvisoryPipeline {
    classifier: Arc<dyn CropClassifier>,
    advisor: Option<Arc<dyn AdviceGenerator>>,
    store: Arc<dyn RecommendationStore>,
    device_id: String,
}

impl AdvisoryPipeline {
    pub fn new(
        classifier: Arc<dyn CropClassifier>,
        advisor: Option<Arc<dyn AdviceGenerator>>,
        store: Arc<dyn RecommendationStore>,
    ) -> Self {
        if advisor.is_none() {
            tracing::warn!("No advice generator configured, recommendations will carry empty advice");
        }
        Self {
            classifier,
            advisor,
            store,
            device_id: default_device_id(),
        }
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

#[async_trait]
impl ChangeHandler for AdvisoryPipeline {
    async fn on_change(&self, reading: &Reading) -> Result<(), DispatchError> {
        let prediction = self.classifier.classify(reading)?;
        tracing::info!(
            "Recommended crop {} ({:.3}) for {}",
            prediction.crop_name,
            prediction.suitability,
            reading
        );

        let advice = match &self.advisor {
            Some(advisor) => advisor.generate(reading, &prediction).await?,
            None => String::new(),
        };

        self.store
            .save_reading(&HardwareMessage::new(reading, self.device_id.clone()))
            .await?;
        self.store
            .save_recommendation(&CropRecommendation::new(prediction, advice))
            .await?;

        tracing::debug!("Stored reading and recommendation via {}", self.store.backend_name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::AdviceError;
    use crate::model::{CropPrediction, ModelError};
    use crate::store::MemoryStore;

    struct FixedCrop(&'static str);

    impl CropClassifier for FixedCrop {
        fn classify(&self, _reading: &Reading) -> Result<CropPrediction, ModelError> {
            Ok(CropPrediction {
                crop_name: self.0.to_string(),
                suitability: 0.9,
            })
        }
    }

    struct NoCrop;

    impl CropClassifier for NoCrop {
        fn classify(&self, _reading: &Reading) -> Result<CropPrediction, ModelError> {
            Err(ModelError::Unavailable("crop"))
        }
    }

    struct Echo;

    #[async_trait]
    impl AdviceGenerator for Echo {
        async fn generate(
            &self,
            _reading: &Reading,
            prediction: &CropPrediction,
        ) -> Result<String, AdviceError> {
            Ok(format!("- Grow {}", prediction.crop_name))
        }
    }

    struct Offline;

    #[async_trait]
    impl AdviceGenerator for Offline {
        async fn generate(
            &self,
            _reading: &Reading,
            _prediction: &CropPrediction,
        ) -> Result<String, AdviceError> {
            Err(AdviceError::Network("connection refused".to_string()))
        }
    }

    fn reading() -> Reading {
        Reading::new([90.0, 42.0, 43.0, 20.8, 82.0, 6.5, 202.9]).unwrap()
    }

    #[tokio::test]
    async fn test_change_is_classified_advised_and_stored() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = AdvisoryPipeline::new(
            Arc::new(FixedCrop("Rice")),
            Some(Arc::new(Echo)),
            store.clone(),
        )
        .with_device_id("sensor-test");

        pipeline.on_change(&reading()).await.unwrap();

        let readings = store.readings();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].device_id, "sensor-test");
        assert_eq!(readings[0].reading().unwrap(), reading());

        let recs = store.recommendations();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].recommendations.crop_name, "Rice");
        assert_eq!(recs[0].general_recommendations, "- Grow Rice");
    }

    #[tokio::test]
    async fn test_without_advisor_stores_empty_advice() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = AdvisoryPipeline::new(Arc::new(FixedCrop("Jute")), None, store.clone());

        pipeline.on_change(&reading()).await.unwrap();
        assert_eq!(store.recommendations()[0].general_recommendations, "");
    }

    #[tokio::test]
    async fn test_classification_failure_stores_nothing() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = AdvisoryPipeline::new(Arc::new(NoCrop), Some(Arc::new(Echo)), store.clone());

        let err = pipeline.on_change(&reading()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Classification(_)));
        assert!(store.readings().is_empty());
        assert!(store.recommendations().is_empty());
    }

    #[tokio::test]
    async fn test_advice_failure_aborts_cycle() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = AdvisoryPipeline::new(
            Arc::new(FixedCrop("Rice")),
            Some(Arc::new(Offline)),
            store.clone(),
        );

        let err = pipeline.on_change(&reading()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Advice(_)));
        assert!(store.readings().is_empty());
    }

    #[test]
    fn test_default_device_id_shape() {
        let id = default_device_id();
        assert!(id.starts_with("sensor-"));
        assert_ne!(id, default_device_id());
    }
}
