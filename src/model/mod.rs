//! Pretrained classifiers, loaded once per process.
//!
//! - [`CropModel`]: recommends a crop from a seven-value soil reading
//! - [`DiseaseModel`]: names the leaf disease in a photo
//!
//! Both are held by [`Models`], which is shared behind an `Arc` by the HTTP
//! handlers and the dispatch pipeline.

pub mod layers;
pub mod tabular;
pub mod vision;

use crate::config::ModelConfig;
use crate::core::reading::Reading;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub use tabular::{CropModel, CropModelWeights, CROP_LABELS};
pub use vision::{decode_image, DiseaseModel, DiseaseModelWeights, DISEASE_LABELS};

/// Model loading and inference errors.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model not loaded: {0}")]
    Unavailable(&'static str),

    #[error("could not read weights: {0}")]
    Io(String),

    #[error("invalid weight file: {0}")]
    Format(String),

    #[error("weight shape mismatch: {0}")]
    Shape(String),

    #[error("image download failed: {0}")]
    Download(String),

    #[error("could not decode image: {0}")]
    Image(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Recommended crop for a reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropPrediction {
    pub crop_name: String,
    /// Softmax probability of the recommended crop
    #[serde(rename = "Suitability")]
    pub suitability: f64,
}

/// `(label, probability)` for one image; serialized as a two-element array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseasePrediction(pub String, pub f64);

impl DiseasePrediction {
    pub fn label(&self) -> &str {
        &self.0
    }

    pub fn probability(&self) -> f64 {
        self.1
    }
}

/// Anything that can recommend a crop for a reading.
pub trait CropClassifier: Send + Sync {
    fn classify(&self, reading: &Reading) -> Result<CropPrediction, ModelError>;
}

impl CropClassifier for CropModel {
    fn classify(&self, reading: &Reading) -> Result<CropPrediction, ModelError> {
        CropModel::classify(self, reading)
    }
}

/// Process-wide model registry.
pub struct Models {
    crop: Option<CropModel>,
    disease: Option<Arc<DiseaseModel>>,
    http: reqwest::Client,
}

impl Models {
    pub fn new(crop: Option<CropModel>, disease: Option<DiseaseModel>) -> Self {
        Self::with_timeout(crop, disease, std::time::Duration::from_secs(30))
    }

    fn with_timeout(
        crop: Option<CropModel>,
        disease: Option<DiseaseModel>,
        timeout: std::time::Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            crop,
            disease: disease.map(Arc::new),
            http,
        }
    }

    /// Load every configured model. A model that fails to load is logged and
    /// left out; requests against it fail with [`ModelError::Unavailable`].
    pub fn load(config: &ModelConfig) -> Self {
        let crop = match CropModel::load(&config.crop_weights) {
            Ok(model) => {
                tracing::info!("Loaded crop model from {:?}", config.crop_weights);
                Some(model)
            }
            Err(e) => {
                tracing::warn!("Crop model unavailable: {}", e);
                None
            }
        };

        let disease = match DiseaseModel::load(&config.disease_weights) {
            Ok(model) => {
                tracing::info!("Loaded disease model from {:?}", config.disease_weights);
                Some(model)
            }
            Err(e) => {
                tracing::warn!("Disease model unavailable: {}", e);
                None
            }
        };

        Self::with_timeout(crop, disease, config.download_timeout)
    }

    pub fn has_crop_model(&self) -> bool {
        self.crop.is_some()
    }

    pub fn has_disease_model(&self) -> bool {
        self.disease.is_some()
    }

    pub fn classify_crop(&self, reading: &Reading) -> Result<CropPrediction, ModelError> {
        self.crop
            .as_ref()
            .ok_or(ModelError::Unavailable("crop"))?
            .classify(reading)
    }

    /// Classify already-downloaded image bytes.
    pub async fn classify_image_bytes(&self, bytes: Vec<u8>) -> Result<DiseasePrediction, ModelError> {
        let model = self
            .disease
            .clone()
            .ok_or(ModelError::Unavailable("disease"))?;

        tokio::task::spawn_blocking(move || model.classify(&decode_image(&bytes)?))
            .await
            .map_err(|e| ModelError::Inference(e.to_string()))?
    }

    /// Download each image and classify it, in order.
    pub async fn classify_image_urls(
        &self,
        urls: &[String],
    ) -> Result<Vec<DiseasePrediction>, ModelError> {
        if self.disease.is_none() {
            return Err(ModelError::Unavailable("disease"));
        }

        let mut predictions = Vec::with_capacity(urls.len());
        for url in urls {
            let bytes = self
                .http
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| ModelError::Download(e.to_string()))?
                .bytes()
                .await
                .map_err(|e| ModelError::Download(e.to_string()))?;

            predictions.push(self.classify_image_bytes(bytes.to_vec()).await?);
        }
        Ok(predictions)
    }
}

impl CropClassifier for Models {
    fn classify(&self, reading: &Reading) -> Result<CropPrediction, ModelError> {
        self.classify_crop(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_prediction_wire_format() {
        let prediction = CropPrediction {
            crop_name: "Rice".to_string(),
            suitability: 1.0,
        };
        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(json, serde_json::json!({"crop_name": "Rice", "Suitability": 1.0}));
    }

    #[test]
    fn test_disease_prediction_wire_format() {
        let prediction = DiseasePrediction("Grape___Black_rot".to_string(), 0.5);
        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(json, serde_json::json!(["Grape___Black_rot", 0.5]));
    }

    #[test]
    fn test_missing_models_are_unavailable() {
        let models = Models::new(None, None);
        let reading = Reading::new([0.0; 7]).unwrap();
        assert!(matches!(
            models.classify_crop(&reading),
            Err(ModelError::Unavailable("crop"))
        ));
        assert!(!models.has_disease_model());
    }

    #[tokio::test]
    async fn test_image_urls_need_disease_model() {
        let models = Models::new(None, None);
        let result = models
            .classify_image_urls(&["http://127.0.0.1:1/leaf.jpg".to_string()])
            .await;
        assert!(matches!(result, Err(ModelError::Unavailable("disease"))));
    }

    #[tokio::test]
    async fn test_classify_image_bytes() {
        let model = DiseaseModel::from_weights(vision::biased_weights(37, 1)).unwrap();
        let models = Models::new(None, Some(model));

        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(32, 32));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let prediction = models.classify_image_bytes(bytes).await.unwrap();
        assert_eq!(prediction.label(), "Tomato___healthy");
    }
}
