//! Crop recommendation model.
//!
//! A three-layer perceptron over the seven soil/climate values:
//! `Linear(7, 64) -> ReLU -> Linear(64, 64) -> ReLU -> Linear(64, 22)`,
//! followed by softmax. The winning class names the recommended crop and its
//! probability is reported as suitability.

use super::layers::{argmax, relu_in_place, softmax, Linear};
use super::{CropPrediction, ModelError};
use crate::core::reading::{Reading, READING_ARITY};
use serde::Deserialize;
use std::path::Path;

/// Crop labels in output order.
pub const CROP_LABELS: [&str; 22] = [
    "Rice",
    "Maize",
    "ChickPea",
    "KidneyBeans",
    "PigeonPeas",
    "MothBeans",
    "MungBean",
    "Blackgram",
    "Lentil",
    "Pomegranate",
    "Banana",
    "Mango",
    "Grapes",
    "Watermelon",
    "Muskmelon",
    "Apple",
    "Orange",
    "Papaya",
    "Coconut",
    "Cotton",
    "Jute",
    "Coffee",
];

/// On-disk weight format.
#[derive(Debug, Clone, Deserialize)]
pub struct CropModelWeights {
    pub layers: Vec<Linear>,
    /// Overrides the built-in label order when present
    #[serde(default)]
    pub labels: Option<Vec<String>>,
}

/// Loaded crop classifier.
#[derive(Debug, Clone)]
pub struct CropModel {
    layers: Vec<Linear>,
    labels: Vec<String>,
}

impl CropModel {
    /// Build from weights, checking that the layers chain from 7 inputs to
    /// one output per label.
    pub fn from_weights(weights: CropModelWeights) -> Result<Self, ModelError> {
        let labels = weights
            .labels
            .unwrap_or_else(|| CROP_LABELS.iter().map(|s| s.to_string()).collect());

        if weights.layers.is_empty() {
            return Err(ModelError::Shape("crop model has no layers".to_string()));
        }

        let mut width = READING_ARITY;
        for (i, layer) in weights.layers.iter().enumerate() {
            layer.validate(&format!("crop layer {i}"), width)?;
            width = layer.out_features();
        }
        if width != labels.len() {
            return Err(ModelError::Shape(format!(
                "crop model produces {width} outputs for {} labels",
                labels.len()
            )));
        }

        Ok(Self {
            layers: weights.layers,
            labels,
        })
    }

    /// Load a JSON weight export.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Io(format!("{}: {e}", path.display())))?;
        let weights: CropModelWeights =
            serde_json::from_str(&content).map_err(|e| ModelError::Format(e.to_string()))?;
        Self::from_weights(weights)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Class probabilities for one reading.
    pub fn probabilities(&self, reading: &Reading) -> Vec<f32> {
        let mut activations: Vec<f32> = reading.values().iter().map(|v| *v as f32).collect();
        let last = self.layers.len() - 1;

        for (i, layer) in self.layers.iter().enumerate() {
            activations = layer.forward(&activations);
            if i < last {
                relu_in_place(&mut activations);
            }
        }
        softmax(&activations)
    }

    pub fn classify(&self, reading: &Reading) -> Result<CropPrediction, ModelError> {
        let probs = self.probabilities(reading);
        let (index, probability) = argmax(&probs)
            .ok_or_else(|| ModelError::Inference("crop model produced no output".to_string()))?;

        Ok(CropPrediction {
            crop_name: self.labels[index].clone(),
            suitability: f64::from(probability),
        })
    }
}

/// Weights for a zero network whose last bias favours `class`.
#[cfg(test)]
pub(crate) fn biased_weights(class: usize, hidden: usize) -> CropModelWeights {
    let zeros = |out: usize, inp: usize| Linear {
        weight: vec![vec![0.0; inp]; out],
        bias: vec![0.0; out],
    };
    let mut head = zeros(CROP_LABELS.len(), hidden);
    head.bias[class] = 8.0;

    CropModelWeights {
        layers: vec![zeros(hidden, READING_ARITY), zeros(hidden, hidden), head],
        labels: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_follows_output_bias() {
        let model = CropModel::from_weights(biased_weights(1, 4)).unwrap();
        let reading = Reading::new([90.0, 42.0, 43.0, 20.8, 82.0, 6.5, 202.9]).unwrap();

        let prediction = model.classify(&reading).unwrap();
        assert_eq!(prediction.crop_name, "Maize");
        assert!(prediction.suitability > 0.9);
    }

    #[test]
    fn test_hidden_layers_use_relu() {
        // Without clipping, the two negations would cancel and push class 2.
        let mut weights = biased_weights(0, 1);
        weights.layers[0].weight[0][0] = -1.0;
        weights.layers[1].weight[0][0] = -1.0;
        weights.layers[2].weight[2][0] = 100.0;
        let model = CropModel::from_weights(weights).unwrap();

        let reading = Reading::new([5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(model.classify(&reading).unwrap().crop_name, "Rice");
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut weights = biased_weights(0, 4);
        weights.layers[1].weight.pop();
        assert!(matches!(
            CropModel::from_weights(weights),
            Err(ModelError::Shape(_))
        ));

        let mut weights = biased_weights(0, 4);
        weights.labels = Some(vec!["Rice".to_string()]);
        assert!(CropModel::from_weights(weights).is_err());
    }

    #[test]
    fn test_load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crop.json");
        let weights = biased_weights(21, 2);
        let json = serde_json::json!({
            "layers": weights.layers.iter().map(|l| serde_json::json!({
                "weight": l.weight,
                "bias": l.bias,
            })).collect::<Vec<_>>(),
        });
        std::fs::write(&path, json.to_string()).unwrap();

        let model = CropModel::load(&path).unwrap();
        let reading = Reading::new([0.0; 7]).unwrap();
        assert_eq!(model.classify(&reading).unwrap().crop_name, "Coffee");
    }
}
