//! Leaf disease model.
//!
//! A TinyVGG network over 64x64 RGB images: two blocks of
//! `Conv3x3 -> ReLU -> Conv3x3 -> ReLU -> MaxPool2`, then a linear head over
//! the flattened 16x16 feature maps.

use super::layers::{argmax, softmax, Conv3x3, FeatureMap, Linear};
use super::{DiseasePrediction, ModelError};
use image::imageops::FilterType;
use image::DynamicImage;
use serde::Deserialize;
use std::path::Path;

/// Side length the network was trained on.
pub const IMAGE_SIZE: u32 = 64;

/// Spatial size after the two pooling stages.
const POOLED_SIZE: usize = (IMAGE_SIZE / 4) as usize;

/// PlantVillage class names in output order.
pub const DISEASE_LABELS: [&str; 38] = [
    "Apple___Apple_scab",
    "Apple___Black_rot",
    "Apple___Cedar_apple_rust",
    "Apple___healthy",
    "Blueberry___healthy",
    "Cherry_(including_sour)___Powdery_mildew",
    "Cherry_(including_sour)___healthy",
    "Corn_(maize)___Cercospora_leaf_spot Gray_leaf_spot",
    "Corn_(maize)___Common_rust_",
    "Corn_(maize)___Northern_Leaf_Blight",
    "Corn_(maize)___healthy",
    "Grape___Black_rot",
    "Grape___Esca_(Black_Measles)",
    "Grape___Leaf_blight_(Isariopsis_Leaf_Spot)",
    "Grape___healthy",
    "Orange___Haunglongbing_(Citrus_greening)",
    "Peach___Bacterial_spot",
    "Peach___healthy",
    "Pepper,_bell___Bacterial_spot",
    "Pepper,_bell___healthy",
    "Potato___Early_blight",
    "Potato___Late_blight",
    "Potato___healthy",
    "Raspberry___healthy",
    "Soybean___healthy",
    "Squash___Powdery_mildew",
    "Strawberry___Leaf_scorch",
    "Strawberry___healthy",
    "Tomato___Bacterial_spot",
    "Tomato___Early_blight",
    "Tomato___Late_blight",
    "Tomato___Leaf_Mold",
    "Tomato___Septoria_leaf_spot",
    "Tomato___Spider_mites Two-spotted_spider_mite",
    "Tomato___Target_Spot",
    "Tomato___Tomato_Yellow_Leaf_Curl_Virus",
    "Tomato___Tomato_mosaic_virus",
    "Tomato___healthy",
];

/// On-disk weight format.
#[derive(Debug, Clone, Deserialize)]
pub struct DiseaseModelWeights {
    pub conv_block_1: [Conv3x3; 2],
    pub conv_block_2: [Conv3x3; 2],
    pub classifier: Linear,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
}

/// Loaded disease classifier.
#[derive(Debug, Clone)]
pub struct DiseaseModel {
    weights: DiseaseModelWeights,
    labels: Vec<String>,
}

impl DiseaseModel {
    pub fn from_weights(mut weights: DiseaseModelWeights) -> Result<Self, ModelError> {
        let labels = weights
            .labels
            .take()
            .unwrap_or_else(|| DISEASE_LABELS.iter().map(|s| s.to_string()).collect());

        let mut channels = 3;
        for (i, conv) in weights
            .conv_block_1
            .iter()
            .chain(weights.conv_block_2.iter())
            .enumerate()
        {
            conv.validate(&format!("conv {i}"), channels)?;
            channels = conv.out_channels;
        }

        let flattened = channels * POOLED_SIZE * POOLED_SIZE;
        weights.classifier.validate("classifier", flattened)?;
        if weights.classifier.out_features() != labels.len() {
            return Err(ModelError::Shape(format!(
                "classifier produces {} outputs for {} labels",
                weights.classifier.out_features(),
                labels.len()
            )));
        }

        Ok(Self { weights, labels })
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Io(format!("{}: {e}", path.display())))?;
        let weights: DiseaseModelWeights =
            serde_json::from_str(&content).map_err(|e| ModelError::Format(e.to_string()))?;
        Self::from_weights(weights)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Resize to 64x64 RGB and normalize each channel to [-1, 1].
    pub fn preprocess(image: &DynamicImage) -> FeatureMap {
        let rgb = image::imageops::resize(
            &image.to_rgb8(),
            IMAGE_SIZE,
            IMAGE_SIZE,
            FilterType::Triangle,
        );
        let side = IMAGE_SIZE as usize;
        let plane = side * side;
        let mut map = FeatureMap::zeros(3, side, side);

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let offset = y as usize * side + x as usize;
            for c in 0..3 {
                let scaled = f32::from(pixel[c]) / 255.0;
                map.data[c * plane + offset] = (scaled - 0.5) / 0.5;
            }
        }
        map
    }

    /// Raw class scores for a preprocessed image.
    pub fn forward(&self, input: &FeatureMap) -> Vec<f32> {
        let [c1, c2] = &self.weights.conv_block_1;
        let [c3, c4] = &self.weights.conv_block_2;

        let x = c2.forward(&c1.forward(input).relu()).relu().max_pool2();
        let x = c4.forward(&c3.forward(&x).relu()).relu().max_pool2();
        self.weights.classifier.forward(&x.data)
    }

    pub fn classify(&self, image: &DynamicImage) -> Result<DiseasePrediction, ModelError> {
        let probs = softmax(&self.forward(&Self::preprocess(image)));
        let (index, probability) = argmax(&probs)
            .ok_or_else(|| ModelError::Inference("disease model produced no output".to_string()))?;

        Ok(DiseasePrediction(
            self.labels[index].clone(),
            f64::from(probability),
        ))
    }
}

/// Decode an encoded image (JPEG, PNG, ...).
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ModelError> {
    image::load_from_memory(bytes).map_err(|e| ModelError::Image(e.to_string()))
}

/// Weights for a small zero network whose head bias favours `class`.
#[cfg(test)]
pub(crate) fn biased_weights(class: usize, hidden: usize) -> DiseaseModelWeights {
    let conv = |inp: usize| Conv3x3 {
        in_channels: inp,
        out_channels: hidden,
        weight: vec![0.0; hidden * inp * 9],
        bias: vec![0.0; hidden],
    };
    let mut bias = vec![0.0; DISEASE_LABELS.len()];
    bias[class] = 6.0;

    DiseaseModelWeights {
        conv_block_1: [conv(3), conv(hidden)],
        conv_block_2: [conv(hidden), conv(hidden)],
        classifier: Linear {
            weight: vec![vec![0.0; hidden * POOLED_SIZE * POOLED_SIZE]; DISEASE_LABELS.len()],
            bias,
        },
        labels: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    #[test]
    fn test_preprocess_normalizes_to_unit_range() {
        let white = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(80, 120, Rgb([255, 255, 255])));
        let map = DiseaseModel::preprocess(&white);

        assert_eq!((map.channels, map.height, map.width), (3, 64, 64));
        assert!(map.data.iter().all(|v| (v - 1.0).abs() < 0.02));

        let black = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(10, 10, Rgb([0, 0, 0])));
        let map = DiseaseModel::preprocess(&black);
        assert!(map.data.iter().all(|v| (v + 1.0).abs() < 0.02));
    }

    #[test]
    fn test_classify_follows_head_bias() {
        let model = DiseaseModel::from_weights(biased_weights(11, 2)).unwrap();
        let leaf = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(64, 64, Rgb([30, 140, 40])));

        let prediction = model.classify(&leaf).unwrap();
        assert_eq!(prediction.label(), "Grape___Black_rot");
        assert!(prediction.probability() > 0.5);
    }

    #[test]
    fn test_classifier_width_checked() {
        let mut weights = biased_weights(0, 2);
        weights.classifier.weight = vec![vec![0.0; 10]; DISEASE_LABELS.len()];
        assert!(matches!(
            DiseaseModel::from_weights(weights),
            Err(ModelError::Shape(_))
        ));
    }

    #[test]
    fn test_channel_chain_checked() {
        let mut weights = biased_weights(0, 2);
        weights.conv_block_2[0].in_channels = 5;
        assert!(DiseaseModel::from_weights(weights).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_image(b"not an image"),
            Err(ModelError::Image(_))
        ));
    }
}
