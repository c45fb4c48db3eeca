//! Inference building blocks shared by the crop and disease models.
//!
//! Weights are plain `f32` buffers exported from the training notebooks as
//! JSON. Feature maps use channel-major layout (`[c][y][x]`), matching the
//! flatten order the classifier head was trained with.

use super::ModelError;
use serde::{Deserialize, Serialize};

/// Fully connected layer, `y = W x + b`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Linear {
    /// Row-major weight matrix, one row per output
    pub weight: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

impl Linear {
    pub fn in_features(&self) -> usize {
        self.weight.first().map(|row| row.len()).unwrap_or(0)
    }

    pub fn out_features(&self) -> usize {
        self.weight.len()
    }

    /// Check internal consistency and the expected input width.
    pub fn validate(&self, name: &str, in_features: usize) -> Result<(), ModelError> {
        if self.weight.is_empty() {
            return Err(ModelError::Shape(format!("{name}: empty weight matrix")));
        }
        if self.bias.len() != self.weight.len() {
            return Err(ModelError::Shape(format!(
                "{name}: {} bias values for {} outputs",
                self.bias.len(),
                self.weight.len()
            )));
        }
        if let Some(row) = self.weight.iter().find(|row| row.len() != in_features) {
            return Err(ModelError::Shape(format!(
                "{name}: expected {in_features} inputs, found a row of {}",
                row.len()
            )));
        }
        Ok(())
    }

    pub fn forward(&self, input: &[f32]) -> Vec<f32> {
        self.weight
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect()
    }
}

/// 3x3 convolution with stride 1 and zero padding 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv3x3 {
    pub in_channels: usize,
    pub out_channels: usize,
    /// Flattened `[out][in][3][3]`
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
}

impl Conv3x3 {
    pub fn validate(&self, name: &str, in_channels: usize) -> Result<(), ModelError> {
        if self.in_channels != in_channels {
            return Err(ModelError::Shape(format!(
                "{name}: expected {in_channels} input channels, weights declare {}",
                self.in_channels
            )));
        }
        let expected = self.out_channels * self.in_channels * 9;
        if self.weight.len() != expected || self.bias.len() != self.out_channels {
            return Err(ModelError::Shape(format!(
                "{name}: {} weights / {} biases, expected {expected} / {}",
                self.weight.len(),
                self.bias.len(),
                self.out_channels
            )));
        }
        Ok(())
    }

    pub fn forward(&self, input: &FeatureMap) -> FeatureMap {
        let (h, w) = (input.height, input.width);
        let plane = h * w;
        let mut out = FeatureMap::zeros(self.out_channels, h, w);

        for o in 0..self.out_channels {
            let bias = self.bias[o];
            for y in 0..h {
                for x in 0..w {
                    let mut acc = bias;
                    for i in 0..self.in_channels {
                        let kernel = &self.weight[(o * self.in_channels + i) * 9..][..9];
                        let channel = &input.data[i * plane..][..plane];
                        for ky in 0..3 {
                            let Some(iy) = (y + ky).checked_sub(1).filter(|iy| *iy < h) else {
                                continue;
                            };
                            for kx in 0..3 {
                                let Some(ix) = (x + kx).checked_sub(1).filter(|ix| *ix < w) else {
                                    continue;
                                };
                                acc += kernel[ky * 3 + kx] * channel[iy * w + ix];
                            }
                        }
                    }
                    out.data[o * plane + y * w + x] = acc;
                }
            }
        }
        out
    }
}

/// Dense activation tensor for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMap {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl FeatureMap {
    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
            data: vec![0.0; channels * height * width],
        }
    }

    pub fn relu(mut self) -> Self {
        relu_in_place(&mut self.data);
        self
    }

    /// 2x2 max pooling with stride 2 (odd edges are dropped).
    pub fn max_pool2(&self) -> Self {
        let (h, w) = (self.height / 2, self.width / 2);
        let mut out = FeatureMap::zeros(self.channels, h, w);
        let plane = self.height * self.width;

        for c in 0..self.channels {
            let src = &self.data[c * plane..][..plane];
            for y in 0..h {
                for x in 0..w {
                    let (sy, sx) = (y * 2, x * 2);
                    let m = src[sy * self.width + sx]
                        .max(src[sy * self.width + sx + 1])
                        .max(src[(sy + 1) * self.width + sx])
                        .max(src[(sy + 1) * self.width + sx + 1]);
                    out.data[c * h * w + y * w + x] = m;
                }
            }
        }
        out
    }
}

pub fn relu_in_place(values: &mut [f32]) {
    for v in values.iter_mut() {
        *v = v.max(0.0);
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and value of the largest element; the first one wins ties.
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((i, v)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_forward() {
        let layer = Linear {
            weight: vec![vec![1.0, 2.0], vec![0.0, -1.0]],
            bias: vec![0.5, 1.0],
        };
        assert_eq!(layer.forward(&[3.0, 4.0]), vec![11.5, -3.0]);
        assert!(layer.validate("fc", 2).is_ok());
        assert!(layer.validate("fc", 3).is_err());
    }

    #[test]
    fn test_conv_identity_kernel() {
        let mut weight = vec![0.0; 9];
        weight[4] = 1.0;
        let conv = Conv3x3 {
            in_channels: 1,
            out_channels: 1,
            weight,
            bias: vec![0.0],
        };
        let input = FeatureMap {
            channels: 1,
            height: 2,
            width: 2,
            data: vec![1.0, 2.0, 3.0, 4.0],
        };
        assert_eq!(conv.forward(&input), input);
    }

    #[test]
    fn test_conv_sums_neighbourhood_with_padding() {
        let conv = Conv3x3 {
            in_channels: 1,
            out_channels: 1,
            weight: vec![1.0; 9],
            bias: vec![0.0],
        };
        let input = FeatureMap {
            channels: 1,
            height: 2,
            width: 2,
            data: vec![1.0, 1.0, 1.0, 1.0],
        };
        assert_eq!(conv.forward(&input).data, vec![4.0, 4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_max_pool() {
        let input = FeatureMap {
            channels: 1,
            height: 2,
            width: 4,
            data: vec![1.0, 5.0, 2.0, 0.0, 3.0, 4.0, 8.0, 1.0],
        };
        let pooled = input.max_pool2();
        assert_eq!((pooled.height, pooled.width), (1, 2));
        assert_eq!(pooled.data, vec![5.0, 8.0]);
    }

    #[test]
    fn test_softmax_and_argmax() {
        let probs = softmax(&[1.0, 3.0, 3.0]);
        let total: f32 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert_eq!(argmax(&probs).map(|(i, _)| i), Some(1));
        assert_eq!(argmax(&[]), None);
    }
}
