/**
 * Linear Pilot
 *
 * Predicts (angle, throttle) from a camera frame with one linear layer over
 * block-averaged grayscale features. Checkpoints are JSON files holding the
 * input shape, weights and bias.
 */

pub mod features;
pub mod trainer;

pub use trainer::{EpochLoss, FitReport, TrainingConfig};

use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::vehicle::{ControlPair, Frame};

/// Number of outputs: angle, throttle.
pub const OUTPUTS: usize = 2;

const INIT_RANGE: f32 = 0.01;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("frame is {actual:?} (h, w) but the model expects {expected:?}")]
    ShapeMismatch { expected: (u32, u32), actual: (u32, u32) },
    #[error("checkpoint {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("checkpoint {path}: {reason}")]
    Corrupt { path: String, reason: String },
    #[error("batch has {actual} features, model expects {expected}")]
    FeatureMismatch { expected: usize, actual: usize },
    #[error("no training steps per epoch, dataset smaller than one batch")]
    NoTrainingSteps,
    #[error("validation loss was never finite in {epochs} epochs, lower the learning rate")]
    Diverged { epochs: usize },
    #[error("{0} generator produced no batches")]
    EmptyGenerator(&'static str),
    #[error("loading batch: {0}")]
    Batch(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Inputs and targets for one training step.
#[derive(Debug, Clone)]
pub struct Batch {
    /// (batch, features)
    pub x: Array2<f32>,
    /// (batch, 2): angle, throttle
    pub y: Array2<f32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Checkpoint {
    input_shape: (u32, u32),
    weights: Array2<f32>,
    bias: Array1<f32>,
}

#[derive(Debug, Clone)]
pub struct LinearPilot {
    input_shape: (u32, u32),
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl LinearPilot {
    /// Small random weights; a pilot that has not been trained or loaded.
    pub fn new(input_shape: (u32, u32)) -> Self {
        Self::init(input_shape, SmallRng::from_entropy())
    }

    pub fn with_seed(input_shape: (u32, u32), seed: u64) -> Self {
        Self::init(input_shape, SmallRng::seed_from_u64(seed))
    }

    fn init(input_shape: (u32, u32), mut rng: SmallRng) -> Self {
        let dim = features::feature_dim(input_shape);
        let weights = Array2::from_shape_fn((dim, OUTPUTS), |_| rng.gen_range(-INIT_RANGE..INIT_RANGE));
        Self {
            input_shape,
            weights,
            bias: Array1::zeros(OUTPUTS),
        }
    }

    /// (height, width) of the frames this pilot accepts.
    pub fn input_shape(&self) -> (u32, u32) {
        self.input_shape
    }

    pub fn feature_dim(&self) -> usize {
        self.weights.nrows()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: shown.clone(),
            source,
        })?;
        let ckpt: Checkpoint = serde_json::from_str(&text).map_err(|source| ModelError::Json {
            path: shown.clone(),
            source,
        })?;

        let expected = features::feature_dim(ckpt.input_shape);
        if ckpt.weights.dim() != (expected, OUTPUTS) || ckpt.bias.len() != OUTPUTS {
            return Err(ModelError::Corrupt {
                path: shown,
                reason: format!(
                    "weights {:?} / bias {} do not fit input shape {:?}",
                    ckpt.weights.dim(),
                    ckpt.bias.len(),
                    ckpt.input_shape
                ),
            });
        }
        info!(path = %shown, input_shape = ?ckpt.input_shape, "pilot checkpoint loaded");
        Ok(Self {
            input_shape: ckpt.input_shape,
            weights: ckpt.weights,
            bias: ckpt.bias,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let io_err = |source| ModelError::Io { path: shown.clone(), source };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let ckpt = Checkpoint {
            input_shape: self.input_shape,
            weights: self.weights.clone(),
            bias: self.bias.clone(),
        };
        let text = serde_json::to_string(&ckpt).map_err(|source| ModelError::Json {
            path: shown.clone(),
            source,
        })?;
        fs::write(path, text).map_err(io_err)?;
        Ok(())
    }

    pub fn predict(&self, frame: &Frame) -> Result<ControlPair, ModelError> {
        let actual = (frame.height(), frame.width());
        if actual != self.input_shape {
            return Err(ModelError::ShapeMismatch { expected: self.input_shape, actual });
        }
        let x = features::extract(frame.image());
        let out = x.dot(&self.weights) + &self.bias;
        Ok(ControlPair::new(out[0], out[1]))
    }

    /// Outputs for a (batch, features) matrix.
    pub fn forward(&self, x: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        if x.ncols() != self.feature_dim() {
            return Err(ModelError::FeatureMismatch {
                expected: self.feature_dim(),
                actual: x.ncols(),
            });
        }
        Ok(x.dot(&self.weights) + &self.bias)
    }

    /// Mean squared error over every output of the batch.
    pub fn loss(&self, batch: &Batch) -> Result<f32, ModelError> {
        let err = self.forward(&batch.x)? - &batch.y;
        Ok(err.mapv(|e| e * e).mean().unwrap_or(0.0))
    }

    /// One gradient descent step on the batch MSE, returns the loss before the step.
    pub fn sgd_step(&mut self, batch: &Batch, learning_rate: f32) -> Result<f32, ModelError> {
        if batch.is_empty() {
            return Ok(0.0);
        }
        let err = self.forward(&batch.x)? - &batch.y;
        let loss = err.mapv(|e| e * e).mean().unwrap_or(0.0);
        let scale = 2.0 / err.len() as f32;

        let grad_w = batch.x.t().dot(&err) * scale;
        let grad_b = err.sum_axis(Axis(0)) * scale;
        self.weights.scaled_add(-learning_rate, &grad_w);
        self.bias.scaled_add(-learning_rate, &grad_b);
        Ok(loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn frame(h: u32, w: u32, v: u8) -> Frame {
        Frame::new(RgbImage::from_pixel(w, h, Rgb([v, v, v])))
    }

    #[test]
    fn checkpoint_survives_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("models/pilot.json");
        let pilot = LinearPilot::with_seed((8, 12), 3);
        pilot.save(&path).unwrap();

        let loaded = LinearPilot::load(&path).unwrap();
        assert_eq!(loaded.input_shape(), (8, 12));
        let f = frame(8, 12, 200);
        let (a, b) = (pilot.predict(&f).unwrap(), loaded.predict(&f).unwrap());
        assert!((a.angle - b.angle).abs() < 1e-5);
        assert!((a.throttle - b.throttle).abs() < 1e-5);
    }

    #[test]
    fn load_missing_checkpoint_fails() {
        let dir = tempdir().unwrap();
        let err = LinearPilot::load(dir.path().join("none.json")).unwrap_err();
        assert!(matches!(err, ModelError::Io { .. }));
    }

    #[test]
    fn load_rejects_mismatched_weights() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        let ckpt = Checkpoint {
            input_shape: (8, 8),
            weights: Array2::zeros((3, OUTPUTS)),
            bias: Array1::zeros(OUTPUTS),
        };
        fs::write(&path, serde_json::to_string(&ckpt).unwrap()).unwrap();
        assert!(matches!(LinearPilot::load(&path), Err(ModelError::Corrupt { .. })));
    }

    #[test]
    fn predict_rejects_wrong_frame_size() {
        let pilot = LinearPilot::with_seed((8, 8), 1);
        let err = pilot.predict(&frame(4, 8, 0)).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }

    #[test]
    fn sgd_reduces_loss() {
        let mut pilot = LinearPilot::with_seed((4, 8), 9);
        let x = Array2::from_shape_vec((2, 2), vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let y = Array2::from_shape_vec((2, 2), vec![0.5, 0.2, -0.5, 0.4]).unwrap();
        let batch = Batch { x, y };

        let first = pilot.sgd_step(&batch, 0.5).unwrap();
        for _ in 0..50 {
            pilot.sgd_step(&batch, 0.5).unwrap();
        }
        assert!(pilot.loss(&batch).unwrap() < first * 0.1);
    }
}
