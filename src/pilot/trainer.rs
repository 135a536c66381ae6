use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Batch, LinearPilot, ModelError};
use crate::config::Config;

/// Training hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f32,
    /// Epochs without a `min_delta` improvement before stopping.
    pub patience: usize,
    pub min_delta: f32,
    /// Fraction of records used for training; sizes the validation pass.
    pub train_split: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            learning_rate: 0.001,
            patience: 5,
            min_delta: 0.0005,
            train_split: 0.8,
        }
    }
}

impl From<&Config> for TrainingConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            epochs: cfg.epochs,
            learning_rate: cfg.learning_rate,
            patience: cfg.early_stop_patience,
            min_delta: cfg.min_delta,
            train_split: cfg.train_test_split,
        }
    }
}

impl TrainingConfig {
    /// Validation batches per epoch for `steps` training batches.
    pub fn validation_steps(&self, steps: usize) -> usize {
        let split = self.train_split;
        ((steps as f64 * (1.0 - split) / split) as usize).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLoss {
    pub epoch: usize,
    pub train: f32,
    pub val: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub history: Vec<EpochLoss>,
    pub best_val_loss: f32,
    pub stopped_early: bool,
}

impl FitReport {
    pub fn epochs_run(&self) -> usize {
        self.history.len()
    }
}

fn next_batch<I, E>(batches: &mut I, which: &'static str) -> Result<Batch, ModelError>
where
    I: Iterator<Item = Result<Batch, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    match batches.next() {
        Some(batch) => batch.map_err(|e| ModelError::Batch(Box::new(e))),
        None => Err(ModelError::EmptyGenerator(which)),
    }
}

impl LinearPilot {
    /// Trains on `steps` batches per epoch drawn from `train`, validates on
    /// `val`, and writes the best weights seen to `save_path`. On return the
    /// pilot holds the best weights.
    pub fn fit<T, V, E>(
        &mut self,
        train: &mut T,
        val: &mut V,
        steps: usize,
        config: &TrainingConfig,
        save_path: &Path,
    ) -> Result<FitReport, ModelError>
    where
        T: Iterator<Item = Result<Batch, E>>,
        V: Iterator<Item = Result<Batch, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if steps == 0 {
            return Err(ModelError::NoTrainingSteps);
        }
        let val_steps = config.validation_steps(steps);
        info!(steps, val_steps, epochs = config.epochs, "fitting pilot");

        let mut history = Vec::new();
        let mut best_val = f32::INFINITY;
        let mut best: Option<LinearPilot> = None;
        //early stopping tracks its own baseline so small gains still checkpoint
        let mut baseline = f32::INFINITY;
        let mut wait = 0;
        let mut stopped_early = false;

        for epoch in 0..config.epochs {
            let mut train_loss = 0.0;
            for _ in 0..steps {
                let batch = next_batch(train, "training")?;
                train_loss += self.sgd_step(&batch, config.learning_rate)?;
            }
            train_loss /= steps as f32;

            let mut val_loss = 0.0;
            for _ in 0..val_steps {
                let batch = next_batch(val, "validation")?;
                val_loss += self.loss(&batch)?;
            }
            val_loss /= val_steps as f32;

            history.push(EpochLoss { epoch, train: train_loss, val: val_loss });
            info!(epoch, train_loss, val_loss, "epoch done");

            if val_loss < best_val {
                debug!(epoch, val_loss, path = %save_path.display(), "val loss improved, saving");
                best_val = val_loss;
                self.save(save_path)?;
                best = Some(self.clone());
            }

            if val_loss < baseline - config.min_delta {
                baseline = val_loss;
                wait = 0;
            } else {
                wait += 1;
                if wait >= config.patience {
                    info!(epoch, patience = config.patience, "early stopping");
                    stopped_early = true;
                    break;
                }
            }
        }

        //nan or inf every epoch, nothing was saved
        let Some(best) = best else {
            return Err(ModelError::Diverged { epochs: history.len() });
        };
        *self = best;
        Ok(FitReport {
            history,
            best_val_loss: best_val,
            stopped_early,
        })
    }
}
