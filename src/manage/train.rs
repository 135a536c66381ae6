use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::pilot::{FitReport, LinearPilot, TrainingConfig};
use crate::tub::{split_records, BatchGenerator, SampleSource, TubGroup, SPLIT_SEED};

/// How a dataset is divided for one training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainPlan {
    pub total_records: usize,
    pub total_train: usize,
    pub total_val: usize,
    pub steps_per_epoch: usize,
}

impl TrainPlan {
    pub fn new(total_records: usize, train_split: f64, batch_size: usize) -> Self {
        let total_train = (total_records as f64 * train_split) as usize;
        let total_val = total_records - total_train;
        Self {
            total_records,
            total_train,
            total_val,
            steps_per_epoch: total_train / batch_size,
        }
    }
}

/// Fits a pilot on the tubs named by `tub_names` (or everything under
/// `DATA_PATH`) and saves the best weights to `new_model_path`. Training
/// starts from `base_model_path` when given.
pub fn train(
    cfg: &Config,
    tub_names: Option<&str>,
    new_model_path: &Path,
    base_model_path: Option<&Path>,
    cache: bool,
) -> Result<FitReport> {
    let group = TubGroup::from_arg(tub_names, &cfg.data_path).context("resolving tubs")?;
    let records = group.records().context("listing tub records")?;

    let plan = TrainPlan::new(records.len(), cfg.train_test_split, cfg.batch_size);
    info!(
        total_records = plan.total_records,
        total_train = plan.total_train,
        total_val = plan.total_val,
        steps_per_epoch = plan.steps_per_epoch,
        "training plan"
    );

    let mut pilot = match base_model_path {
        Some(path) => {
            let path = cfg.model_path(path);
            LinearPilot::load(&path).with_context(|| format!("loading base model {}", path.display()))?
        }
        None => LinearPilot::new(cfg.camera_resolution),
    };
    let input_shape = pilot.input_shape();

    let (train_refs, val_refs) = split_records(records, plan.total_train, SPLIT_SEED);
    let group = Arc::new(group);
    let (train_src, val_src) = if cache {
        (
            SampleSource::cached(&group, &train_refs, input_shape).context("loading training samples")?,
            SampleSource::cached(&group, &val_refs, input_shape).context("loading validation samples")?,
        )
    } else {
        (
            SampleSource::lazy(Arc::clone(&group), train_refs, input_shape),
            SampleSource::lazy(group, val_refs, input_shape),
        )
    };
    let mut train_batches = BatchGenerator::new(train_src, cfg.batch_size, SPLIT_SEED);
    let mut val_batches = BatchGenerator::new(val_src, cfg.batch_size, SPLIT_SEED + 1);

    let save_path = cfg.model_path(new_model_path);
    let report = pilot
        .fit(
            &mut train_batches,
            &mut val_batches,
            plan.steps_per_epoch,
            &TrainingConfig::from(cfg),
            &save_path,
        )
        .context("fitting pilot")?;

    info!(
        path = %save_path.display(),
        epochs = report.epochs_run(),
        best_val_loss = report.best_val_loss,
        "pilot saved"
    );
    Ok(report)
}
