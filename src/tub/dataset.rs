use std::sync::Arc;

use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use super::group::{RecordRef, Sample, TubGroup};
use super::TubError;
use crate::pilot::Batch;

/// Seed of the train/validation shuffle, fixed so splits are reproducible.
pub const SPLIT_SEED: u64 = 200;

/// Shuffles `records` with `seed` and splits off the first `total_train`.
pub fn split_records(
    mut records: Vec<RecordRef>,
    total_train: usize,
    seed: u64,
) -> (Vec<RecordRef>, Vec<RecordRef>) {
    let mut rng = SmallRng::seed_from_u64(seed);
    records.shuffle(&mut rng);
    let val = records.split_off(total_train.min(records.len()));
    (records, val)
}

/// Where a generator's samples come from.
#[derive(Debug, Clone)]
pub enum SampleSource {
    /// Decoded once up front.
    Cached(Arc<Vec<Sample>>),
    /// Decoded from disk each time a batch is built.
    Lazy {
        group: Arc<TubGroup>,
        records: Vec<RecordRef>,
        input_shape: (u32, u32),
    },
}

impl SampleSource {
    pub fn cached(group: &TubGroup, records: &[RecordRef], input_shape: (u32, u32)) -> Result<Self, TubError> {
        let samples = records
            .iter()
            .map(|r| group.load_sample(*r, input_shape))
            .collect::<Result<Vec<_>, _>>()?;
        info!(samples = samples.len(), "samples cached");
        Ok(SampleSource::Cached(Arc::new(samples)))
    }

    pub fn lazy(group: Arc<TubGroup>, records: Vec<RecordRef>, input_shape: (u32, u32)) -> Self {
        SampleSource::Lazy { group, records, input_shape }
    }

    pub fn len(&self) -> usize {
        match self {
            SampleSource::Cached(samples) => samples.len(),
            SampleSource::Lazy { records, .. } => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sample(&self, i: usize) -> Result<Sample, TubError> {
        match self {
            SampleSource::Cached(samples) => Ok(samples[i].clone()),
            SampleSource::Lazy { group, records, input_shape } => group.load_sample(records[i], *input_shape),
        }
    }
}

/// Endless batches over a sample source, reshuffled on every pass.
/// Yields nothing when the source is empty.
pub struct BatchGenerator {
    source: SampleSource,
    batch_size: usize,
    order: Vec<usize>,
    cursor: usize,
    rng: SmallRng,
}

impl BatchGenerator {
    pub fn new(source: SampleSource, batch_size: usize, seed: u64) -> Self {
        let order = (0..source.len()).collect();
        let mut batches = Self {
            source,
            batch_size: batch_size.max(1),
            order,
            cursor: 0,
            rng: SmallRng::seed_from_u64(seed),
        };
        batches.order.shuffle(&mut batches.rng);
        batches
    }

    fn next_index(&mut self) -> usize {
        if self.cursor == self.order.len() {
            self.order.shuffle(&mut self.rng);
            self.cursor = 0;
        }
        let i = self.order[self.cursor];
        self.cursor += 1;
        i
    }

    fn build(&mut self) -> Result<Batch, TubError> {
        let mut rows = Vec::with_capacity(self.batch_size);
        for _ in 0..self.batch_size {
            let i = self.next_index();
            rows.push(self.source.sample(i)?);
        }

        let dim = rows[0].x.len();
        let mut x = Array2::<f32>::zeros((rows.len(), dim));
        let mut y = Array2::<f32>::zeros((rows.len(), 2));
        for (r, sample) in rows.iter().enumerate() {
            x.row_mut(r).assign(&sample.x);
            y[[r, 0]] = sample.y[0];
            y[[r, 1]] = sample.y[1];
        }
        Ok(Batch { x, y })
    }
}

impl Iterator for BatchGenerator {
    type Item = Result<Batch, TubError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.source.is_empty() {
            return None;
        }
        Some(self.build())
    }
}
