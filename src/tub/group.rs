use std::path::{Path, PathBuf};

use ndarray::Array1;
use tracing::{debug, info};

use super::{Tub, TubError};
use crate::pilot::features;

/// Expands a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Tub directories for a `--tub` argument: a comma separated list of paths
/// or glob patterns. Without an argument every directory in `data_path` is
/// taken.
pub fn resolve_tub_paths(arg: Option<&str>, data_path: &Path) -> Result<Vec<PathBuf>, TubError> {
    let patterns: Vec<PathBuf> = match arg {
        Some(arg) => arg
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(expand_home)
            .collect(),
        None => vec![data_path.join("*")],
    };

    let mut paths = Vec::new();
    for pattern in &patterns {
        let pattern = pattern.to_string_lossy();
        let matches = glob::glob(&pattern).map_err(|source| TubError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        //unreadable entries are skipped like non-directories
        for path in matches.flatten() {
            if path.is_dir() {
                paths.push(path);
            } else {
                debug!(?path, "not a directory, skipped");
            }
        }
    }
    paths.sort();
    paths.dedup();

    if paths.is_empty() {
        let described = arg.map_or_else(|| data_path.join("*").display().to_string(), str::to_string);
        return Err(TubError::NoTubs(described));
    }
    Ok(paths)
}

/// A record of one tub in a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordRef {
    pub tub: usize,
    pub index: usize,
}

/// Features and (angle, throttle) target of one record.
#[derive(Debug, Clone)]
pub struct Sample {
    pub x: Array1<f32>,
    pub y: [f32; 2],
}

#[derive(Debug)]
pub struct TubGroup {
    tubs: Vec<Tub>,
}

impl TubGroup {
    pub fn open(paths: &[PathBuf]) -> Result<Self, TubError> {
        let tubs = paths.iter().map(Tub::open).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tubs })
    }

    pub fn from_arg(arg: Option<&str>, data_path: &Path) -> Result<Self, TubError> {
        let paths = resolve_tub_paths(arg, data_path)?;
        let group = Self::open(&paths)?;
        info!(tubs = group.tubs.len(), "tub group opened");
        Ok(group)
    }

    pub fn tubs(&self) -> &[Tub] {
        &self.tubs
    }

    /// Every record of every tub, tub by tub in index order.
    pub fn records(&self) -> Result<Vec<RecordRef>, TubError> {
        let mut out = Vec::new();
        for (tub, t) in self.tubs.iter().enumerate() {
            out.extend(t.indices()?.into_iter().map(|index| RecordRef { tub, index }));
        }
        Ok(out)
    }

    /// Decodes a record's frame into model features and reads its targets.
    pub fn load_sample(&self, record: RecordRef, input_shape: (u32, u32)) -> Result<Sample, TubError> {
        let tub = &self.tubs[record.tub];
        let rec = tub.get_record(record.index)?;
        let image = tub.load_image(&rec)?;
        let actual = (image.height(), image.width());
        if actual != input_shape {
            return Err(TubError::ImageSize {
                path: tub.path().join(&rec.image),
                expected: input_shape,
                actual,
            });
        }
        Ok(Sample {
            x: features::extract(&image),
            y: [rec.angle, rec.throttle],
        })
    }
}
