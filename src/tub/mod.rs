/**
 * Tub Datastore
 *
 * A tub is a directory of driving records:
 *   meta.json                  input keys and their types
 *   record_<n>.json            one record per recorded tick
 *   <n>_cam-image_array_.jpg   the frame of record n
 *
 * Writers resume numbering after the highest record already on disk, so a
 * drive session can append to an existing tub.
 */

pub mod dataset;
pub mod group;

pub use dataset::{split_records, BatchGenerator, SampleSource, SPLIT_SEED};
pub use group::{expand_home, resolve_tub_paths, RecordRef, Sample, TubGroup};

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::vehicle::{keys, ControlPair, Mode};

pub const META_FILE: &str = "meta.json";

/// Keys written for each record, in order, with their types.
pub const DRIVE_INPUTS: [(&str, &str); 5] = [
    (keys::CAM_IMAGE, "image_array"),
    (keys::USER_ANGLE, "float"),
    (keys::USER_THROTTLE, "float"),
    (keys::USER_MODE, "str"),
    (keys::TIMESTAMP, "str"),
];

#[derive(Debug, Error)]
pub enum TubError {
    #[error("{path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path:?}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{0:?} is not a tub (no meta.json)")]
    NotATub(PathBuf),
    #[error("no tubs found for {0:?}")]
    NoTubs(String),
    #[error("bad tub pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("{path:?} is {actual:?} (h, w), expected {expected:?}")]
    ImageSize {
        path: PathBuf,
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> TubError + '_ {
    move |source| TubError::Io { path: path.to_path_buf(), source }
}

fn json_err(path: &Path) -> impl FnOnce(serde_json::Error) -> TubError + '_ {
    move |source| TubError::Json { path: path.to_path_buf(), source }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TubMeta {
    pub inputs: Vec<String>,
    pub types: Vec<String>,
}

impl Default for TubMeta {
    fn default() -> Self {
        Self {
            inputs: DRIVE_INPUTS.iter().map(|(k, _)| k.to_string()).collect(),
            types: DRIVE_INPUTS.iter().map(|(_, t)| t.to_string()).collect(),
        }
    }
}

/// One stored tick. The image field holds the file name, relative to the tub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TubRecord {
    #[serde(rename = "cam/image_array")]
    pub image: String,
    #[serde(rename = "user/angle")]
    pub angle: f32,
    #[serde(rename = "user/throttle")]
    pub throttle: f32,
    #[serde(rename = "user/mode", default)]
    pub mode: Mode,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl TubRecord {
    pub fn target(&self) -> ControlPair {
        ControlPair::new(self.angle, self.throttle)
    }
}

#[derive(Debug)]
pub struct Tub {
    path: PathBuf,
    meta: TubMeta,
    next_index: usize,
}

impl Tub {
    /// Opens the tub at `path`, creating it with the drive inputs if needed.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, TubError> {
        let path = path.into();
        let meta_path = path.join(META_FILE);
        if meta_path.exists() {
            let tub = Self::open(path)?;
            info!(path = ?tub.path, next = tub.next_index, "appending to existing tub");
            return Ok(tub);
        }

        fs::create_dir_all(&path).map_err(io_err(&path))?;
        let meta = TubMeta::default();
        let text = serde_json::to_string(&meta).map_err(json_err(&meta_path))?;
        fs::write(&meta_path, text).map_err(io_err(&meta_path))?;
        info!(?path, "created tub");
        Ok(Self { path, meta, next_index: 0 })
    }

    /// Opens an existing tub.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TubError> {
        let path = path.into();
        let meta_path = path.join(META_FILE);
        if !meta_path.is_file() {
            return Err(TubError::NotATub(path));
        }
        let text = fs::read_to_string(&meta_path).map_err(io_err(&meta_path))?;
        let meta: TubMeta = serde_json::from_str(&text).map_err(json_err(&meta_path))?;

        let mut tub = Self { path, meta, next_index: 0 };
        tub.next_index = tub.indices()?.last().map_or(0, |last| last + 1);
        Ok(tub)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> &TubMeta {
        &self.meta
    }

    /// Index the next written record gets.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn record_path(&self, index: usize) -> PathBuf {
        self.path.join(format!("record_{index}.json"))
    }

    pub fn image_name(index: usize) -> String {
        format!("{index}_cam-image_array_.jpg")
    }

    /// Sorted indices of the records on disk.
    pub fn indices(&self) -> Result<Vec<usize>, TubError> {
        let entries = fs::read_dir(&self.path).map_err(io_err(&self.path))?;
        let mut indices = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_err(&self.path))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(index) = name
                .strip_prefix("record_")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|n| n.parse::<usize>().ok())
            {
                indices.push(index);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    pub fn len(&self) -> Result<usize, TubError> {
        Ok(self.indices()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, TubError> {
        Ok(self.len()? == 0)
    }

    /// Writes a record and its frame, returns the record index.
    pub fn put_record(
        &mut self,
        image: &RgbImage,
        user: ControlPair,
        mode: &Mode,
        timestamp: Option<&str>,
    ) -> Result<usize, TubError> {
        let index = self.next_index;
        let image_name = Self::image_name(index);
        let image_path = self.path.join(&image_name);
        image.save(&image_path).map_err(|source| TubError::Image {
            path: image_path.clone(),
            source,
        })?;

        let record = TubRecord {
            image: image_name,
            angle: user.angle,
            throttle: user.throttle,
            mode: mode.clone(),
            timestamp: timestamp.map(str::to_string),
        };
        let record_path = self.record_path(index);
        let text = serde_json::to_string(&record).map_err(json_err(&record_path))?;
        fs::write(&record_path, text).map_err(io_err(&record_path))?;

        self.next_index += 1;
        debug!(index, "tub record written");
        Ok(index)
    }

    pub fn get_record(&self, index: usize) -> Result<TubRecord, TubError> {
        let path = self.record_path(index);
        let text = fs::read_to_string(&path).map_err(io_err(&path))?;
        serde_json::from_str(&text).map_err(json_err(&path))
    }

    pub fn load_image(&self, record: &TubRecord) -> Result<RgbImage, TubError> {
        let path = self.path.join(&record.image);
        let image = image::open(&path).map_err(|source| TubError::Image {
            path: path.clone(),
            source,
        })?;
        Ok(image.into_rgb8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::tempdir;

    fn frame() -> RgbImage {
        RgbImage::from_pixel(16, 12, Rgb([90, 120, 30]))
    }

    #[test]
    fn create_writes_meta() {
        let dir = tempdir().unwrap();
        let tub = Tub::create(dir.path().join("tub")).unwrap();
        let text = fs::read_to_string(tub.path().join(META_FILE)).unwrap();
        let meta: TubMeta = serde_json::from_str(&text).unwrap();
        assert_eq!(meta.inputs[0], "cam/image_array");
        assert_eq!(meta.types[0], "image_array");
        assert_eq!(meta.inputs.len(), meta.types.len());
        assert!(tub.is_empty().unwrap());
    }

    #[test]
    fn put_and_get_record() {
        let dir = tempdir().unwrap();
        let mut tub = Tub::create(dir.path()).unwrap();
        let idx = tub
            .put_record(&frame(), ControlPair::new(0.25, -0.5), &Mode::LocalAngle, Some("2024-01-01 00:00:00.000000"))
            .unwrap();
        assert_eq!(idx, 0);

        let record = tub.get_record(0).unwrap();
        assert_eq!(record.image, "0_cam-image_array_.jpg");
        assert_eq!(record.target(), ControlPair::new(0.25, -0.5));
        assert_eq!(record.mode, Mode::LocalAngle);

        let image = tub.load_image(&record).unwrap();
        assert_eq!(image.dimensions(), (16, 12));
    }

    #[test]
    fn record_uses_drive_keys_on_disk() {
        let dir = tempdir().unwrap();
        let mut tub = Tub::create(dir.path()).unwrap();
        tub.put_record(&frame(), ControlPair::new(0.1, 0.2), &Mode::User, None).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(tub.record_path(0)).unwrap()).unwrap();
        assert_eq!(value["user/mode"], "user");
        assert_eq!(value["cam/image_array"], "0_cam-image_array_.jpg");
        assert!(value.get("user/angle").is_some());
    }

    #[test]
    fn reopening_resumes_numbering() {
        let dir = tempdir().unwrap();
        {
            let mut tub = Tub::create(dir.path()).unwrap();
            for _ in 0..3 {
                tub.put_record(&frame(), ControlPair::default(), &Mode::User, None).unwrap();
            }
        }
        let mut tub = Tub::create(dir.path()).unwrap();
        assert_eq!(tub.next_index(), 3);
        let idx = tub.put_record(&frame(), ControlPair::default(), &Mode::User, None).unwrap();
        assert_eq!(idx, 3);
        assert_eq!(tub.indices().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn open_requires_meta() {
        let dir = tempdir().unwrap();
        assert!(matches!(Tub::open(dir.path()), Err(TubError::NotATub(_))));
    }
}
