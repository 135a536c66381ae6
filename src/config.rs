/**
 * Vehicle Configuration
 *
 * Per-car settings loaded from a TOML file. Keys keep the upper-case names
 * used on the car (`DRIVE_LOOP_HZ`, `STEERING_LEFT_PWM`, ...) and every key
 * has a default, so a config file only needs the values that differ.
 */

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::tub::expand_home;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {0:?} not found")]
    NotFound(PathBuf),
    #[error("reading config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraType {
    Synthetic,
    ImageList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PwmBackend {
    Serial,
    Mock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    // camera
    /// (height, width)
    pub camera_resolution: (u32, u32),
    pub camera_framerate: u32,
    pub camera_type: CameraType,
    pub camera_image_glob: String,

    // drive loop
    pub drive_loop_hz: u32,
    pub max_loops: Option<u64>,

    // joystick
    pub use_joystick_as_default: bool,
    pub joystick_device: PathBuf,
    pub joystick_max_throttle: f32,
    pub joystick_steering_scale: f32,
    pub joystick_steering_axis: u8,
    pub joystick_throttle_axis: u8,
    pub joystick_mode_button: u8,
    pub joystick_record_button: u8,
    pub auto_record_on_throttle: bool,

    // web controller
    pub web_control_port: u16,

    // actuators
    pub pwm_backend: PwmBackend,
    pub pwm_serial_port: String,
    pub pwm_baud: u32,
    pub steering_channel: u8,
    pub steering_left_pwm: u16,
    pub steering_right_pwm: u16,
    pub throttle_channel: u8,
    pub throttle_forward_pwm: u16,
    pub throttle_stopped_pwm: u16,
    pub throttle_reverse_pwm: u16,

    // storage
    pub data_path: PathBuf,
    pub tub_path: PathBuf,
    pub models_path: PathBuf,

    // training
    pub batch_size: usize,
    pub train_test_split: f64,
    pub epochs: usize,
    pub learning_rate: f32,
    pub early_stop_patience: usize,
    pub min_delta: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_resolution: (120, 160),
            camera_framerate: 20,
            camera_type: CameraType::Synthetic,
            camera_image_glob: String::new(),

            drive_loop_hz: 20,
            max_loops: None,

            use_joystick_as_default: false,
            joystick_device: PathBuf::from("/dev/input/js0"),
            joystick_max_throttle: 0.25,
            joystick_steering_scale: 1.0,
            joystick_steering_axis: 0,
            joystick_throttle_axis: 4,
            joystick_mode_button: 3,
            joystick_record_button: 0,
            auto_record_on_throttle: true,

            web_control_port: 8887,

            pwm_backend: PwmBackend::Serial,
            pwm_serial_port: "/dev/ttyACM0".to_string(),
            pwm_baud: 115_200,
            steering_channel: 1,
            steering_left_pwm: 460,
            steering_right_pwm: 290,
            throttle_channel: 0,
            throttle_forward_pwm: 500,
            throttle_stopped_pwm: 370,
            throttle_reverse_pwm: 220,

            data_path: PathBuf::from("data"),
            tub_path: PathBuf::from("data/tub"),
            models_path: PathBuf::from("models"),

            batch_size: 128,
            train_test_split: 0.8,
            epochs: 100,
            learning_rate: 0.001,
            early_stop_patience: 5,
            min_delta: 0.0005,
        }
    }
}

impl Config {
    /// Parses a config from TOML text.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads `path`, or `./config.toml` when no path is given. A missing
    /// default file falls back to built-in defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigError::NotFound(path));
            }
            warn!(?path, "no config file, using built-in defaults");
            return Ok(Self::default());
        }

        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let cfg = Self::from_toml_str(&text, &path)?;
        info!(?path, "loaded vehicle config");
        Ok(cfg)
    }

    /// Resolves a `--model` argument: `~` expands to the home directory, a
    /// bare file name lives in `MODELS_PATH`, anything with a directory part
    /// is taken as given.
    pub fn model_path(&self, arg: &Path) -> PathBuf {
        let expanded = arg.to_str().map_or_else(|| arg.to_path_buf(), expand_home);
        let arg = expanded.as_path();
        let bare = arg.parent().map_or(true, |p| p.as_os_str().is_empty());
        if bare && arg.is_relative() {
            self.models_path.join(arg)
        } else {
            arg.to_path_buf()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let (height, width) = self.camera_resolution;
        if height == 0 || width == 0 {
            return Err(ConfigError::Invalid(format!(
                "CAMERA_RESOLUTION must be non-zero, got ({height}, {width})"
            )));
        }
        if self.drive_loop_hz == 0 {
            return Err(ConfigError::Invalid("DRIVE_LOOP_HZ must be > 0".into()));
        }
        if self.camera_framerate == 0 {
            return Err(ConfigError::Invalid("CAMERA_FRAMERATE must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("BATCH_SIZE must be > 0".into()));
        }
        if !(self.train_test_split > 0.0 && self.train_test_split <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "TRAIN_TEST_SPLIT must be in (0, 1], got {}",
                self.train_test_split
            )));
        }
        Ok(())
    }
}
