/**
 * Tick Memory
 *
 * The values parts exchange within one loop tick. Each named value of the
 * drive pipeline has its own typed field; a field keeps its last value
 * until a part overwrites it.
 */

use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::mode::Mode;

/// Names of the values passed between parts. Also used as tub record keys.
pub mod keys {
    pub const TIMESTAMP: &str = "timestamp";
    pub const CAM_IMAGE: &str = "cam/image_array";
    pub const USER_ANGLE: &str = "user/angle";
    pub const USER_THROTTLE: &str = "user/throttle";
    pub const USER_MODE: &str = "user/mode";
    pub const RECORDING: &str = "recording";
    pub const RUN_PILOT: &str = "run_pilot";
    pub const PILOT_ANGLE: &str = "pilot/angle";
    pub const PILOT_THROTTLE: &str = "pilot/throttle";
    pub const ANGLE: &str = "angle";
    pub const THROTTLE: &str = "throttle";
}

/// Steering angle and throttle, both nominally in [-1, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlPair {
    pub angle: f32,
    pub throttle: f32,
}

impl ControlPair {
    pub fn new(angle: f32, throttle: f32) -> Self {
        Self { angle, throttle }
    }
}

/// Camera image shared by reference between the producer and the parts.
#[derive(Debug, Clone, Default)]
pub struct Frame(Arc<RgbImage>);

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Frame(Arc::new(image))
    }

    pub fn image(&self) -> &RgbImage {
        &self.0
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Memory {
    /// `timestamp`
    pub timestamp: Option<String>,
    /// `cam/image_array`
    pub image: Option<Frame>,
    /// `user/angle`, `user/throttle`
    pub user: ControlPair,
    /// `user/mode`
    pub user_mode: Mode,
    /// `recording`
    pub recording: bool,
    /// `run_pilot`
    pub run_pilot: bool,
    /// `pilot/angle`, `pilot/throttle`
    pub pilot: ControlPair,
    /// `angle`, `throttle`: what the actuators apply
    pub drive: ControlPair,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Run condition: the pilot runs only when the gate said so.
pub fn run_pilot(memory: &Memory) -> bool {
    memory.run_pilot
}

/// Run condition: the tub writer runs only while recording.
pub fn recording(memory: &Memory) -> bool {
    memory.recording
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_memory_is_manual_and_idle() {
        let memory = Memory::new();
        assert_eq!(memory.user_mode, Mode::User);
        assert!(!memory.recording);
        assert!(!run_pilot(&memory));
        assert!(memory.image.is_none());
        assert_eq!(memory.drive, ControlPair::default());
    }

    #[test]
    fn frame_clones_share_pixels() {
        let frame = Frame::new(RgbImage::new(4, 3));
        let copy = frame.clone();
        assert!(std::ptr::eq(frame.image(), copy.image()));
        assert_eq!((copy.width(), copy.height()), (4, 3));
    }
}
