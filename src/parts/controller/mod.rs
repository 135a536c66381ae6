/**
 * Manual Controllers
 *
 * Both controllers run their input handling on a background thread and
 * publish a `ControlState` into a latest-value topic. Each tick the part
 * copies the newest state into `user/angle`, `user/throttle`, `user/mode`
 * and `recording`; without new input the previous values stay in place.
 */

pub mod chaos;
pub mod joystick;
pub mod web;

pub use chaos::ChaosMonkey;
pub use joystick::{JoystickConfig, JoystickController};
pub use web::LocalWebController;

use serde::{Deserialize, Serialize};

use crate::vehicle::{ControlPair, Memory, Mode};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    pub angle: f32,
    pub throttle: f32,
    #[serde(rename = "drive_mode")]
    pub mode: Mode,
    pub recording: bool,
}

impl ControlState {
    pub fn apply_to(&self, memory: &mut Memory) {
        memory.user = ControlPair::new(self.angle, self.throttle);
        memory.user_mode = self.mode.clone();
        memory.recording = self.recording;
    }
}
