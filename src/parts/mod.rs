/**
 * Drive Parts
 *
 * Everything the drive loop runs, in pipeline order:
 * clock -> camera -> controller -> pilot condition -> pilot -> drive mode
 * -> steering/throttle -> tub writer
 */

pub mod actuator;
pub mod arbiter;
pub mod camera;
pub mod clock;
pub mod controller;
pub mod pilot;
pub mod tub_writer;

pub use actuator::{MockPwm, PwmOutput, PwmSteering, PwmThrottle, SerialPwmBridge, SharedPwm};
pub use arbiter::{drive_mode, pilot_condition, DriveMode, PilotCondition};
pub use camera::{Camera, FrameSource, ImageListCamera, SyntheticCamera};
pub use clock::Timestamp;
pub use controller::{ChaosMonkey, ControlState, JoystickController, LocalWebController};
pub use pilot::PilotPart;
pub use tub_writer::TubWriter;
