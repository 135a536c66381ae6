/**
 * Car Management
 *
 * The two things the `manage` binary does:
 * - `drive`: assemble the part pipeline and run the vehicle loop
 * - `train`: fit a pilot on recorded tubs
 */

pub mod drive;
pub mod train;

pub use drive::{assemble, drive, open_pwm, DriveOptions, CONTROL_TOPIC};
pub use train::{train, TrainPlan};
