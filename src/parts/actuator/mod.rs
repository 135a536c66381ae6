/**
 * PWM Actuators
 *
 * Steering servo and throttle ESC driven by pulse widths on a PWM board.
 * The board sits behind `PwmOutput`: a serial bridge to the microcontroller
 * generating the pulses, or an in-memory mock for bench runs.
 */

pub mod mock;
pub mod serial;

pub use mock::MockPwm;
pub use serial::{SerialLink, SerialPwmBridge};

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::vehicle::{Memory, Part, PartError};

/// Largest pulse a 12-bit PWM board accepts.
pub const MAX_PULSE: u16 = 4095;

const CALIBRATION_STEP: Duration = Duration::from_millis(10);
const DEFAULT_CALIBRATION_SETTLE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("serial port: {0}")]
    Serial(#[from] serialport::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("pwm output lock poisoned")]
    Poisoned,
}

pub trait PwmOutput: Send {
    fn set_pulse(&mut self, channel: u8, pulse: u16) -> Result<(), ActuatorError>;
}

/// One PWM board shared by the steering and throttle parts.
pub type SharedPwm = Arc<Mutex<dyn PwmOutput>>;

pub fn shared(output: impl PwmOutput + 'static) -> SharedPwm {
    Arc::new(Mutex::new(output))
}

fn set_pulse(output: &SharedPwm, channel: u8, pulse: u16) -> Result<(), ActuatorError> {
    let mut board = output.lock().map_err(|_| ActuatorError::Poisoned)?;
    board.set_pulse(channel, pulse)
}

/// Linear map of `x` from [x_min, x_max] onto [y_min, y_max], floored.
pub fn map_range(x: f32, x_min: f32, x_max: f32, y_min: f32, y_max: f32) -> i32 {
    let (x, x_min, x_max) = (f64::from(x), f64::from(x_min), f64::from(x_max));
    let (y_min, y_max) = (f64::from(y_min), f64::from(y_max));
    ((x - x_min) * (y_max - y_min) / (x_max - x_min) + y_min).floor() as i32
}

fn to_pulse(value: i32) -> u16 {
    value.clamp(0, i32::from(MAX_PULSE)) as u16
}

/// Steering servo: `angle` in [-1, 1] maps onto [left_pulse, right_pulse].
pub struct PwmSteering {
    output: SharedPwm,
    channel: u8,
    left_pulse: u16,
    right_pulse: u16,
}

impl PwmSteering {
    pub fn new(output: SharedPwm, channel: u8, left_pulse: u16, right_pulse: u16) -> Self {
        Self { output, channel, left_pulse, right_pulse }
    }

    pub fn pulse_for(&self, angle: f32) -> u16 {
        let angle = angle.clamp(-1.0, 1.0);
        to_pulse(map_range(angle, -1.0, 1.0, f32::from(self.left_pulse), f32::from(self.right_pulse)))
    }

    fn apply(&self, angle: f32) -> Result<(), ActuatorError> {
        set_pulse(&self.output, self.channel, self.pulse_for(angle))
    }
}

impl Part for PwmSteering {
    fn name(&self) -> &str {
        "steering"
    }

    fn run(&mut self, memory: &mut Memory) -> Result<(), PartError> {
        self.apply(memory.drive.angle)?;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), PartError> {
        self.apply(0.0)?;
        Ok(())
    }
}

/// Throttle ESC: forward maps onto [stopped, forward], reverse onto [reverse, stopped].
pub struct PwmThrottle {
    output: SharedPwm,
    channel: u8,
    max_pulse: u16,
    zero_pulse: u16,
    min_pulse: u16,
    settle: Duration,
}

impl PwmThrottle {
    pub fn new(output: SharedPwm, channel: u8, max_pulse: u16, zero_pulse: u16, min_pulse: u16) -> Self {
        Self {
            output,
            channel,
            max_pulse,
            zero_pulse,
            min_pulse,
            settle: DEFAULT_CALIBRATION_SETTLE,
        }
    }

    /// How long the ESC is held at neutral after calibration.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn pulse_for(&self, throttle: f32) -> u16 {
        let throttle = throttle.clamp(-1.0, 1.0);
        let pulse = if throttle > 0.0 {
            map_range(throttle, 0.0, 1.0, f32::from(self.zero_pulse), f32::from(self.max_pulse))
        } else {
            map_range(throttle, -1.0, 0.0, f32::from(self.min_pulse), f32::from(self.zero_pulse))
        };
        to_pulse(pulse)
    }

    /// ESC arming sequence: full forward, full reverse, then neutral.
    pub fn calibrate(&mut self) -> Result<(), ActuatorError> {
        info!(channel = self.channel, "calibrating ESC");
        set_pulse(&self.output, self.channel, self.max_pulse)?;
        thread::sleep(CALIBRATION_STEP);
        set_pulse(&self.output, self.channel, self.min_pulse)?;
        thread::sleep(CALIBRATION_STEP);
        set_pulse(&self.output, self.channel, self.zero_pulse)?;
        thread::sleep(self.settle);
        debug!("ESC calibrated");
        Ok(())
    }

    fn apply(&self, throttle: f32) -> Result<(), ActuatorError> {
        set_pulse(&self.output, self.channel, self.pulse_for(throttle))
    }
}

impl Part for PwmThrottle {
    fn name(&self) -> &str {
        "throttle"
    }

    fn start(&mut self) -> Result<(), PartError> {
        self.calibrate()?;
        Ok(())
    }

    fn run(&mut self, memory: &mut Memory) -> Result<(), PartError> {
        self.apply(memory.drive.throttle)?;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), PartError> {
        self.apply(0.0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::ControlPair;

    fn steering(board: &MockPwm) -> PwmSteering {
        PwmSteering::new(shared(board.clone()), 1, 460, 290)
    }

    fn throttle(board: &MockPwm) -> PwmThrottle {
        PwmThrottle::new(shared(board.clone()), 0, 500, 370, 220).with_settle(Duration::ZERO)
    }

    #[test]
    fn map_range_endpoints_and_midpoint() {
        assert_eq!(map_range(-1.0, -1.0, 1.0, 460.0, 290.0), 460);
        assert_eq!(map_range(1.0, -1.0, 1.0, 460.0, 290.0), 290);
        assert_eq!(map_range(0.0, -1.0, 1.0, 460.0, 290.0), 375);
        //floored, not rounded
        assert_eq!(map_range(0.5, 0.0, 1.0, 0.0, 3.0), 1);
    }

    #[test]
    fn steering_pulses() {
        let board = MockPwm::new();
        let s = steering(&board);
        assert_eq!(s.pulse_for(-1.0), 460);
        assert_eq!(s.pulse_for(1.0), 290);
        assert_eq!(s.pulse_for(0.0), 375);
        //clamped outside [-1, 1]
        assert_eq!(s.pulse_for(3.0), 290);
    }

    #[test]
    fn throttle_pulses() {
        let board = MockPwm::new();
        let t = throttle(&board);
        assert_eq!(t.pulse_for(1.0), 500);
        assert_eq!(t.pulse_for(0.5), 435);
        assert_eq!(t.pulse_for(0.0), 370);
        assert_eq!(t.pulse_for(-0.5), 295);
        assert_eq!(t.pulse_for(-1.0), 220);
    }

    #[test]
    fn throttle_calibration_sequence() {
        let board = MockPwm::new();
        let mut t = throttle(&board);
        t.start().unwrap();
        assert_eq!(board.history(), vec![(0, 500), (0, 220), (0, 370)]);
    }

    #[test]
    fn parts_drive_board_and_center_on_shutdown() {
        let board = MockPwm::new();
        let mut s = steering(&board);
        let mut t = throttle(&board);
        let mut memory = Memory::new();
        memory.drive = ControlPair::new(1.0, 0.5);

        s.run(&mut memory).unwrap();
        t.run(&mut memory).unwrap();
        assert_eq!(board.last(1), Some(290));
        assert_eq!(board.last(0), Some(435));

        s.shutdown().unwrap();
        t.shutdown().unwrap();
        assert_eq!(board.last(1), Some(375));
        assert_eq!(board.last(0), Some(370));
    }
}
