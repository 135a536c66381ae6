/**
 * Joystick Controller
 *
 * Reads the Linux joystick interface (`/dev/input/jsN`). Each event is an
 * 8 byte record: [time u32][value i16][type u8][number u8], little endian.
 * The reader thread folds events into a `ControlState` and publishes it.
 */

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::ControlState;
use crate::config::Config;
use crate::pubsub::{Publisher, Subscriber, Topic};
use crate::vehicle::{Memory, Mode, Part, PartError};

pub const JS_EVENT_SIZE: usize = 8;
pub const JS_EVENT_BUTTON: u8 = 0x01;
pub const JS_EVENT_AXIS: u8 = 0x02;
pub const JS_EVENT_INIT: u8 = 0x80;

const AXIS_MAX: f32 = 32767.0;
const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsEvent {
    pub time: u32,    //ms
    pub value: i16,
    pub kind: u8,
    pub number: u8,
}

impl JsEvent {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < JS_EVENT_SIZE {
            return None;
        }
        Some(JsEvent {
            time: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            value: i16::from_le_bytes([data[4], data[5]]),
            kind: data[6],
            number: data[7],
        })
    }

    pub fn is_init(&self) -> bool {
        self.kind & JS_EVENT_INIT != 0
    }

    fn base_kind(&self) -> u8 {
        self.kind & !JS_EVENT_INIT
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoystickConfig {
    pub device: PathBuf,
    pub max_throttle: f32,
    pub steering_scale: f32,
    pub steering_axis: u8,
    pub throttle_axis: u8,
    pub mode_button: u8,
    pub record_button: u8,
    pub auto_record_on_throttle: bool,
}

impl From<&Config> for JoystickConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            device: cfg.joystick_device.clone(),
            max_throttle: cfg.joystick_max_throttle,
            steering_scale: cfg.joystick_steering_scale,
            steering_axis: cfg.joystick_steering_axis,
            throttle_axis: cfg.joystick_throttle_axis,
            mode_button: cfg.joystick_mode_button,
            record_button: cfg.joystick_record_button,
            auto_record_on_throttle: cfg.auto_record_on_throttle,
        }
    }
}

/// Folds joystick events into a control state.
#[derive(Debug, Clone)]
pub struct JoystickMapper {
    config: JoystickConfig,
    state: ControlState,
}

impl JoystickMapper {
    pub fn new(config: JoystickConfig) -> Self {
        Self {
            config,
            state: ControlState::default(),
        }
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    /// Applies one event, returns whether the state changed.
    pub fn apply(&mut self, event: &JsEvent) -> bool {
        let before = self.state.clone();
        match event.base_kind() {
            JS_EVENT_AXIS => self.on_axis(event.number, f32::from(event.value) / AXIS_MAX),
            //initial button snapshot is not a press
            JS_EVENT_BUTTON if !event.is_init() && event.value == 1 => self.on_button(event.number),
            _ => {}
        }
        self.state != before
    }

    fn on_axis(&mut self, axis: u8, value: f32) {
        if axis == self.config.steering_axis {
            self.state.angle = (value * self.config.steering_scale).clamp(-1.0, 1.0);
        } else if axis == self.config.throttle_axis {
            //stick forward reads negative
            self.state.throttle = (-value * self.config.max_throttle).clamp(-1.0, 1.0);
            if self.config.auto_record_on_throttle {
                self.state.recording = self.state.throttle != 0.0 && self.state.mode == Mode::User;
            }
        }
    }

    fn on_button(&mut self, button: u8) {
        if button == self.config.mode_button {
            self.state.mode = self.state.mode.next();
            info!(mode = %self.state.mode, "drive mode changed");
        } else if button == self.config.record_button && !self.config.auto_record_on_throttle {
            self.state.recording = !self.state.recording;
            info!(recording = self.state.recording, "recording toggled");
        }
    }
}

fn open_device(config: &JoystickConfig) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.custom_flags(libc::O_NONBLOCK);
    }
    options.open(&config.device)
}

/// Threaded joystick part producing the `user/*` values and `recording`.
pub struct JoystickController {
    config: JoystickConfig,
    publisher: Publisher<ControlState>,
    subscriber: Subscriber<ControlState>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl JoystickController {
    pub fn new(config: JoystickConfig, control: Arc<Topic<ControlState>>) -> Self {
        if control.is_empty() {
            control.publish(ControlState::default());
        }
        Self {
            config,
            publisher: Publisher::new(Arc::clone(&control)),
            subscriber: Subscriber::new(control),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

impl Part for JoystickController {
    fn name(&self) -> &str {
        "joystick_controller"
    }

    fn start(&mut self) -> Result<(), PartError> {
        let mut device = open_device(&self.config).map_err(|e| {
            PartError::device("joystick_controller", format!("{}: {e}", self.config.device.display()))
        })?;
        info!(device = %self.config.device.display(), "joystick opened");

        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);
        let publisher = self.publisher.clone();
        let mut mapper = JoystickMapper::new(self.config.clone());

        self.handle = Some(thread::spawn(move || {
            let mut buf = [0u8; JS_EVENT_SIZE];
            while running.load(Ordering::SeqCst) {
                match device.read_exact(&mut buf) {
                    Ok(()) => {
                        let Some(event) = JsEvent::from_bytes(&buf) else { continue };
                        if mapper.apply(&event) {
                            publisher.publish(mapper.state().clone());
                        }
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
                    Err(e) => {
                        warn!(error = %e, "joystick read failed, stopping reader");
                        break;
                    }
                }
            }
            debug!("joystick thread exiting");
        }));
        Ok(())
    }

    fn run(&mut self, memory: &mut Memory) -> Result<(), PartError> {
        if let Some(state) = self.subscriber.take_latest() {
            state.apply_to(memory);
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), PartError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                return Err(PartError::device("joystick_controller", "reader thread panicked"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: u8, number: u8, value: i16) -> JsEvent {
        JsEvent { time: 0, value, kind, number }
    }

    fn mapper(auto_record: bool) -> JoystickMapper {
        let mut cfg = JoystickConfig::from(&Config::default());
        cfg.auto_record_on_throttle = auto_record;
        JoystickMapper::new(cfg)
    }

    #[test]
    fn decodes_raw_event() {
        let raw = [0x10, 0x00, 0x00, 0x00, 0xFF, 0x7F, 0x02, 0x04];
        let ev = JsEvent::from_bytes(&raw).unwrap();
        assert_eq!(ev, event(JS_EVENT_AXIS, 4, 32767));
        assert_eq!(ev.time, 16);
        assert!(JsEvent::from_bytes(&raw[..7]).is_none());
    }

    #[test]
    fn axes_scale_steering_and_throttle() {
        let mut m = mapper(true);
        assert!(m.apply(&event(JS_EVENT_AXIS, 0, 32767)));
        assert_eq!(m.state().angle, 1.0);

        //full forward on the throttle stick is -32767
        m.apply(&event(JS_EVENT_AXIS, 4, -32767));
        assert!((m.state().throttle - 0.25).abs() < 1e-6);
        assert!(m.state().recording);

        m.apply(&event(JS_EVENT_AXIS, 4, 0));
        assert_eq!(m.state().throttle, 0.0);
        assert!(!m.state().recording);
    }

    #[test]
    fn mode_button_cycles_modes() {
        let mut m = mapper(true);
        m.apply(&event(JS_EVENT_BUTTON, 3, 1));
        assert_eq!(m.state().mode, Mode::LocalAngle);
        //release does nothing
        assert!(!m.apply(&event(JS_EVENT_BUTTON, 3, 0)));
        m.apply(&event(JS_EVENT_BUTTON, 3, 1));
        m.apply(&event(JS_EVENT_BUTTON, 3, 1));
        assert_eq!(m.state().mode, Mode::User);
    }

    #[test]
    fn auto_record_only_in_user_mode() {
        let mut m = mapper(true);
        m.apply(&event(JS_EVENT_BUTTON, 3, 1));
        m.apply(&event(JS_EVENT_AXIS, 4, -16000));
        assert!(!m.state().recording);
    }

    #[test]
    fn record_button_toggles_without_auto_record() {
        let mut m = mapper(false);
        m.apply(&event(JS_EVENT_BUTTON, 0, 1));
        assert!(m.state().recording);
        m.apply(&event(JS_EVENT_BUTTON, 0, 1));
        assert!(!m.state().recording);
    }

    #[test]
    fn init_button_events_are_ignored() {
        let mut m = mapper(true);
        assert!(!m.apply(&event(JS_EVENT_BUTTON | JS_EVENT_INIT, 3, 1)));
        assert_eq!(m.state().mode, Mode::User);
    }

    #[test]
    fn missing_device_fails_to_start() {
        let mut cfg = JoystickConfig::from(&Config::default());
        cfg.device = PathBuf::from("/nonexistent/js9");
        let mut js = JoystickController::new(cfg, Arc::new(Topic::new("user/control")));
        assert!(js.start().is_err());
    }
}
