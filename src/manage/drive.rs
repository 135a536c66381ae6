use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::config::{CameraType, Config, PwmBackend};
use crate::parts::actuator::{self, MockPwm, PwmSteering, PwmThrottle, SerialPwmBridge, SharedPwm};
use crate::parts::controller::{ChaosMonkey, ControlState, JoystickConfig, JoystickController, LocalWebController};
use crate::parts::{Camera, DriveMode, ImageListCamera, PilotCondition, PilotPart, SyntheticCamera, Timestamp, TubWriter};
use crate::pilot::LinearPilot;
use crate::tub::Tub;
use crate::vehicle::{keys, memory, Frame, LoopStats, Vehicle};

/// Topic the manual controllers publish their state into.
pub const CONTROL_TOPIC: &str = "user/control";

#[derive(Debug, Clone, Default)]
pub struct DriveOptions {
    /// Pilot checkpoint; without one the pilot runs untrained.
    pub model_path: Option<PathBuf>,
    pub use_joystick: bool,
    pub use_chaos: bool,
}

/// The PWM board selected by `PWM_BACKEND`.
pub fn open_pwm(cfg: &Config) -> Result<SharedPwm> {
    match cfg.pwm_backend {
        PwmBackend::Serial => {
            let bridge = SerialPwmBridge::open(&cfg.pwm_serial_port, cfg.pwm_baud)
                .with_context(|| format!("opening PWM bridge on {}", cfg.pwm_serial_port))?;
            Ok(actuator::shared(bridge))
        }
        PwmBackend::Mock => {
            warn!("PWM_BACKEND is mock, actuators are not driven");
            Ok(actuator::shared(MockPwm::new()))
        }
    }
}

fn load_pilot(cfg: &Config, model_path: Option<&PathBuf>) -> Result<LinearPilot> {
    let Some(path) = model_path else {
        warn!("no --model given, pilot runs on untrained weights");
        return Ok(LinearPilot::new(cfg.camera_resolution));
    };
    let path = cfg.model_path(path);
    let pilot = LinearPilot::load(&path).with_context(|| format!("loading pilot {}", path.display()))?;
    if pilot.input_shape() != cfg.camera_resolution {
        bail!(
            "pilot {} expects {:?} frames but CAMERA_RESOLUTION is {:?}",
            path.display(),
            pilot.input_shape(),
            cfg.camera_resolution
        );
    }
    Ok(pilot)
}

/// Builds the drive pipeline:
/// clock, camera, controller, pilot condition, pilot (when `run_pilot`),
/// drive mode, steering, throttle, tub writer (when `recording`).
pub fn assemble(cfg: &Config, opts: &DriveOptions, pwm: SharedPwm) -> Result<Vehicle> {
    let mut v = Vehicle::new();
    let registry = v.registry();

    v.add(Timestamp::new());

    let frames = registry.get_or_create::<Frame>(keys::CAM_IMAGE);
    match cfg.camera_type {
        CameraType::Synthetic => {
            let source = SyntheticCamera::new(cfg.camera_resolution);
            v.add(Camera::new(source, frames, cfg.camera_framerate));
        }
        CameraType::ImageList => {
            let source = ImageListCamera::from_glob(&cfg.camera_image_glob, cfg.camera_resolution)
                .context("setting up image list camera")?;
            v.add(Camera::new(source, frames, cfg.camera_framerate));
        }
    }

    let control = registry.get_or_create::<ControlState>(CONTROL_TOPIC);
    if opts.use_joystick || cfg.use_joystick_as_default {
        if opts.use_chaos {
            warn!("chaos steering only applies to the web controller, ignored");
        }
        v.add(JoystickController::new(JoystickConfig::from(cfg), control));
    } else {
        let chaos = opts.use_chaos.then(ChaosMonkey::default);
        v.add(LocalWebController::new(cfg.web_control_port, control, chaos));
    }

    v.add(PilotCondition);
    let pilot = load_pilot(cfg, opts.model_path.as_ref())?;
    v.add_when(PilotPart::new(pilot), memory::run_pilot);
    v.add(DriveMode);

    v.add(PwmSteering::new(
        pwm.clone(),
        cfg.steering_channel,
        cfg.steering_left_pwm,
        cfg.steering_right_pwm,
    ));
    v.add(PwmThrottle::new(
        pwm,
        cfg.throttle_channel,
        cfg.throttle_forward_pwm,
        cfg.throttle_stopped_pwm,
        cfg.throttle_reverse_pwm,
    ));

    let tub = Tub::create(&cfg.tub_path)
        .with_context(|| format!("opening tub {}", cfg.tub_path.display()))?;
    v.add_when(TubWriter::new(tub), memory::recording);

    info!(parts = ?v.part_names(), "vehicle assembled");
    Ok(v)
}

/// Assembles the vehicle and runs it until `MAX_LOOPS` or Ctrl-C.
pub fn drive(cfg: &Config, opts: &DriveOptions) -> Result<LoopStats> {
    let pwm = open_pwm(cfg)?;
    let mut v = assemble(cfg, opts, pwm)?;

    let running = v.running_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("interrupt received, stopping");
        running.store(false, Ordering::SeqCst);
    }) {
        warn!(error = %e, "could not install Ctrl-C handler");
    }

    let stats = v
        .start(cfg.drive_loop_hz, cfg.max_loops)
        .context("vehicle loop failed")?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn bench_config(dir: &std::path::Path) -> Config {
        Config {
            camera_resolution: (16, 20),
            pwm_backend: PwmBackend::Mock,
            web_control_port: 0,
            tub_path: dir.join("tub"),
            models_path: dir.join("models"),
            drive_loop_hz: 200,
            max_loops: Some(5),
            ..Config::default()
        }
    }

    #[test]
    fn pipeline_order() {
        let dir = tempdir().unwrap();
        let cfg = bench_config(dir.path());
        let v = assemble(&cfg, &DriveOptions::default(), actuator::shared(MockPwm::new())).unwrap();
        assert_eq!(
            v.part_names(),
            [
                "timestamp",
                "camera",
                "web_controller",
                "pilot_condition",
                "pilot",
                "drive_mode",
                "steering",
                "throttle",
                "tub_writer",
            ]
        );
        assert!(cfg.tub_path.join("meta.json").exists());
    }

    #[test]
    fn missing_model_is_an_error() {
        let dir = tempdir().unwrap();
        let cfg = bench_config(dir.path());
        let opts = DriveOptions {
            model_path: Some(PathBuf::from("missing.json")),
            ..DriveOptions::default()
        };
        assert!(assemble(&cfg, &opts, actuator::shared(MockPwm::new())).is_err());
    }

    #[test]
    fn model_resolution_must_match_camera() {
        let dir = tempdir().unwrap();
        let cfg = bench_config(dir.path());
        LinearPilot::with_seed((8, 8), 1).save(cfg.models_path.join("small.json")).unwrap();
        let opts = DriveOptions {
            model_path: Some(PathBuf::from("small.json")),
            ..DriveOptions::default()
        };
        let err = assemble(&cfg, &opts, actuator::shared(MockPwm::new())).unwrap_err();
        assert!(err.to_string().contains("CAMERA_RESOLUTION"));
    }

    #[test]
    fn bench_drive_runs_bounded_loop() {
        let dir = tempdir().unwrap();
        let cfg = bench_config(dir.path());
        let pwm = MockPwm::new();
        let mut v = assemble(&cfg, &DriveOptions::default(), actuator::shared(pwm.clone())).unwrap();
        let stats = v.start(cfg.drive_loop_hz, cfg.max_loops).unwrap();

        assert_eq!(stats.loops, 5);
        // web default: user mode, centered, stopped
        assert_eq!(pwm.last(cfg.steering_channel), Some(375));
        assert_eq!(pwm.last(cfg.throttle_channel), Some(370));
        // not recording by default
        assert!(Tub::open(&cfg.tub_path).unwrap().is_empty().unwrap());
    }
}
