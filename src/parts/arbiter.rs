/**
 * Mode Arbitration
 *
 * The two decisions the drive loop makes itself:
 * - whether the pilot runs this tick (`pilot_condition`)
 * - which of the manual and pilot values reach the actuators (`drive_mode`)
 *
 * Any mode other than `user` and `local_angle` is treated as full
 * autopilot, including mode strings no controller produces.
 */

use crate::vehicle::{ControlPair, Memory, Mode, Part, PartError};

/// False only in `user` mode.
pub fn pilot_condition(mode: &Mode) -> bool {
    !matches!(mode, Mode::User)
}

/// Picks the pair sent to the actuators.
pub fn drive_mode(mode: &Mode, user: ControlPair, pilot: ControlPair) -> ControlPair {
    match mode {
        Mode::User => user,
        Mode::LocalAngle => ControlPair::new(pilot.angle, user.throttle),
        // TODO: unknown modes should probably stop the car instead of
        // handing it to the pilot; kept as-is until controllers validate modes.
        Mode::Local | Mode::Other(_) => pilot,
    }
}

/// `user/mode` -> `run_pilot`
#[derive(Debug, Default)]
pub struct PilotCondition;

impl Part for PilotCondition {
    fn name(&self) -> &str {
        "pilot_condition"
    }

    fn run(&mut self, memory: &mut Memory) -> Result<(), PartError> {
        memory.run_pilot = pilot_condition(&memory.user_mode);
        Ok(())
    }
}

/// `user/mode`, `user/*`, `pilot/*` -> `angle`, `throttle`
#[derive(Debug, Default)]
pub struct DriveMode;

impl Part for DriveMode {
    fn name(&self) -> &str {
        "drive_mode"
    }

    fn run(&mut self, memory: &mut Memory) -> Result<(), PartError> {
        memory.drive = drive_mode(&memory.user_mode, memory.user, memory.pilot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANUAL: ControlPair = ControlPair { angle: 0.3, throttle: 0.5 };
    const PILOT: ControlPair = ControlPair { angle: 0.9, throttle: 0.9 };

    #[test]
    fn gate_blocks_only_user_mode() {
        assert!(!pilot_condition(&Mode::User));
        assert!(pilot_condition(&Mode::LocalAngle));
        assert!(pilot_condition(&Mode::Local));
        assert!(pilot_condition(&Mode::from("bogus")));
        assert!(pilot_condition(&Mode::from("")));
    }

    #[test]
    fn user_mode_passes_manual_values() {
        assert_eq!(drive_mode(&Mode::User, MANUAL, PILOT), ControlPair::new(0.3, 0.5));
    }

    #[test]
    fn local_angle_mixes_pilot_steering_with_manual_throttle() {
        assert_eq!(drive_mode(&Mode::LocalAngle, MANUAL, PILOT), ControlPair::new(0.9, 0.5));
    }

    #[test]
    fn local_mode_passes_pilot_values() {
        assert_eq!(drive_mode(&Mode::Local, MANUAL, PILOT), ControlPair::new(0.9, 0.9));
    }

    #[test]
    fn unknown_mode_falls_back_to_full_autopilot() {
        let mode = Mode::from("bogus");
        assert!(pilot_condition(&mode));
        assert_eq!(drive_mode(&mode, MANUAL, PILOT), ControlPair::new(0.9, 0.9));
    }

    #[test]
    fn arbitration_holds_for_many_value_combinations() {
        let values = [-1.0f32, -0.35, 0.0, 0.2, 1.0];
        for &ua in &values {
            for &ut in &values {
                for &pa in &values {
                    for &pt in &values {
                        let user = ControlPair::new(ua, ut);
                        let pilot = ControlPair::new(pa, pt);
                        assert_eq!(drive_mode(&Mode::User, user, pilot), user);
                        assert_eq!(drive_mode(&Mode::LocalAngle, user, pilot), ControlPair::new(pa, ut));
                        assert_eq!(drive_mode(&Mode::Local, user, pilot), pilot);
                        assert_eq!(drive_mode(&Mode::from("x"), user, pilot), pilot);
                    }
                }
            }
        }
    }

    #[test]
    fn parts_read_and_write_memory() {
        let mut memory = Memory::new();
        memory.user_mode = Mode::LocalAngle;
        memory.user = MANUAL;
        memory.pilot = PILOT;

        PilotCondition.run(&mut memory).unwrap();
        DriveMode.run(&mut memory).unwrap();
        assert!(memory.run_pilot);
        assert_eq!(memory.drive, ControlPair::new(0.9, 0.5));
    }
}
