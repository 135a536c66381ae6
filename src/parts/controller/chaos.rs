use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::vehicle::Mode;

pub const DEFAULT_CHAOS_FREQUENCY: u64 = 1000;
pub const DEFAULT_CHAOS_DURATION: u64 = 10;

/// Periodically overrides manual steering with a random angle, so recorded
/// data contains recoveries from bad headings. Only active in `user` mode.
#[derive(Debug)]
pub struct ChaosMonkey {
    frequency: u64,
    duration: u64,
    counter: u64,
    steering: Option<f32>,
    rng: SmallRng,
}

impl ChaosMonkey {
    pub fn new(frequency: u64, duration: u64) -> Self {
        Self::with_rng(frequency, duration, SmallRng::from_entropy())
    }

    pub fn with_seed(frequency: u64, duration: u64, seed: u64) -> Self {
        Self::with_rng(frequency, duration, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(frequency: u64, duration: u64, rng: SmallRng) -> Self {
        Self {
            frequency: frequency.max(1),
            duration,
            counter: 0,
            steering: None,
            rng,
        }
    }

    pub fn is_active(&self) -> bool {
        self.steering.is_some()
    }

    /// Steering to apply this tick given the operator's `angle`.
    pub fn steer(&mut self, mode: &Mode, angle: f32) -> f32 {
        if *mode != Mode::User {
            self.counter = 0;
            self.steering = None;
            return angle;
        }

        self.counter += 1;
        if self.counter == self.frequency {
            let random = self.rng.gen_range(-1.0..=1.0);
            debug!(angle = random, "chaos steering on");
            self.steering = Some(random);
        } else if self.counter >= self.frequency + self.duration {
            debug!("chaos steering off");
            self.steering = None;
            self.counter = 0;
        }
        self.steering.unwrap_or(angle)
    }
}

impl Default for ChaosMonkey {
    fn default() -> Self {
        Self::new(DEFAULT_CHAOS_FREQUENCY, DEFAULT_CHAOS_DURATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_for_duration_every_period() {
        let mut chaos = ChaosMonkey::with_seed(5, 2, 7);
        let out: Vec<bool> = (0..14)
            .map(|_| chaos.steer(&Mode::User, 0.0) != 0.0 || chaos.is_active())
            .collect();
        //ticks 5,6 overridden, 7 back to manual, counter restarts
        assert_eq!(
            out,
            vec![false, false, false, false, true, true, false, false, false, false, false, true, true, false]
        );
    }

    #[test]
    fn random_steering_in_range_and_held() {
        let mut chaos = ChaosMonkey::with_seed(1, 3, 42);
        let first = chaos.steer(&Mode::User, 0.5);
        let second = chaos.steer(&Mode::User, 0.5);
        assert!((-1.0..=1.0).contains(&first));
        assert_eq!(first, second);
    }

    #[test]
    fn inactive_outside_user_mode() {
        let mut chaos = ChaosMonkey::with_seed(1, 10, 1);
        assert_eq!(chaos.steer(&Mode::Local, 0.3), 0.3);
        assert_eq!(chaos.steer(&Mode::LocalAngle, 0.3), 0.3);
        assert!(!chaos.is_active());
    }
}
