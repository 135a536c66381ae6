use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use super::{ActuatorError, PwmOutput};

/// Pulses kept in the history; older ones are dropped.
pub const HISTORY_LIMIT: usize = 4096;

#[derive(Debug, Default)]
struct Pulses {
    recent: VecDeque<(u8, u16)>,
    last: HashMap<u8, u16>,
}

/// PWM board that only records pulses. Clones share the same record.
///
/// The history is bounded so a bench drive without a loop limit stays in
/// constant memory; the last pulse of every channel is always kept.
#[derive(Debug, Clone, Default)]
pub struct MockPwm {
    pulses: Arc<Mutex<Pulses>>,
}

impl MockPwm {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent (channel, pulse) writes, oldest first, at most
    /// `HISTORY_LIMIT` of them.
    pub fn history(&self) -> Vec<(u8, u16)> {
        self.pulses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recent
            .iter()
            .copied()
            .collect()
    }

    pub fn last(&self, channel: u8) -> Option<u16> {
        self.pulses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last
            .get(&channel)
            .copied()
    }
}

impl PwmOutput for MockPwm {
    fn set_pulse(&mut self, channel: u8, pulse: u16) -> Result<(), ActuatorError> {
        trace!(channel, pulse, "mock pwm");
        let mut pulses = self.pulses.lock().map_err(|_| ActuatorError::Poisoned)?;
        if pulses.recent.len() == HISTORY_LIMIT {
            pulses.recent.pop_front();
        }
        pulses.recent.push_back((channel, pulse));
        pulses.last.insert(channel, pulse);
        Ok(())
    }
}
