/**
 * Vehicle Loop
 *
 * Runs registered parts in order at a fixed rate:
 * 1. start every part (producer threads, ESC calibration)
 * 2. each tick, run each part whose run condition holds
 * 3. sleep the rest of the period
 * 4. shut every part down when the loop ends, also after an error
 */

pub mod memory;
pub mod mode;
pub mod part;

pub use memory::{keys, ControlPair, Frame, Memory};
pub use mode::Mode;
pub use part::{Part, PartError, RunCondition};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::pubsub::TopicRegistry;

struct PartEntry {
    part: Box<dyn Part>,
    run_condition: Option<RunCondition>,
}

/// Loop statistics returned when the vehicle stops.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopStats {
    pub loops: u64,
    pub overruns: u64,
    pub busy: Duration,
}

impl LoopStats {
    /// Mean time spent running parts per tick.
    pub fn mean_tick(&self) -> Duration {
        if self.loops == 0 {
            return Duration::ZERO;
        }
        self.busy / self.loops as u32
    }
}

pub struct Vehicle {
    parts: Vec<PartEntry>,
    memory: Memory,
    registry: Arc<TopicRegistry>,
    running: Arc<AtomicBool>,
}

impl Vehicle {
    pub fn new() -> Self {
        Self {
            parts: Vec::new(),
            memory: Memory::new(),
            registry: Arc::new(TopicRegistry::new()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Topics threaded parts publish into.
    pub fn registry(&self) -> Arc<TopicRegistry> {
        Arc::clone(&self.registry)
    }

    /// Clearing this flag stops the loop after the current tick.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn add(&mut self, part: impl Part + 'static) {
        self.push(Box::new(part), None);
    }

    pub fn add_when(&mut self, part: impl Part + 'static, run_condition: RunCondition) {
        self.push(Box::new(part), Some(run_condition));
    }

    fn push(&mut self, part: Box<dyn Part>, run_condition: Option<RunCondition>) {
        debug!(part = part.name(), conditional = run_condition.is_some(), "adding part");
        self.parts.push(PartEntry { part, run_condition });
    }

    pub fn part_names(&self) -> Vec<&str> {
        self.parts.iter().map(|e| e.part.name()).collect()
    }

    /// Runs the loop at `rate_hz` until `max_loop_count` ticks have run or
    /// the running flag is cleared.
    pub fn start(&mut self, rate_hz: u32, max_loop_count: Option<u64>) -> Result<LoopStats, PartError> {
        let period = Duration::from_secs_f64(1.0 / f64::from(rate_hz.max(1)));

        for idx in 0..self.parts.len() {
            if let Err(e) = self.parts[idx].part.start() {
                error!(part = self.parts[idx].part.name(), error = %e, "part failed to start");
                let _ = self.shutdown_parts(idx);
                return Err(e);
            }
        }

        self.running.store(true, Ordering::SeqCst);
        info!(rate_hz, ?max_loop_count, parts = self.parts.len(), "vehicle loop started");

        let mut stats = LoopStats::default();
        let mut result = Ok(());

        while self.running.load(Ordering::SeqCst) {
            if max_loop_count.is_some_and(|max| stats.loops >= max) {
                break;
            }

            let tick_start = Instant::now();
            if let Err(e) = self.update_parts() {
                result = Err(e);
                break;
            }
            stats.loops += 1;

            let busy = tick_start.elapsed();
            stats.busy += busy;
            match period.checked_sub(busy) {
                Some(rest) => thread::sleep(rest),
                None => {
                    stats.overruns += 1;
                    debug!(?busy, ?period, "tick overran its period");
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(loops = stats.loops, overruns = stats.overruns, mean_tick = ?stats.mean_tick(), "vehicle loop stopped");

        let shutdown = self.shutdown_parts(self.parts.len());
        result?;
        shutdown?;
        Ok(stats)
    }

    /// Runs one tick over every part.
    pub fn update_parts(&mut self) -> Result<(), PartError> {
        let memory = &mut self.memory;
        for entry in self.parts.iter_mut() {
            if let Some(condition) = entry.run_condition {
                if !condition(memory) {
                    continue;
                }
            }
            if let Err(e) = entry.part.run(memory) {
                error!(part = entry.part.name(), error = %e, "part failed");
                return Err(e);
            }
        }
        Ok(())
    }

    //shuts down the first `count` parts, returns the first failure
    fn shutdown_parts(&mut self, count: usize) -> Result<(), PartError> {
        let mut first_err = None;
        for entry in self.parts[..count].iter_mut() {
            if let Err(e) = entry.part.shutdown() {
                error!(part = entry.part.name(), error = %e, "part failed to shut down");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vehicle")
            .field("parts", &self.part_names())
            .field("topics", &self.registry.topic_names())
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

impl Default for Vehicle {
    fn default() -> Self {
        Self::new()
    }
}
