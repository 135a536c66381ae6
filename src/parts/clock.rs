use chrono::{DateTime, Utc};

use crate::vehicle::{Memory, Part, PartError};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Produces `timestamp`, the UTC wall clock at the start of the tick.
#[derive(Debug, Default)]
pub struct Timestamp;

impl Timestamp {
    pub fn new() -> Self {
        Timestamp
    }
}

impl Part for Timestamp {
    fn name(&self) -> &str {
        "timestamp"
    }

    fn run(&mut self, memory: &mut Memory) -> Result<(), PartError> {
        memory.timestamp = Some(format_timestamp(Utc::now()));
        Ok(())
    }
}
