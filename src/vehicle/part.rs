use thiserror::Error;

use crate::parts::actuator::ActuatorError;
use crate::pilot::ModelError;
use crate::tub::TubError;

use super::memory::Memory;

#[derive(Debug, Error)]
pub enum PartError {
    #[error("actuator: {0}")]
    Actuator(#[from] ActuatorError),
    #[error("tub: {0}")]
    Tub(#[from] TubError),
    #[error("pilot: {0}")]
    Model(#[from] ModelError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("{part}: {message}")]
    Device { part: String, message: String },
}

impl PartError {
    pub fn device(part: &str, message: impl Into<String>) -> Self {
        PartError::Device {
            part: part.to_string(),
            message: message.into(),
        }
    }
}

/// A unit of work run once per tick.
///
/// Parts that own hardware or a background producer set it up in `start`
/// and release it in `shutdown`; `run` must not block on a producer.
pub trait Part: Send {
    fn name(&self) -> &str;

    fn start(&mut self) -> Result<(), PartError> {
        Ok(())
    }

    fn run(&mut self, memory: &mut Memory) -> Result<(), PartError>;

    fn shutdown(&mut self) -> Result<(), PartError> {
        Ok(())
    }
}

/// Predicate over the tick memory deciding whether a part runs this tick.
pub type RunCondition = fn(&Memory) -> bool;
