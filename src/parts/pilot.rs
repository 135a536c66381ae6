use tracing::trace;

use crate::pilot::LinearPilot;
use crate::vehicle::{Memory, Part, PartError};

/// `cam/image_array` -> `pilot/angle`, `pilot/throttle`
///
/// Registered behind the `run_pilot` condition; leaves the previous
/// prediction in place on ticks without a frame.
pub struct PilotPart {
    model: LinearPilot,
}

impl PilotPart {
    pub fn new(model: LinearPilot) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &LinearPilot {
        &self.model
    }
}

impl Part for PilotPart {
    fn name(&self) -> &str {
        "pilot"
    }

    fn run(&mut self, memory: &mut Memory) -> Result<(), PartError> {
        let Some(frame) = memory.image.as_ref() else {
            trace!("no frame yet, pilot skipped");
            return Ok(());
        };
        memory.pilot = self.model.predict(frame)?;
        Ok(())
    }
}
