use tracing::{info, warn};

use crate::tub::Tub;
use crate::vehicle::{Memory, Part, PartError};

/// Appends `cam/image_array`, `user/*` and `timestamp` to a tub.
/// Registered behind the `recording` condition.
pub struct TubWriter {
    tub: Tub,
    written: usize,
    missing_frame_warned: bool,
}

impl TubWriter {
    pub fn new(tub: Tub) -> Self {
        Self {
            tub,
            written: 0,
            missing_frame_warned: false,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn tub(&self) -> &Tub {
        &self.tub
    }
}

impl Part for TubWriter {
    fn name(&self) -> &str {
        "tub_writer"
    }

    fn run(&mut self, memory: &mut Memory) -> Result<(), PartError> {
        let Some(frame) = memory.image.as_ref() else {
            if !self.missing_frame_warned {
                warn!("recording without a camera frame, records skipped");
                self.missing_frame_warned = true;
            }
            return Ok(());
        };
        self.tub.put_record(
            frame.image(),
            memory.user,
            &memory.user_mode,
            memory.timestamp.as_deref(),
        )?;
        self.written += 1;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), PartError> {
        info!(path = ?self.tub.path(), records = self.written, "tub closed");
        Ok(())
    }
}
