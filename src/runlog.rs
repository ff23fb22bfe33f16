//! Run log: the coordinating rank's record of driver-level events.
//!
//! REGRID, STEP, CHECKPOINT and RESTART events are mirrored to the `log`
//! facade (for whatever logger the host installs) and, when a path is
//! configured, appended to a run-log file by the I/O rank only. Other ranks
//! hold a disabled writer and the calls are no-ops, so callers never branch
//! on rank.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::amr_error::AmrError;

#[derive(Debug, Default)]
pub struct RunLog {
    file: Option<BufWriter<File>>,
}

impl RunLog {
    /// A log that only mirrors to the `log` facade.
    pub fn disabled() -> Self {
        RunLog { file: None }
    }

    /// Open (append) the run log at `path`. Call on the I/O rank only;
    /// non-I/O ranks use [`disabled`](Self::disabled).
    pub fn open(path: &Path) -> Result<Self, AmrError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AmrError::io(path.display().to_string(), e))?;
        Ok(RunLog {
            file: Some(BufWriter::new(file)),
        })
    }

    /// Record one event line.
    pub fn record(&mut self, msg: &str) {
        log::info!("{msg}");
        if let Some(f) = self.file.as_mut() {
            // Best effort: a failing diagnostics write must not take the
            // run down mid-step; flush() reports persistent failures.
            let _ = writeln!(f, "{msg}");
        }
    }

    pub fn flush(&mut self) -> Result<(), AmrError> {
        if let Some(f) = self.file.as_mut() {
            f.flush()
                .map_err(|e| AmrError::io("run log", e))?;
        }
        Ok(())
    }
}
