//! Leveled diagnostics emitted by the simulation orchestrator.

use std::fmt;

use log::Level;

use super::BackendError;

/// Something the orchestrator wants to report.
#[derive(Debug)]
pub enum Diagnostic<'a> {
    /// Construction aborted; no simulation was produced.
    ConstructionFailed { error: &'a BackendError },
    /// No presentable target was available, so frame `frame` recorded no work.
    FrameSkipped { frame: u64 },
    /// The input grid was repopulated from the seed policy.
    Reseeded { cells: usize },
}

impl fmt::Display for Diagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConstructionFailed { error } => {
                write!(f, "simulation construction failed: {error}")
            }
            Self::FrameSkipped { frame } => {
                write!(f, "frame {frame} skipped: no presentable surface")
            }
            Self::Reseeded { cells } => write!(f, "reseeded {cells} cells"),
        }
    }
}

/// Receives orchestrator diagnostics.
pub type DiagnosticSink = Box<dyn FnMut(Level, &Diagnostic<'_>) + Send>;

/// Default sink: forwards to the `log` facade.
pub fn log_sink() -> DiagnosticSink {
    Box::new(|level: Level, diagnostic: &Diagnostic<'_>| {
        log::log!(target: "gray_scott::simulation", level, "{diagnostic}")
    })
}
