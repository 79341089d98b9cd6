//! Progress reporting for the flash orchestrator

use std::fmt;

use tracing::info;

use super::FlashError;

/// Steps of the flash state machine, in the order they occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashStep {
    ClearEmissions,
    Session,
    Identify,
    Precondition,
    Unlock,
    WorkshopCode,
    Erase,
    Download,
    Transfer,
    Checksum,
    Dependencies,
    Reset,
    Done,
}

impl fmt::Display for FlashStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FlashStep::ClearEmissions => "clear-emissions",
            FlashStep::Session => "session",
            FlashStep::Identify => "identify",
            FlashStep::Precondition => "precondition",
            FlashStep::Unlock => "unlock",
            FlashStep::WorkshopCode => "workshop-code",
            FlashStep::Erase => "erase",
            FlashStep::Download => "download",
            FlashStep::Transfer => "transfer",
            FlashStep::Checksum => "checksum",
            FlashStep::Dependencies => "dependencies",
            FlashStep::Reset => "reset",
            FlashStep::Done => "done",
        };
        f.write_str(text)
    }
}

/// Sink for orchestrator progress. Both messages have no-op defaults so
/// implementations pick what they care about.
pub trait FlashProgress: Send + Sync {
    fn status(&self, step: FlashStep, text: &str, percent: f32) {
        let _ = (step, text, percent);
    }

    fn done(&self, result: &Result<(), FlashError>) {
        let _ = result;
    }
}

/// Discards all progress.
pub struct NullProgress;

impl FlashProgress for NullProgress {}

/// Reports progress through the log.
pub struct LogProgress;

impl FlashProgress for LogProgress {
    fn status(&self, step: FlashStep, text: &str, percent: f32) {
        info!(%step, percent = format_args!("{percent:5.1}"), "{text}");
    }

    fn done(&self, result: &Result<(), FlashError>) {
        match result {
            Ok(()) => info!("flash complete"),
            Err(e) => info!(error = %e, "flash failed"),
        }
    }
}
