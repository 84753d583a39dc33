use std::{fmt, process::ExitStatus};

use json_frames::FrameError;
use thiserror::Error;

use crate::error::{ExtractError, SinkError};
use crate::normalize::RecordErrorKind;
use crate::record::DecodeError;

/// What the orchestrator does with an error object found mid-stream.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum SignalPolicy {
    /// Log it, keep its message in [`RunResult::signals`], keep streaming.
    #[default]
    Record,
    /// End the run with a fatal [`ExtractError::SignalAbort`].
    Abort,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Stage {
    Spawning,
    Streaming,
    Draining,
    Closing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Spawning => "spawning",
            Stage::Streaming => "streaming",
            Stage::Draining => "draining",
            Stage::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// The single run-level error of a run, with where it happened.
#[derive(Debug, Error)]
#[error("{stage} failed (last record: {}): {source}", display_last(.last_identifier))]
pub struct FatalError {
    pub stage: Stage,
    pub last_identifier: Option<String>,
    #[source]
    pub source: ExtractError,
}

fn display_last(identifier: &Option<String>) -> &str {
    identifier.as_deref().unwrap_or("none")
}

#[derive(Debug, Error)]
pub enum FailureReason {
    #[error("{0}")]
    Frame(FrameError),
    #[error("{0}")]
    Decode(DecodeError),
    #[error("{0}")]
    Normalize(RecordErrorKind),
    #[error("{0}")]
    Store(SinkError),
}

/// One record that did not reach the store.
#[derive(Debug)]
pub struct RecordFailure {
    pub frame_number: usize,
    pub identifier: Option<String>,
    pub reason: FailureReason,
}

impl RecordFailure {
    /// The record identifier, or `frame #n` when the frame never yielded one.
    pub fn label(&self) -> String {
        match &self.identifier {
            Some(identifier) => identifier.clone(),
            None => format!("frame #{}", self.frame_number),
        }
    }
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label(), self.reason)
    }
}

#[derive(Debug, Default)]
pub struct RunResult {
    pub succeeded: usize,
    pub failures: Vec<RecordFailure>,
    /// Messages of error objects seen under [`SignalPolicy::Record`].
    pub signals: Vec<String>,
    pub fatal: Option<FatalError>,
    /// Everything the fetch process wrote to stderr; empty after cancellation.
    pub diagnostics: String,
    pub exit_status: Option<ExitStatus>,
    pub cancelled: bool,
}

impl RunResult {
    /// Labels of failed records, in stream order.
    pub fn failed(&self) -> Vec<String> {
        self.failures.iter().map(RecordFailure::label).collect()
    }

    pub fn is_success(&self) -> bool {
        self.fatal.is_none() && !self.cancelled
    }

    pub(crate) fn set_fatal(
        &mut self,
        stage: Stage,
        last_identifier: Option<String>,
        source: ExtractError,
    ) {
        if self.fatal.is_none() {
            self.fatal = Some(FatalError {
                stage,
                last_identifier,
                source,
            });
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed",
            self.succeeded,
            self.failures.len()
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        if let Some(fatal) = &self.fatal {
            write!(f, "; {fatal}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_lists_identifiers_then_frame_numbers() {
        let mut result = RunResult::default();
        result.failures.push(RecordFailure {
            frame_number: 2,
            identifier: Some("05586100".to_string()),
            reason: FailureReason::Normalize(RecordErrorKind::NoInterval),
        });
        result.failures.push(RecordFailure {
            frame_number: 3,
            identifier: None,
            reason: FailureReason::Frame(FrameError::TooLarge {
                frame_number: 3,
                observed_bytes: 10,
                max_frame_bytes: 4,
            }),
        });
        assert_eq!(result.failed(), vec!["05586100", "frame #3"]);
        assert!(result.is_success());
    }

    #[test]
    fn first_fatal_error_wins() {
        let mut result = RunResult::default();
        result.set_fatal(
            Stage::Streaming,
            Some("A".to_string()),
            ExtractError::StdoutUnavailable,
        );
        result.set_fatal(Stage::Closing, None, ExtractError::StdinUnavailable);
        let fatal = result.fatal.as_ref().unwrap();
        assert_eq!(fatal.stage, Stage::Streaming);
        assert!(fatal.to_string().contains("last record: A"));
        assert!(!result.is_success());
    }
}
