use std::{io, path::PathBuf, process::ExitStatus, time::Duration};

use json_frames::FrameError;
use thiserror::Error;

/// Run-level failures. Any of these ends a run with [`crate::FatalError`] set.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("fetch binary `{binary}` could not be spawned: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize extraction request: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed writing request to fetch stdin: {0}")]
    StdinWrite(#[source] io::Error),
    #[error("writing request to fetch stdin exceeded {timeout:?}")]
    WriteTimeout { timeout: Duration },
    #[error("fetch stdout idle for {idle_for:?}")]
    ReadTimeout { idle_for: Duration },
    #[error("fetch stderr still open after {timeout:?}")]
    DrainTimeout { timeout: Duration },
    #[error("fetch stdin unavailable")]
    StdinUnavailable,
    #[error("fetch stdout unavailable")]
    StdoutUnavailable,
    #[error("fetch stderr unavailable")]
    StderrUnavailable,
    #[error("fetch output stream failed: {0}")]
    Stream(#[from] FrameError),
    #[error("failed to open series store `{path}`: {source}")]
    SinkOpen {
        path: PathBuf,
        #[source]
        source: SinkError,
    },
    #[error("failed to close series store: {0}")]
    SinkClose(#[source] SinkError),
    #[error("fetch process signalled an error: {message}")]
    SignalAbort { message: String },
    #[error("fetch diagnostics reported a failure: {message}")]
    DiagnosticMarker { message: String },
    #[error("fetch process exited with {status}: {diagnostics}")]
    NonZeroExit {
        status: ExitStatus,
        diagnostics: String,
    },
    #[error("failed waiting for fetch process: {0}")]
    Wait(#[source] io::Error),
    #[error("failed reading fetch stderr: {0}")]
    StderrRead(#[source] io::Error),
    #[error("internal error: join failure: {0}")]
    Join(String),
}

/// Failures raised by a [`crate::SeriesStore`].
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("series store is closed")]
    Closed,
    #[error("series store database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("series store I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("series store rejected `{path}`: {reason}")]
    Rejected { path: String, reason: String },
}
