use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};

use json_frames::{AsyncFrameReader, Frame, FrameError, FrameLimits};
use tokio::{
    io::{AsyncRead, AsyncWriteExt},
    process::{Child, ChildStdin, ChildStdout, Command},
    task::JoinHandle,
    time,
};
use tracing::{debug, info, warn};

use crate::codes::CodeTable;
use crate::normalize::Normalizer;
use crate::process::{collect_stream, diagnostics_text, marker_message, spawn_with_retry};
use crate::record::{decode_frame, DecodedRecord};
use crate::result::{FailureReason, RecordFailure, RunResult, SignalPolicy, Stage};
use crate::sink::{SeriesStore, SinkWriter, SqliteStore};
use crate::{CancelToken, ExtractClientBuilder, ExtractError, ExtractionRequest};

/// One independent run of a batch: a request and the store file it writes to.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub request: ExtractionRequest,
    pub sink_path: PathBuf,
}

impl BatchJob {
    pub fn new(request: ExtractionRequest, sink_path: impl Into<PathBuf>) -> Self {
        Self {
            request,
            sink_path: sink_path.into(),
        }
    }
}

/// Runs the fetch process and moves what it streams into a series store.
///
/// Every run is self-contained: the client holds only settings, and each run owns its child
/// process and its store.
#[derive(Clone, Debug)]
pub struct ExtractClient {
    pub(crate) binary: PathBuf,
    pub(crate) working_dir: Option<PathBuf>,
    pub(crate) env: Vec<(OsString, OsString)>,
    pub(crate) write_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) drain_timeout: Duration,
    pub(crate) signal_policy: SignalPolicy,
    pub(crate) failure_marker: String,
    pub(crate) frame_limits: FrameLimits,
    pub(crate) code_table: CodeTable,
    pub(crate) mirror_stderr: bool,
}

struct Launched {
    child: Child,
    stdout: ChildStdout,
    diagnostics: JoinHandle<io::Result<Vec<u8>>>,
}

/// Per-run mutable state threaded through streaming.
struct RunState<'a, S: SeriesStore> {
    normalizer: Normalizer,
    sink: &'a mut SinkWriter<S>,
    result: &'a mut RunResult,
    last_identifier: Option<String>,
}

impl ExtractClient {
    pub fn builder() -> ExtractClientBuilder {
        ExtractClientBuilder::default()
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Runs `request` into the SQLite store at `sink_path`, creating it if needed.
    pub async fn run(&self, request: &ExtractionRequest, sink_path: impl AsRef<Path>) -> RunResult {
        let sink_path = sink_path.as_ref();
        match SqliteStore::open(sink_path) {
            Ok(store) => {
                self.run_with_store(request, store, CancelToken::never())
                    .await
            }
            Err(source) => {
                warn!(path = %sink_path.display(), error = %source, "series store unavailable");
                let mut result = RunResult::default();
                result.set_fatal(
                    Stage::Spawning,
                    None,
                    ExtractError::SinkOpen {
                        path: sink_path.to_path_buf(),
                        source,
                    },
                );
                result
            }
        }
    }

    /// Runs the jobs one after another, each against its own store.
    pub async fn run_batch<I>(&self, jobs: I) -> Vec<RunResult>
    where
        I: IntoIterator<Item = BatchJob>,
    {
        let mut results = Vec::new();
        for job in jobs {
            let result = self.run(&job.request, &job.sink_path).await;
            info!(
                slug = %job.request.slug,
                sink = %job.sink_path.display(),
                outcome = %result,
                "batch job finished"
            );
            results.push(result);
        }
        results
    }

    /// Runs `request` into `store`.
    ///
    /// The store is closed exactly once before this returns, whatever happened. Records already
    /// written stay written when the run fails later.
    pub async fn run_with_store<S: SeriesStore>(
        &self,
        request: &ExtractionRequest,
        store: S,
        mut cancel: CancelToken,
    ) -> RunResult {
        let mut result = RunResult::default();
        let mut sink = SinkWriter::new(store);

        info!(
            binary = ?self.binary,
            slug = %request.slug,
            endpoint = %request.endpoint,
            "starting extraction"
        );

        match self.launch(request).await {
            Ok(launched) => {
                let state = RunState {
                    normalizer: Normalizer::new(self.code_table.clone(), request.location_part()),
                    sink: &mut sink,
                    result: &mut result,
                    last_identifier: None,
                };
                self.stream_and_drain(launched, state, &mut cancel).await;
            }
            Err(err) => {
                warn!(binary = ?self.binary, error = %err, "fetch process failed to start");
                result.set_fatal(Stage::Spawning, None, err);
            }
        }

        if let Err(err) = sink.close() {
            let last = result.failures.last().and_then(|f| f.identifier.clone());
            result.set_fatal(Stage::Closing, last, ExtractError::SinkClose(err));
        }

        info!(
            succeeded = result.succeeded,
            failed = result.failures.len(),
            signals = result.signals.len(),
            cancelled = result.cancelled,
            fatal = result.fatal.is_some(),
            "extraction finished"
        );
        result
    }

    async fn launch(&self, request: &ExtractionRequest) -> Result<Launched, ExtractError> {
        let payload = request.to_json().map_err(ExtractError::Serialize)?;

        let mut command = Command::new(&self.binary);
        command
            .arg(&request.subcommand)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command.envs(self.env.iter().map(|(k, v)| (k, v)));

        let mut child = spawn_with_retry(&mut command, &self.binary).await?;
        debug!(binary = ?self.binary, pid = ?child.id(), "spawned fetch process");

        let stderr = child.stderr.take().ok_or(ExtractError::StderrUnavailable)?;
        let diagnostics = tokio::spawn(collect_stream(stderr, self.mirror_stderr));

        let stdin = child.stdin.take().ok_or(ExtractError::StdinUnavailable)?;
        if let Err(err) = self.write_request(stdin, &payload).await {
            diagnostics.abort();
            return Err(err);
        }

        let stdout = child.stdout.take().ok_or(ExtractError::StdoutUnavailable)?;
        Ok(Launched {
            child,
            stdout,
            diagnostics,
        })
    }

    async fn write_request(&self, mut stdin: ChildStdin, payload: &[u8]) -> Result<(), ExtractError> {
        // A fetch process that exits without reading its input reports through stderr and its
        // exit status instead, so a broken pipe is not an error here.
        let write = async move {
            if let Err(source) = stdin.write_all(payload).await {
                if source.kind() != io::ErrorKind::BrokenPipe {
                    return Err(ExtractError::StdinWrite(source));
                }
            }
            if let Err(source) = stdin.shutdown().await {
                if source.kind() != io::ErrorKind::BrokenPipe {
                    return Err(ExtractError::StdinWrite(source));
                }
            }
            Ok(())
        };

        if self.write_timeout.is_zero() {
            return write.await;
        }
        match time::timeout(self.write_timeout, write).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ExtractError::WriteTimeout {
                timeout: self.write_timeout,
            }),
        }
    }

    async fn stream_and_drain<S: SeriesStore>(
        &self,
        launched: Launched,
        mut state: RunState<'_, S>,
        cancel: &mut CancelToken,
    ) {
        let Launched {
            mut child,
            stdout,
            mut diagnostics,
        } = launched;

        let mut frames = AsyncFrameReader::new(stdout, self.frame_limits);
        let stopped_early = self.stream(&mut frames, &mut state, cancel).await;
        let skipped = frames.skipped_bytes();
        drop(frames);
        if skipped > 0 {
            debug!(skipped_bytes = skipped, "ignored bytes between frames");
        }

        if stopped_early {
            if let Err(err) = child.start_kill() {
                debug!(error = %err, "fetch process already gone");
            }
        }

        let drained = self.drain(&mut diagnostics).await;
        if state.result.cancelled {
            // Diagnostics of a cancelled run are read only to unblock the child.
            if let Ok(status) = self.reap(&mut child).await {
                state.result.exit_status = Some(status);
            }
            return;
        }

        match drained {
            Ok(text) => {
                if let Some(message) = marker_message(&text, &self.failure_marker) {
                    warn!(message = %message, "fetch diagnostics reported a failure");
                    state.result.set_fatal(
                        Stage::Draining,
                        state.last_identifier.clone(),
                        ExtractError::DiagnosticMarker { message },
                    );
                }
                state.result.diagnostics = text;
            }
            Err(err) => {
                state
                    .result
                    .set_fatal(Stage::Draining, state.last_identifier.clone(), err);
            }
        }

        match self.reap(&mut child).await {
            Ok(status) => {
                state.result.exit_status = Some(status);
                if !status.success() && !stopped_early {
                    state.result.set_fatal(
                        Stage::Draining,
                        state.last_identifier.clone(),
                        ExtractError::NonZeroExit {
                            status,
                            diagnostics: state.result.diagnostics.clone(),
                        },
                    );
                }
            }
            Err(err) => {
                state
                    .result
                    .set_fatal(Stage::Draining, state.last_identifier.clone(), err);
            }
        }
    }

    /// Reads frames until clean end-of-stream. Returns `true` when it stopped before that.
    async fn stream<R, S>(
        &self,
        frames: &mut AsyncFrameReader<R>,
        state: &mut RunState<'_, S>,
        cancel: &mut CancelToken,
    ) -> bool
    where
        R: AsyncRead + Unpin,
        S: SeriesStore,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(last = ?state.last_identifier, "extraction cancelled");
                    state.result.cancelled = true;
                    return true;
                }
                next = read_frame(frames, self.read_timeout) => next,
            };

            let outcome = match next {
                Ok(Some(outcome)) => outcome,
                Ok(None) => return false,
                Err(err) => {
                    warn!(error = %err, "fetch output stalled");
                    state
                        .result
                        .set_fatal(Stage::Streaming, state.last_identifier.clone(), err);
                    return true;
                }
            };

            match outcome {
                Ok(frame) => {
                    if let Err(err) = self.handle_frame(&frame, state) {
                        state
                            .result
                            .set_fatal(Stage::Streaming, state.last_identifier.clone(), err);
                        return true;
                    }
                }
                Err(err) if err.is_recoverable() => {
                    warn!(error = %err, "frame skipped");
                    state.result.failures.push(RecordFailure {
                        frame_number: err.frame_number(),
                        identifier: None,
                        reason: FailureReason::Frame(err),
                    });
                }
                Err(err) => {
                    warn!(error = %err, "fetch output stream broke");
                    state.result.set_fatal(
                        Stage::Streaming,
                        state.last_identifier.clone(),
                        ExtractError::Stream(err),
                    );
                    return true;
                }
            }
        }
    }

    /// Routes one frame through decode, normalize and store. Only an error signal under
    /// [`SignalPolicy::Abort`] comes back as `Err`; every other failure is tallied.
    fn handle_frame<S: SeriesStore>(
        &self,
        frame: &Frame,
        state: &mut RunState<'_, S>,
    ) -> Result<(), ExtractError> {
        let record = match decode_frame(frame.as_bytes()) {
            Ok(DecodedRecord::Data(record)) => record,
            Ok(DecodedRecord::ErrorSignal { message }) => {
                warn!(
                    frame = frame.frame_number,
                    message = %message,
                    "fetch process reported an error"
                );
                return match self.signal_policy {
                    SignalPolicy::Record => {
                        state.result.signals.push(message);
                        Ok(())
                    }
                    SignalPolicy::Abort => Err(ExtractError::SignalAbort { message }),
                };
            }
            Err(err) => {
                let identifier = err.identifier().map(str::to_string);
                warn!(
                    frame = frame.frame_number,
                    identifier = ?identifier,
                    error = %err,
                    "frame did not decode"
                );
                state.result.failures.push(RecordFailure {
                    frame_number: frame.frame_number,
                    identifier,
                    reason: FailureReason::Decode(err),
                });
                return Ok(());
            }
        };

        state.last_identifier = Some(record.identifier.clone());
        let series = match state.normalizer.normalize(&record) {
            Ok(series) => series,
            Err(err) => {
                warn!(frame = frame.frame_number, error = %err, "record skipped");
                state.result.failures.push(RecordFailure {
                    frame_number: frame.frame_number,
                    identifier: Some(err.identifier),
                    reason: FailureReason::Normalize(err.kind),
                });
                return Ok(());
            }
        };

        match state.sink.put(&series) {
            Ok(()) => state.result.succeeded += 1,
            Err(err) => state.result.failures.push(RecordFailure {
                frame_number: frame.frame_number,
                identifier: Some(series.identifier),
                reason: FailureReason::Store(err),
            }),
        }
        Ok(())
    }

    async fn drain(
        &self,
        diagnostics: &mut JoinHandle<io::Result<Vec<u8>>>,
    ) -> Result<String, ExtractError> {
        let joined = match time::timeout(self.drain_timeout, &mut *diagnostics).await {
            Ok(joined) => joined,
            Err(_) => {
                diagnostics.abort();
                return Err(ExtractError::DrainTimeout {
                    timeout: self.drain_timeout,
                });
            }
        };
        let bytes = joined
            .map_err(|err| ExtractError::Join(err.to_string()))?
            .map_err(ExtractError::StderrRead)?;
        Ok(diagnostics_text(&bytes))
    }

    async fn reap(&self, child: &mut Child) -> Result<ExitStatus, ExtractError> {
        match time::timeout(self.drain_timeout, child.wait()).await {
            Ok(status) => status.map_err(ExtractError::Wait),
            Err(_) => {
                warn!(timeout = ?self.drain_timeout, "fetch process did not exit; killing it");
                if let Err(err) = child.start_kill() {
                    debug!(error = %err, "fetch process already gone");
                }
                child.wait().await.map_err(ExtractError::Wait)
            }
        }
    }
}

async fn read_frame<R: AsyncRead + Unpin>(
    frames: &mut AsyncFrameReader<R>,
    idle: Duration,
) -> Result<Option<Result<Frame, FrameError>>, ExtractError> {
    if idle.is_zero() {
        return Ok(frames.next_frame().await);
    }
    frames
        .next_frame_idle(idle)
        .await
        .map_err(|_| ExtractError::ReadTimeout { idle_for: idle })
}
