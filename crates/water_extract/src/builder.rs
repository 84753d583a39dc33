use std::{ffi::OsString, path::PathBuf, time::Duration};

use json_frames::FrameLimits;

use crate::codes::{CodeMapping, CodeTable};
use crate::defaults::{
    default_binary_path, DEFAULT_DRAIN_TIMEOUT, DEFAULT_FAILURE_MARKER, DEFAULT_READ_TIMEOUT,
    DEFAULT_WRITE_TIMEOUT,
};
use crate::{ExtractClient, SignalPolicy};

/// Builder for [`ExtractClient`].
#[derive(Clone, Debug)]
pub struct ExtractClientBuilder {
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

impl ExtractClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fetch executable.
    ///
    /// Defaults to `WATER_EXTRACT_BINARY` when present or `cavi` on `PATH`.
    pub fn binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds an environment variable for the fetch process on top of the inherited environment.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Bounds writing the request to the fetch process. Zero disables the bound.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Longest silence allowed on the fetch process's stdout. The clock restarts on every read,
    /// so a large record that keeps arriving is never cut off. Zero disables it.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Bounds collecting stderr and reaping the process once streaming stops.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn signal_policy(mut self, policy: SignalPolicy) -> Self {
        self.signal_policy = policy;
        self
    }

    /// Case-sensitive substring that fails a run when it appears on the fetch process's stderr.
    /// Defaults to `error`; an empty marker disables the check.
    pub fn failure_marker(mut self, marker: impl Into<String>) -> Self {
        self.failure_marker = marker.into();
        self
    }

    pub fn frame_limits(mut self, limits: FrameLimits) -> Self {
        self.frame_limits = limits;
        self
    }

    pub fn code_table(mut self, table: CodeTable) -> Self {
        self.code_table = table;
        self
    }

    /// Adds or replaces one code on the current table.
    pub fn code(mut self, code: impl Into<String>, mapping: CodeMapping) -> Self {
        self.code_table = self.code_table.with_override(code, mapping);
        self
    }

    /// Echoes the fetch process's stderr to this process's stderr while it is captured.
    /// Requires a multi-threaded runtime.
    pub fn mirror_stderr(mut self, enable: bool) -> Self {
        self.mirror_stderr = enable;
        self
    }

    pub fn build(self) -> ExtractClient {
        ExtractClient {
            binary: self.binary,
            working_dir: self.working_dir,
            env: self.env,
            write_timeout: self.write_timeout,
            read_timeout: self.read_timeout,
            drain_timeout: self.drain_timeout,
            signal_policy: self.signal_policy,
            failure_marker: self.failure_marker,
            frame_limits: self.frame_limits,
            code_table: self.code_table,
            mirror_stderr: self.mirror_stderr,
        }
    }
}

impl Default for ExtractClientBuilder {
    fn default() -> Self {
        Self {
            binary: default_binary_path(),
            working_dir: None,
            env: Vec::new(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            signal_policy: SignalPolicy::default(),
            failure_marker: DEFAULT_FAILURE_MARKER.to_string(),
            frame_limits: FrameLimits::default(),
            code_table: CodeTable::builtin(),
            mirror_stderr: false,
        }
    }
}
