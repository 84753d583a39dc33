use std::{env, path::PathBuf, time::Duration};

pub(crate) const BINARY_ENV: &str = "WATER_EXTRACT_BINARY";
pub(crate) const DEFAULT_BINARY: &str = "cavi";
pub(crate) const DEFAULT_SCHEME: &str = "https";
pub(crate) const DEFAULT_SUBCOMMAND: &str = "extract";
pub(crate) const DEFAULT_FAILURE_MARKER: &str = "error";
pub(crate) const DEFAULT_WINDOW: time::Duration = time::Duration::days(7);
pub(crate) const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(600);
pub(crate) const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(300);
pub(crate) const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
/// About four years of one-minute slots.
pub(crate) const DEFAULT_MAX_GRID_SLOTS: usize = 1 << 21;

pub(crate) fn default_binary_path() -> PathBuf {
    env::var_os(BINARY_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BINARY))
}
