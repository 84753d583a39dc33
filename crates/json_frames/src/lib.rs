#![forbid(unsafe_code)]
//! Framing for streams of back-to-back JSON objects.
//!
//! Producers that write `{...}{...}{...}` with no separators or length prefixes can only be
//! split by following the JSON grammar. This crate provides:
//! - [`FrameScanner`], a brace-depth state machine that ignores braces inside string literals.
//! - [`SyncFrameReader`] (and, with the `tokio` feature, [`AsyncFrameReader`]) which yield one
//!   [`Frame`] per top-level object and report a source that closes mid-object as
//!   [`FrameError::Truncated`] rather than a clean end-of-stream.
//!
//! Frames are not parsed here; callers decide what a frame means.

mod config;
mod error;
mod frame;
mod reader;
mod scanner;

pub use config::FrameLimits;
pub use error::FrameError;
pub use frame::Frame;
pub use reader::SyncFrameReader;
pub use scanner::{FrameScanner, ScanStep};

#[cfg(feature = "tokio")]
pub use reader::AsyncFrameReader;

/// Splits an in-memory buffer into frames.
pub fn split_frames(bytes: &[u8]) -> Vec<Result<Frame, FrameError>> {
    SyncFrameReader::new(bytes, FrameLimits::default()).collect()
}
