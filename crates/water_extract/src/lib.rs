#![forbid(unsafe_code)]
//! Runs a hydrologic data-fetch process and stores what it streams as regular-interval series.
//!
//! The fetch process reads one JSON request on stdin and writes back-to-back JSON objects on
//! stdout with no separators. Each object is either a data record (a site, a parameter code,
//! and parallel time/value arrays) or an error object carrying a `message`.
//!
//! ## Pipeline
//! - Frames are split by brace depth ([`json_frames`]), so braces inside string values never end
//!   a record early, and a stream that closes mid-object is reported as a fatal truncation
//!   rather than a clean end.
//! - [`decode_frame`] turns a frame into a [`DecodedRecord`].
//! - [`Normalizer`] resolves the code through a [`CodeTable`], infers the sampling interval from
//!   the minimum gap between samples adjacent in input order, picks an [`IntervalToken`], snaps
//!   samples to epoch-aligned slots, and names the series with a six-part [`SeriesPath`].
//! - A [`SeriesStore`] receives each series. [`SqliteStore`] is the default; [`MemoryStore`]
//!   keeps everything in process.
//!
//! ## Failures
//! - A bad frame, record, or `put` is tallied in [`RunResult::failures`] and the run continues.
//! - Launch failure, a store that cannot be opened, a truncated stream, a stalled stream, the
//!   failure marker on stderr (`error` by default, case-sensitive), or a non-zero exit set
//!   [`RunResult::fatal`]. Records written before that stay written.
//! - Error objects are recorded by default; [`SignalPolicy::Abort`] makes them fatal.
//!
//! ```rust,no_run
//! use water_extract::{ExtractClient, ExtractionRequest};
//! # #[tokio::main]
//! # async fn main() {
//! let client = ExtractClient::builder().binary("/opt/rtsutils/cavi").build();
//! let request = ExtractionRequest::new("cumulus-api.example.org", "kanawha-river")
//!     .products(["usgs-00060"]);
//! let result = client.run(&request, "kanawha.db").await;
//! println!("{result}");
//! # }
//! ```

mod builder;
mod cancel;
mod client;
mod codes;
mod config;
mod defaults;
mod error;
mod normalize;
mod process;
mod record;
mod request;
mod result;
mod sink;

pub use builder::ExtractClientBuilder;
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use client::{BatchJob, ExtractClient};
pub use codes::{CodeMapping, CodeTable};
pub use config::{ConfigError, ConfigFile, ExtractConfig};
pub use error::{ExtractError, SinkError};
pub use normalize::{
    minute_to_datetime, parse_minute, IntervalToken, NormalizedSeries, Normalizer,
    PathParseError, RecordError, RecordErrorKind, SeriesPath,
};
pub use record::{decode_frame, DataRecord, DecodeError, DecodedRecord};
pub use request::ExtractionRequest;
pub use result::{FailureReason, FatalError, RecordFailure, RunResult, SignalPolicy, Stage};
pub use sink::{MemoryStore, SeriesStore, SinkWriter, SqliteStore, StoredSeries};
