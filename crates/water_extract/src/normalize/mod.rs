//! Turns decoded records into regular-interval series ready for the store.

mod interval;
mod path;
mod resample;

use std::fmt;

use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::debug;

use crate::codes::CodeTable;
use crate::defaults::DEFAULT_MAX_GRID_SLOTS;
use crate::record::DataRecord;
use resample::SnapError;

pub use interval::IntervalToken;
pub use path::{PathParseError, SeriesPath};

/// Series in store-ready form.
///
/// `times` are minutes since the Unix epoch, strictly ascending and spaced `grid_minutes` apart;
/// `values[i]` belongs to `times[i]` and is `None` for a slot with no sample.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSeries {
    pub path: SeriesPath,
    pub identifier: String,
    pub parameter: String,
    pub units: String,
    pub value_type: String,
    pub version: String,
    /// Minimum positive gap between raw samples adjacent in input order.
    pub interval_minutes: i64,
    /// Spacing of the regular grid, i.e. the minutes behind `interval_token`.
    pub grid_minutes: i64,
    pub interval_token: &'static str,
    pub times: Vec<i64>,
    pub values: Vec<Option<f64>>,
    pub start_minute: i64,
    pub end_minute: i64,
    pub time_zone: String,
    /// Raw sample count before resampling.
    pub source_samples: usize,
}

impl NormalizedSeries {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn pathname(&self) -> String {
        self.path.to_string()
    }

    pub fn start_time(&self) -> Option<OffsetDateTime> {
        minute_to_datetime(self.start_minute)
    }

    pub fn end_time(&self) -> Option<OffsetDateTime> {
        minute_to_datetime(self.end_minute)
    }

    /// Slots that carry a value.
    pub fn present(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.times
            .iter()
            .zip(&self.values)
            .filter_map(|(t, v)| v.map(|v| (*t, v)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordErrorKind {
    UnsupportedCode(String),
    InvalidTime(String),
    Empty,
    LengthMismatch { times: usize, values: usize },
    NoInterval,
    NothingOnGrid { interval: &'static str },
    GridTooLarge { slots: u64, limit: usize },
}

impl fmt::Display for RecordErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordErrorKind::UnsupportedCode(code) => write!(f, "unsupported code ({code})"),
            RecordErrorKind::InvalidTime(raw) => write!(f, "invalid time `{raw}`"),
            RecordErrorKind::Empty => write!(f, "no samples"),
            RecordErrorKind::LengthMismatch { times, values } => {
                write!(f, "{times} times but {values} values")
            }
            RecordErrorKind::NoInterval => write!(f, "fewer than two distinct times"),
            RecordErrorKind::NothingOnGrid { interval } => {
                write!(f, "no sample falls on the {interval} grid")
            }
            RecordErrorKind::GridTooLarge { slots, limit } => {
                write!(f, "regular grid needs {slots} slots, limit is {limit}")
            }
        }
    }
}

/// Per-record normalization failure. Returned as a value; the batch carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{identifier}: {kind}")]
pub struct RecordError {
    pub identifier: String,
    pub kind: RecordErrorKind,
}

impl RecordError {
    fn new(identifier: &str, kind: RecordErrorKind) -> Self {
        Self {
            identifier: identifier.to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    codes: CodeTable,
    location: String,
    time_zone: String,
    max_slots: usize,
}

impl Normalizer {
    /// `location` becomes the A part of every pathname.
    pub fn new(codes: CodeTable, location: impl Into<String>) -> Self {
        Self {
            codes,
            location: location.into(),
            time_zone: "UTC".to_string(),
            max_slots: DEFAULT_MAX_GRID_SLOTS,
        }
    }

    /// Largest regular grid a single record may expand to. Sparse records spread over a long
    /// span at a fine interval fail with [`RecordErrorKind::GridTooLarge`] instead.
    pub fn max_slots(mut self, max_slots: usize) -> Self {
        self.max_slots = max_slots;
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn normalize(&self, record: &DataRecord) -> Result<NormalizedSeries, RecordError> {
        let id = record.identifier.as_str();
        let mapping = self.codes.lookup(&record.code).ok_or_else(|| {
            RecordError::new(id, RecordErrorKind::UnsupportedCode(record.code.clone()))
        })?;

        if record.times.is_empty() {
            return Err(RecordError::new(id, RecordErrorKind::Empty));
        }
        if record.times.len() != record.values.len() {
            return Err(RecordError::new(
                id,
                RecordErrorKind::LengthMismatch {
                    times: record.times.len(),
                    values: record.values.len(),
                },
            ));
        }

        let minutes = record
            .times
            .iter()
            .map(|raw| {
                parse_minute(raw)
                    .ok_or_else(|| RecordError::new(id, RecordErrorKind::InvalidTime(raw.clone())))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let interval_minutes = interval::min_adjacent_gap(&minutes)
            .ok_or_else(|| RecordError::new(id, RecordErrorKind::NoInterval))?;
        let (times, values) = co_sort(&minutes, &record.values);
        let token = IntervalToken::for_minutes(interval_minutes);

        let grid = resample::snap_to_regular(&times, &values, token.minutes, self.max_slots)
            .map_err(|err| {
                let kind = match err {
                    SnapError::NothingOnGrid => RecordErrorKind::NothingOnGrid {
                        interval: token.token,
                    },
                    SnapError::TooManySlots { slots } => RecordErrorKind::GridTooLarge {
                        slots,
                        limit: self.max_slots,
                    },
                };
                RecordError::new(id, kind)
            })?;
        if grid.dropped > 0 || grid.times.len() != times.len() {
            debug!(
                identifier = id,
                interval = token.token,
                dropped = grid.dropped,
                slots = grid.times.len(),
                "snapped irregular series to regular interval"
            );
        }

        let path = SeriesPath::new(
            &self.location,
            id,
            &mapping.parameter,
            token.token,
            &mapping.version,
        );
        let start_minute = grid.times[0];
        let end_minute = grid.times[grid.times.len() - 1];

        Ok(NormalizedSeries {
            path,
            identifier: record.identifier.clone(),
            parameter: mapping.parameter.clone(),
            units: mapping.unit.clone(),
            value_type: mapping.value_type.clone(),
            version: mapping.version.clone(),
            interval_minutes,
            grid_minutes: token.minutes,
            interval_token: token.token,
            times: grid.times,
            values: grid.values,
            start_minute,
            end_minute,
            time_zone: self.time_zone.clone(),
            source_samples: record.times.len(),
        })
    }
}

/// Parses an RFC 3339 timestamp to whole minutes since the Unix epoch.
pub fn parse_minute(raw: &str) -> Option<i64> {
    let parsed = OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()?;
    Some(parsed.unix_timestamp().div_euclid(60))
}

pub fn minute_to_datetime(minute: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(minute.checked_mul(60)?).ok()
}

/// Stable co-sort by time; a repeated time keeps the value that appeared last in the input.
fn co_sort(minutes: &[i64], values: &[Option<f64>]) -> (Vec<i64>, Vec<Option<f64>>) {
    let mut order: Vec<usize> = (0..minutes.len()).collect();
    order.sort_by_key(|&i| minutes[i]);

    let mut times: Vec<i64> = Vec::with_capacity(order.len());
    let mut sorted_values: Vec<Option<f64>> = Vec::with_capacity(order.len());
    for i in order {
        if times.last() == Some(&minutes[i]) {
            if let Some(slot) = sorted_values.last_mut() {
                *slot = values[i];
            }
            continue;
        }
        times.push(minutes[i]);
        sorted_values.push(values[i]);
    }
    (times, sorted_values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::CodeMapping;

    fn record(code: &str, times: &[&str], values: &[f64]) -> DataRecord {
        DataRecord {
            identifier: "05586100".to_string(),
            code: code.to_string(),
            site_id: None,
            parameter_id: None,
            times: times.iter().map(|t| t.to_string()).collect(),
            values: values.iter().map(|v| Some(*v)).collect(),
        }
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(CodeTable::builtin(), "illinois-river")
    }

    #[test]
    fn regular_record_keeps_mapping_and_interval() {
        let rec = record(
            "00060",
            &[
                "2021-03-01T12:00:00Z",
                "2021-03-01T12:15:00Z",
                "2021-03-01T12:30:00Z",
            ],
            &[10.0, 11.0, 12.0],
        );
        let series = normalizer().normalize(&rec).unwrap();

        let mapping = CodeTable::builtin().lookup("00060").cloned().unwrap();
        assert_eq!(series.parameter, mapping.parameter);
        assert_eq!(series.units, mapping.unit);
        assert_eq!(series.value_type, mapping.value_type);
        assert_eq!(series.version, mapping.version);
        assert_eq!(series.interval_minutes, 15);
        assert_eq!(series.interval_token, "15MIN");
        assert_eq!(
            series.pathname(),
            "/ILLINOIS-RIVER/05586100/FLOW//15MIN/WATER-USGS/"
        );
        assert_eq!(series.len(), 3);
        assert_eq!(series.start_minute, series.times[0]);
        assert_eq!(series.end_minute - series.start_minute, 30);
        assert_eq!(series.time_zone, "UTC");
    }

    #[test]
    fn interval_uses_neighbours_in_input_order() {
        let rec = record(
            "00065",
            &[
                "2021-03-01T00:00:00Z",
                "2021-03-01T00:30:00Z",
                "2021-03-01T00:10:00Z",
            ],
            &[1.0, 3.0, 2.0],
        );
        let series = normalizer().normalize(&rec).unwrap();
        assert_eq!(series.interval_minutes, 20);
        assert_eq!(series.interval_token, "20MIN");
        // Only 00:00 lands on the 20MIN grid.
        assert_eq!(series.present().collect::<Vec<_>>(), vec![(series.start_minute, 1.0)]);
    }

    #[test]
    fn reversed_input_sorts_to_the_same_series() {
        let times = [
            "2021-03-01T00:00:00Z",
            "2021-03-01T00:05:00Z",
            "2021-03-01T00:10:00Z",
            "2021-03-01T00:15:00Z",
        ];
        let forward = record("00065", &times, &[1.0, 2.0, 3.0, 4.0]);
        let mut reversed_times = times;
        reversed_times.reverse();
        let backward = record("00065", &reversed_times, &[4.0, 3.0, 2.0, 1.0]);

        let a = normalizer().normalize(&forward).unwrap();
        let b = normalizer().normalize(&backward).unwrap();
        assert_eq!(a.interval_minutes, 5);
        assert_eq!(b.interval_minutes, 5);
        assert_eq!(a.times, b.times);
        assert_eq!(a.values, b.values);
    }

    #[test]
    fn values_follow_their_times_when_sorting() {
        let rec = record(
            "00065",
            &[
                "2021-03-01T01:00:00Z",
                "2021-03-01T00:00:00Z",
                "2021-03-01T02:00:00Z",
            ],
            &[2.0, 1.0, 3.0],
        );
        let series = normalizer().normalize(&rec).unwrap();
        assert_eq!(series.values, vec![Some(1.0), Some(2.0), Some(3.0)]);
        assert!(series.times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn duplicate_times_keep_last_value() {
        let rec = record(
            "00065",
            &[
                "2021-03-01T00:00:00Z",
                "2021-03-01T01:00:00Z",
                "2021-03-01T00:00:00Z",
            ],
            &[1.0, 2.0, 9.0],
        );
        let series = normalizer().normalize(&rec).unwrap();
        assert_eq!(series.values, vec![Some(9.0), Some(2.0)]);
        assert_eq!(series.source_samples, 3);
    }

    #[test]
    fn irregular_record_is_snapped_with_absent_slots() {
        let rec = record(
            "00065",
            &[
                "2021-03-01T00:00:00Z",
                "2021-03-01T00:30:00Z",
                "2021-03-01T01:00:00Z",
                "2021-03-01T01:07:00Z",
            ],
            &[1.0, 2.0, 3.0, 4.0],
        );
        let series = normalizer().normalize(&rec).unwrap();
        // Smallest gap is 7 minutes, which rounds down to 6MIN; 01:07 is off that grid.
        assert_eq!(series.interval_minutes, 7);
        assert_eq!(series.interval_token, "6MIN");
        assert_eq!(series.grid_minutes, 6);
        assert_eq!(series.len(), 11);
        assert_eq!(series.values.first(), Some(&Some(1.0)));
        assert_eq!(series.values[5], Some(2.0));
        assert_eq!(series.values.last(), Some(&Some(3.0)));
        assert_eq!(series.present().count(), 3);
        assert_eq!(series.end_minute - series.start_minute, 60);
    }

    #[test]
    fn unknown_code_names_the_identifier() {
        let rec = record("99999", &["2021-03-01T00:00:00Z"], &[1.0]);
        let err = normalizer().normalize(&rec).unwrap_err();
        assert_eq!(err.identifier, "05586100");
        assert!(err.to_string().starts_with("05586100: unsupported code"));
    }

    #[test]
    fn single_sample_has_no_interval() {
        let rec = record("00060", &["2021-03-01T00:00:00Z"], &[1.0]);
        let err = normalizer().normalize(&rec).unwrap_err();
        assert_eq!(err.kind, RecordErrorKind::NoInterval);
    }

    #[test]
    fn bad_timestamp_is_a_record_error() {
        let rec = record("00060", &["yesterday", "2021-03-01T00:00:00Z"], &[1.0, 2.0]);
        let err = normalizer().normalize(&rec).unwrap_err();
        assert!(matches!(err.kind, RecordErrorKind::InvalidTime(ref raw) if raw == "yesterday"));
    }

    #[test]
    fn empty_record_is_rejected() {
        let rec = record("00060", &[], &[]);
        assert_eq!(
            normalizer().normalize(&rec).unwrap_err().kind,
            RecordErrorKind::Empty
        );
    }

    #[test]
    fn off_grid_only_record_is_rejected() {
        let rec = record(
            "00060",
            &["2021-03-01T00:07:00Z", "2021-03-01T00:22:00Z"],
            &[1.0, 2.0],
        );
        let err = normalizer().normalize(&rec).unwrap_err();
        assert_eq!(
            err.kind,
            RecordErrorKind::NothingOnGrid { interval: "15MIN" }
        );
    }

    #[test]
    fn sparse_record_over_a_long_span_is_refused() {
        let rec = record(
            "00065",
            &[
                "1900-01-01T00:00:00Z",
                "1900-01-01T00:01:00Z",
                "2100-01-01T00:00:00Z",
            ],
            &[1.0, 2.0, 3.0],
        );
        let err = normalizer().normalize(&rec).unwrap_err();
        assert_eq!(err.identifier, "05586100");
        match err.kind {
            RecordErrorKind::GridTooLarge { slots, limit } => {
                assert_eq!(limit, DEFAULT_MAX_GRID_SLOTS);
                assert!(slots > 100_000_000);
            }
            other => panic!("expected GridTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn slot_limit_is_configurable() {
        let rec = record(
            "00060",
            &["2021-03-01T00:00:00Z", "2021-03-01T01:00:00Z"],
            &[1.0, 2.0],
        );
        let tight = normalizer().max_slots(1);
        assert!(matches!(
            tight.normalize(&rec).unwrap_err().kind,
            RecordErrorKind::GridTooLarge { slots: 2, limit: 1 }
        ));
        assert_eq!(normalizer().max_slots(2).normalize(&rec).unwrap().len(), 2);
    }

    #[test]
    fn override_mapping_flows_into_path() {
        let codes = CodeTable::builtin().with_override(
            "00010",
            CodeMapping::new("Temp-Water", "C", "INST-VAL", "Provisional"),
        );
        let rec = record(
            "00010",
            &["2021-03-01T00:00:00Z", "2021-03-01T01:00:00Z"],
            &[4.0, 4.5],
        );
        let series = Normalizer::new(codes, "ws").normalize(&rec).unwrap();
        assert_eq!(
            series.pathname(),
            "/WS/05586100/TEMP-WATER//1HOUR/PROVISIONAL/"
        );
        assert_eq!(series.units, "C");
    }

    #[test]
    fn seconds_are_truncated_to_the_minute() {
        assert_eq!(parse_minute("1970-01-01T00:01:59Z"), Some(1));
        assert_eq!(parse_minute("1969-12-31T23:59:30Z"), Some(-1));
        assert_eq!(
            parse_minute("2021-03-01T06:00:00-06:00"),
            parse_minute("2021-03-01T12:00:00Z")
        );
    }
}
