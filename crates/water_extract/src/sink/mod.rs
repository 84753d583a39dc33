//! Destination stores and the per-run writer that owns one of them.

mod memory;
mod sqlite;

use tracing::{debug, warn};

use crate::error::SinkError;
use crate::normalize::NormalizedSeries;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A time-series container store, opened once per run.
///
/// `put` of a series whose pathname already exists overwrites the overlapping slots and keeps
/// the rest, so repeating a `put` leaves the store unchanged.
pub trait SeriesStore {
    fn put(&mut self, series: &NormalizedSeries) -> Result<(), SinkError>;
    fn close(&mut self) -> Result<(), SinkError>;
}

impl<S: SeriesStore + ?Sized> SeriesStore for Box<S> {
    fn put(&mut self, series: &NormalizedSeries) -> Result<(), SinkError> {
        (**self).put(series)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        (**self).close()
    }
}

/// What a store holds for one pathname.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSeries {
    pub pathname: String,
    pub identifier: String,
    pub units: String,
    pub value_type: String,
    pub interval_minutes: i64,
    pub grid_minutes: i64,
    pub start_minute: i64,
    pub end_minute: i64,
    pub time_zone: String,
    /// `(minute, value)` pairs, ascending; absent slots are not listed.
    pub samples: Vec<(i64, f64)>,
}

pub(crate) fn check_series(series: &NormalizedSeries) -> Result<(), SinkError> {
    let reject = |reason: &str| {
        Err(SinkError::Rejected {
            path: series.pathname(),
            reason: reason.to_string(),
        })
    };
    if series.times.is_empty() {
        return reject("series has no slots");
    }
    if series.times.len() != series.values.len() {
        return reject("time and value counts differ");
    }
    if !series.times.windows(2).all(|w| w[0] < w[1]) {
        return reject("times are not strictly ascending");
    }
    if series.values.iter().flatten().any(|v| !v.is_finite()) {
        return reject("series contains a non-finite value");
    }
    Ok(())
}

/// Owns the store for one run and closes it exactly once.
///
/// A failed `put` is logged with the record identifier and handed back as a value; the writer
/// stays usable. If the writer is dropped without [`SinkWriter::close`], the store is closed
/// from `Drop`.
pub struct SinkWriter<S: SeriesStore> {
    store: S,
    closed: bool,
    written: usize,
    rejected: usize,
}

impl<S: SeriesStore> SinkWriter<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            closed: false,
            written: 0,
            rejected: 0,
        }
    }

    pub fn put(&mut self, series: &NormalizedSeries) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        match self.store.put(series) {
            Ok(()) => {
                self.written += 1;
                debug!(
                    identifier = %series.identifier,
                    path = %series.path,
                    slots = series.len(),
                    "stored series"
                );
                Ok(())
            }
            Err(err) => {
                self.rejected += 1;
                warn!(
                    identifier = %series.identifier,
                    path = %series.path,
                    error = %err,
                    "series not saved"
                );
                Err(err)
            }
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn close(mut self) -> Result<(), SinkError> {
        self.close_once()
    }

    fn close_once(&mut self) -> Result<(), SinkError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.store.close()
    }
}

impl<S: SeriesStore> Drop for SinkWriter<S> {
    fn drop(&mut self) {
        if let Err(err) = self.close_once() {
            warn!(error = %err, "failed to close series store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::CodeTable;
    use crate::normalize::Normalizer;
    use crate::record::DataRecord;

    pub(crate) fn sample_series(identifier: &str) -> NormalizedSeries {
        let record = DataRecord {
            identifier: identifier.to_string(),
            code: "00065".to_string(),
            site_id: None,
            parameter_id: None,
            times: vec![
                "2021-03-01T00:00:00Z".to_string(),
                "2021-03-01T00:15:00Z".to_string(),
                "2021-03-01T00:45:00Z".to_string(),
            ],
            values: vec![Some(1.0), Some(2.0), Some(4.0)],
        };
        Normalizer::new(CodeTable::builtin(), "ws")
            .normalize(&record)
            .expect("normalize")
    }

    struct FlakyStore {
        fail_on: &'static str,
        closes: usize,
    }

    impl SeriesStore for FlakyStore {
        fn put(&mut self, series: &NormalizedSeries) -> Result<(), SinkError> {
            if series.identifier == self.fail_on {
                return Err(SinkError::Rejected {
                    path: series.pathname(),
                    reason: "duplicate".to_string(),
                });
            }
            Ok(())
        }

        fn close(&mut self) -> Result<(), SinkError> {
            self.closes += 1;
            Ok(())
        }
    }

    #[test]
    fn failed_put_does_not_stop_later_puts() {
        let mut writer = SinkWriter::new(FlakyStore {
            fail_on: "B",
            closes: 0,
        });
        assert!(writer.put(&sample_series("A")).is_ok());
        assert!(writer.put(&sample_series("B")).is_err());
        assert!(writer.put(&sample_series("C")).is_ok());
        assert_eq!(writer.written(), 2);
        assert_eq!(writer.rejected(), 1);
    }

    #[test]
    fn store_is_closed_once_on_drop() {
        let store = MemoryStore::new();
        {
            let mut writer = SinkWriter::new(store.clone());
            writer.put(&sample_series("A")).unwrap();
        }
        assert_eq!(store.close_count(), 1);
    }

    #[test]
    fn explicit_close_is_not_repeated_by_drop() {
        let store = MemoryStore::new();
        let writer = SinkWriter::new(store.clone());
        writer.close().unwrap();
        assert_eq!(store.close_count(), 1);
    }

    #[test]
    fn check_series_rejects_unsorted_times() {
        let mut series = sample_series("A");
        series.times.swap(0, 1);
        assert!(matches!(
            check_series(&series),
            Err(SinkError::Rejected { .. })
        ));
    }
}
