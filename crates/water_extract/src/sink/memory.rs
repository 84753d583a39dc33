use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use super::{check_series, SeriesStore, StoredSeries};
use crate::error::SinkError;
use crate::normalize::NormalizedSeries;

#[derive(Debug, Default)]
struct Inner {
    series: BTreeMap<String, (StoredSeries, BTreeMap<i64, f64>)>,
    closed: bool,
    close_count: usize,
}

/// In-process store. Clones share the same contents, so a caller can keep a handle and inspect
/// what a run wrote after the run's writer has closed it.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-opens a closed store for another run.
    pub fn reopen(&self) -> Self {
        self.lock().closed = false;
        self.clone()
    }

    pub fn pathnames(&self) -> Vec<String> {
        self.lock().series.keys().cloned().collect()
    }

    pub fn read(&self, pathname: &str) -> Option<StoredSeries> {
        let guard = self.lock();
        let (meta, samples) = guard.series.get(pathname)?;
        let mut stored = meta.clone();
        stored.samples = samples.iter().map(|(t, v)| (*t, *v)).collect();
        Some(stored)
    }

    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl SeriesStore for MemoryStore {
    fn put(&mut self, series: &NormalizedSeries) -> Result<(), SinkError> {
        check_series(series)?;
        let mut guard = self.lock();
        if guard.closed {
            return Err(SinkError::Closed);
        }

        let pathname = series.pathname();
        let entry = guard.series.entry(pathname.clone()).or_insert_with(|| {
            (
                StoredSeries {
                    pathname,
                    identifier: series.identifier.clone(),
                    units: series.units.clone(),
                    value_type: series.value_type.clone(),
                    interval_minutes: series.interval_minutes,
                    grid_minutes: series.grid_minutes,
                    start_minute: series.start_minute,
                    end_minute: series.end_minute,
                    time_zone: series.time_zone.clone(),
                    samples: Vec::new(),
                },
                BTreeMap::new(),
            )
        });

        let (meta, samples) = entry;
        meta.units = series.units.clone();
        meta.value_type = series.value_type.clone();
        meta.interval_minutes = series.interval_minutes;
        meta.grid_minutes = series.grid_minutes;
        meta.time_zone = series.time_zone.clone();
        meta.start_minute = meta.start_minute.min(series.start_minute);
        meta.end_minute = meta.end_minute.max(series.end_minute);
        for (minute, value) in series.present() {
            samples.insert(minute, value);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        let mut guard = self.lock();
        guard.closed = true;
        guard.close_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::tests::sample_series;

    #[test]
    fn repeated_put_is_idempotent() {
        let mut store = MemoryStore::new();
        let series = sample_series("05586100");
        store.put(&series).unwrap();
        let first = store.read(&series.pathname()).unwrap();
        store.put(&series).unwrap();
        let second = store.read(&series.pathname()).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.pathnames().len(), 1);
    }

    #[test]
    fn rewrite_refreshes_grid_and_time_zone() {
        let mut store = MemoryStore::new();
        let series = sample_series("05586100");
        store.put(&series).unwrap();

        let mut rerun = series.clone();
        rerun.grid_minutes = 5;
        rerun.time_zone = "America/Chicago".to_string();
        store.put(&rerun).unwrap();

        let stored = store.read(&series.pathname()).unwrap();
        assert_eq!(stored.grid_minutes, 5);
        assert_eq!(stored.time_zone, "America/Chicago");
    }

    #[test]
    fn put_after_close_is_rejected() {
        let mut store = MemoryStore::new();
        store.close().unwrap();
        assert!(matches!(
            store.put(&sample_series("A")),
            Err(SinkError::Closed)
        ));
        assert!(store.reopen().put(&sample_series("A")).is_ok());
    }
}
