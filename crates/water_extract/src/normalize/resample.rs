/// Regular-interval view of an ascending series.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RegularGrid {
    pub times: Vec<i64>,
    pub values: Vec<Option<f64>>,
    /// Input samples that did not fall exactly on a slot.
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SnapError {
    NothingOnGrid,
    TooManySlots { slots: u64 },
}

/// Snaps samples onto slots aligned to multiples of `step` minutes since the epoch.
///
/// Zero tolerance: a sample is kept only when its time is exactly a slot time. The grid spans
/// the first to the last occupied slot; slots without a sample are `None`. A grid wider than
/// `max_slots` is refused before anything is allocated. `times` must be strictly ascending.
pub(crate) fn snap_to_regular(
    times: &[i64],
    values: &[Option<f64>],
    step: i64,
    max_slots: usize,
) -> Result<RegularGrid, SnapError> {
    debug_assert!(step > 0);
    debug_assert_eq!(times.len(), values.len());

    let on_grid: Vec<(i64, Option<f64>)> = times
        .iter()
        .zip(values)
        .filter(|(t, _)| t.rem_euclid(step) == 0)
        .map(|(t, v)| (*t, *v))
        .collect();
    let (first, last) = match (on_grid.first(), on_grid.last()) {
        (Some(first), Some(last)) => (first.0, last.0),
        _ => return Err(SnapError::NothingOnGrid),
    };

    let slots = (last - first).unsigned_abs() / step.unsigned_abs() + 1;
    let slots = match usize::try_from(slots) {
        Ok(slots) if slots <= max_slots => slots,
        _ => return Err(SnapError::TooManySlots { slots }),
    };

    let grid_times: Vec<i64> = (0..slots).map(|i| first + i as i64 * step).collect();
    let mut grid_values = vec![None; slots];
    for (t, v) in &on_grid {
        grid_values[((t - first) / step) as usize] = *v;
    }

    Ok(RegularGrid {
        times: grid_times,
        values: grid_values,
        dropped: times.len() - on_grid.len(),
    })
}
