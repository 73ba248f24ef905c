//! Resampling onto a fixed cadence
//!
//! Bins are right-closed and right-labeled: a sample at time `t` belongs to
//! the bin `(label - cadence, label]` whose label is the first grid point at
//! or after `t`. The grid starts at midnight of the day of the earliest
//! sample. Within a bin the last observed value wins; bins without any
//! observation are empty until [`forward_fill`] is applied.

use crate::config::Cadence;
use crate::types::{Column, Frame, Timestamp};
use chrono::{NaiveTime, TimeDelta};

/// Re-grid a frame onto the cadence, keeping the last value per bin and column
pub fn resample_last<T: Clone>(frame: Frame<T>, cadence: Cadence) -> Frame<T> {
    let Some(&first) = frame.index.iter().min() else {
        return frame;
    };
    let step = cadence.nanos();
    let origin = first.date().and_time(NaiveTime::MIN);

    // Rows ordered by time; ties keep their original order
    let mut order: Vec<usize> = (0..frame.index.len()).collect();
    order.sort_by_key(|&row| frame.index[row]);

    let bins: Vec<i64> = frame
        .index
        .iter()
        .map(|t| bin_number(*t - origin, step))
        .collect();
    let first_bin = bins.iter().copied().min().unwrap_or(0);
    let last_bin = bins.iter().copied().max().unwrap_or(0);
    let bin_count = (last_bin - first_bin + 1) as usize;

    let index = (first_bin..=last_bin)
        .map(|bin| origin + TimeDelta::nanoseconds(bin * step))
        .collect();

    let columns = frame
        .columns
        .into_iter()
        .map(|column| {
            let mut values: Vec<Option<T>> = vec![None; bin_count];
            for &row in &order {
                if let Some(value) = &column.values[row] {
                    values[(bins[row] - first_bin) as usize] = Some(value.clone());
                }
            }
            Column::new(column.name, values)
        })
        .collect();

    Frame::new(index, columns)
}

/// Number of the right-closed bin containing an offset from the grid origin
fn bin_number(offset: TimeDelta, step: i64) -> i64 {
    let nanos = offset.num_nanoseconds().unwrap_or(i64::MAX);
    // ceil(nanos / step) for a positive step
    nanos.div_euclid(step) + i64::from(nanos.rem_euclid(step) != 0)
}

/// Carry the last value forward into following empty cells
///
/// Cells before the first value stay empty.
pub fn forward_fill<T: Clone>(values: &mut [Option<T>]) {
    let mut last: Option<T> = None;
    for cell in values.iter_mut() {
        match cell {
            Some(value) => last = Some(value.clone()),
            None => *cell = last.clone(),
        }
    }
}

/// Forward-fill every column of a frame
pub fn forward_fill_frame<T: Clone>(frame: &mut Frame<T>) {
    for column in &mut frame.columns {
        forward_fill(&mut column.values);
    }
}

/// Timestamp of the grid point labelling `t`
pub fn bin_label(t: Timestamp, cadence: Cadence) -> Timestamp {
    let origin = t.date().and_time(NaiveTime::MIN);
    origin + TimeDelta::nanoseconds(bin_number(t - origin, cadence.nanos()) * cadence.nanos())
}
