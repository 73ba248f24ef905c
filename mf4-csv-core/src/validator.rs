//! Timestamp validation
//!
//! Turns elapsed seconds into absolute timestamps, rejects recordings whose
//! timestamps drift implausibly far from the measurement start in either
//! direction, and drops samples outside the retention window.

use crate::config::TimestampLimits;
use crate::extractor::SampleSeries;
use crate::types::{Column, ConvertError, Frame, Result, Sample, Timestamp};
use chrono::TimeDelta;

/// Validates the time axis of extracted series against the recording start
#[derive(Debug, Clone, Copy)]
pub struct TimestampValidator {
    start: Timestamp,
    limits: TimestampLimits,
}

impl TimestampValidator {
    pub fn new(start: Timestamp, limits: TimestampLimits) -> Self {
        Self { start, limits }
    }

    /// `start + elapsed` for every value
    ///
    /// Fails with [`ConvertError::TimestampOverflow`] on the first value that
    /// cannot be represented as a timestamp.
    pub fn absolute(&self, label: &str, elapsed: &[f64]) -> Result<Vec<Timestamp>> {
        elapsed
            .iter()
            .map(|&secs| {
                elapsed_delta(secs)
                    .and_then(|delta| self.start.checked_add_signed(delta))
                    .ok_or_else(|| ConvertError::TimestampOverflow {
                        channel: label.to_string(),
                        elapsed: secs,
                    })
            })
            .collect()
    }

    /// Convert, check for corruption, then trim a series
    ///
    /// A corrupt time axis fails the whole file, not just this series.
    pub fn validate(&self, series: SampleSeries) -> Result<Frame<Sample>> {
        let index = self.absolute(&series.label, &series.elapsed)?;

        // Earliest and latest sample both lie within the window
        for bound in [index.iter().max(), index.iter().min()].into_iter().flatten() {
            let drift = *bound - self.start;
            if drift.abs() > self.limits.corruption_window {
                return Err(ConvertError::TimestampCorruption {
                    channel: series.label,
                    drift,
                    limit: self.limits.corruption_window,
                });
            }
        }

        let keep: Vec<bool> = index
            .iter()
            .map(|t| *t - self.start < self.limits.retention_window)
            .collect();
        let dropped = keep.iter().filter(|k| !**k).count();
        if dropped > 0 {
            log::debug!(
                "{}: dropping {} samples outside the retention window",
                series.label,
                dropped
            );
        }

        let index = filter_rows(index, &keep);
        let columns = series
            .columns
            .into_iter()
            .map(|column| Column::new(column.name, filter_rows(column.values, &keep)))
            .collect();

        Ok(Frame::new(index, columns))
    }
}

/// Seconds as a nanosecond-precision delta; `None` if not representable
fn elapsed_delta(secs: f64) -> Option<TimeDelta> {
    let nanos = (secs * 1e9).round();
    if !nanos.is_finite() || nanos >= i64::MAX as f64 || nanos <= i64::MIN as f64 {
        return None;
    }
    Some(TimeDelta::nanoseconds(nanos as i64))
}

fn filter_rows<T>(values: Vec<T>, keep: &[bool]) -> Vec<T> {
    values
        .into_iter()
        .zip(keep)
        .filter_map(|(value, &k)| k.then_some(value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> Timestamp {
        NaiveDate::from_ymd_opt(2021, 12, 1)
            .unwrap()
            .and_hms_opt(0, 54, 56)
            .unwrap()
    }

    fn series(label: &str, elapsed: &[f64]) -> SampleSeries {
        SampleSeries {
            label: label.to_string(),
            elapsed: elapsed.to_vec(),
            columns: vec![Column::new(
                label,
                elapsed.iter().map(|&t| Some(Sample::Scalar(t))).collect(),
            )],
        }
    }

    #[test]
    fn test_absolute_timestamps() {
        let validator = TimestampValidator::new(start(), TimestampLimits::default());
        let index = validator.absolute("A", &[0.0, 0.025, 1.5]).unwrap();
        assert_eq!(index[0], start());
        assert_eq!(index[1], start() + TimeDelta::milliseconds(25));
        assert_eq!(index[2], start() + TimeDelta::milliseconds(1500));
    }

    #[test]
    fn test_overflow() {
        let validator = TimestampValidator::new(start(), TimestampLimits::default());
        for bad in [1e300, f64::NAN, f64::INFINITY, 9.3e9] {
            match validator.absolute("GPS_Lat", &[0.0, bad]) {
                Err(ConvertError::TimestampOverflow { channel, .. }) => assert_eq!(channel, "GPS_Lat"),
                other => panic!("expected overflow for {}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_corruption_fails_series() {
        let validator = TimestampValidator::new(start(), TimestampLimits::default());
        let two_days = 2.0 * 86_400.0;
        match validator.validate(series("B", &[0.0, 1.0, two_days])) {
            Err(ConvertError::TimestampCorruption { channel, drift, .. }) => {
                assert_eq!(channel, "B");
                assert_eq!(drift, TimeDelta::days(2));
            }
            other => panic!("expected corruption, got {:?}", other),
        }

        // Exactly one day is still accepted
        assert!(validator.validate(series("C", &[0.0, 86_400.0])).is_ok());
    }

    #[test]
    fn test_corruption_before_start() {
        let validator = TimestampValidator::new(start(), TimestampLimits::default());
        match validator.validate(series("A", &[-9e9, 0.0])) {
            Err(ConvertError::TimestampCorruption { channel, drift, .. }) => {
                assert_eq!(channel, "A");
                assert_eq!(drift, TimeDelta::seconds(-9_000_000_000));
            }
            other => panic!("expected corruption, got {:?}", other),
        }

        assert!(validator.validate(series("B", &[-86_400.0, 0.0])).is_ok());
        assert!(validator.validate(series("B", &[-86_401.0, 0.0])).is_err());
    }

    #[test]
    fn test_retention_trim() {
        let limits = TimestampLimits::new(TimeDelta::days(1), TimeDelta::seconds(10));
        let validator = TimestampValidator::new(start(), limits);

        let frame = validator.validate(series("A", &[0.0, 9.5, 10.0, 20.0])).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(
            frame.columns[0].values,
            vec![Some(Sample::Scalar(0.0)), Some(Sample::Scalar(9.5))]
        );
    }

    #[test]
    fn test_default_retention_keeps_valid_day() {
        let validator = TimestampValidator::new(start(), TimestampLimits::default());
        let frame = validator.validate(series("A", &[0.0, 3_600.0, 86_000.0])).unwrap();
        assert_eq!(frame.len(), 3);
    }
}
