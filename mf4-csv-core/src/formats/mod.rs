//! Recording decoders (MF4, in-memory)
//!
//! This module defines the seam between the conversion pipeline and the
//! measurement-file decoders. A [`MeasurementSource`] opens a path into a
//! [`Recording`]; the recording exposes group/channel metadata and raw
//! samples on demand.

use crate::types::{
    ChannelData, Column, ConvertError, GroupData, GroupInfo, Result, Sample, Timestamp,
    ValueMode,
};
use std::cmp::Ordering;
use std::path::Path;

pub mod memory;
pub mod mf4;

// Re-export decoder types
pub use memory::{MemoryChannel, MemoryGroup, MemoryRecording, MemorySource};
pub use mf4::{Mdf4Recording, Mdf4Source};

/// Opens recordings by path
pub trait MeasurementSource: Send + Sync {
    /// Open a recording; failures are reported as [`ConvertError::Read`]
    fn open(&self, path: &Path) -> Result<Box<dyn Recording>>;
}

/// An opened measurement recording
///
/// The handle is owned by one conversion run and dropped as soon as
/// extraction has finished.
pub trait Recording {
    /// Absolute, timezone-naive start of the measurement
    fn start_time(&self) -> Timestamp;

    /// Channel groups in file order
    fn groups(&self) -> &[GroupInfo];

    /// Elapsed seconds of every record in a group (the master channel)
    fn timebase(&self, group: usize) -> Result<Vec<f64>>;

    /// Elapsed seconds and samples of one channel
    ///
    /// Samples flagged invalid in the recording are left out.
    fn channel(&self, group: usize, index: usize, mode: ValueMode) -> Result<ChannelData>;

    /// Stored samples of several channels of one group on a shared time axis
    ///
    /// Conversion rules are not applied. The default implementation reads
    /// each channel in [`ValueMode::Raw`] and aligns them on the union of
    /// their elapsed times.
    fn group_data(&self, group: usize, channels: &[usize]) -> Result<GroupData> {
        let data = channels
            .iter()
            .map(|&index| self.channel(group, index, ValueMode::Raw))
            .collect::<Result<Vec<_>>>()?;
        Ok(align_channels(data))
    }

    /// Look up a group descriptor
    fn group(&self, group: usize) -> Result<&GroupInfo> {
        self.groups()
            .get(group)
            .ok_or_else(|| ConvertError::Read(format!("group {} does not exist", group)))
    }
}

/// Outer-join channels on their elapsed times
///
/// Each channel is ordered by time first; when a channel repeats a point in
/// time its last sample wins.
pub(crate) fn align_channels(channels: Vec<ChannelData>) -> GroupData {
    let mut elapsed: Vec<f64> = channels
        .iter()
        .flat_map(|c| c.elapsed.iter().copied())
        .collect();
    elapsed.sort_by(f64::total_cmp);
    elapsed.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);

    let columns = channels
        .into_iter()
        .map(|channel| {
            let mut values: Vec<Option<Sample>> = vec![None; elapsed.len()];
            let mut rows: Vec<(f64, Sample)> =
                channel.elapsed.into_iter().zip(channel.samples).collect();
            rows.sort_by(|a, b| a.0.total_cmp(&b.0));
            for (t, sample) in rows {
                if let Ok(pos) = elapsed.binary_search_by(|x| x.total_cmp(&t)) {
                    values[pos] = Some(sample);
                }
            }
            Column::new(channel.name, values)
        })
        .collect();

    GroupData { elapsed, columns }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(name: &str, elapsed: &[f64], values: &[f64]) -> ChannelData {
        ChannelData {
            name: name.to_string(),
            elapsed: elapsed.to_vec(),
            samples: values.iter().map(|&v| Sample::Scalar(v)).collect(),
        }
    }

    #[test]
    fn test_align_channels_outer_join() {
        let data = align_channels(vec![
            channel("A", &[0.0, 0.025], &[1.0, 2.0]),
            channel("B", &[0.01, 0.0], &[20.0, 10.0]),
        ]);

        assert_eq!(data.elapsed, vec![0.0, 0.01, 0.025]);
        assert_eq!(
            data.columns[0].values,
            vec![Some(Sample::Scalar(1.0)), None, Some(Sample::Scalar(2.0))]
        );
        assert_eq!(
            data.columns[1].values,
            vec![Some(Sample::Scalar(10.0)), Some(Sample::Scalar(20.0)), None]
        );
    }

    #[test]
    fn test_align_channels_duplicate_times() {
        let data = align_channels(vec![channel("A", &[0.5, 0.5], &[1.0, 2.0])]);
        assert_eq!(data.elapsed, vec![0.5]);
        assert_eq!(data.columns[0].values, vec![Some(Sample::Scalar(2.0))]);
    }
}
