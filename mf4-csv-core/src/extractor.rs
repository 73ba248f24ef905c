//! Raw extraction strategies
//!
//! A recording is processed in units: one unit per channel for
//! [`PerChannelExtraction`], one unit per group for [`PerGroupExtraction`].
//! Both strategies share one contract so the converter drives them the same
//! way:
//!
//! 1. [`select`](ExtractionStrategy::select) the groups and channels to read
//! 2. [`extract`](ExtractionStrategy::extract) raw series for one group
//! 3. the caller validates each series into a timestamped frame
//! 4. [`align`](ExtractionStrategy::align) expands and resamples the
//!    validated frames of the group into one scalar frame
//!
//! The strategies differ in where expansion happens: per channel it runs
//! before resampling on the shape of the first sample, per group it runs
//! after resampling on the shape of the last cell.

use crate::catalog::{ChannelCatalog, GroupSelection};
use crate::config::{Cadence, Strategy};
use crate::expander::{expand_frame, first_shape, last_shape};
use crate::formats::Recording;
use crate::resampler::{forward_fill_frame, resample_last};
use crate::table::concat;
use crate::types::{Column, Frame, Result, Sample, ValueMode};

/// Raw samples of one extraction unit, on an elapsed-seconds axis
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSeries {
    /// Channel name, or a group label for per-group units
    pub label: String,
    pub elapsed: Vec<f64>,
    pub columns: Vec<Column<Sample>>,
}

/// Shared contract of the two extraction variants
pub trait ExtractionStrategy: Send + Sync {
    /// Groups and channels to read, in group order
    fn select(&self, recording: &dyn Recording) -> Vec<GroupSelection>;

    /// Read the raw series of one selected group
    ///
    /// An error here fails the whole file.
    fn extract(&self, recording: &dyn Recording, selection: &GroupSelection)
        -> Result<Vec<SampleSeries>>;

    /// Turn the validated frames of one group into a resampled scalar frame
    ///
    /// Returns `None` when the group yields no usable column.
    fn align(&self, frames: Vec<Frame<Sample>>, cadence: Cadence) -> Option<Frame<f64>>;
}

/// Variant A: every channel is read, expanded and resampled on its own
#[derive(Debug, Clone, Copy, Default)]
pub struct PerChannelExtraction;

impl ExtractionStrategy for PerChannelExtraction {
    fn select(&self, recording: &dyn Recording) -> Vec<GroupSelection> {
        ChannelCatalog::new(recording).signal_channels()
    }

    fn extract(
        &self,
        recording: &dyn Recording,
        selection: &GroupSelection,
    ) -> Result<Vec<SampleSeries>> {
        let mut series = Vec::with_capacity(selection.channels.len());
        for &index in &selection.channels {
            let data = match recording.channel(selection.group, index, ValueMode::Physical) {
                Ok(data) => data,
                Err(e) => {
                    log::debug!(
                        "Skipping channel {} of group {}: {}",
                        index,
                        selection.group,
                        e
                    );
                    continue;
                }
            };
            if data.elapsed.is_empty() {
                log::debug!("Skipping channel {:?}: no samples", data.name);
                continue;
            }

            let values = data.samples.into_iter().map(Some).collect();
            series.push(SampleSeries {
                columns: vec![Column::new(data.name.clone(), values)],
                label: data.name,
                elapsed: data.elapsed,
            });
        }
        Ok(series)
    }

    fn align(&self, frames: Vec<Frame<Sample>>, cadence: Cadence) -> Option<Frame<f64>> {
        let resampled: Vec<Frame<f64>> = frames
            .into_iter()
            .map(|frame| expand_frame(frame, first_shape))
            .filter(|frame| !frame.columns.is_empty())
            .map(|frame| resample_last(frame, cadence))
            .collect();
        if resampled.is_empty() {
            return None;
        }

        let mut group = concat(resampled);
        forward_fill_frame(&mut group);
        Some(group)
    }
}

/// Variant B: each group is read as one aligned table
#[derive(Debug, Clone, Copy, Default)]
pub struct PerGroupExtraction;

impl ExtractionStrategy for PerGroupExtraction {
    fn select(&self, recording: &dyn Recording) -> Vec<GroupSelection> {
        ChannelCatalog::new(recording).value_channels()
    }

    fn extract(
        &self,
        recording: &dyn Recording,
        selection: &GroupSelection,
    ) -> Result<Vec<SampleSeries>> {
        let data = recording.group_data(selection.group, &selection.channels)?;
        log::trace!(
            "Group {}: {} rows, {} channels",
            selection.group,
            data.elapsed.len(),
            data.columns.len()
        );
        Ok(vec![SampleSeries {
            label: format!("group {}", selection.group),
            elapsed: data.elapsed,
            columns: data.columns,
        }])
    }

    fn align(&self, frames: Vec<Frame<Sample>>, cadence: Cadence) -> Option<Frame<f64>> {
        let mut aligned = Vec::with_capacity(frames.len());
        for frame in frames {
            let mut resampled = resample_last(frame, cadence);
            forward_fill_frame(&mut resampled);

            let mut expanded = expand_frame(resampled, last_shape);
            expanded.columns.retain(Column::has_values);
            if !expanded.columns.is_empty() {
                aligned.push(expanded);
            }
        }

        match aligned.len() {
            0 => None,
            1 => aligned.pop(),
            _ => Some(concat(aligned)),
        }
    }
}

impl Strategy {
    /// The extraction implementation for this strategy
    pub fn extractor(self) -> &'static dyn ExtractionStrategy {
        match self {
            Strategy::PerChannel => &PerChannelExtraction,
            Strategy::PerGroup => &PerGroupExtraction,
        }
    }
}
