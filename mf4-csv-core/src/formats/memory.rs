//! In-memory recordings
//!
//! Recordings assembled directly from sample vectors. Useful for callers
//! that decode measurement data elsewhere, and for tests.
//!
//! Every group gets a master channel at index 0 carrying the group timebase,
//! followed by the user channels in insertion order.

use super::{MeasurementSource, Recording};
use crate::types::{
    ChannelData, ChannelInfo, ChannelKind, ConvertError, GroupInfo, Result, Sample, SampleShape,
    Timestamp, ValueMode,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Name of the synthetic master channel of every in-memory group
const MASTER_NAME: &str = "t";

/// One channel of an in-memory group
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryChannel {
    name: String,
    kind: ChannelKind,
    elapsed: Vec<f64>,
    samples: Vec<Sample>,
    /// Linear conversion `offset + factor * stored`
    linear: Option<(f64, f64)>,
    readable: bool,
}

impl MemoryChannel {
    /// Create a value channel from parallel elapsed-time and sample vectors
    ///
    /// # Panics
    /// If the two vectors differ in length.
    pub fn new(name: impl Into<String>, elapsed: Vec<f64>, samples: Vec<Sample>) -> Self {
        assert_eq!(elapsed.len(), samples.len(), "elapsed/sample length mismatch");
        Self {
            name: name.into(),
            kind: ChannelKind::Value,
            elapsed,
            samples,
            linear: None,
            readable: true,
        }
    }

    /// Create a scalar value channel from `(elapsed seconds, value)` points
    pub fn scalar(name: impl Into<String>, points: &[(f64, f64)]) -> Self {
        let (elapsed, samples) = points
            .iter()
            .map(|&(t, v)| (t, Sample::Scalar(v)))
            .unzip();
        Self::new(name, elapsed, samples)
    }

    /// Builder method: override the channel kind
    pub fn with_kind(mut self, kind: ChannelKind) -> Self {
        self.kind = kind;
        self
    }

    /// Builder method: attach a linear conversion rule
    ///
    /// The samples given to the constructor are the stored values; physical
    /// reads return `offset + factor * stored`.
    pub fn with_linear(mut self, offset: f64, factor: f64) -> Self {
        self.linear = Some((offset, factor));
        self
    }

    /// Builder method: make every read of this channel fail
    pub fn unreadable(mut self) -> Self {
        self.readable = false;
        self
    }

    fn shape(&self) -> SampleShape {
        self.samples
            .first()
            .map(Sample::shape)
            .unwrap_or(SampleShape::Scalar)
    }
}

/// One channel group of an in-memory recording
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemoryGroup {
    channels: Vec<MemoryChannel>,
    timebase: Option<Vec<f64>>,
}

impl MemoryGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: append a channel
    pub fn with_channel(mut self, channel: MemoryChannel) -> Self {
        self.channels.push(channel);
        self
    }

    /// Builder method: set the master timebase explicitly
    ///
    /// Without it, the timebase is the sorted union of the channel times.
    pub fn with_timebase(mut self, elapsed: Vec<f64>) -> Self {
        self.timebase = Some(elapsed);
        self
    }

    fn timebase(&self) -> Vec<f64> {
        if let Some(timebase) = &self.timebase {
            return timebase.clone();
        }
        let mut elapsed: Vec<f64> = self
            .channels
            .iter()
            .flat_map(|c| c.elapsed.iter().copied())
            .collect();
        elapsed.sort_by(f64::total_cmp);
        elapsed.dedup();
        elapsed
    }
}

/// A recording held entirely in memory
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecording {
    start: Timestamp,
    groups: Vec<MemoryGroup>,
    infos: Vec<GroupInfo>,
}

impl MemoryRecording {
    pub fn new(start: Timestamp) -> Self {
        Self {
            start,
            groups: Vec::new(),
            infos: Vec::new(),
        }
    }

    /// Builder method: append a channel group
    pub fn with_group(mut self, group: MemoryGroup) -> Self {
        let index = self.groups.len();
        let mut channels = vec![ChannelInfo {
            name: MASTER_NAME.to_string(),
            index: 0,
            shape: SampleShape::Scalar,
            kind: ChannelKind::Master,
        }];
        channels.extend(group.channels.iter().enumerate().map(|(i, c)| ChannelInfo {
            name: c.name.clone(),
            index: i + 1,
            shape: c.shape(),
            kind: c.kind,
        }));
        self.infos.push(GroupInfo {
            index,
            cycles: group.timebase().len() as u64,
            channels,
        });
        self.groups.push(group);
        self
    }

    fn memory_group(&self, group: usize) -> Result<&MemoryGroup> {
        self.groups
            .get(group)
            .ok_or_else(|| ConvertError::Read(format!("group {} does not exist", group)))
    }
}

impl Recording for MemoryRecording {
    fn start_time(&self) -> Timestamp {
        self.start
    }

    fn groups(&self) -> &[GroupInfo] {
        &self.infos
    }

    fn timebase(&self, group: usize) -> Result<Vec<f64>> {
        Ok(self.memory_group(group)?.timebase())
    }

    fn channel(&self, group: usize, index: usize, mode: ValueMode) -> Result<ChannelData> {
        let memory_group = self.memory_group(group)?;

        if index == 0 {
            let elapsed = memory_group.timebase();
            let samples = elapsed.iter().map(|&t| Sample::Scalar(t)).collect();
            return Ok(ChannelData {
                name: MASTER_NAME.to_string(),
                elapsed,
                samples,
            });
        }

        let channel = memory_group.channels.get(index - 1).ok_or_else(|| {
            ConvertError::Read(format!("channel {} of group {} does not exist", index, group))
        })?;
        if !channel.readable {
            return Err(ConvertError::Read(format!(
                "channel {:?} of group {} cannot be read",
                channel.name, group
            )));
        }

        let samples = match (mode, channel.linear) {
            (ValueMode::Physical, Some((offset, factor))) => channel
                .samples
                .iter()
                .map(|s| s.clone().map(|v| offset + factor * v))
                .collect(),
            _ => channel.samples.clone(),
        };

        Ok(ChannelData {
            name: channel.name.clone(),
            elapsed: channel.elapsed.clone(),
            samples,
        })
    }
}

/// Serves in-memory recordings by file name
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    recordings: BTreeMap<String, MemoryRecording>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: register a recording under a file name
    pub fn with_recording(mut self, file_name: impl Into<String>, recording: MemoryRecording) -> Self {
        self.recordings.insert(file_name.into(), recording);
        self
    }
}

impl MeasurementSource for MemorySource {
    fn open(&self, path: &Path) -> Result<Box<dyn Recording>> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ConvertError::Read(format!("invalid recording path: {:?}", path)))?;

        self.recordings
            .get(file_name)
            .map(|r| Box::new(r.clone()) as Box<dyn Recording>)
            .ok_or_else(|| ConvertError::Read(format!("recording not found: {:?}", path)))
    }
}
