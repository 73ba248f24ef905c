//! Channel catalog
//!
//! Enumerates the groups of a recording and picks the channels each
//! extraction strategy should read.

use crate::formats::Recording;
use crate::types::{ChannelKind, GroupInfo};

/// Channels of one group selected for extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSelection {
    pub group: usize,
    pub channels: Vec<usize>,
}

/// Group/channel enumeration over an opened recording
pub struct ChannelCatalog<'r> {
    recording: &'r dyn Recording,
}

impl<'r> ChannelCatalog<'r> {
    pub fn new(recording: &'r dyn Recording) -> Self {
        Self { recording }
    }

    /// Candidates for per-channel extraction
    ///
    /// Every non-master channel of every group whose timebase can be read and
    /// is non-empty. Whether a single channel can actually be retrieved is
    /// decided at extraction time.
    pub fn signal_channels(&self) -> Vec<GroupSelection> {
        self.recording
            .groups()
            .iter()
            .filter(|group| self.has_timebase(group))
            .map(|group| GroupSelection {
                group: group.index,
                channels: group
                    .channels
                    .iter()
                    .filter(|c| c.kind != ChannelKind::Master)
                    .map(|c| c.index)
                    .collect(),
            })
            .filter(|selection| !selection.channels.is_empty())
            .collect()
    }

    /// Candidates for per-group extraction
    ///
    /// Value-kind channels of groups with at least one cycle; groups without
    /// any value channel are left out.
    pub fn value_channels(&self) -> Vec<GroupSelection> {
        self.recording
            .groups()
            .iter()
            .filter(|group| {
                if group.cycles == 0 {
                    log::debug!("Group {} has no cycles, skipping", group.index);
                    return false;
                }
                true
            })
            .map(|group| GroupSelection {
                group: group.index,
                channels: group
                    .channels
                    .iter()
                    .filter(|c| c.kind == ChannelKind::Value)
                    .map(|c| c.index)
                    .collect(),
            })
            .filter(|selection| !selection.channels.is_empty())
            .collect()
    }

    fn has_timebase(&self, group: &GroupInfo) -> bool {
        match self.recording.timebase(group.index) {
            Ok(timebase) if !timebase.is_empty() => true,
            Ok(_) => {
                log::debug!("Group {} has no data, skipping", group.index);
                false
            }
            Err(e) => {
                log::debug!("Cannot read group {}: {}", group.index, e);
                false
            }
        }
    }
}
