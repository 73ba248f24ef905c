//! MF4 (Measurement Data Format 4) recording reader
//!
//! Thin adapter over the `mdf4-rs` crate. The crate parses the block tree
//! and walks the record data; this module classifies channels, picks the
//! group masters and turns decoded values into [`Sample`]s, either
//! physical (conversion rule applied) or raw.
//!
//! ## Supported
//! - Sorted and unsorted data groups with DT/DV data or DL lists
//! - Unsigned/signed integers and IEEE floats, little and big endian
//! - Numeric conversion rules (linear, rational, table look-ups)
//! - Time master channels, explicit or virtual
//! - CN-template arrays (CA) with one or two dimensions, as vector and matrix samples
//! - Invalidation bits: invalid samples are left out
//!
//! ## Known Limitations
//! - MDF 3.x and MDF 4.00 files are rejected
//! - Text, byte-array, VLSD and structure channels are listed but not decodable

use super::{MeasurementSource, Recording};
use crate::types::{
    ChannelData, ChannelInfo, ChannelKind, ConvertError, GroupInfo, Result, Sample, SampleShape,
    Timestamp, ValueMode,
};
use byteorder::{ByteOrder, LittleEndian};
use chrono::DateTime;
use mdf4_rs::blocks::{ChannelBlock, ConversionType, DataType, HeaderBlock};
use mdf4_rs::parsing::decoder::{decode_channel_value, decode_channel_value_with_validity};
use mdf4_rs::{ChannelGroup, DecodedValue, MDF};
use std::path::Path;

const CN_FIXED_LENGTH: u8 = 0;
const CN_VLSD: u8 = 1;
const CN_MASTER: u8 = 2;
const CN_VIRTUAL_MASTER: u8 = 3;
const SYNC_TIME: u8 = 1;
const CG_VLSD: u16 = 0x0001;
const CA_INVERSE_LAYOUT: u32 = 0x40;
const HD_LOCAL_TIME: u8 = 0x01;
const HD_OFFSETS_VALID: u8 = 0x02;

fn read_error(e: mdf4_rs::Error) -> ConvertError {
    ConvertError::Read(e.to_string())
}

/// Opens MF4 files from disk
#[derive(Debug, Clone, Copy, Default)]
pub struct Mdf4Source;

impl MeasurementSource for Mdf4Source {
    fn open(&self, path: &Path) -> Result<Box<dyn Recording>> {
        log::info!("Opening MF4 file: {:?}", path);

        if !path.exists() {
            return Err(ConvertError::Read(format!("MF4 file not found: {:?}", path)));
        }

        let recording = Mdf4Recording::open(path)?;
        log::info!(
            "MF4 file opened: {} channel groups, start {}",
            recording.infos.len(),
            recording.start
        );
        Ok(Box::new(recording))
    }
}

/// Dimensions and element spacing of a CN-template array
#[derive(Debug, Clone, PartialEq)]
struct ArrayLayout {
    stride: i32,
    dimensions: Vec<u64>,
    /// Column-oriented element storage
    inverse_layout: bool,
}

impl ArrayLayout {
    /// Parse the CA block at `offset`; `None` if it is not a plain CN-template array
    fn read(bytes: &[u8], offset: u64) -> Result<Option<Self>> {
        let truncated =
            || ConvertError::Read(format!("truncated composition block at {:#x}", offset));

        let start = usize::try_from(offset).map_err(|_| truncated())?;
        let header = start
            .checked_add(24)
            .and_then(|end| bytes.get(start..end))
            .ok_or_else(truncated)?;
        if &header[0..4] != b"##CA" {
            return Ok(None);
        }
        let length =
            usize::try_from(LittleEndian::read_u64(&header[8..16])).map_err(|_| truncated())?;
        let link_count =
            usize::try_from(LittleEndian::read_u64(&header[16..24])).map_err(|_| truncated())?;

        let block = start
            .checked_add(length)
            .and_then(|end| bytes.get(start..end))
            .ok_or_else(truncated)?;
        let data = link_count
            .checked_mul(8)
            .and_then(|links| links.checked_add(24))
            .and_then(|data_start| block.get(data_start..))
            .filter(|data| data.len() >= 16)
            .ok_or_else(truncated)?;

        let (array_type, storage) = (data[0], data[1]);
        if array_type != 0 || storage != 0 {
            return Ok(None);
        }
        let ndim = usize::from(LittleEndian::read_u16(&data[2..4]));
        let flags = LittleEndian::read_u32(&data[4..8]);

        let dimensions = (0..ndim)
            .map(|i| {
                data.get(16 + i * 8..24 + i * 8)
                    .map(LittleEndian::read_u64)
                    .ok_or_else(truncated)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Self {
            stride: LittleEndian::read_i32(&data[8..12]),
            dimensions,
            inverse_layout: flags & CA_INVERSE_LAYOUT != 0,
        }))
    }

    fn shape(&self) -> Option<SampleShape> {
        match self.dimensions.as_slice() {
            [width] => Some(SampleShape::Vector(usize::try_from(*width).ok()?)),
            [rows, cols] => Some(SampleShape::Matrix(
                usize::try_from(*rows).ok()?,
                usize::try_from(*cols).ok()?,
            )),
            _ => None,
        }
    }

    /// One copy of `template` per element, in row-major order, offset to
    /// where the element is stored
    ///
    /// Fails if the elements do not fit in a record of `record_size` bytes.
    fn elements(&self, template: &ChannelBlock, record_size: u32) -> Result<Vec<ChannelBlock>> {
        let too_large = || {
            ConvertError::Read(format!(
                "array {:?} does not fit in a {}-byte record",
                self.dimensions, record_size
            ))
        };

        let stride = u64::try_from(self.stride).map_err(|_| too_large())?;
        let count = self
            .dimensions
            .iter()
            .try_fold(1u64, |acc, &d| acc.checked_mul(d))
            .ok_or_else(too_large)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let element_bytes =
            (u64::from(template.bit_offset) + u64::from(template.bit_count)).div_ceil(8);
        let end = (count - 1)
            .checked_mul(stride)
            .and_then(|last| last.checked_add(u64::from(template.byte_offset)))
            .and_then(|last| last.checked_add(element_bytes))
            .ok_or_else(too_large)?;
        if end > u64::from(record_size) {
            return Err(too_large());
        }

        let cols = match self.dimensions.as_slice() {
            [_, cols] => *cols,
            _ => count,
        };
        let rows = count / cols;
        Ok((0..count)
            .map(|k| {
                let storage = if self.inverse_layout {
                    (k % cols) * rows + k / cols
                } else {
                    k
                };
                let mut element = template.clone();
                // Bounded by `end` above
                element.byte_offset = template.byte_offset + (storage * stride) as u32;
                element
            })
            .collect())
    }
}

/// How one channel is read from its group records
#[derive(Debug, Clone)]
struct ChannelLayout {
    block: ChannelBlock,
    shape: SampleShape,
    /// Per-element blocks of an array channel, empty for scalars
    elements: Vec<ChannelBlock>,
}

impl ChannelLayout {
    fn is_master(&self) -> bool {
        matches!(self.block.channel_type, CN_MASTER | CN_VIRTUAL_MASTER)
    }

    /// Decode the sample of one record; `None` if the record marks it invalid
    fn read_sample(
        &self,
        record: &[u8],
        frame: &RecordFrame<'_>,
        mode: ValueMode,
    ) -> Result<Option<Sample>> {
        if self.elements.is_empty() {
            return Ok(frame.read_value(&self.block, record, mode)?.map(Sample::Scalar));
        }

        let mut values = Vec::with_capacity(self.elements.len());
        for element in &self.elements {
            match frame.read_value(element, record, mode)? {
                Some(value) => values.push(value),
                None => return Ok(None),
            }
        }
        Ok(Some(match self.shape {
            SampleShape::Matrix(rows, cols) => Sample::Matrix { rows, cols, values },
            _ => Sample::Vector(values),
        }))
    }
}

/// Record framing shared by all channels of a group
struct RecordFrame<'a> {
    record_id_size: usize,
    data_bytes: u32,
    file: &'a [u8],
}

impl<'a> RecordFrame<'a> {
    fn of(group: &'a ChannelGroup<'_>) -> Self {
        Self {
            record_id_size: usize::from(group.raw_data_group().block.record_id_size),
            data_bytes: group.raw_channel_group().block.record_size,
            file: group.mmap(),
        }
    }

    fn convert(&self, block: &ChannelBlock, value: DecodedValue) -> Result<f64> {
        block
            .apply_conversion_value(value, self.file)
            .map_err(read_error)?
            .as_f64()
            .ok_or_else(|| ConvertError::Read("conversion did not yield a number".to_string()))
    }

    fn read_value(
        &self,
        block: &ChannelBlock,
        record: &[u8],
        mode: ValueMode,
    ) -> Result<Option<f64>> {
        let decoded =
            decode_channel_value_with_validity(record, self.record_id_size, self.data_bytes, block)
                .ok_or_else(|| {
                    ConvertError::Read("record shorter than channel layout".to_string())
                })?;
        if !decoded.is_valid {
            return Ok(None);
        }

        match mode {
            ValueMode::Physical => self.convert(block, decoded.value).map(Some),
            ValueMode::Raw => decoded
                .value
                .as_f64()
                .map(Some)
                .ok_or_else(|| ConvertError::Read("stored value is not a number".to_string())),
        }
    }

    /// Master values are always physical and never invalid
    fn read_master(&self, block: &ChannelBlock, record: &[u8]) -> Result<f64> {
        let value = decode_channel_value(record, self.record_id_size, block)
            .ok_or_else(|| ConvertError::Read("record shorter than master layout".to_string()))?;
        self.convert(block, value)
    }
}

/// Channel layouts of one listed channel group
#[derive(Debug, Clone)]
struct GroupLayout {
    /// Position among all channel groups of the file
    channel_group: usize,
    cycles: usize,
    master: Option<usize>,
    channels: Vec<ChannelLayout>,
}

/// An opened MF4 recording
pub struct Mdf4Recording {
    mdf: MDF,
    start: Timestamp,
    infos: Vec<GroupInfo>,
    layouts: Vec<GroupLayout>,
}

impl Mdf4Recording {
    /// Parse an MF4 file
    pub fn open(path: &Path) -> Result<Self> {
        let name = path
            .to_str()
            .ok_or_else(|| ConvertError::Read(format!("invalid recording path: {:?}", path)))?;
        let mdf = MDF::from_file(name).map_err(|e| {
            ConvertError::Read(format!("Failed to parse MF4 file {:?}: {}", path, e))
        })?;
        Self::from_mdf(mdf)
    }

    fn from_mdf(mdf: MDF) -> Result<Self> {
        let start = local_start(&mdf.raw().header)?;

        let mut infos = Vec::new();
        let mut layouts = Vec::new();
        for (channel_group, group) in mdf.channel_groups().iter().enumerate() {
            if group.raw_channel_group().block.flags & CG_VLSD != 0 {
                continue;
            }

            let (channel_infos, channels) = read_channels(group)?;
            let cycles = group_records(group)?.len();
            let index = infos.len();
            log::debug!(
                "MF4 group {}: {} channels, {} records",
                index,
                channel_infos.len(),
                cycles
            );

            infos.push(GroupInfo {
                index,
                cycles: cycles as u64,
                channels: channel_infos,
            });
            layouts.push(GroupLayout {
                channel_group,
                cycles,
                master: pick_master(&channels),
                channels,
            });
        }

        Ok(Self {
            mdf,
            start,
            infos,
            layouts,
        })
    }

    fn layout(&self, group: usize) -> Result<&GroupLayout> {
        self.layouts
            .get(group)
            .ok_or_else(|| ConvertError::Read(format!("group {} does not exist", group)))
    }

    fn channel_group(&self, layout: &GroupLayout) -> Result<ChannelGroup<'_>> {
        self.mdf
            .channel_groups()
            .into_iter()
            .nth(layout.channel_group)
            .ok_or_else(|| ConvertError::Read("channel group vanished from file".to_string()))
    }

    /// Elapsed seconds of every record, from the group master
    fn elapsed(
        &self,
        group: usize,
        layout: &GroupLayout,
        records: &[&[u8]],
        frame: &RecordFrame<'_>,
    ) -> Result<Vec<f64>> {
        let master = layout.master.map(|m| &layout.channels[m].block).ok_or_else(|| {
            ConvertError::Read(format!("channel group {} has no master channel", group))
        })?;

        if master.channel_type == CN_VIRTUAL_MASTER {
            return (0..records.len() as u64)
                .map(|i| frame.convert(master, DecodedValue::UnsignedInteger(i)))
                .collect();
        }
        records.iter().map(|r| frame.read_master(master, r)).collect()
    }
}

impl Recording for Mdf4Recording {
    fn start_time(&self) -> Timestamp {
        self.start
    }

    fn groups(&self) -> &[GroupInfo] {
        &self.infos
    }

    fn timebase(&self, group: usize) -> Result<Vec<f64>> {
        let layout = self.layout(group)?;
        let channel_group = self.channel_group(layout)?;
        let records = group_records(&channel_group)?;
        self.elapsed(group, layout, &records, &RecordFrame::of(&channel_group))
    }

    fn channel(&self, group: usize, index: usize, mode: ValueMode) -> Result<ChannelData> {
        let info = self
            .group(group)?
            .channels
            .get(index)
            .ok_or_else(|| {
                ConvertError::Read(format!("channel {} of group {} does not exist", index, group))
            })?;

        if info.kind == ChannelKind::Other {
            return Err(ConvertError::Read(format!(
                "channel {:?} has no decodable values",
                info.name
            )));
        }

        let layout = self.layout(group)?;
        let channel_group = self.channel_group(layout)?;
        let frame = RecordFrame::of(&channel_group);
        let records = group_records(&channel_group)?;
        let times = self.elapsed(group, layout, &records, &frame)?;

        if info.kind == ChannelKind::Master {
            return Ok(ChannelData {
                name: info.name.clone(),
                samples: times.iter().map(|&t| Sample::Scalar(t)).collect(),
                elapsed: times,
            });
        }

        let channel = &layout.channels[index];
        let mut elapsed = Vec::with_capacity(layout.cycles);
        let mut samples = Vec::with_capacity(layout.cycles);
        for (t, record) in times.into_iter().zip(&records) {
            if let Some(sample) = channel.read_sample(record, &frame, mode)? {
                elapsed.push(t);
                samples.push(sample);
            }
        }
        if samples.len() < records.len() {
            log::trace!(
                "MF4 channel {:?}: {} invalid samples left out",
                info.name,
                records.len() - samples.len()
            );
        }

        Ok(ChannelData {
            name: info.name.clone(),
            elapsed,
            samples,
        })
    }
}

/// Measurement start as local wall-clock time
fn local_start(header: &HeaderBlock) -> Result<Timestamp> {
    let invalid = || ConvertError::Read("invalid measurement start time".to_string());

    let mut ns = i64::try_from(header.start_time_ns).map_err(|_| invalid())?;
    if header.time_flags & HD_LOCAL_TIME == 0 && header.time_flags & HD_OFFSETS_VALID != 0 {
        let minutes = i64::from(header.tz_offset_min) + i64::from(header.dst_offset_min);
        ns = ns.checked_add(minutes * 60 * 1_000_000_000).ok_or_else(invalid)?;
    }

    DateTime::from_timestamp(ns.div_euclid(1_000_000_000), ns.rem_euclid(1_000_000_000) as u32)
        .map(|t| t.naive_utc())
        .ok_or_else(invalid)
}

/// All records of a channel group, record id included, up to its cycle count
fn group_records<'a>(group: &'a ChannelGroup<'_>) -> Result<Vec<&'a [u8]>> {
    let data_group = group.raw_data_group();
    let channel_group = group.raw_channel_group();
    let file = group.mmap();

    let record_size = usize::from(data_group.block.record_id_size)
        + channel_group.block.record_size as usize
        + channel_group.block.invalidation_size as usize;
    let Some(carrier) = channel_group
        .raw_channels
        .iter()
        .find(|c| c.block.channel_type != CN_VLSD)
    else {
        return Ok(Vec::new());
    };
    if record_size == 0 {
        return Ok(Vec::new());
    }

    let data = data_group.block.data_block_addr;
    let in_file = usize::try_from(data)
        .ok()
        .and_then(|start| start.checked_add(24))
        .is_some_and(|end| end <= file.len());
    if data != 0 && !in_file {
        return Err(ConvertError::Read(format!(
            "data block link {:#x} points outside the file",
            data
        )));
    }

    let mut records = carrier
        .records(data_group, channel_group, file)
        .map_err(read_error)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(read_error)?;

    let declared = channel_group.block.cycle_count;
    if (records.len() as u64) < declared {
        log::warn!(
            "MF4 data holds {} of {} declared records",
            records.len(),
            declared
        );
    } else {
        records.truncate(declared as usize);
    }
    Ok(records)
}

/// True if values decode to numbers, physical ones included
fn is_numeric(block: &ChannelBlock) -> bool {
    let encoding_ok = match block.data_type {
        DataType::UnsignedIntegerLE
        | DataType::UnsignedIntegerBE
        | DataType::SignedIntegerLE
        | DataType::SignedIntegerBE => {
            block.bit_count > 0 && u32::from(block.bit_offset) + block.bit_count <= 64
        }
        DataType::FloatLE | DataType::FloatBE => {
            block.bit_offset == 0 && matches!(block.bit_count, 32 | 64)
        }
        _ => false,
    };
    let conversion_ok = block.conversion.as_ref().map_or(true, |cc| {
        matches!(
            cc.conversion_type,
            ConversionType::Identity
                | ConversionType::Linear
                | ConversionType::Rational
                | ConversionType::TableLookupInterp
                | ConversionType::TableLookupNoInterp
                | ConversionType::RangeLookup
        )
    });
    encoding_ok && conversion_ok
}

/// Classify the channels of a group and prepare their layouts
fn read_channels(group: &ChannelGroup<'_>) -> Result<(Vec<ChannelInfo>, Vec<ChannelLayout>)> {
    let file = group.mmap();
    let record_size = group.raw_channel_group().block.record_size;

    let mut infos = Vec::new();
    let mut layouts = Vec::new();
    for (index, raw) in group.raw_channel_group().raw_channels.iter().enumerate() {
        let mut block = raw.block.clone();
        block.resolve_name(file).map_err(read_error)?;
        let name = block
            .name
            .as_deref()
            .map(|n| n.trim_end_matches('\0'))
            .filter(|n| !n.is_empty())
            .map_or_else(|| format!("channel_{}", index), str::to_string);

        let array = match block.component_addr {
            0 => None,
            addr => Some(ArrayLayout::read(file, addr)?),
        };
        let numeric = block.channel_type == CN_FIXED_LENGTH && is_numeric(&block);

        let (kind, shape, elements) = match (block.channel_type, array) {
            (CN_MASTER | CN_VIRTUAL_MASTER, _) => {
                (ChannelKind::Master, SampleShape::Scalar, Vec::new())
            }
            (_, None) if numeric => (ChannelKind::Value, SampleShape::Scalar, Vec::new()),
            (_, Some(Some(array))) if numeric && array.stride > 0 => match array.shape() {
                Some(shape) => {
                    let elements = array.elements(&block, record_size)?;
                    (ChannelKind::Value, shape, elements)
                }
                None => (ChannelKind::Other, SampleShape::Scalar, Vec::new()),
            },
            _ => (ChannelKind::Other, SampleShape::Scalar, Vec::new()),
        };
        // Empty arrays carry nothing to read
        let kind = if shape != SampleShape::Scalar && elements.is_empty() {
            ChannelKind::Other
        } else {
            kind
        };
        if kind == ChannelKind::Other {
            log::trace!("MF4 channel {:?} is not a decodable value channel", name);
        }

        infos.push(ChannelInfo {
            name,
            index,
            shape,
            kind,
        });
        layouts.push(ChannelLayout {
            block,
            shape,
            elements,
        });
    }

    Ok((infos, layouts))
}

/// Prefer a time master; fall back to any master channel
fn pick_master(layouts: &[ChannelLayout]) -> Option<usize> {
    layouts
        .iter()
        .position(|l| l.is_master() && l.block.sync_type == SYNC_TIME)
        .or_else(|| layouts.iter().position(ChannelLayout::is_master))
}
