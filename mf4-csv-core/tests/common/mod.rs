// Helpers shared by the integration tests: MDF 4.10 fixtures written with
// the mdf4-rs writer, and the recording start time.
#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use mdf4_rs::blocks::{ChannelBlock, DataType};
use mdf4_rs::{DecodedValue, MdfWriter};

/// Offset of the start time inside the HD block
const HD_START_TIME: u64 = 72;
/// Offset of the composition link inside a CN block
const CN_COMPOSITION: u64 = 32;

pub fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 12, 1)
        .unwrap()
        .and_hms_opt(0, 54, 56)
        .unwrap()
}

/// Route library logs through env_logger (`RUST_LOG=debug cargo test`)
pub fn init_logging() {
    env_logger::try_init().ok();
}

/// One f64 value channel; `dims` is empty for scalars
pub struct TestChannel {
    pub name: String,
    pub dims: Vec<usize>,
    /// One entry per record, elements in row-major order
    pub values: Vec<Vec<f64>>,
    /// Linear conversion rule `(offset, factor)`
    pub linear: Option<(f64, f64)>,
    /// Dimensions written to the CA block, when they differ from `dims`
    pub declared_dims: Option<Vec<u64>>,
}

impl TestChannel {
    pub fn scalar(name: &str, values: &[f64]) -> Self {
        Self::array(name, &[], values.iter().map(|&v| vec![v]).collect())
    }

    pub fn array(name: &str, dims: &[usize], values: Vec<Vec<f64>>) -> Self {
        Self {
            name: name.to_string(),
            dims: dims.to_vec(),
            values,
            linear: None,
            declared_dims: None,
        }
    }

    /// Stored values stay as given; the physical value is `offset + factor * stored`
    pub fn with_linear(mut self, offset: f64, factor: f64) -> Self {
        self.linear = Some((offset, factor));
        self
    }

    /// Write these dimensions into the CA block instead of the real ones
    pub fn with_declared_dims(mut self, dims: &[u64]) -> Self {
        self.declared_dims = Some(dims.to_vec());
        self
    }

    fn element_count(&self) -> usize {
        self.dims.iter().product()
    }

    fn ca_block(&self) -> Option<Vec<u8>> {
        let dims = match &self.declared_dims {
            Some(dims) => dims.clone(),
            None if self.dims.is_empty() => return None,
            None => self.dims.iter().map(|&d| d as u64).collect(),
        };

        let mut data = vec![0u8, 0u8]; // CN template, CN template storage
        data.extend_from_slice(&(dims.len() as u16).to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes()); // flags
        data.extend_from_slice(&8i32.to_le_bytes()); // byte offset base
        data.extend_from_slice(&0u32.to_le_bytes()); // invalidation bit base
        for d in dims {
            data.extend_from_slice(&d.to_le_bytes());
        }

        let mut block = b"##CA".to_vec();
        block.extend_from_slice(&[0; 4]);
        block.extend_from_slice(&((24 + 8 + data.len()) as u64).to_le_bytes());
        block.extend_from_slice(&1u64.to_le_bytes());
        block.extend_from_slice(&0u64.to_le_bytes()); // composition
        block.extend_from_slice(&data);
        Some(block)
    }
}

/// One sorted data group with a time master and f64 channels
pub struct TestGroup {
    pub times: Vec<f64>,
    pub channels: Vec<TestChannel>,
}

impl TestGroup {
    pub fn new(times: &[f64]) -> Self {
        Self {
            times: times.to_vec(),
            channels: Vec::new(),
        }
    }

    pub fn with_channel(mut self, channel: TestChannel) -> Self {
        self.channels.push(channel);
        self
    }
}

fn float64(name: &str, byte_offset: u32) -> impl FnOnce(&mut ChannelBlock) + '_ {
    move |ch| {
        ch.name = Some(name.to_string());
        ch.data_type = DataType::FloatLE;
        ch.bit_count = 64;
        ch.byte_offset = byte_offset;
    }
}

/// Serialize a sorted MDF 4.10 file
pub fn write_mdf4(start: NaiveDateTime, groups: &[TestGroup]) -> Vec<u8> {
    let mut writer = MdfWriter::in_memory();
    let (_, hd) = writer.init_mdf_file().unwrap();
    let start_ns = start.and_utc().timestamp_nanos_opt().unwrap() as u64;
    writer.update_link(hd + HD_START_TIME, start_ns).unwrap();

    let mut prev_dg: Option<String> = None;
    for group in groups {
        let dg = writer.add_data_group(prev_dg.as_deref()).unwrap();
        let cg = writer.add_channel_group_with_dg(&dg, None, |_| {}).unwrap();

        let mut prev_cn = writer.add_channel(&cg, None, float64("t", 0)).unwrap();
        writer.set_time_channel(&prev_cn).unwrap();

        let mut byte_offset = 8u32;
        for channel in &group.channels {
            let cn = writer
                .add_channel(&cg, Some(&prev_cn), float64(&channel.name, byte_offset))
                .unwrap();
            if let Some((offset, factor)) = channel.linear {
                writer.add_linear_conversion(&cn, offset, factor).unwrap();
            }
            if let Some(ca) = channel.ca_block() {
                let ca_pos = writer.write_block(&ca).unwrap();
                let cn_pos = writer.get_block_position(&cn).unwrap();
                writer.update_link(cn_pos + CN_COMPOSITION, ca_pos).unwrap();
            }
            byte_offset += (channel.element_count() * 8) as u32;
            prev_cn = cn;
        }

        // One f64 slot per stored number: the time, then every element
        let slots: Vec<ChannelBlock> = (0..byte_offset / 8)
            .map(|k| ChannelBlock {
                data_type: DataType::FloatLE,
                bit_count: 64,
                byte_offset: k * 8,
                ..ChannelBlock::default()
            })
            .collect();
        writer.start_data_block(&dg, &cg, 0, &slots).unwrap();
        for (row, t) in group.times.iter().enumerate() {
            let mut record = vec![DecodedValue::Float(*t)];
            for channel in &group.channels {
                record.extend(channel.values[row].iter().map(|&v| DecodedValue::Float(v)));
            }
            writer.write_record(&cg, &record).unwrap();
        }
        writer.finish_data_block(&cg).unwrap();
        prev_dg = Some(dg);
    }

    writer.finalize().unwrap();
    writer.into_inner().into_inner()
}
