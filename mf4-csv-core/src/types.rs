//! Core types for the MF4 to CSV converter
//!
//! This module defines the data model shared by the decoders and the
//! conversion pipeline: recording metadata, raw samples, tabular frames and
//! the error taxonomy.

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used throughout the converter (timezone-naive)
pub type Timestamp = NaiveDateTime;

/// Result type for conversion operations
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Errors that can occur while converting a recording
///
/// Every error is terminal for the file being converted and for that file only.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Failed to read recording: {0}")]
    Read(String),

    #[error("file name error: {file:?} matches {matches} profiles (expected exactly one)")]
    ProfileResolution { file: String, matches: usize },

    #[error("timestamp overflow in channel {channel:?}: {elapsed} s cannot be represented")]
    TimestampOverflow { channel: String, elapsed: f64 },

    #[error(
        "timestamp bug, interval is over {}s in channel {channel:?} (drift {}s)",
        .limit.num_seconds(),
        .drift.num_seconds()
    )]
    TimestampCorruption {
        channel: String,
        drift: TimeDelta,
        limit: TimeDelta,
    },

    #[error("no data")]
    EmptyResult,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ConvertError {
    /// Classify this error for structured failure reporting
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::Read(_) => ErrorKind::ReadError,
            ConvertError::ProfileResolution { .. } => ErrorKind::ProfileResolutionError,
            ConvertError::TimestampOverflow { .. } => ErrorKind::TimestampOverflowError,
            ConvertError::TimestampCorruption { .. } => ErrorKind::TimestampCorruptionError,
            ConvertError::EmptyResult => ErrorKind::EmptyResultError,
            ConvertError::Config(_) => ErrorKind::ConfigError,
            ConvertError::Io(_) | ConvertError::Csv(_) => ErrorKind::OutputError,
        }
    }
}

/// Error classification carried by failure events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ReadError,
    ProfileResolutionError,
    TimestampOverflowError,
    TimestampCorruptionError,
    EmptyResultError,
    ConfigError,
    OutputError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ReadError => "read-error",
            ErrorKind::ProfileResolutionError => "profile-resolution-error",
            ErrorKind::TimestampOverflowError => "timestamp-overflow",
            ErrorKind::TimestampCorruptionError => "timestamp-corruption",
            ErrorKind::EmptyResultError => "empty-result",
            ErrorKind::ConfigError => "config-error",
            ErrorKind::OutputError => "output-error",
        };
        write!(f, "{}", name)
    }
}

/// Shape of the samples carried by a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleShape {
    /// One number per sample
    Scalar,
    /// Fixed-width vector
    Vector(usize),
    /// Fixed-size matrix (rows, cols)
    Matrix(usize, usize),
}

impl fmt::Display for SampleShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleShape::Scalar => write!(f, "scalar"),
            SampleShape::Vector(w) => write!(f, "vector[{}]", w),
            SampleShape::Matrix(r, c) => write!(f, "matrix[{}x{}]", r, c),
        }
    }
}

/// One raw sample as delivered by a decoder
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Scalar(f64),
    Vector(Vec<f64>),
    /// Matrix values stored row-major: element (i, j) is `values[i * cols + j]`
    Matrix {
        rows: usize,
        cols: usize,
        values: Vec<f64>,
    },
}

impl Sample {
    /// Shape of this sample
    pub fn shape(&self) -> SampleShape {
        match self {
            Sample::Scalar(_) => SampleShape::Scalar,
            Sample::Vector(v) => SampleShape::Vector(v.len()),
            Sample::Matrix { rows, cols, .. } => SampleShape::Matrix(*rows, *cols),
        }
    }

    /// Apply `f` to every element, keeping the shape
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        match self {
            Sample::Scalar(v) => Sample::Scalar(f(v)),
            Sample::Vector(values) => Sample::Vector(values.into_iter().map(f).collect()),
            Sample::Matrix { rows, cols, values } => Sample::Matrix {
                rows,
                cols,
                values: values.into_iter().map(f).collect(),
            },
        }
    }
}

impl From<f64> for Sample {
    fn from(value: f64) -> Self {
        Sample::Scalar(value)
    }
}

impl From<Vec<f64>> for Sample {
    fn from(values: Vec<f64>) -> Self {
        Sample::Vector(values)
    }
}

/// Role of a channel inside its group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Timebase of the group
    Master,
    /// Physical measurement value
    Value,
    /// Anything that is not a decodable physical value (text, byte arrays, structures)
    Other,
}

/// Which value of a sample a read returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueMode {
    /// Conversion rule of the channel applied
    #[default]
    Physical,
    /// Stored value, conversion rule ignored
    Raw,
}

/// Channel descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub name: String,
    /// Position of the channel within its group
    pub index: usize,
    pub shape: SampleShape,
    pub kind: ChannelKind,
}

/// Channel group descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct GroupInfo {
    pub index: usize,
    /// Number of records (sample cycles) stored for this group
    pub cycles: u64,
    pub channels: Vec<ChannelInfo>,
}

impl GroupInfo {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Raw per-channel data: elapsed seconds since recording start and samples
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelData {
    pub name: String,
    pub elapsed: Vec<f64>,
    pub samples: Vec<Sample>,
}

/// Raw per-group table aligned on one elapsed-time axis
///
/// A cell is `None` when the channel has no sample at that point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupData {
    pub elapsed: Vec<f64>,
    pub columns: Vec<Column<Sample>>,
}

/// A named column of optional cells
#[derive(Debug, Clone, PartialEq)]
pub struct Column<T> {
    pub name: String,
    pub values: Vec<Option<T>>,
}

impl<T> Column<T> {
    pub fn new(name: impl Into<String>, values: Vec<Option<T>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// True if at least one cell holds a value
    pub fn has_values(&self) -> bool {
        self.values.iter().any(Option::is_some)
    }
}

/// A time-indexed set of columns; every column has one cell per index entry
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<T> {
    pub index: Vec<Timestamp>,
    pub columns: Vec<Column<T>>,
}

impl<T> Frame<T> {
    pub fn new(index: Vec<Timestamp>, columns: Vec<Column<T>>) -> Self {
        debug_assert!(columns.iter().all(|c| c.values.len() == index.len()));
        Self { index, columns }
    }

    /// An empty frame over the given index
    pub fn with_index(index: Vec<Timestamp>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&Column<T>> {
        self.columns.iter().find(|c| c.name == name)
    }
}
