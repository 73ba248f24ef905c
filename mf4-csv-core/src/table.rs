//! Table assembly and CSV output

use crate::resampler::forward_fill;
use crate::types::{Column, ConvertError, Frame, Result, Timestamp};
use chrono::Timelike;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Column-wise concatenation of frames on the union of their time indices
///
/// Cells at time points a frame does not cover are empty. Column order is
/// the frames' order, then each frame's own column order.
pub fn concat<T: Clone>(frames: Vec<Frame<T>>) -> Frame<T> {
    let mut index: Vec<Timestamp> = frames
        .iter()
        .flat_map(|frame| frame.index.iter().copied())
        .collect();
    index.sort_unstable();
    index.dedup();

    let mut columns = Vec::new();
    for frame in frames {
        let rows: Vec<usize> = frame
            .index
            .iter()
            .map(|t| index.binary_search(t).unwrap_or_else(|pos| pos))
            .collect();
        for column in frame.columns {
            let mut values: Vec<Option<T>> = vec![None; index.len()];
            for (&row, value) in rows.iter().zip(column.values) {
                if value.is_some() {
                    values[row] = value;
                }
            }
            columns.push(Column::new(column.name, values));
        }
    }

    Frame::new(index, columns)
}

/// The final time-aligned output table
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedTable {
    index_label: String,
    index: Vec<Timestamp>,
    columns: Vec<Column<f64>>,
}

impl AlignedTable {
    pub fn index_label(&self) -> &str {
        &self.index_label
    }

    pub fn index(&self) -> &[Timestamp] {
        &self.index
    }

    pub fn columns(&self) -> &[Column<f64>] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column<f64>> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Write the table as CSV: a header row, then one row per time point
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);

        let mut header = Vec::with_capacity(self.columns.len() + 1);
        header.push(self.index_label.as_str());
        header.extend(self.columns.iter().map(|c| c.name.as_str()));
        csv.write_record(&header)?;

        let time_format = time_format(&self.index);
        for (row, t) in self.index.iter().enumerate() {
            let mut record = Vec::with_capacity(self.columns.len() + 1);
            record.push(t.format(time_format).to_string());
            record.extend(
                self.columns
                    .iter()
                    .map(|c| c.values[row].map(format_value).unwrap_or_default()),
            );
            csv.write_record(&record)?;
        }

        csv.flush()?;
        Ok(())
    }

    /// Write the table to a CSV file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        self.write_csv(BufWriter::new(file))?;
        log::debug!("Wrote {} rows to {}", self.len(), path.display());
        Ok(())
    }
}

/// Timestamp format wide enough for the finest fraction in the index
fn time_format(index: &[Timestamp]) -> &'static str {
    let nanos = index.iter().map(|t| t.nanosecond() % 1_000_000_000);
    let mut fractional = false;
    for n in nanos {
        if n % 1_000 != 0 {
            return "%Y-%m-%d %H:%M:%S%.9f";
        }
        fractional |= n != 0;
    }
    if fractional {
        "%Y-%m-%d %H:%M:%S%.6f"
    } else {
        "%Y-%m-%d %H:%M:%S"
    }
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// Collects group frames and finalizes them into an [`AlignedTable`]
#[derive(Debug, Default)]
pub struct TableAssembler {
    frames: Vec<Frame<f64>>,
}

impl TableAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame<f64>) {
        self.frames.push(frame);
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Outer-join all frames, forward-fill, and label the index
    ///
    /// Fails with [`ConvertError::EmptyResult`] when no frame was pushed or
    /// no column carries a value.
    pub fn finish(self, index_label: &str) -> Result<AlignedTable> {
        if self.frames.is_empty() {
            return Err(ConvertError::EmptyResult);
        }

        let Frame { index, columns } = concat(self.frames);
        let mut columns: Vec<Column<f64>> = columns
            .into_iter()
            .filter(Column::has_values)
            .map(|mut column| {
                forward_fill(&mut column.values);
                column
            })
            .collect();
        if columns.is_empty() {
            return Err(ConvertError::EmptyResult);
        }
        dedupe_names(&mut columns);

        Ok(AlignedTable {
            index_label: index_label.to_string(),
            index,
            columns,
        })
    }
}

/// Suffix repeated column names with `_<n>`; the first occurrence keeps its name
fn dedupe_names(columns: &mut [Column<f64>]) {
    let mut seen: HashMap<String, usize> = columns.iter().map(|c| (c.name.clone(), 0)).collect();
    let mut renamed = Vec::new();

    for (i, column) in columns.iter().enumerate() {
        let Some(count) = seen.get_mut(&column.name) else {
            continue;
        };
        *count += 1;
        if *count > 1 {
            renamed.push(i);
        }
    }

    for i in renamed {
        let base = columns[i].name.clone();
        let mut n = 1;
        let name = loop {
            let candidate = format!("{}_{}", base, n);
            if !seen.contains_key(&candidate) {
                break candidate;
            }
            n += 1;
        };
        log::warn!("Duplicate column {:?} renamed to {:?}", base, name);
        seen.insert(name.clone(), 1);
        columns[i].name = name;
    }
}
