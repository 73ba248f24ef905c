//! Column expansion
//!
//! Splits vector and matrix samples into scalar columns.
//!
//! - scalar `X`          → `X`
//! - vector `V` of width W → `V.0` … `V.{W-1}`
//! - matrix `M` of shape (R, C) → `M.j.i` with `j` over the C columns as the
//!   outer loop and `i` over the R rows as the inner loop; the cell for
//!   `M.j.i` is element (i, j).

use crate::types::{Column, Frame, Sample, SampleShape};

/// Output column names for a channel of the given shape
pub fn column_names(name: &str, shape: SampleShape) -> Vec<String> {
    match shape {
        SampleShape::Scalar => vec![name.to_string()],
        SampleShape::Vector(width) => (0..width).map(|i| format!("{}.{}", name, i)).collect(),
        SampleShape::Matrix(rows, cols) => (0..cols)
            .flat_map(|j| (0..rows).map(move |i| format!("{}.{}.{}", name, j, i)))
            .collect(),
    }
}

/// Values of a sample in output column order
pub fn flatten(sample: &Sample) -> Vec<f64> {
    match sample {
        Sample::Scalar(value) => vec![*value],
        Sample::Vector(values) => values.clone(),
        Sample::Matrix { rows, cols, values } => (0..*cols)
            .flat_map(|j| {
                (0..*rows).map(move |i| values.get(i * cols + j).copied().unwrap_or(f64::NAN))
            })
            .collect(),
    }
}

/// Expand one column of samples into scalar columns of the given shape
///
/// Cells whose sample has a different shape are left empty.
pub fn expand_column(column: Column<Sample>, shape: SampleShape) -> Vec<Column<f64>> {
    let names = column_names(&column.name, shape);
    let mut outputs: Vec<Vec<Option<f64>>> = names
        .iter()
        .map(|_| Vec::with_capacity(column.values.len()))
        .collect();
    let mut mismatched = 0usize;

    for cell in &column.values {
        let flat = match cell {
            Some(sample) if sample.shape() == shape => Some(flatten(sample)),
            Some(_) => {
                mismatched += 1;
                None
            }
            None => None,
        };
        for (k, output) in outputs.iter_mut().enumerate() {
            output.push(flat.as_ref().map(|values| values[k]));
        }
    }

    if mismatched > 0 {
        log::warn!(
            "{}: {} samples do not have shape {}, left empty",
            column.name,
            mismatched,
            shape
        );
    }

    names
        .into_iter()
        .zip(outputs)
        .map(|(name, values)| Column::new(name, values))
        .collect()
}

/// Shape of the first sample of a column
pub fn first_shape(column: &Column<Sample>) -> Option<SampleShape> {
    column.values.iter().flatten().next().map(Sample::shape)
}

/// Shape of the last cell of a column, if that cell holds a value
pub fn last_shape(column: &Column<Sample>) -> Option<SampleShape> {
    column.values.last().and_then(|cell| cell.as_ref()).map(Sample::shape)
}

/// Expand every column of a frame, choosing each column's shape with `pick`
///
/// Columns for which `pick` finds no shape have no valid samples and are
/// dropped.
pub fn expand_frame(
    frame: Frame<Sample>,
    pick: impl Fn(&Column<Sample>) -> Option<SampleShape>,
) -> Frame<f64> {
    let mut columns = Vec::new();
    for column in frame.columns {
        match pick(&column) {
            Some(shape) => columns.extend(expand_column(column, shape)),
            None => log::debug!("{}: no valid samples, column dropped", column.name),
        }
    }
    Frame::new(frame.index, columns)
}
