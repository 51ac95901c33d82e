//! Named input batches and dense prediction arrays.

use crate::error::{EmulatorError, Result};
use candle_core::Tensor;

/// A batch of input parameter values, one column per parameter name.
///
/// Columns keep their insertion order. When a bundle declares no canonical
/// parameter order, this order is the one the evaluator stacks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterBatch {
    columns: Vec<(String, Vec<f64>)>,
}

impl ParameterBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Insert a column. An existing column of the same name is replaced in place.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = values,
            None => self.columns.push((name, values)),
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.insert(name, values);
        self
    }

    /// Get a column by name.
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Check if a column exists.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Column names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Iterate over `(name, values)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if the batch has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Shared length of all columns.
    ///
    /// Returns 0 for a batch without columns and a shape error when columns
    /// disagree.
    pub fn batch_size(&self) -> Result<usize> {
        let mut iter = self.columns.iter();
        let Some((first_name, first)) = iter.next() else {
            return Ok(0);
        };
        for (name, values) in iter {
            if values.len() != first.len() {
                return Err(EmulatorError::shape(format!(
                    "parameter '{}' has {} values but '{}' has {}",
                    name,
                    values.len(),
                    first_name,
                    first.len()
                )));
            }
        }
        Ok(first.len())
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<f64>)> for ParameterBatch {
    fn from_iter<I: IntoIterator<Item = (K, Vec<f64>)>>(iter: I) -> Self {
        let mut batch = Self::new();
        for (name, values) in iter {
            batch.insert(name, values);
        }
        batch
    }
}

impl From<Vec<(String, Vec<f64>)>> for ParameterBatch {
    fn from(columns: Vec<(String, Vec<f64>)>) -> Self {
        columns.into_iter().collect()
    }
}

/// Dense row-major predictions of shape `[rows, cols]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    values: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl Predictions {
    /// Create from row-major values.
    pub fn new(values: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        if values.len() != rows * cols {
            return Err(EmulatorError::shape(format!(
                "{} values cannot fill a [{}, {}] array",
                values.len(),
                rows,
                cols
            )));
        }
        Ok(Self { values, rows, cols })
    }

    /// An empty `[0, cols]` array.
    pub fn empty(cols: usize) -> Self {
        Self {
            values: Vec::new(),
            rows: 0,
            cols,
        }
    }

    /// Copy a rank-2 tensor out of its device.
    pub fn from_tensor(tensor: &Tensor) -> Result<Self> {
        let (rows, cols) = tensor.dims2()?;
        let values = tensor.flatten_all()?.to_vec1::<f64>()?;
        Self::new(values, rows, cols)
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of rows (batch size).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (output modes).
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// A single row.
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.cols;
        Some(&self.values[start..start + self.cols])
    }

    /// A single element.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if col >= self.cols {
            return None;
        }
        self.row(row).map(|r| r[col])
    }

    /// Iterate over rows.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        let cols = self.cols;
        (0..self.rows).map(move |i| &self.values[i * cols..(i + 1) * cols])
    }

    /// Row-major values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Apply a function elementwise.
    pub fn map(mut self, f: impl Fn(f64) -> f64) -> Self {
        self.values.iter_mut().for_each(|v| *v = f(*v));
        self
    }

    /// Copy into nested rows.
    pub fn to_vec2(&self) -> Vec<Vec<f64>> {
        self.iter_rows().map(|r| r.to_vec()).collect()
    }

    /// Convert into nested rows.
    pub fn into_vec2(self) -> Vec<Vec<f64>> {
        self.to_vec2()
    }
}
