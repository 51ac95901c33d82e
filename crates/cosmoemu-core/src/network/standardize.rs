//! Mean/std standardization of network inputs and outputs.

use crate::error::{EmulatorError, Result};
use candle_core::{Device, Tensor};

/// Column-wise `(x - mean) / std` and its inverse.
#[derive(Debug, Clone)]
pub struct Standardizer {
    mean: Tensor,
    std: Tensor,
    dim: usize,
}

impl Standardizer {
    /// Create from raw statistics.
    ///
    /// Every std value must be finite and nonzero.
    pub fn from_slices(mean: &[f64], std: &[f64], device: &Device) -> Result<Self> {
        if mean.len() != std.len() {
            return Err(EmulatorError::shape(format!(
                "mean has {} entries but std has {}",
                mean.len(),
                std.len()
            )));
        }
        if let Some((idx, s)) = std
            .iter()
            .enumerate()
            .find(|(_, s)| !s.is_finite() || **s == 0.0)
        {
            return Err(EmulatorError::load(format!(
                "std[{}] = {} cannot be used for standardization",
                idx, s
            )));
        }

        Ok(Self {
            mean: Tensor::from_slice(mean, mean.len(), device)?,
            std: Tensor::from_slice(std, std.len(), device)?,
            dim: mean.len(),
        })
    }

    /// Number of columns.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The mean vector.
    pub fn mean(&self) -> &Tensor {
        &self.mean
    }

    /// The std vector.
    pub fn std(&self) -> &Tensor {
        &self.std
    }

    /// `(x - mean) / std` for `x` of shape `[batch, dim]`.
    pub fn standardize(&self, x: &Tensor) -> Result<Tensor> {
        Ok(x.broadcast_sub(&self.mean)?.broadcast_div(&self.std)?)
    }

    /// `x * std + mean` for `x` of shape `[batch, dim]`.
    pub fn destandardize(&self, x: &Tensor) -> Result<Tensor> {
        Ok(x.broadcast_mul(&self.std)?.broadcast_add(&self.mean)?)
    }
}
