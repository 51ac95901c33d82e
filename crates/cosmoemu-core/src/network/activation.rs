//! Parametric gated activation.
//!
//! Each hidden unit learns where it sits between the identity map and a
//! sigmoid-gated nonlinearity.
//!
//! # Formula
//!
//! `f(x) = x * (beta + (1 - beta) / (1 + exp(-alpha * x)))`
//!
//! With `beta = 1` the unit is linear. With `beta = 0` it reduces to the
//! SiLU-like `x * sigmoid(alpha * x)`.
//!
//! # Reference
//!
//! [CosmoPower: emulating cosmological power spectra](https://arxiv.org/abs/2106.03846)

use crate::error::{EmulatorError, Result};
use candle_core::{DType, Device, Module, Tensor};

/// Per-unit parametric activation for one hidden layer.
#[derive(Debug, Clone)]
pub struct ParametricActivation {
    /// Gate sharpness, shape `[width]`.
    alpha: Tensor,
    /// Identity weight, shape `[width]`.
    beta: Tensor,
    /// Precomputed `1 - beta`.
    one_minus_beta: Tensor,
    /// Layer width.
    width: usize,
}

impl ParametricActivation {
    /// Create from `alpha` and `beta` vectors of equal length.
    pub fn new(alpha: Tensor, beta: Tensor) -> Result<Self> {
        let width = alpha.dims1()?;
        if beta.dims1()? != width {
            return Err(EmulatorError::shape(format!(
                "alpha has {} units but beta has {}",
                width,
                beta.dims1()?
            )));
        }
        let one_minus_beta = beta.affine(-1.0, 1.0)?;

        Ok(Self {
            alpha,
            beta,
            one_minus_beta,
            width,
        })
    }

    /// Create from raw values on a device.
    pub fn from_slices(alpha: &[f64], beta: &[f64], device: &Device) -> Result<Self> {
        let alpha = Tensor::from_slice(alpha, alpha.len(), device)?;
        let beta = Tensor::from_slice(beta, beta.len(), device)?;
        Self::new(alpha, beta)
    }

    /// Create a purely linear activation (`beta = 1`).
    pub fn identity(width: usize, device: &Device) -> Result<Self> {
        let alpha = Tensor::ones(width, DType::F64, device)?;
        let beta = Tensor::ones(width, DType::F64, device)?;
        Self::new(alpha, beta)
    }

    /// Layer width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// The `alpha` vector.
    pub fn alpha(&self) -> &Tensor {
        &self.alpha
    }

    /// The `beta` vector.
    pub fn beta(&self) -> &Tensor {
        &self.beta
    }
}

impl Module for ParametricActivation {
    /// Apply to `x` of shape `[batch, width]`.
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        // g = 1 + exp(-alpha * x)
        let g = x
            .broadcast_mul(&self.alpha)?
            .affine(-1.0, 0.0)?
            .exp()?
            .affine(1.0, 1.0)?;

        // beta + (1 - beta) / g
        let gate = self.one_minus_beta.broadcast_div(&g)?.broadcast_add(&self.beta)?;

        x * gate
    }
}
