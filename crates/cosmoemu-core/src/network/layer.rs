//! Dense network layer.
//!
//! An affine transform optionally followed by the parametric activation.
//! Hidden layers carry an activation; the output layer is purely linear.

use super::ParametricActivation;
use crate::error::{EmulatorError, Result};
use candle_core::{Device, Module, Tensor};
use candle_nn::Linear;

/// A single dense layer.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    /// Affine transform. Candle stores the weight as `[out, in]`.
    linear: Linear,
    /// Activation applied after the affine transform (hidden layers only).
    activation: Option<ParametricActivation>,
    /// Input width.
    in_dim: usize,
    /// Output width.
    out_dim: usize,
}

impl DenseLayer {
    /// Create a layer from a weight of shape `[in, out]` and a bias of shape `[out]`.
    pub fn new(
        weights: Tensor,
        bias: Tensor,
        activation: Option<ParametricActivation>,
    ) -> Result<Self> {
        let (in_dim, out_dim) = weights.dims2()?;

        if bias.dims1()? != out_dim {
            return Err(EmulatorError::shape(format!(
                "bias: expected {} entries, got {}",
                out_dim,
                bias.dims1()?
            )));
        }
        if let Some(ref act) = activation {
            if act.width() != out_dim {
                return Err(EmulatorError::shape(format!(
                    "activation: expected {} units, got {}",
                    out_dim,
                    act.width()
                )));
            }
        }

        let linear = Linear::new(weights.t()?.contiguous()?, Some(bias));

        Ok(Self {
            linear,
            activation,
            in_dim,
            out_dim,
        })
    }

    /// Create from row-major weight rows (`[in][out]`) and a bias.
    pub fn from_rows(
        weights: &[Vec<f64>],
        bias: &[f64],
        activation: Option<ParametricActivation>,
        device: &Device,
    ) -> Result<Self> {
        let weights = matrix_from_rows(weights, device)?;
        let bias = Tensor::from_slice(bias, bias.len(), device)?;
        Self::new(weights, bias, activation)
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor [batch, in_dim]
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (_, cols) = x.dims2()?;
        if cols != self.in_dim {
            return Err(EmulatorError::shape(format!(
                "layer expects {} input columns, got {}",
                self.in_dim, cols
            )));
        }

        let act = self.linear.forward(x)?;
        match self.activation {
            Some(ref activation) => Ok(activation.forward(&act)?),
            None => Ok(act),
        }
    }

    /// Input width.
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    /// Output width.
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    /// Weight in `[in, out]` layout.
    pub fn weights(&self) -> Result<Tensor> {
        Ok(self.linear.weight().t()?.contiguous()?)
    }

    /// Bias vector.
    pub fn bias(&self) -> Option<&Tensor> {
        self.linear.bias()
    }

    /// Activation, if this is a hidden layer.
    pub fn activation(&self) -> Option<&ParametricActivation> {
        self.activation.as_ref()
    }

    /// Whether the layer is activated.
    pub fn is_hidden(&self) -> bool {
        self.activation.is_some()
    }
}

/// Build a `[rows, cols]` tensor from rectangular row-major rows.
pub(crate) fn matrix_from_rows(rows: &[Vec<f64>], device: &Device) -> Result<Tensor> {
    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, |r| r.len());

    if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_cols) {
        return Err(EmulatorError::shape(format!(
            "row {} has {} columns, expected {}",
            idx,
            row.len(),
            n_cols
        )));
    }

    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Ok(Tensor::from_vec(flat, (n_rows, n_cols), device)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eye(n: usize) -> Vec<Vec<f64>> {
        (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect()
    }

    #[test]
    fn layer_dims() {
        let w = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let layer = DenseLayer::from_rows(&w, &[0.0, 0.0, 0.0], None, &Device::Cpu).unwrap();
        assert_eq!(layer.in_dim(), 2);
        assert_eq!(layer.out_dim(), 3);
        assert!(!layer.is_hidden());
    }

    #[test]
    fn layer_affine_forward() {
        // [1, 1] @ [[1, 2, 3], [4, 5, 6]] + [0.5, 0, -1] = [5.5, 7, 8]
        let w = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let layer = DenseLayer::from_rows(&w, &[0.5, 0.0, -1.0], None, &Device::Cpu).unwrap();

        let x = Tensor::new(&[[1.0f64, 1.0], [0.0, 0.0]], &Device::Cpu).unwrap();
        let out: Vec<Vec<f64>> = layer.forward(&x).unwrap().to_vec2().unwrap();

        assert_eq!(out, vec![vec![5.5, 7.0, 8.0], vec![0.5, 0.0, -1.0]]);
    }

    #[test]
    fn layer_weights_round_trip_layout() {
        let w = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let layer = DenseLayer::from_rows(&w, &[0.0; 3], None, &Device::Cpu).unwrap();
        let back: Vec<Vec<f64>> = layer.weights().unwrap().to_vec2().unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn layer_bias_mismatch() {
        let result = DenseLayer::from_rows(&eye(2), &[0.0; 3], None, &Device::Cpu);
        assert!(matches!(result, Err(EmulatorError::ShapeMismatch(_))));
    }

    #[test]
    fn layer_activation_mismatch() {
        let act = ParametricActivation::identity(3, &Device::Cpu).unwrap();
        let result = DenseLayer::from_rows(&eye(2), &[0.0; 2], Some(act), &Device::Cpu);
        assert!(matches!(result, Err(EmulatorError::ShapeMismatch(_))));
    }

    #[test]
    fn layer_ragged_rows() {
        let w = vec![vec![1.0, 2.0], vec![3.0]];
        let result = DenseLayer::from_rows(&w, &[0.0; 2], None, &Device::Cpu);
        assert!(matches!(result, Err(EmulatorError::ShapeMismatch(_))));
    }

    #[test]
    fn layer_input_width_mismatch() {
        let layer = DenseLayer::from_rows(&eye(3), &[0.0; 3], None, &Device::Cpu).unwrap();
        let x = Tensor::new(&[[1.0f64, 2.0]], &Device::Cpu).unwrap();
        assert!(matches!(layer.forward(&x), Err(EmulatorError::ShapeMismatch(_))));
    }

    #[test]
    fn hidden_layer_applies_activation() {
        let act = ParametricActivation::from_slices(&[1.0], &[0.0], &Device::Cpu).unwrap();
        let layer = DenseLayer::from_rows(&eye(1), &[0.0], Some(act), &Device::Cpu).unwrap();
        assert!(layer.is_hidden());

        let x = Tensor::new(&[[2.0f64]], &Device::Cpu).unwrap();
        let out: Vec<Vec<f64>> = layer.forward(&x).unwrap().to_vec2().unwrap();

        // 2 * sigmoid(2)
        let expected = 2.0 / (1.0 + (-2.0f64).exp());
        assert!((out[0][0] - expected).abs() < 1e-12);
    }
}
