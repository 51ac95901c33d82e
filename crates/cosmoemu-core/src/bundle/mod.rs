//! Trained model bundle.
//!
//! A [`ModelBundle`] holds every trained parameter and the metadata needed for
//! evaluation. It is validated once at construction and never mutated, so a
//! single `Arc<ModelBundle>` can be shared by any number of evaluator threads.

mod grid;
mod loader;

pub use grid::{log10_grid, parse_modes_grid, read_modes_grid};
pub use loader::{BundleLoader, FORMAT_NAME, FORMAT_VERSION};

use crate::error::{EmulatorError, Result};
use crate::network::{DenseLayer, ParametricActivation, Standardizer};
use candle_core::Device;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Layer width bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    /// Number of input parameters.
    pub n_parameters: usize,
    /// Number of output modes.
    pub n_modes: usize,
    /// Hidden layer widths.
    pub n_hidden: Vec<usize>,
    /// Number of affine layers (hidden + output).
    pub n_layers: usize,
}

impl Architecture {
    /// Full width chain `[n_parameters, n_hidden..., n_modes]`.
    pub fn widths(&self) -> Vec<usize> {
        let mut widths = Vec::with_capacity(self.n_hidden.len() + 2);
        widths.push(self.n_parameters);
        widths.extend_from_slice(&self.n_hidden);
        widths.push(self.n_modes);
        widths
    }
}

/// Raw numeric arrays making up a bundle.
///
/// Matrices are row-major with shape `[layer_input_dim][layer_output_dim]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleParts {
    /// One weight matrix per layer.
    pub weights: Vec<Vec<Vec<f64>>>,
    /// One bias vector per layer.
    pub biases: Vec<Vec<f64>>,
    /// Activation `alpha` per hidden layer.
    pub alphas: Vec<Vec<f64>>,
    /// Activation `beta` per hidden layer.
    pub betas: Vec<Vec<f64>>,
    /// Input means.
    pub parameters_mean: Vec<f64>,
    /// Input standard deviations.
    pub parameters_std: Vec<f64>,
    /// Output means.
    pub features_mean: Vec<f64>,
    /// Output standard deviations.
    pub features_std: Vec<f64>,
    /// Canonical input column order.
    pub parameter_names: Option<Vec<String>>,
    /// Output coordinate grid, already in log10 space.
    pub log10_modes: Option<Vec<f64>>,
}

/// Immutable, validated network parameters.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    /// Hidden layers followed by the linear output layer.
    layers: Vec<DenseLayer>,
    /// Input statistics.
    inputs: Standardizer,
    /// Output statistics.
    features: Standardizer,
    parameter_names: Option<Vec<String>>,
    log10_modes: Option<Vec<f64>>,
    architecture: Architecture,
    device: Device,
}

impl ModelBundle {
    /// Validate raw parts and build the bundle on `device`.
    ///
    /// Any invariant violation is reported as [`EmulatorError::ModelLoad`].
    pub fn from_parts(parts: BundleParts, device: &Device) -> Result<Self> {
        Self::build(parts, device).map_err(|e| match e {
            EmulatorError::ModelLoad(_) => e,
            other => EmulatorError::load(other.to_string()),
        })
    }

    fn build(parts: BundleParts, device: &Device) -> Result<Self> {
        let n_layers = parts.weights.len();
        if n_layers == 0 {
            return Err(EmulatorError::load("bundle has no layers"));
        }
        if parts.biases.len() != n_layers {
            return Err(EmulatorError::load(format!(
                "{} weight matrices but {} bias vectors",
                n_layers,
                parts.biases.len()
            )));
        }
        if parts.alphas.len() + 1 != n_layers || parts.betas.len() + 1 != n_layers {
            return Err(EmulatorError::load(format!(
                "{} layers need {} alpha and beta vectors, got {} and {}",
                n_layers,
                n_layers - 1,
                parts.alphas.len(),
                parts.betas.len()
            )));
        }

        let inputs = Standardizer::from_slices(&parts.parameters_mean, &parts.parameters_std, device)
            .map_err(|e| EmulatorError::load(format!("parameter statistics: {}", e)))?;
        let features = Standardizer::from_slices(&parts.features_mean, &parts.features_std, device)
            .map_err(|e| EmulatorError::load(format!("feature statistics: {}", e)))?;

        let mut layers = Vec::with_capacity(n_layers);
        let mut expected_in = inputs.dim();

        for (i, (w, b)) in parts.weights.iter().zip(parts.biases.iter()).enumerate() {
            if w.len() != expected_in {
                return Err(EmulatorError::load(format!(
                    "weights.{}: expected {} rows, got {}",
                    i,
                    expected_in,
                    w.len()
                )));
            }

            let activation = match (parts.alphas.get(i), parts.betas.get(i)) {
                (Some(alpha), Some(beta)) => Some(
                    ParametricActivation::from_slices(alpha, beta, device)
                        .map_err(|e| EmulatorError::load(format!("layer {}: {}", i, e)))?,
                ),
                _ => None,
            };

            let layer = DenseLayer::from_rows(w, b, activation, device)
                .map_err(|e| EmulatorError::load(format!("layer {}: {}", i, e)))?;
            expected_in = layer.out_dim();
            layers.push(layer);
        }

        if expected_in != features.dim() {
            return Err(EmulatorError::load(format!(
                "output layer has {} units but feature statistics have {}",
                expected_in,
                features.dim()
            )));
        }

        if let Some(ref names) = parts.parameter_names {
            if names.len() != inputs.dim() {
                return Err(EmulatorError::load(format!(
                    "{} parameter names for {} inputs",
                    names.len(),
                    inputs.dim()
                )));
            }
            let mut seen = HashSet::with_capacity(names.len());
            if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
                return Err(EmulatorError::load(format!(
                    "parameter '{}' declared twice",
                    dup
                )));
            }
        }

        if let Some(ref modes) = parts.log10_modes {
            if modes.len() != features.dim() {
                return Err(EmulatorError::load(format!(
                    "modes grid has {} entries for {} output modes",
                    modes.len(),
                    features.dim()
                )));
            }
        }

        let architecture = Architecture {
            n_parameters: inputs.dim(),
            n_modes: features.dim(),
            n_hidden: layers[..n_layers - 1].iter().map(|l| l.out_dim()).collect(),
            n_layers,
        };

        Ok(Self {
            layers,
            inputs,
            features,
            parameter_names: parts.parameter_names,
            log10_modes: parts.log10_modes,
            architecture,
            device: device.clone(),
        })
    }

    /// Copy every parameter back out into raw arrays.
    pub fn to_parts(&self) -> Result<BundleParts> {
        let mut parts = BundleParts {
            parameters_mean: self.inputs.mean().to_vec1()?,
            parameters_std: self.inputs.std().to_vec1()?,
            features_mean: self.features.mean().to_vec1()?,
            features_std: self.features.std().to_vec1()?,
            parameter_names: self.parameter_names.clone(),
            log10_modes: self.log10_modes.clone(),
            ..Default::default()
        };

        for layer in &self.layers {
            parts.weights.push(layer.weights()?.to_vec2()?);
            let bias = layer
                .bias()
                .ok_or_else(|| EmulatorError::load("layer without bias"))?;
            parts.biases.push(bias.to_vec1()?);
            if let Some(act) = layer.activation() {
                parts.alphas.push(act.alpha().to_vec1()?);
                parts.betas.push(act.beta().to_vec1()?);
            }
        }

        Ok(parts)
    }

    /// All layers, hidden first, output last.
    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    /// Number of affine layers.
    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    /// Number of input parameters.
    pub fn n_parameters(&self) -> usize {
        self.architecture.n_parameters
    }

    /// Number of output modes.
    pub fn n_modes(&self) -> usize {
        self.architecture.n_modes
    }

    /// Canonical input column order, if declared.
    pub fn parameter_names(&self) -> Option<&[String]> {
        self.parameter_names.as_deref()
    }

    /// Output coordinate grid in log10 space, if loaded.
    pub fn log10_modes(&self) -> Option<&[f64]> {
        self.log10_modes.as_deref()
    }

    /// Input standardization.
    pub fn input_standardizer(&self) -> &Standardizer {
        &self.inputs
    }

    /// Output de-standardization.
    pub fn feature_standardizer(&self) -> &Standardizer {
        &self.features
    }

    /// Layer widths.
    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    /// Device holding the tensors.
    pub fn device(&self) -> &Device {
        &self.device
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two inputs, one hidden layer of three units, two outputs.
    pub(crate) fn small_parts() -> BundleParts {
        BundleParts {
            weights: vec![
                vec![vec![0.5, -1.0, 0.25], vec![1.5, 0.75, -0.5]],
                vec![vec![1.0, 0.0], vec![-0.5, 2.0], vec![0.25, 0.125]],
            ],
            biases: vec![vec![0.1, -0.2, 0.3], vec![0.05, -0.05]],
            alphas: vec![vec![1.0, 0.5, 2.0]],
            betas: vec![vec![0.2, 0.6, 0.9]],
            parameters_mean: vec![0.3, 1.0],
            parameters_std: vec![0.1, 2.0],
            features_mean: vec![-1.0, 4.0],
            features_std: vec![0.5, 3.0],
            parameter_names: Some(vec!["omega_m".to_string(), "sigma_8".to_string()]),
            log10_modes: Some(vec![-2.0, 0.0]),
        }
    }

    #[test]
    fn bundle_architecture() {
        let bundle = ModelBundle::from_parts(small_parts(), &Device::Cpu).unwrap();
        let arch = bundle.architecture();

        assert_eq!(arch.n_parameters, 2);
        assert_eq!(arch.n_modes, 2);
        assert_eq!(arch.n_hidden, vec![3]);
        assert_eq!(arch.n_layers, 2);
        assert_eq!(arch.widths(), vec![2, 3, 2]);
        assert!(bundle.layers()[0].is_hidden());
        assert!(!bundle.layers()[1].is_hidden());
    }

    #[test]
    fn bundle_parts_round_trip() {
        let parts = small_parts();
        let bundle = ModelBundle::from_parts(parts.clone(), &Device::Cpu).unwrap();
        assert_eq!(bundle.to_parts().unwrap(), parts);
    }

    #[test]
    fn bundle_without_layers() {
        let result = ModelBundle::from_parts(BundleParts::default(), &Device::Cpu);
        assert!(matches!(result, Err(EmulatorError::ModelLoad(_))));
    }

    #[test]
    fn bundle_alpha_count_mismatch() {
        let mut parts = small_parts();
        parts.alphas.push(vec![1.0, 1.0]);
        let result = ModelBundle::from_parts(parts, &Device::Cpu);
        assert!(matches!(result, Err(EmulatorError::ModelLoad(_))));
    }

    #[test]
    fn bundle_bias_count_mismatch() {
        let mut parts = small_parts();
        parts.biases.pop();
        let result = ModelBundle::from_parts(parts, &Device::Cpu);
        assert!(matches!(result, Err(EmulatorError::ModelLoad(_))));
    }

    #[test]
    fn bundle_broken_layer_chain() {
        let mut parts = small_parts();
        // second layer now takes 2 inputs while the hidden layer emits 3
        parts.weights[1].pop();
        let result = ModelBundle::from_parts(parts, &Device::Cpu);
        assert!(matches!(result, Err(EmulatorError::ModelLoad(_))));
    }

    #[test]
    fn bundle_first_layer_rows_mismatch() {
        let mut parts = small_parts();
        parts.parameters_mean.push(0.0);
        parts.parameters_std.push(1.0);
        let result = ModelBundle::from_parts(parts, &Device::Cpu);
        assert!(matches!(result, Err(EmulatorError::ModelLoad(_))));
    }

    #[test]
    fn bundle_feature_stats_mismatch() {
        let mut parts = small_parts();
        parts.features_std.push(1.0);
        let result = ModelBundle::from_parts(parts, &Device::Cpu);
        assert!(matches!(result, Err(EmulatorError::ModelLoad(_))));
    }

    #[test]
    fn bundle_output_width_mismatch() {
        let mut parts = small_parts();
        parts.features_mean.push(0.0);
        parts.features_std.push(1.0);
        parts.log10_modes = None;
        let result = ModelBundle::from_parts(parts, &Device::Cpu);
        assert!(matches!(result, Err(EmulatorError::ModelLoad(_))));
    }

    #[test]
    fn bundle_zero_std_rejected() {
        let mut parts = small_parts();
        parts.parameters_std[1] = 0.0;
        let err = ModelBundle::from_parts(parts, &Device::Cpu).unwrap_err();
        assert!(err.to_string().contains("parameter statistics"));
    }

    #[test]
    fn bundle_wrong_alpha_width() {
        let mut parts = small_parts();
        parts.alphas[0].pop();
        parts.betas[0].pop();
        let result = ModelBundle::from_parts(parts, &Device::Cpu);
        assert!(matches!(result, Err(EmulatorError::ModelLoad(_))));
    }

    #[test]
    fn bundle_parameter_name_count() {
        let mut parts = small_parts();
        parts.parameter_names = Some(vec!["omega_m".to_string()]);
        let result = ModelBundle::from_parts(parts, &Device::Cpu);
        assert!(matches!(result, Err(EmulatorError::ModelLoad(_))));
    }

    #[test]
    fn bundle_duplicate_parameter_name() {
        let mut parts = small_parts();
        parts.parameter_names = Some(vec!["h".to_string(), "h".to_string()]);
        let err = ModelBundle::from_parts(parts, &Device::Cpu).unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn bundle_modes_length_mismatch() {
        let mut parts = small_parts();
        parts.log10_modes = Some(vec![0.0, 1.0, 2.0]);
        let result = ModelBundle::from_parts(parts, &Device::Cpu);
        assert!(matches!(result, Err(EmulatorError::ModelLoad(_))));
    }

    #[test]
    fn bundle_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ModelBundle>();
    }
}
