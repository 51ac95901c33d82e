//! Stateless forward evaluator.
//!
//! The evaluator maps a named [`ParameterBatch`] to [`Predictions`]:
//!
//! 1. order the named columns into a `[batch, n_parameters]` matrix
//! 2. standardize with the bundle's parameter statistics
//! 3. run every hidden layer (affine + parametric activation)
//! 4. run the linear output layer
//! 5. de-standardize with the bundle's feature statistics
//!
//! It holds nothing but a shared reference to the bundle, so it can be cloned
//! freely and called from many threads at once.

use crate::batch::{ParameterBatch, Predictions};
use crate::bundle::ModelBundle;
use crate::error::{EmulatorError, Result};
use candle_core::{DType, Tensor};
use std::f64::consts::LN_10;
use std::sync::Arc;
use tracing::{debug, trace};

/// Forward evaluator over a shared [`ModelBundle`].
#[derive(Debug, Clone)]
pub struct Evaluator {
    bundle: Arc<ModelBundle>,
}

impl Evaluator {
    /// Create an evaluator for a bundle.
    pub fn new(bundle: Arc<ModelBundle>) -> Self {
        Self { bundle }
    }

    /// The underlying bundle.
    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    /// Shared handle to the underlying bundle.
    pub fn shared_bundle(&self) -> Arc<ModelBundle> {
        Arc::clone(&self.bundle)
    }

    /// Stack the batch columns into a `[batch, n_parameters]` matrix.
    ///
    /// With declared parameter names the columns follow that order and extra
    /// columns are ignored. Without them the batch's insertion order is used
    /// and the column count must match the network input width.
    pub fn order_inputs(&self, batch: &ParameterBatch) -> Result<Tensor> {
        let n_parameters = self.bundle.n_parameters();

        let columns: Vec<(&str, &[f64])> = match self.bundle.parameter_names() {
            Some(names) => {
                let mut columns = Vec::with_capacity(names.len());
                for name in names {
                    let values = batch
                        .get(name)
                        .ok_or_else(|| EmulatorError::MissingParameter(name.clone()))?;
                    columns.push((name.as_str(), values));
                }
                if batch.len() > columns.len() {
                    let ignored: Vec<&str> = batch
                        .names()
                        .filter(|n| !names.iter().any(|d| d == n))
                        .collect();
                    debug!(?ignored, "ignoring undeclared input parameters");
                }
                columns
            }
            None => {
                if batch.len() != n_parameters {
                    return Err(EmulatorError::shape(format!(
                        "network takes {} parameters, batch has {}",
                        n_parameters,
                        batch.len()
                    )));
                }
                batch.iter().collect()
            }
        };

        let rows = columns.first().map_or(0, |(_, v)| v.len());
        if let Some((name, values)) = columns.iter().find(|(_, v)| v.len() != rows) {
            return Err(EmulatorError::shape(format!(
                "parameter '{}' has {} values, expected {}",
                name,
                values.len(),
                rows
            )));
        }

        let mut flat = Vec::with_capacity(rows * columns.len());
        for r in 0..rows {
            flat.extend(columns.iter().map(|(_, v)| v[r]));
        }

        Ok(Tensor::from_vec(
            flat,
            (rows, columns.len()),
            self.bundle.device(),
        )?)
    }

    /// Run the network on an ordered `[batch, n_parameters]` matrix.
    pub fn forward_pass(&self, x: &Tensor) -> Result<Tensor> {
        let (rows, cols) = x.dims2().map_err(|_| {
            EmulatorError::shape(format!("expected a [batch, parameters] matrix, got {:?}", x.dims()))
        })?;
        if cols != self.bundle.n_parameters() {
            return Err(EmulatorError::shape(format!(
                "network takes {} parameters, input has {} columns",
                self.bundle.n_parameters(),
                cols
            )));
        }

        let x = x.to_dtype(DType::F64)?.to_device(self.bundle.device())?;
        let mut z = self.bundle.input_standardizer().standardize(&x)?;

        for (i, layer) in self.bundle.layers().iter().enumerate() {
            z = layer.forward(&z)?;
            trace!(layer = i, rows, width = layer.out_dim(), "layer evaluated");
        }

        self.bundle.feature_standardizer().destandardize(&z)
    }

    /// Order then evaluate, returning the raw tensor.
    pub fn predict_tensor(&self, batch: &ParameterBatch) -> Result<Tensor> {
        let x = self.order_inputs(batch)?;
        self.forward_pass(&x)
    }

    /// `10 ** predict_tensor(batch)`.
    pub fn predict_exponentiated_tensor(&self, batch: &ParameterBatch) -> Result<Tensor> {
        let y = self.predict_tensor(batch)?;
        Ok(y.affine(LN_10, 0.0)?.exp()?)
    }

    /// Predict outputs for a named batch.
    pub fn predict(&self, batch: &ParameterBatch) -> Result<Predictions> {
        let x = self.order_inputs(batch)?;
        if x.dims()[0] == 0 {
            return Ok(Predictions::empty(self.bundle.n_modes()));
        }
        Predictions::from_tensor(&self.forward_pass(&x)?)
    }

    /// Predict `10 ** outputs` for a named batch.
    ///
    /// For networks trained on log10 of the target quantity.
    pub fn predict_exponentiated(&self, batch: &ParameterBatch) -> Result<Predictions> {
        let x = self.order_inputs(batch)?;
        if x.dims()[0] == 0 {
            return Ok(Predictions::empty(self.bundle.n_modes()));
        }
        let y = self.forward_pass(&x)?.affine(LN_10, 0.0)?.exp()?;
        Predictions::from_tensor(&y)
    }
}
