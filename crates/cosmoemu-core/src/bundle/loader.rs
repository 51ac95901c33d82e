//! SafeTensors bundle loading and packaging.
//!
//! A bundle artifact is a single `.safetensors` file. Tensors carry the
//! numeric arrays, the string metadata header carries the schema version and
//! architecture bookkeeping.
//!
//! | tensor | shape |
//! |---|---|
//! | `weights.{i}` | `[in, out]` |
//! | `biases.{i}` | `[out]` |
//! | `alphas.{i}`, `betas.{i}` | `[out]`, hidden layers only |
//! | `parameters_mean`, `parameters_std` | `[n_parameters]` |
//! | `features_mean`, `features_std` | `[n_modes]` |
//! | `modes` (optional) | `[n_modes]`, linear space |
//!
//! Metadata keys: `format`, `format_version`, `n_parameters`, `n_modes`,
//! `n_layers`, `n_hidden` (JSON), `architecture` (JSON), `parameter_names`
//! (JSON array or `null`).
//!
//! # Example
//!
//! ```ignore
//! use cosmoemu_core::bundle::BundleLoader;
//!
//! let bundle = BundleLoader::new("PKLIN_NN.safetensors")
//!     .with_modes_file("k_modes.txt")
//!     .load()?;
//! ```

use super::grid::{log10_grid, read_modes_grid};
use super::{Architecture, BundleParts, ModelBundle};
use crate::error::{EmulatorError, Result};
use candle_core::{DType, Device, Tensor};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Value of the `format` metadata key.
pub const FORMAT_NAME: &str = "cosmoemu.bundle";

/// Supported value of the `format_version` metadata key.
pub const FORMAT_VERSION: u32 = 1;

/// Loads a [`ModelBundle`] from an explicit artifact location.
#[derive(Debug, Clone)]
pub struct BundleLoader {
    /// Path to the `.safetensors` artifact.
    artifact: PathBuf,
    /// Optional plain-text wavenumber grid.
    modes_file: Option<PathBuf>,
    /// Device for loaded tensors.
    device: Device,
}

impl BundleLoader {
    /// Create a loader for an artifact path.
    pub fn new(artifact: impl Into<PathBuf>) -> Self {
        Self {
            artifact: artifact.into(),
            modes_file: None,
            device: Device::Cpu,
        }
    }

    /// Read the output grid from a text file.
    ///
    /// Takes precedence over a `modes` tensor embedded in the artifact.
    pub fn with_modes_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.modes_file = Some(path.into());
        self
    }

    /// Place tensors on `device`.
    pub fn with_device(mut self, device: &Device) -> Self {
        self.device = device.clone();
        self
    }

    /// Artifact path.
    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// Read, decode and validate the bundle.
    pub fn load(&self) -> Result<ModelBundle> {
        let data = fs::read(&self.artifact).map_err(|e| {
            EmulatorError::load(format!("cannot read {}: {}", self.artifact.display(), e))
        })?;

        let modes = match self.modes_file {
            Some(ref path) => Some(read_modes_grid(path)?),
            None => None,
        };

        let bundle = decode(&data, modes, &self.device)?;
        info!(
            artifact = %self.artifact.display(),
            n_parameters = bundle.n_parameters(),
            n_modes = bundle.n_modes(),
            n_layers = bundle.n_layers(),
            named_inputs = bundle.parameter_names().is_some(),
            "model bundle loaded"
        );
        Ok(bundle)
    }

    /// Decode a bundle from an in-memory artifact.
    pub fn from_bytes(data: &[u8], device: &Device) -> Result<ModelBundle> {
        decode(data, None, device)
    }

    /// Decode a bundle from an in-memory artifact and a linear-space grid.
    pub fn from_bytes_with_modes(data: &[u8], modes: &[f64], device: &Device) -> Result<ModelBundle> {
        decode(data, Some(modes.to_vec()), device)
    }
}

fn decode(data: &[u8], modes: Option<Vec<f64>>, device: &Device) -> Result<ModelBundle> {
    let (_, header) = SafeTensors::read_metadata(data)
        .map_err(|e| EmulatorError::load(format!("invalid safetensors header: {}", e)))?;
    let metadata = header.metadata().clone().unwrap_or_default();
    let tensors = SafeTensors::deserialize(data)
        .map_err(|e| EmulatorError::load(format!("invalid safetensors data: {}", e)))?;

    check_format(&metadata)?;

    let expected = Architecture {
        n_parameters: parse_meta(&metadata, "n_parameters")?,
        n_modes: parse_meta(&metadata, "n_modes")?,
        n_hidden: parse_meta_json(&metadata, "n_hidden")?,
        n_layers: parse_meta(&metadata, "n_layers")?,
    };
    let widths: Vec<usize> = parse_meta_json(&metadata, "architecture")?;
    if widths != expected.widths() || expected.n_layers != expected.n_hidden.len() + 1 {
        return Err(EmulatorError::load(format!(
            "architecture {:?} disagrees with n_parameters={}, n_hidden={:?}, n_modes={}, n_layers={}",
            widths, expected.n_parameters, expected.n_hidden, expected.n_modes, expected.n_layers
        )));
    }

    let parameter_names: Option<Vec<String>> = match metadata.get("parameter_names") {
        Some(raw) => serde_json::from_str(raw).map_err(|e| {
            EmulatorError::load(format!("metadata 'parameter_names': {}", e))
        })?,
        None => None,
    };

    let n_layers = expected.n_layers;
    let mut parts = BundleParts {
        parameters_mean: read_vector(&tensors, "parameters_mean", device)?,
        parameters_std: read_vector(&tensors, "parameters_std", device)?,
        features_mean: read_vector(&tensors, "features_mean", device)?,
        features_std: read_vector(&tensors, "features_std", device)?,
        parameter_names,
        ..Default::default()
    };
    for i in 0..n_layers {
        parts.weights.push(read_matrix(&tensors, &format!("weights.{}", i), device)?);
        parts.biases.push(read_vector(&tensors, &format!("biases.{}", i), device)?);
        if i + 1 < n_layers {
            parts.alphas.push(read_vector(&tensors, &format!("alphas.{}", i), device)?);
            parts.betas.push(read_vector(&tensors, &format!("betas.{}", i), device)?);
        }
    }

    let raw_modes = match modes {
        Some(grid) => Some(grid),
        None if has_tensor(&tensors, "modes") => Some(read_vector(&tensors, "modes", device)?),
        None => None,
    };
    parts.log10_modes = raw_modes.as_deref().map(log10_grid).transpose()?;

    let bundle = ModelBundle::from_parts(parts, device)?;
    if *bundle.architecture() != expected {
        return Err(EmulatorError::load(format!(
            "tensors describe {:?} but metadata declares {:?}",
            bundle.architecture(),
            expected
        )));
    }

    Ok(bundle)
}

fn check_format(metadata: &HashMap<String, String>) -> Result<()> {
    let format = metadata
        .get("format")
        .ok_or_else(|| EmulatorError::load("metadata 'format' missing"))?;
    if format != FORMAT_NAME {
        return Err(EmulatorError::load(format!(
            "unsupported artifact format '{}'",
            format
        )));
    }

    let version: u32 = parse_meta(metadata, "format_version")?;
    if version != FORMAT_VERSION {
        return Err(EmulatorError::load(format!(
            "unsupported format version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }

    Ok(())
}

fn meta_value<'a>(metadata: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    metadata
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| EmulatorError::load(format!("metadata '{}' missing", key)))
}

fn parse_meta<T: FromStr>(metadata: &HashMap<String, String>, key: &str) -> Result<T> {
    let raw = meta_value(metadata, key)?;
    raw.trim()
        .parse()
        .map_err(|_| EmulatorError::load(format!("metadata '{}' = '{}' is invalid", key, raw)))
}

fn parse_meta_json<T: serde::de::DeserializeOwned>(
    metadata: &HashMap<String, String>,
    key: &str,
) -> Result<T> {
    let raw = meta_value(metadata, key)?;
    serde_json::from_str(raw)
        .map_err(|e| EmulatorError::load(format!("metadata '{}': {}", key, e)))
}

fn has_tensor(tensors: &SafeTensors<'_>, name: &str) -> bool {
    tensors.names().iter().any(|n| n.as_str() == name)
}

/// Load a named tensor as F64 on `device`.
fn load_tensor(tensors: &SafeTensors<'_>, name: &str, device: &Device) -> Result<Tensor> {
    let view = tensors
        .tensor(name)
        .map_err(|_| EmulatorError::load(format!("tensor '{}' not found", name)))?;

    let dtype = match view.dtype() {
        Dtype::F64 => DType::F64,
        Dtype::F32 => DType::F32,
        Dtype::F16 => DType::F16,
        Dtype::BF16 => DType::BF16,
        other => {
            return Err(EmulatorError::load(format!(
                "tensor '{}' has unsupported dtype {:?}",
                name, other
            )));
        }
    };

    debug!(tensor = name, shape = ?view.shape(), dtype = ?view.dtype(), "loading tensor");

    let tensor = Tensor::from_raw_buffer(view.data(), dtype, view.shape(), device)?;
    Ok(tensor.to_dtype(DType::F64)?)
}

fn read_vector(tensors: &SafeTensors<'_>, name: &str, device: &Device) -> Result<Vec<f64>> {
    let tensor = load_tensor(tensors, name, device)?;
    if tensor.rank() != 1 {
        return Err(EmulatorError::load(format!(
            "tensor '{}' should be a vector, got shape {:?}",
            name,
            tensor.dims()
        )));
    }
    Ok(tensor.to_vec1()?)
}

fn read_matrix(tensors: &SafeTensors<'_>, name: &str, device: &Device) -> Result<Vec<Vec<f64>>> {
    let tensor = load_tensor(tensors, name, device)?;
    if tensor.rank() != 2 {
        return Err(EmulatorError::load(format!(
            "tensor '{}' should be a matrix, got shape {:?}",
            name,
            tensor.dims()
        )));
    }
    Ok(tensor.to_vec2()?)
}

/// A tensor staged for serialization.
struct Staged {
    name: String,
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

impl Staged {
    fn vector(name: impl Into<String>, values: &[f64]) -> Self {
        Self {
            name: name.into(),
            shape: vec![values.len()],
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    fn matrix(name: impl Into<String>, rows: &[Vec<f64>]) -> Self {
        let cols = rows.first().map_or(0, |r| r.len());
        Self {
            name: name.into(),
            shape: vec![rows.len(), cols],
            bytes: rows.iter().flatten().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }
}

impl ModelBundle {
    /// Serialize the bundle in the artifact format read by [`BundleLoader`].
    pub fn to_safetensors(&self) -> Result<Vec<u8>> {
        let parts = self.to_parts()?;
        let arch = self.architecture();

        let mut staged = vec![
            Staged::vector("parameters_mean", &parts.parameters_mean),
            Staged::vector("parameters_std", &parts.parameters_std),
            Staged::vector("features_mean", &parts.features_mean),
            Staged::vector("features_std", &parts.features_std),
        ];
        for (i, (w, b)) in parts.weights.iter().zip(parts.biases.iter()).enumerate() {
            staged.push(Staged::matrix(format!("weights.{}", i), w));
            staged.push(Staged::vector(format!("biases.{}", i), b));
        }
        for (i, (a, b)) in parts.alphas.iter().zip(parts.betas.iter()).enumerate() {
            staged.push(Staged::vector(format!("alphas.{}", i), a));
            staged.push(Staged::vector(format!("betas.{}", i), b));
        }
        if let Some(ref log_modes) = parts.log10_modes {
            let modes: Vec<f64> = log_modes.iter().map(|l| 10f64.powf(*l)).collect();
            staged.push(Staged::vector("modes", &modes));
        }

        let mut metadata = HashMap::new();
        metadata.insert("format".to_string(), FORMAT_NAME.to_string());
        metadata.insert("format_version".to_string(), FORMAT_VERSION.to_string());
        metadata.insert("n_parameters".to_string(), arch.n_parameters.to_string());
        metadata.insert("n_modes".to_string(), arch.n_modes.to_string());
        metadata.insert("n_layers".to_string(), arch.n_layers.to_string());
        metadata.insert("n_hidden".to_string(), serde_json::to_string(&arch.n_hidden)?);
        metadata.insert("architecture".to_string(), serde_json::to_string(&arch.widths())?);
        metadata.insert(
            "parameter_names".to_string(),
            serde_json::to_string(&parts.parameter_names)?,
        );

        let mut views = Vec::with_capacity(staged.len());
        for s in &staged {
            let view = TensorView::new(Dtype::F64, s.shape.clone(), &s.bytes).map_err(|e| {
                EmulatorError::load(format!("cannot stage tensor '{}': {}", s.name, e))
            })?;
            views.push((s.name.as_str(), view));
        }

        safetensors::serialize(views.iter().map(|(n, v)| (*n, v)), &Some(metadata))
            .map_err(|e| EmulatorError::load(format!("cannot serialize bundle: {}", e)))
    }

    /// Write the bundle to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_safetensors()?)?;
        debug!(path = %path.display(), "model bundle saved");
        Ok(())
    }
}
