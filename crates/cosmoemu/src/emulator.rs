//! High-level power spectrum emulator.

use anyhow::{bail, Context, Result};
use candle_core::Device;
use cosmoemu_core::{
    batch::ParameterBatch,
    bundle::{BundleLoader, ModelBundle},
    network::Evaluator,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Configuration for the emulator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmulatorConfig {
    /// Path to the `.safetensors` model bundle.
    pub model_path: PathBuf,
    /// Path to the plain-text wavenumber grid.
    #[serde(default)]
    pub modes_path: Option<PathBuf>,
    /// Whether the network was trained on log10 of the spectrum.
    #[serde(default)]
    pub exponentiate: bool,
}

impl EmulatorConfig {
    /// Load from JSON file.
    ///
    /// Relative paths inside the file are resolved against its directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading emulator config {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("parsing emulator config {}", path.display()))?;

        if let Some(base) = path.parent() {
            if config.model_path.is_relative() {
                config.model_path = base.join(&config.model_path);
            }
            if let Some(ref modes) = config.modes_path {
                if modes.is_relative() {
                    config.modes_path = Some(base.join(modes));
                }
            }
        }

        Ok(config)
    }
}

/// Builder for creating an Emulator.
pub struct EmulatorBuilder {
    config: EmulatorConfig,
    device: Device,
    bundle: Option<Arc<ModelBundle>>,
}

impl EmulatorBuilder {
    /// Create a new emulator builder.
    pub fn new() -> Self {
        Self {
            config: EmulatorConfig::default(),
            device: Device::Cpu,
            bundle: None,
        }
    }

    /// Set model path.
    pub fn model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.model_path = path.into();
        self
    }

    /// Set wavenumber grid path.
    pub fn modes_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.modes_path = Some(path.into());
        self
    }

    /// Set whether spectra are exponentiated.
    pub fn exponentiate(mut self, exponentiate: bool) -> Self {
        self.config.exponentiate = exponentiate;
        self
    }

    /// Set the device for loaded tensors.
    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: EmulatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an already built bundle instead of loading one.
    pub fn bundle(mut self, bundle: Arc<ModelBundle>) -> Self {
        self.bundle = Some(bundle);
        self
    }

    /// Build the emulator.
    pub fn build(self) -> Result<Emulator> {
        let bundle = match self.bundle {
            Some(bundle) => bundle,
            None => {
                if self.config.model_path.as_os_str().is_empty() {
                    bail!("no model path configured");
                }

                let mut loader =
                    BundleLoader::new(&self.config.model_path).with_device(&self.device);
                if let Some(ref modes) = self.config.modes_path {
                    loader = loader.with_modes_file(modes);
                }
                let bundle = loader.load().with_context(|| {
                    format!("loading model bundle {}", self.config.model_path.display())
                })?;
                Arc::new(bundle)
            }
        };

        info!(
            n_parameters = bundle.n_parameters(),
            n_modes = bundle.n_modes(),
            exponentiate = self.config.exponentiate,
            "emulator initialized"
        );

        Ok(Emulator {
            config: self.config,
            evaluator: Evaluator::new(bundle),
        })
    }
}

impl Default for EmulatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Power spectrum emulator.
#[derive(Debug, Clone)]
pub struct Emulator {
    config: EmulatorConfig,
    evaluator: Evaluator,
}

impl Emulator {
    /// Create a new emulator builder.
    pub fn builder() -> EmulatorBuilder {
        EmulatorBuilder::new()
    }

    /// Build directly from a configuration.
    pub fn from_config(config: EmulatorConfig) -> Result<Self> {
        EmulatorBuilder::new().config(config).build()
    }

    /// Get emulator configuration.
    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Get the evaluator.
    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Get the model bundle.
    pub fn bundle(&self) -> &ModelBundle {
        self.evaluator.bundle()
    }

    /// Canonical input parameter names, if the bundle declares them.
    pub fn parameter_names(&self) -> Option<&[String]> {
        self.bundle().parameter_names()
    }

    /// Wavenumber grid in log10 space.
    pub fn log10_modes(&self) -> Option<&[f64]> {
        self.bundle().log10_modes()
    }

    /// Wavenumber grid in linear space.
    pub fn modes(&self) -> Option<Vec<f64>> {
        self.log10_modes()
            .map(|logs| logs.iter().map(|l| 10f64.powf(*l)).collect())
    }

    /// Raw network predictions, one row per input sample.
    pub fn predict(&self, parameters: &ParameterBatch) -> Result<Vec<Vec<f64>>> {
        Ok(self.evaluator.predict(parameters)?.into_vec2())
    }

    /// `10 ** predict(parameters)`.
    pub fn predict_exponentiated(&self, parameters: &ParameterBatch) -> Result<Vec<Vec<f64>>> {
        Ok(self.evaluator.predict_exponentiated(parameters)?.into_vec2())
    }

    /// Predictions in the scale chosen by [`EmulatorConfig::exponentiate`].
    pub fn predict_spectrum(&self, parameters: &ParameterBatch) -> Result<Vec<Vec<f64>>> {
        if self.config.exponentiate {
            self.predict_exponentiated(parameters)
        } else {
            self.predict(parameters)
        }
    }
}
