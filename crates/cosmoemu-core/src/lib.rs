//! # cosmoemu Core
//!
//! Forward evaluation of neural emulators for cosmological power spectra.
//!
//! This crate provides:
//! - **Model bundles**: validated, immutable trained parameters loaded from SafeTensors
//! - **Forward evaluator**: standardize, affine layers with a parametric activation, de-standardize
//! - **Named input batches** ordered by the bundle's declared parameter names
//! - **Golden harness** for validating predictions against reference spectra

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod batch;
pub mod bundle;
pub mod error;
pub mod golden;
pub mod network;

pub use error::{EmulatorError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::batch::{ParameterBatch, Predictions};
    pub use crate::bundle::{Architecture, BundleLoader, BundleParts, ModelBundle};
    pub use crate::error::{EmulatorError, Result};
    pub use crate::golden::{GoldenCase, GoldenTestHarness, GoldenTestable};
    pub use crate::network::Evaluator;
}
