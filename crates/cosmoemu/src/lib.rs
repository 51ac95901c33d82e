//! # cosmoemu
//!
//! Neural emulation of the linear matter power spectrum.
//!
//! cosmoemu evaluates a pretrained feed-forward network that maps a handful
//! of cosmological parameters to a power spectrum on a fixed wavenumber grid:
//! - **Explicit artifacts**: bundles are loaded from a path you choose, never from package resources
//! - **Named inputs**: parameters are matched by name, in any order
//! - **Pure evaluation**: no state between calls, safe to share across threads
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cosmoemu::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let emulator = Emulator::builder()
//!         .model_path("PKLIN_NN.safetensors")
//!         .modes_path("k_modes.txt")
//!         .exponentiate(true)
//!         .build()?;
//!
//!     let params = ParameterBatch::new()
//!         .with("omega_b", vec![0.0223])
//!         .with("omega_cdm", vec![0.120])
//!         .with("h", vec![0.674])
//!         .with("n_s", vec![0.965])
//!         .with("ln10^{10}A_s", vec![3.044]);
//!
//!     let pk = emulator.predict_spectrum(&params)?;
//!     println!("{} modes", pk[0].len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Re-export core crate
pub use cosmoemu_core::*;

mod emulator;

pub use emulator::{Emulator, EmulatorBuilder, EmulatorConfig};

/// Commonly used types.
pub mod prelude {
    pub use crate::emulator::{Emulator, EmulatorBuilder, EmulatorConfig};
    pub use crate::{
        batch::{ParameterBatch, Predictions},
        bundle::{BundleLoader, ModelBundle},
        error::{EmulatorError, Result},
        golden::{GoldenCase, GoldenTestHarness, GoldenTestable},
        network::Evaluator,
    };

    // Re-export useful external types
    pub use anyhow;
    pub use tracing;
}
