//! Forward evaluation of the emulator network.
//!
//! Provides the building blocks of the network:
//! - Input/output standardization
//! - Dense layers with the parametric activation
//! - The stateless [`Evaluator`]

mod activation;
mod evaluator;
mod layer;
mod standardize;

pub use activation::ParametricActivation;
pub use evaluator::Evaluator;
pub use layer::DenseLayer;
pub use standardize::Standardizer;
