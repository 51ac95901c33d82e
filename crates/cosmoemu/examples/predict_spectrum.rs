//! Predict a linear matter power spectrum.
//!
//! Loads a bundle and its wavenumber grid, then evaluates a small batch of
//! cosmologies and prints `k` against `P(k)`.
//!
//!    cargo run -p cosmoemu --example predict_spectrum -- PKLIN_NN.safetensors k_modes.txt

use anyhow::{Context, Result};
use cosmoemu::prelude::*;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let model = args
        .next()
        .context("usage: predict_spectrum <bundle.safetensors> [modes.txt]")?;

    let mut builder = Emulator::builder().model_path(model).exponentiate(true);
    if let Some(modes) = args.next() {
        builder = builder.modes_path(modes);
    }
    let emulator = builder.build()?;

    println!("Emulator initialized");
    if let Some(names) = emulator.parameter_names() {
        println!("Parameters: {}", names.join(", "));
    }

    // Planck-like cosmology and a variation in h
    let params = ParameterBatch::new()
        .with("omega_b", vec![0.02237, 0.02237])
        .with("omega_cdm", vec![0.1200, 0.1200])
        .with("h", vec![0.6736, 0.7300])
        .with("n_s", vec![0.9649, 0.9649])
        .with("ln10^{10}A_s", vec![3.044, 3.044])
        .with("z", vec![0.0, 0.0]);

    let spectra = emulator.predict_spectrum(&params)?;
    let modes = emulator.modes();

    for (i, pk) in spectra.iter().enumerate() {
        println!("\nCosmology {}:", i);
        let stride = (pk.len() / 10).max(1);
        for j in (0..pk.len()).step_by(stride) {
            match modes {
                Some(ref k) => println!("  k = {:.4e}  P(k) = {:.6e}", k[j], pk[j]),
                None => println!("  mode {:>4}  P = {:.6e}", j, pk[j]),
            }
        }
    }

    Ok(())
}
