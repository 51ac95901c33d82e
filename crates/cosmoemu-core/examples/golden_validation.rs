//! Golden spectrum validation against reference predictions.
//!
//! Validates the forward evaluator against spectra computed by the
//! reference training pipeline for the same bundle.
//!
//! Run validation:
//!    cargo run -p cosmoemu-core --example golden_validation -- PKLIN_NN.safetensors golden_cases.json

use candle_core::Device;
use cosmoemu_core::bundle::BundleLoader;
use cosmoemu_core::golden::{GoldenCaseFile, GoldenTestable};
use cosmoemu_core::network::Evaluator;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: golden_validation <bundle.safetensors> <golden_cases.json> [modes.txt]");
        std::process::exit(1);
    }

    let bundle_path = Path::new(&args[1]);
    let golden_path = Path::new(&args[2]);

    println!("Golden Spectrum Validation");
    println!("==========================\n");

    println!("Loading golden cases from {}...", golden_path.display());
    let file = GoldenCaseFile::from_file(golden_path)?;
    for case in &file.cases {
        println!(
            "  - {}: {} parameters, {} expected rows{}",
            case.name,
            case.inputs.len(),
            case.expected.len(),
            if case.exponentiated { " (exponentiated)" } else { "" }
        );
    }
    let harness = file.into_harness();

    #[cfg(feature = "cuda")]
    let device = {
        println!("\nUsing CUDA");
        Device::new_cuda(0)?
    };

    #[cfg(not(feature = "cuda"))]
    let device = {
        println!("\nUsing CPU (for deterministic validation)");
        Device::Cpu
    };

    println!("Loading bundle...");
    let load_start = Instant::now();
    let mut loader = BundleLoader::new(bundle_path).with_device(&device);
    if let Some(modes) = args.get(3) {
        loader = loader.with_modes_file(modes);
    }
    let bundle = loader.load()?;
    let arch = bundle.architecture();
    println!(
        "  {} parameters -> {} modes, hidden {:?}",
        arch.n_parameters, arch.n_modes, arch.n_hidden
    );
    println!("Loaded in {:.2}s\n", load_start.elapsed().as_secs_f64());

    let evaluator = Evaluator::new(Arc::new(bundle));

    println!("Running golden validation...\n");
    let summary = evaluator.run_golden_tests(&harness);

    println!("{}", summary);

    if !summary.all_passed() {
        println!("\n--- Detailed Failure Analysis ---\n");

        for result in summary.results.values().filter(|r| !r.passed) {
            println!("Case: {}", result.name);

            if let Some(ref err) = result.error {
                println!("  Error: {}", err);
            }

            if let Some((row, col)) = result.first_divergence {
                println!("  First divergence at row {}, mode {}", row, col);
            }

            println!(
                "  Max abs error: {:.3e}, max rel error: {:.3e}",
                result.max_abs_error, result.max_rel_error
            );
            println!();
        }
    }

    if summary.all_passed() {
        println!("\nAll golden tests passed!");
        Ok(())
    } else {
        eprintln!("\n{} of {} tests failed", summary.failed, summary.total);
        std::process::exit(1);
    }
}
