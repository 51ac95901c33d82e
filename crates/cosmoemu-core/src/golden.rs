//! Golden prediction harness for model validation.
//!
//! Validates evaluator outputs against reference spectra produced by the
//! training pipeline. Golden tests catch drift in the forward pass across code
//! changes, platforms, and artifact conversions.
//!
//! # Architecture
//!
//! The harness consists of:
//! - [`GoldenCase`] - A single test case with inputs and expected outputs
//! - [`GoldenTestHarness`] - Collection of test cases with validation
//! - [`GoldenResult`] - Comparison result with error metrics
//! - [`GoldenCaseFile`] - JSON case list as written by the reference pipeline
//!
//! # Example
//!
//! ```rust,ignore
//! use cosmoemu_core::golden::{GoldenCase, GoldenTestHarness, GoldenTestable};
//!
//! let mut harness = GoldenTestHarness::new();
//! harness.add_case(
//!     GoldenCase::new("planck_best_fit", inputs, expected)
//!         .exponentiated()
//!         .with_tolerance(1e-6),
//! );
//!
//! let summary = evaluator.run_golden_tests(&harness);
//! assert!(summary.all_passed());
//! ```
//!
//! # Tolerance
//!
//! An element passes when `|actual - expected| <= tolerance * max(1, |expected|)`,
//! i.e. absolute near zero and relative for large values. Exponentiated
//! spectra span many decades, so the relative part matters there.

use crate::batch::{ParameterBatch, Predictions};
use crate::error::Result;
use crate::network::Evaluator;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

/// A single golden test case.
#[derive(Debug, Clone)]
pub struct GoldenCase {
    /// Test case name for identification.
    pub name: String,
    /// Input parameters.
    pub inputs: ParameterBatch,
    /// Expected output rows.
    pub expected: Vec<Vec<f64>>,
    /// Compare against `10 ** predictions` instead of raw predictions.
    pub exponentiated: bool,
    /// Allowed mixed absolute/relative tolerance.
    pub tolerance: f64,
    /// Optional description.
    pub description: Option<String>,
    /// Tags for filtering tests.
    pub tags: Vec<String>,
}

impl Default for GoldenCase {
    fn default() -> Self {
        Self {
            name: String::new(),
            inputs: ParameterBatch::new(),
            expected: Vec::new(),
            exponentiated: false,
            tolerance: 1e-9,
            description: None,
            tags: Vec::new(),
        }
    }
}

impl GoldenCase {
    /// Create a case comparing raw predictions.
    pub fn new(name: impl Into<String>, inputs: ParameterBatch, expected: Vec<Vec<f64>>) -> Self {
        Self {
            name: name.into(),
            inputs,
            expected,
            ..Default::default()
        }
    }

    /// Compare against exponentiated predictions.
    pub fn exponentiated(mut self) -> Self {
        self.exponentiated = true;
        self
    }

    /// Set tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Add a tag to the test case.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Result of a single golden test.
#[derive(Debug, Clone)]
pub struct GoldenResult {
    /// Test case name.
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Largest absolute deviation.
    pub max_abs_error: f64,
    /// Largest relative deviation.
    pub max_rel_error: f64,
    /// First `(row, col)` outside tolerance.
    pub first_divergence: Option<(usize, usize)>,
    /// Error message (if failed).
    pub error: Option<String>,
    /// Execution time in milliseconds.
    pub time_ms: f64,
}

impl GoldenResult {
    /// Compare predictions against expected rows.
    pub fn compare(
        name: String,
        expected: &[Vec<f64>],
        actual: &Predictions,
        tolerance: f64,
        time_ms: f64,
    ) -> Self {
        let expected_rows = expected.len();
        let expected_cols = expected.first().map_or(actual.cols(), |r| r.len());
        if actual.shape() != (expected_rows, expected_cols)
            || expected.iter().any(|r| r.len() != expected_cols)
        {
            let mut result = Self::error(
                name,
                format!(
                    "Shape mismatch: expected [{}, {}], got {:?}",
                    expected_rows,
                    expected_cols,
                    actual.shape()
                ),
            );
            result.time_ms = time_ms;
            return result;
        }

        let mut max_abs_error = 0.0f64;
        let mut max_rel_error = 0.0f64;
        let mut first_divergence = None;

        for (r, (exp_row, act_row)) in expected.iter().zip(actual.iter_rows()).enumerate() {
            for (c, (&e, &a)) in exp_row.iter().zip(act_row.iter()).enumerate() {
                let abs = (a - e).abs();
                let rel = if e != 0.0 { abs / e.abs() } else { abs };
                // NaN never passes
                let within = abs <= tolerance * e.abs().max(1.0);

                max_abs_error = max_abs_error.max(abs);
                max_rel_error = max_rel_error.max(rel);
                if !within && first_divergence.is_none() {
                    first_divergence = Some((r, c));
                }
            }
        }

        let error = first_divergence.map(|(r, c)| {
            format!(
                "Divergence at [{}, {}]: expected {}, got {}",
                r,
                c,
                expected[r][c],
                actual.get(r, c).unwrap_or(f64::NAN)
            )
        });

        Self {
            name,
            passed: first_divergence.is_none(),
            max_abs_error,
            max_rel_error,
            first_divergence,
            error,
            time_ms,
        }
    }

    /// Create an error result.
    pub fn error(name: String, error: String) -> Self {
        Self {
            name,
            passed: false,
            max_abs_error: f64::NAN,
            max_rel_error: f64::NAN,
            first_divergence: None,
            error: Some(error),
            time_ms: 0.0,
        }
    }
}

impl fmt::Display for GoldenResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed { "PASS" } else { "FAIL" };
        write!(f, "[{}] {} ({:.1}ms)", status, self.name, self.time_ms)?;

        if self.max_abs_error.is_finite() {
            write!(
                f,
                " max abs {:.3e}, max rel {:.3e}",
                self.max_abs_error, self.max_rel_error
            )?;
        }
        if !self.passed {
            if let Some(ref err) = self.error {
                write!(f, "\n  Error: {}", err)?;
            }
        }

        Ok(())
    }
}

/// Summary of golden test results.
#[derive(Debug, Clone, Default)]
pub struct GoldenSummary {
    /// Total number of tests.
    pub total: usize,
    /// Number of passed tests.
    pub passed: usize,
    /// Number of failed tests.
    pub failed: usize,
    /// Total execution time in milliseconds.
    pub total_time_ms: f64,
    /// Results by name.
    pub results: HashMap<String, GoldenResult>,
}

impl GoldenSummary {
    /// Create from results.
    pub fn from_results(results: Vec<GoldenResult>) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        let failed = total - passed;
        let total_time_ms = results.iter().map(|r| r.time_ms).sum();

        let results_map: HashMap<String, GoldenResult> = results
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();

        Self {
            total,
            passed,
            failed,
            total_time_ms,
            results: results_map,
        }
    }

    /// Check if all tests passed.
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Get failure rate.
    pub fn failure_rate(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        (self.failed as f32 / self.total as f32) * 100.0
    }
}

impl fmt::Display for GoldenSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Golden Test Summary")?;
        writeln!(f, "===================")?;
        writeln!(f, "Total:  {}", self.total)?;
        writeln!(f, "Passed: {} ({:.1}%)", self.passed,
            if self.total > 0 { (self.passed as f32 / self.total as f32) * 100.0 } else { 0.0 })?;
        writeln!(f, "Failed: {} ({:.1}%)", self.failed, self.failure_rate())?;
        writeln!(f, "Time:   {:.1}ms", self.total_time_ms)?;

        if self.failed > 0 {
            writeln!(f, "\nFailed tests:")?;
            for result in self.results.values() {
                if !result.passed {
                    writeln!(f, "  - {}", result)?;
                }
            }
        }

        Ok(())
    }
}

/// Golden test harness for model validation.
#[derive(Debug, Clone, Default)]
pub struct GoldenTestHarness {
    /// Test cases.
    cases: Vec<GoldenCase>,
    /// Strict mode - stop at the first failure.
    strict: bool,
}

impl GoldenTestHarness {
    /// Create a new test harness.
    pub fn new() -> Self {
        Self {
            cases: Vec::new(),
            strict: false,
        }
    }

    /// Enable strict mode.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Add a test case.
    pub fn add_case(&mut self, case: GoldenCase) {
        self.cases.push(case);
    }

    /// Add multiple test cases.
    pub fn add_cases(&mut self, cases: impl IntoIterator<Item = GoldenCase>) {
        self.cases.extend(cases);
    }

    /// Get all test cases.
    pub fn cases(&self) -> &[GoldenCase] {
        &self.cases
    }

    /// Filter cases by tag.
    pub fn filter_by_tag(&self, tag: &str) -> Vec<&GoldenCase> {
        self.cases
            .iter()
            .filter(|c| c.tags.iter().any(|t| t == tag))
            .collect()
    }

    /// Compare predictions for a single case.
    ///
    /// This is the core comparison logic, usable without a loaded model.
    pub fn compare(&self, case: &GoldenCase, actual: &Predictions) -> GoldenResult {
        GoldenResult::compare(
            case.name.clone(),
            &case.expected,
            actual,
            case.tolerance,
            0.0,
        )
    }

    /// Run all cases with a custom predictor.
    ///
    /// The predictor receives the case inputs and whether exponentiated
    /// outputs are expected.
    pub fn run_with<F>(&self, mut predictor: F) -> GoldenSummary
    where
        F: FnMut(&ParameterBatch, bool) -> std::result::Result<Predictions, String>,
    {
        let mut results = Vec::with_capacity(self.cases.len());

        for case in &self.cases {
            let start = std::time::Instant::now();

            let result = match predictor(&case.inputs, case.exponentiated) {
                Ok(actual) => {
                    let elapsed = start.elapsed().as_secs_f64() * 1000.0;
                    GoldenResult::compare(
                        case.name.clone(),
                        &case.expected,
                        &actual,
                        case.tolerance,
                        elapsed,
                    )
                }
                Err(err) => GoldenResult::error(case.name.clone(), err),
            };

            let failed = !result.passed;
            results.push(result);
            if failed && self.strict {
                break;
            }
        }

        GoldenSummary::from_results(results)
    }
}

/// Trait for predictors that support golden testing.
pub trait GoldenTestable {
    /// Predict raw or exponentiated outputs for a batch.
    fn golden_predict(&self, inputs: &ParameterBatch, exponentiated: bool) -> Result<Predictions>;

    /// Run golden tests against this predictor.
    fn run_golden_tests(&self, harness: &GoldenTestHarness) -> GoldenSummary {
        harness.run_with(|inputs, exponentiated| {
            self.golden_predict(inputs, exponentiated)
                .map_err(|e| e.to_string())
        })
    }
}

impl GoldenTestable for Evaluator {
    fn golden_predict(&self, inputs: &ParameterBatch, exponentiated: bool) -> Result<Predictions> {
        if exponentiated {
            self.predict_exponentiated(inputs)
        } else {
            self.predict(inputs)
        }
    }
}

/// Golden case as stored in JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonGoldenCase {
    /// Case name.
    pub name: String,
    /// Parameter name to values.
    pub inputs: BTreeMap<String, Vec<f64>>,
    /// Expected output rows.
    pub expected: Vec<Vec<f64>>,
    /// Whether `expected` holds `10 ** predictions`.
    #[serde(default)]
    pub exponentiated: bool,
    /// Optional tolerance override.
    #[serde(default)]
    pub tolerance: Option<f64>,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<JsonGoldenCase> for GoldenCase {
    fn from(json: JsonGoldenCase) -> Self {
        let mut case = GoldenCase::new(json.name, json.inputs.into_iter().collect(), json.expected);
        case.exponentiated = json.exponentiated;
        if let Some(tol) = json.tolerance {
            case.tolerance = tol;
        }
        case.description = json.description;
        case.tags = json.tags;
        case
    }
}

/// A file of golden cases.
#[derive(Debug, Clone, Deserialize)]
pub struct GoldenCaseFile {
    /// Cases in file order.
    pub cases: Vec<JsonGoldenCase>,
}

impl GoldenCaseFile {
    /// Parse from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Build a harness from the file's cases.
    pub fn into_harness(self) -> GoldenTestHarness {
        let mut harness = GoldenTestHarness::new();
        harness.add_cases(self.cases.into_iter().map(GoldenCase::from));
        harness
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::tests::small_parts;
    use crate::bundle::ModelBundle;
    use candle_core::Device;
    use std::sync::Arc;

    fn preds(rows: Vec<Vec<f64>>) -> Predictions {
        let r = rows.len();
        let c = rows.first().map_or(0, |row| row.len());
        Predictions::new(rows.into_iter().flatten().collect(), r, c).unwrap()
    }

    fn inputs() -> ParameterBatch {
        ParameterBatch::new()
            .with("omega_m", vec![0.3])
            .with("sigma_8", vec![0.8])
    }

    #[test]
    fn golden_case_builder() {
        let case = GoldenCase::new("test", inputs(), vec![vec![1.0]])
            .exponentiated()
            .with_tolerance(1e-4)
            .with_description("A test case")
            .with_tag("important");

        assert!(case.exponentiated);
        assert_eq!(case.tolerance, 1e-4);
        assert_eq!(case.description, Some("A test case".to_string()));
        assert!(case.tags.contains(&"important".to_string()));
    }

    #[test]
    fn golden_result_passes_within_tolerance() {
        let result = GoldenResult::compare(
            "test".to_string(),
            &[vec![1.0, 2.0]],
            &preds(vec![vec![1.0 + 1e-12, 2.0]]),
            1e-9,
            1.0,
        );

        assert!(result.passed);
        assert!(result.error.is_none());
        assert!(result.max_abs_error < 1e-11);
    }

    #[test]
    fn golden_result_relative_for_large_values() {
        // 1e-3 absolute on 1e6 is a relative 1e-9
        let result = GoldenResult::compare(
            "big".to_string(),
            &[vec![1e6]],
            &preds(vec![vec![1e6 + 1e-3]]),
            1e-8,
            0.0,
        );
        assert!(result.passed);
    }

    #[test]
    fn golden_result_divergence() {
        let result = GoldenResult::compare(
            "test".to_string(),
            &[vec![1.0, 2.0], vec![3.0, 4.0]],
            &preds(vec![vec![1.0, 2.0], vec![3.0, 4.5]]),
            1e-9,
            0.0,
        );

        assert!(!result.passed);
        assert_eq!(result.first_divergence, Some((1, 1)));
        assert!((result.max_abs_error - 0.5).abs() < 1e-12);
        assert!(result.error.unwrap().contains("[1, 1]"));
    }

    #[test]
    fn golden_result_nan_fails() {
        let result = GoldenResult::compare(
            "nan".to_string(),
            &[vec![1.0]],
            &preds(vec![vec![f64::NAN]]),
            1e-3,
            0.0,
        );
        assert!(!result.passed);
    }

    #[test]
    fn golden_result_shape_mismatch() {
        let result = GoldenResult::compare(
            "test".to_string(),
            &[vec![1.0, 2.0]],
            &preds(vec![vec![1.0, 2.0, 3.0]]),
            1e-9,
            0.0,
        );
        assert!(!result.passed);
        assert!(result.error.unwrap().contains("Shape mismatch"));
    }

    #[test]
    fn golden_harness_run_with() {
        let mut harness = GoldenTestHarness::new();
        harness.add_case(GoldenCase::new("pass", inputs(), vec![vec![0.3, 0.8]]));
        harness.add_case(GoldenCase::new("fail", inputs(), vec![vec![0.0, 0.0]]));

        // Mock predictor echoing its inputs
        let summary = harness.run_with(|batch, _exp| {
            let row = vec![batch.get("omega_m").unwrap()[0], batch.get("sigma_8").unwrap()[0]];
            Ok(preds(vec![row]))
        });

        assert_eq!(summary.total, 2);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.results.get("pass").unwrap().passed);
        assert!(!summary.results.get("fail").unwrap().passed);
    }

    #[test]
    fn golden_harness_strict_stops() {
        let mut harness = GoldenTestHarness::new().strict();
        harness.add_case(GoldenCase::new("first", inputs(), vec![vec![9.0]]));
        harness.add_case(GoldenCase::new("second", inputs(), vec![vec![9.0]]));

        let summary = harness.run_with(|_, _| Err("boom".to_string()));
        assert_eq!(summary.total, 1);
        assert!(!summary.all_passed());
    }

    #[test]
    fn golden_harness_filter_by_tag() {
        let mut harness = GoldenTestHarness::new();
        harness.add_case(GoldenCase::new("a", inputs(), vec![]).with_tag("regression"));
        harness.add_case(GoldenCase::new("b", inputs(), vec![]).with_tag("basic"));
        harness.add_case(
            GoldenCase::new("c", inputs(), vec![])
                .with_tag("regression")
                .with_tag("basic"),
        );

        assert_eq!(harness.filter_by_tag("regression").len(), 2);
        assert_eq!(harness.filter_by_tag("basic").len(), 2);
        assert!(harness.filter_by_tag("missing").is_empty());
    }

    #[test]
    fn golden_summary_counts() {
        let results = vec![
            GoldenResult::compare("a".to_string(), &[vec![1.0]], &preds(vec![vec![1.0]]), 1e-9, 1.0),
            GoldenResult::error("b".to_string(), "failed".to_string()),
        ];

        let summary = GoldenSummary::from_results(results);

        assert!(!summary.all_passed());
        assert_eq!(summary.total, 2);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failure_rate(), 50.0);
        assert!(format!("{}", summary).contains("Failed tests"));
    }

    #[test]
    fn golden_result_display() {
        let result = GoldenResult::compare("test".to_string(), &[vec![1.0]], &preds(vec![vec![1.0]]), 1e-9, 5.5);
        let display = format!("{}", result);
        assert!(display.contains("PASS"));
        assert!(display.contains("test"));
        assert!(display.contains("5.5"));
    }

    #[test]
    fn evaluator_golden_self_consistency() {
        let bundle = Arc::new(ModelBundle::from_parts(small_parts(), &Device::Cpu).unwrap());
        let eval = Evaluator::new(bundle);
        let raw = eval.predict(&inputs()).unwrap().to_vec2();
        let powered = eval.predict_exponentiated(&inputs()).unwrap().to_vec2();

        let mut harness = GoldenTestHarness::new();
        harness.add_case(GoldenCase::new("raw", inputs(), raw));
        harness.add_case(GoldenCase::new("pow", inputs(), powered).exponentiated());

        let summary = eval.run_golden_tests(&harness);
        assert!(summary.all_passed(), "{}", summary);
    }

    #[test]
    fn golden_case_file_parse() {
        let text = r#"{
            "cases": [
                {
                    "name": "fiducial",
                    "inputs": {"sigma_8": [0.8], "omega_m": [0.3]},
                    "expected": [[1.0, 2.0]],
                    "exponentiated": true,
                    "tolerance": 1e-6,
                    "tags": ["planck"]
                },
                {
                    "name": "bare",
                    "inputs": {"omega_m": [0.3], "sigma_8": [0.8]},
                    "expected": [[0.5, 0.5]]
                }
            ]
        }"#;

        let file = GoldenCaseFile::from_json(text).unwrap();
        let harness = file.into_harness();
        assert_eq!(harness.cases().len(), 2);

        let first = &harness.cases()[0];
        assert!(first.exponentiated);
        assert_eq!(first.tolerance, 1e-6);
        assert_eq!(first.inputs.get("omega_m"), Some(&[0.3][..]));
        assert_eq!(harness.filter_by_tag("planck").len(), 1);

        let second = &harness.cases()[1];
        assert!(!second.exponentiated);
        assert_eq!(second.tolerance, GoldenCase::default().tolerance);
    }
}
