//! Output coordinate grid (wavenumbers).
//!
//! The grid file is plain text: whitespace or newline separated positive
//! floats, one per output mode. Anything after `#` on a line is a comment.

use crate::error::{EmulatorError, Result};
use std::fs;
use std::path::Path;

/// Parse a grid from text. Values must be finite and positive.
pub fn parse_modes_grid(text: &str) -> Result<Vec<f64>> {
    let mut values = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let content = line.split('#').next().unwrap_or_default();
        for token in content.split_whitespace() {
            let value: f64 = token.parse().map_err(|_| {
                EmulatorError::load(format!(
                    "modes grid line {}: '{}' is not a number",
                    line_no + 1,
                    token
                ))
            })?;
            if !value.is_finite() || value <= 0.0 {
                return Err(EmulatorError::load(format!(
                    "modes grid line {}: {} is not a positive value",
                    line_no + 1,
                    value
                )));
            }
            values.push(value);
        }
    }

    if values.is_empty() {
        return Err(EmulatorError::load("modes grid is empty"));
    }

    Ok(values)
}

/// Read and parse a grid file.
pub fn read_modes_grid(path: &Path) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path).map_err(|e| {
        EmulatorError::load(format!("cannot read modes grid {}: {}", path.display(), e))
    })?;
    parse_modes_grid(&text)
}

/// Elementwise `log10` of a positive grid.
pub fn log10_grid(values: &[f64]) -> Result<Vec<f64>> {
    values
        .iter()
        .map(|&v| {
            if v.is_finite() && v > 0.0 {
                Ok(v.log10())
            } else {
                Err(EmulatorError::load(format!(
                    "modes grid value {} has no logarithm",
                    v
                )))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_whitespace_and_newlines() {
        let grid = parse_modes_grid("1e-4 1e-3\n0.01\t0.1\n\n1.0\n").unwrap();
        assert_eq!(grid, vec![1e-4, 1e-3, 0.01, 0.1, 1.0]);
    }

    #[test]
    fn grid_comments_skipped() {
        let grid = parse_modes_grid("# k [h/Mpc]\n0.5 # first\n2.0\n").unwrap();
        assert_eq!(grid, vec![0.5, 2.0]);
    }

    #[test]
    fn grid_rejects_garbage() {
        let err = parse_modes_grid("0.1\nabc\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn grid_rejects_non_positive() {
        assert!(parse_modes_grid("0.1 0.0").is_err());
        assert!(parse_modes_grid("-1.0").is_err());
    }

    #[test]
    fn grid_rejects_empty() {
        assert!(parse_modes_grid("  \n# nothing\n").is_err());
    }

    #[test]
    fn grid_log10() {
        let logs = log10_grid(&[1e-3, 1.0, 100.0]).unwrap();
        let expected = [-3.0, 0.0, 2.0];
        for (l, e) in logs.iter().zip(expected.iter()) {
            assert!((l - e).abs() < 1e-12);
        }
        assert!(log10_grid(&[0.0]).is_err());
    }

    #[test]
    fn grid_missing_file() {
        let result = read_modes_grid(Path::new("/nonexistent/k_modes.txt"));
        assert!(matches!(result, Err(EmulatorError::ModelLoad(_))));
    }

    #[test]
    fn grid_from_file() {
        let path = std::env::temp_dir().join("cosmoemu_test_grid.txt");
        fs::write(&path, "0.001\n0.01\n0.1\n").unwrap();

        let grid = read_modes_grid(&path).unwrap();
        assert_eq!(grid.len(), 3);

        let _ = fs::remove_file(&path);
    }
}
