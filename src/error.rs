//! Error types shared by the library modules.
//!
//! Arithmetic degeneracies in the distance formulas are never errors; they
//! are absorbed by per-measure fallback values in the distance module.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by statistics persistence, merging and input parsing.
#[derive(Debug, Error)]
pub enum SimkaError {
    /// Two statistics containers disagree on which optional distance
    /// families they carry.
    #[error("distance flag mismatch: simple {expected_simple} vs {found_simple}, complex {expected_complex} vs {found_complex}")]
    FlagMismatch {
        expected_simple: bool,
        found_simple: bool,
        expected_complex: bool,
        found_complex: bool,
    },

    /// Two statistics containers were built for different dataset counts.
    #[error("dataset count mismatch: expected {expected}, found {found}")]
    SizeMismatch { expected: usize, found: usize },

    /// Underlying I/O failure (sidecar, partition stream, persisted store).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A consumed file does not have the expected shape.
    #[error("invalid input in {}: {detail}", path.display())]
    InputFormat { path: PathBuf, detail: String },
}

impl SimkaError {
    pub fn input_format(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        SimkaError::InputFormat {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimkaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = SimkaError::input_format("/tmp/a.ok", "missing line 3");
        let msg = err.to_string();
        assert!(msg.contains("/tmp/a.ok"));
        assert!(msg.contains("missing line 3"));

        let err = SimkaError::SizeMismatch {
            expected: 4,
            found: 2,
        };
        assert!(err.to_string().contains("expected 4"));
    }
}
