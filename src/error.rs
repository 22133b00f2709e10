//! Error type shared by every inferential procedure in the crate.
//!
//! Failures are reported at the point of detection and never retried: none
//! of them are transient. Optimizer non-convergence is deliberately absent
//! here; it travels as the `converged` flag of
//! [`VariogramFit`](crate::vgm_fit::VariogramFit).

use thiserror::Error;

/// Result alias for fallible statistical operations.
pub type Result<T> = std::result::Result<T, InferenceError>;

/// Errors raised while computing a statistic.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    /// Sample is too small for the requested statistic.
    #[error("insufficient data for {context}: need at least {required} observations, got {got}")]
    InsufficientData {
        required: usize,
        got: usize,
        context: String,
    },

    /// Two inputs that must line up have different lengths.
    #[error("dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        expected: usize,
        got: usize,
        context: String,
    },

    /// A quotient has a zero denominator (e.g. an empty distance bin).
    #[error("division undefined: {context}")]
    DivisionUndefined { context: String },

    /// Input violates a precondition (non-finite value, bad option, unknown column).
    #[error("invalid input: {context}")]
    InvalidInput { context: String },

    /// Design matrix of a linear model does not have full column rank.
    #[error("singular design matrix: {context}")]
    SingularDesign { context: String },
}

impl InferenceError {
    pub(crate) fn insufficient(required: usize, got: usize, context: impl Into<String>) -> Self {
        Self::InsufficientData {
            required,
            got,
            context: context.into(),
        }
    }

    pub(crate) fn mismatch(expected: usize, got: usize, context: impl Into<String>) -> Self {
        Self::DimensionMismatch {
            expected,
            got,
            context: context.into(),
        }
    }

    pub(crate) fn invalid(context: impl Into<String>) -> Self {
        Self::InvalidInput {
            context: context.into(),
        }
    }
}

/// Rejects slices containing NaN or infinities.
pub(crate) fn ensure_finite(data: &[f64], context: &str) -> Result<()> {
    match data.iter().position(|x| !x.is_finite()) {
        Some(i) => Err(InferenceError::invalid(format!(
            "{context}: non-finite value {} at index {i}",
            data[i]
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InferenceError::insufficient(2, 1, "variance");
        let msg = err.to_string();
        assert!(msg.contains("variance"));
        assert!(msg.contains('2'));
        assert!(msg.contains('1'));

        let err = InferenceError::mismatch(3, 4, "paired t-test");
        assert!(err.to_string().contains("paired t-test"));
    }

    #[test]
    fn test_ensure_finite() {
        assert!(ensure_finite(&[1.0, 2.0], "x").is_ok());
        let err = ensure_finite(&[1.0, f64::NAN], "x").unwrap_err();
        assert!(matches!(err, InferenceError::InvalidInput { .. }));
        assert!(ensure_finite(&[f64::INFINITY], "x").is_err());
    }
}
