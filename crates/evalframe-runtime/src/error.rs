//! Failures and non-local exits

use crate::value::Value;
use thiserror::Error;

/// Runtime failures raised by the frame engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// Frame stack depth limit exceeded
    #[error("Stack overflow: frame depth limit of {limit} exceeded")]
    StackOverflow { limit: usize },
    /// Text handed in by a variadic stream could not be scanned
    #[error("Scan failed: {0}")]
    Scan(#[from] ScanError),
    /// A persistent API handle carried no value
    #[error("Nulled cell leaked to API")]
    NulledApiHandle,
    /// An application left arguments unconsumed
    #[error("Too many arguments supplied to {name}")]
    TooManyArguments { name: String },
    /// Structural mutation attempted on a held series
    #[error("Series is held and cannot be structurally modified")]
    SeriesHeld,
    /// Nulled cell stored into a series that does not permit it
    #[error("Series does not permit nulled cells")]
    NulledInSeries,
    /// Series id no longer refers to a live series
    #[error("Stale series reference")]
    StaleSeries,
    /// Series index out of bounds
    #[error("Index {index} out of bounds for series of length {len}")]
    OutOfBounds { index: usize, len: usize },
    /// Branch that is neither a block nor an action
    #[error("Invalid branch: {kind}")]
    InvalidBranch { kind: String },
    /// Failure reported by an evaluator or native
    #[error("{msg}")]
    Evaluation { msg: String },
}

impl RuntimeError {
    /// Convenience constructor for evaluator and native failures
    pub fn evaluation(msg: impl Into<String>) -> Self {
        RuntimeError::Evaluation { msg: msg.into() }
    }
}

/// Scanner failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("Scanning is not supported")]
    Unsupported,
    #[error("Unterminated text starting at offset {offset}")]
    UnterminatedText { offset: usize },
    #[error("Invalid token '{token}'")]
    InvalidToken { token: String },
}

/// Non-local exit travelling up through evaluation
///
/// The engine never catches these; wrappers only clean up the frames they
/// own and hand the unwind back unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Unwind {
    /// A value thrown by a step hook with a label identifying the catcher
    #[error("Thrown {value} with label {label}")]
    Thrown { label: Value, value: Value },
    /// A failure
    #[error(transparent)]
    Failed(#[from] RuntimeError),
}

impl From<ScanError> for Unwind {
    fn from(err: ScanError) -> Self {
        Unwind::Failed(RuntimeError::Scan(err))
    }
}

/// Result of anything that may unwind
pub type EvalResult<T> = Result<T, Unwind>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_becomes_failure() {
        let unwind: Unwind = ScanError::Unsupported.into();
        assert_eq!(
            unwind,
            Unwind::Failed(RuntimeError::Scan(ScanError::Unsupported))
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            RuntimeError::StackOverflow { limit: 8 }.to_string(),
            "Stack overflow: frame depth limit of 8 exceeded"
        );
        assert_eq!(
            Unwind::from(RuntimeError::NulledApiHandle).to_string(),
            "Nulled cell leaked to API"
        );
    }
}
