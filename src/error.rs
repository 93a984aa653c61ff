/// Result type for engine operations
pub type Result<T> = std::result::Result<T, LearningError>;

/// Main error type for the learning engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LearningError {
    /// Operation called in the wrong lifecycle phase, e.g. backward before forward
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Argument value outside its accepted domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Input, gradient or weight vector has the wrong shape
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Network or ensemble is inactive or has nothing to run
    #[error("Not active: {0}")]
    NotActive(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for LearningError {
    fn from(err: std::io::Error) -> Self {
        LearningError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for LearningError {
    fn from(err: serde_json::Error) -> Self {
        LearningError::Config(err.to_string())
    }
}

impl LearningError {
    pub fn dimension_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        LearningError::DimensionMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        LearningError::InvalidArgument(msg.into())
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        LearningError::IllegalState(msg.into())
    }

    pub fn not_active(msg: impl Into<String>) -> Self {
        LearningError::NotActive(msg.into())
    }

    /// True for structural misuse
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, LearningError::IllegalState(_))
    }

    /// True for bad values, including shape mismatches
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            LearningError::InvalidArgument(_) | LearningError::DimensionMismatch { .. }
        )
    }
}

/// Check that a vector has the expected length
pub fn check_len(what: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(LearningError::dimension_mismatch(
            format!("{} of length {}", what, expected),
            format!("length {}", actual),
        ));
    }
    Ok(())
}

/// Check that an integer argument lies in `[min, max]`
pub fn check_range(name: &str, value: usize, min: usize, max: usize) -> Result<()> {
    if value < min || value > max {
        return Err(LearningError::invalid_argument(format!(
            "{} must be in [{}, {}], got {}",
            name, min, max, value
        )));
    }
    Ok(())
}
