use thiserror::Error;

/// Errors raised by the forward model, the variability model and the fitting layer.
///
/// Numeric singularities (an electrode coinciding with a dipole) are not part of
/// this taxonomy; they surface as non-finite values in the computed matrices.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid generator {index}: {reason}")]
    InvalidGenerator { index: usize, reason: String },

    #[error("parameter vector has {got} values but the parameter groups expect {expected}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("variability mismatch: {0}")]
    VariabilityMismatch(String),

    #[error("infeasible bound at position {index}: low {low} > high {high}")]
    InfeasibleBounds { index: usize, low: f64, high: f64 },

    #[error("minimizer failed: {0}")]
    Minimizer(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl ModelError {
    /// Exit code used by the binary when this error reaches `main`.
    pub fn exit_code(&self) -> u8 {
        match self {
            ModelError::InvalidArgument(_)
            | ModelError::InvalidGenerator { .. }
            | ModelError::VariabilityMismatch(_)
            | ModelError::Io(_)
            | ModelError::Parse(_) => 2,
            ModelError::ArityMismatch { .. }
            | ModelError::DimensionMismatch(_)
            | ModelError::InfeasibleBounds { .. }
            | ModelError::Minimizer(_) => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}
