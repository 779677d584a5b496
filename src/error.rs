//! Error types for the malscope detection pipeline.
//!
//! Every failure the core can report is a variant of [`ScanError`]. Format
//! problems inside structural parsing are not errors: they degrade to
//! zero-filled descriptors and are only logged. Cancellation is not an error
//! either; it is reported through [`crate::engine::ScanOutcome::Incomplete`].

use thiserror::Error;

/// Main error type for malscope operations.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Zero-length byte buffer handed to the extractor
    #[error("Empty input: artifact contains no bytes")]
    EmptyInput,

    /// Buffer larger than the configured maximum
    #[error("Input too large: {size} bytes exceeds limit of {limit} bytes")]
    InputTooLarge { size: u64, limit: u64 },

    /// Classifier or novelty weights missing, corrupt, or inconsistent
    #[error("Model unavailable ({model}): {reason}")]
    ModelUnavailable { model: String, reason: String },

    /// Feature vector length does not match the model input size
    #[error("Feature size mismatch: expected {expected}, got {actual}")]
    FeatureSizeMismatch { expected: usize, actual: usize },

    /// Configuration values outside their valid range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for malscope operations
pub type Result<T> = std::result::Result<T, ScanError>;

impl ScanError {
    /// Convenience constructor for model loading failures.
    pub fn model_unavailable(model: impl Into<String>, reason: impl Into<String>) -> Self {
        ScanError::ModelUnavailable {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Stable internal error code for the orchestration layer.
    pub fn code(&self) -> &'static str {
        match self {
            ScanError::EmptyInput => "E_EMPTY_INPUT",
            ScanError::InputTooLarge { .. } => "E_TOO_LARGE",
            ScanError::ModelUnavailable { .. } => "E_MODEL",
            ScanError::FeatureSizeMismatch { .. } => "E_FEATURE_SIZE",
            ScanError::InvalidConfig(_) => "E_CONFIG",
            ScanError::Io(_) => "E_IO",
            ScanError::Serialization(_) => "E_SERDE",
        }
    }

    /// Whether the error must stop the process from serving any scan.
    pub fn is_process_fatal(&self) -> bool {
        matches!(
            self,
            ScanError::ModelUnavailable { .. }
                | ScanError::FeatureSizeMismatch { .. }
                | ScanError::InvalidConfig(_)
        )
    }

    /// Message safe to show to end users. Internal details stay in logs.
    pub fn public_message(&self) -> String {
        format!("scan failed ({})", self.code())
    }

    /// Rebuild an equivalent error. Source errors that cannot be cloned keep
    /// their kind and message.
    pub fn replicate(&self) -> ScanError {
        match self {
            ScanError::EmptyInput => ScanError::EmptyInput,
            ScanError::InputTooLarge { size, limit } => ScanError::InputTooLarge {
                size: *size,
                limit: *limit,
            },
            ScanError::ModelUnavailable { model, reason } => ScanError::ModelUnavailable {
                model: model.clone(),
                reason: reason.clone(),
            },
            ScanError::FeatureSizeMismatch { expected, actual } => {
                ScanError::FeatureSizeMismatch {
                    expected: *expected,
                    actual: *actual,
                }
            }
            ScanError::InvalidConfig(msg) => ScanError::InvalidConfig(msg.clone()),
            ScanError::Io(e) => ScanError::Io(std::io::Error::new(e.kind(), e.to_string())),
            ScanError::Serialization(e) => {
                ScanError::Serialization(serde::de::Error::custom(e.to_string()))
            }
        }
    }
}
