use std::path::PathBuf;

use thiserror::Error;

use crate::plate_detection::normalize::PlateIdentifier;

#[derive(Debug, Error)]
pub enum PlateError {
    #[error("invalid frame {width}x{height}")]
    InvalidFrame { width: i32, height: i32 },
    #[error("preprocessing failed: {0}")]
    PreprocessingFailure(#[source] opencv::Error),
    #[error("recognition unavailable: {message}")]
    RecognitionUnavailable { message: String },
    #[error("capture failed: {message}")]
    CaptureFailure { message: String },
    #[error("display failed: {0}")]
    DisplayFailure(#[source] opencv::Error),
}

impl PlateError {
    pub fn recognition(message: impl Into<String>) -> Self {
        Self::RecognitionUnavailable {
            message: message.into(),
        }
    }

    pub fn capture(message: impl Into<String>) -> Self {
        Self::CaptureFailure {
            message: message.into(),
        }
    }

    /// Fatal errors end the scanning session. The rest only spoil one cycle.
    pub fn is_fatal(&self) -> bool {
        match self {
            PlateError::InvalidFrame { .. } | PlateError::PreprocessingFailure(_) => false,
            PlateError::RecognitionUnavailable { .. }
            | PlateError::CaptureFailure { .. }
            | PlateError::DisplayFailure(_) => true,
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PlateError::InvalidFrame { .. } => "invalid_frame",
            PlateError::PreprocessingFailure(_) => "preprocessing",
            PlateError::RecognitionUnavailable { .. } => "recognition",
            PlateError::CaptureFailure { .. } => "capture",
            PlateError::DisplayFailure(_) => "display",
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("plate {0} is already registered")]
    DuplicateKey(PlateIdentifier),
    #[error("registry id {0} is used by more than one record")]
    DuplicateId(u64),
    #[error("plate is empty after normalization")]
    EmptyPlate,
    #[error("registry unavailable: {0}")]
    Unavailable(String),
    #[error("failed to access registry file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse registry file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize registry: {0}")]
    Serialize(#[from] toml::ser::Error),
}
