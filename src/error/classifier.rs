// Classifier (knowledge pack) error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Classifier error code constants
///
/// Error code range: 3001-3003
pub struct ClassifierErrorCodes {}

impl ClassifierErrorCodes {
    /// Model description could not be parsed or is inconsistent
    pub const MODEL_INVALID: i32 = 3001;

    /// Knowledge pack failed to initialize
    pub const INIT_FAILED: i32 = 3002;

    /// Model requests a feature function this build does not provide
    pub const UNSUPPORTED_FEATURE: i32 = 3003;
}

/// Log a classifier error with structured context
pub fn log_classifier_error(err: &ClassifierError, context: &str) {
    error!(
        "Classifier error in {}: code={}, component=KnowledgePack, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Classifier errors
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierError {
    /// Model description could not be parsed or is inconsistent
    ModelInvalid { reason: String },

    /// Knowledge pack failed to initialize
    InitFailed { reason: String },

    /// Model requests a feature function this build does not provide
    UnsupportedFeature { name: String },
}

impl ErrorCode for ClassifierError {
    fn code(&self) -> i32 {
        match self {
            ClassifierError::ModelInvalid { .. } => ClassifierErrorCodes::MODEL_INVALID,
            ClassifierError::InitFailed { .. } => ClassifierErrorCodes::INIT_FAILED,
            ClassifierError::UnsupportedFeature { .. } => {
                ClassifierErrorCodes::UNSUPPORTED_FEATURE
            }
        }
    }

    fn message(&self) -> String {
        match self {
            ClassifierError::ModelInvalid { reason } => format!("Invalid model: {}", reason),
            ClassifierError::InitFailed { reason } => {
                format!("Knowledge pack init failed: {}", reason)
            }
            ClassifierError::UnsupportedFeature { name } => {
                format!("Unsupported feature function: {}", name)
            }
        }
    }
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClassifierError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ClassifierError {}

impl From<serde_json::Error> for ClassifierError {
    fn from(err: serde_json::Error) -> Self {
        ClassifierError::ModelInvalid {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_error_codes() {
        assert_eq!(
            ClassifierError::ModelInvalid {
                reason: "x".to_string()
            }
            .code(),
            3001
        );
        assert_eq!(
            ClassifierError::UnsupportedFeature {
                name: "MFCC".to_string()
            }
            .code(),
            3003
        );
    }

    #[test]
    fn test_classifier_error_display() {
        let err = ClassifierError::UnsupportedFeature {
            name: "MFCC".to_string(),
        };
        assert!(err.to_string().contains("MFCC"));
    }
}
