// Error types for the fanwatch pipeline
//
// This module defines custom error types for the sensor transport, startup
// configuration and classifier, providing structured error handling with
// numeric codes suitable for diagnostic reports.

mod classifier;
mod config;
mod pipeline;
mod sensor;

pub use classifier::{log_classifier_error, ClassifierError, ClassifierErrorCodes};
pub use config::{log_config_error, ConfigError, ConfigErrorCodes};
pub use pipeline::PipelineError;
pub use sensor::{log_sensor_error, SensorError, SensorErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent reporting over the
/// diagnostic serial port.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_trait_objects() {
        let errors: Vec<Box<dyn ErrorCode>> = vec![
            Box::new(SensorError::BusNack),
            Box::new(ConfigError::WindowSizeEven { window_size: 4 }),
            Box::new(ClassifierError::InitFailed {
                reason: "no model".to_string(),
            }),
        ];

        let codes: Vec<i32> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes, vec![1001, 2002, 3002]);
    }

    #[test]
    fn test_error_code_ranges_do_not_overlap() {
        assert!(SensorErrorCodes::NOT_INITIALIZED < ConfigErrorCodes::CAPACITY_NOT_POWER_OF_TWO);
        assert!(ConfigErrorCodes::PARSE_FAILED < ClassifierErrorCodes::MODEL_INVALID);
    }
}
