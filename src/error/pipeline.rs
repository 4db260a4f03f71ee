// Bring-up error wrapper

use std::fmt;

use super::{ClassifierError, ConfigError, ErrorCode, SensorError};

/// Any error that stops the pipeline from starting.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    Config(ConfigError),
    Sensor(SensorError),
    Classifier(ClassifierError),
}

impl ErrorCode for PipelineError {
    fn code(&self) -> i32 {
        match self {
            PipelineError::Config(err) => err.code(),
            PipelineError::Sensor(err) => err.code(),
            PipelineError::Classifier(err) => err.code(),
        }
    }

    fn message(&self) -> String {
        match self {
            PipelineError::Config(err) => err.message(),
            PipelineError::Sensor(err) => err.message(),
            PipelineError::Classifier(err) => err.message(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Config(err) => err.fmt(f),
            PipelineError::Sensor(err) => err.fmt(f),
            PipelineError::Classifier(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Config(err) => Some(err),
            PipelineError::Sensor(err) => Some(err),
            PipelineError::Classifier(err) => Some(err),
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        PipelineError::Config(err)
    }
}

impl From<SensorError> for PipelineError {
    fn from(err: SensorError) -> Self {
        PipelineError::Sensor(err)
    }
}

impl From<ClassifierError> for PipelineError {
    fn from(err: ClassifierError) -> Self {
        PipelineError::Classifier(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_forwards_codes() {
        let err: PipelineError = SensorError::BusNack.into();
        assert_eq!(err.code(), 1001);

        let err: PipelineError = ConfigError::NoAxesEnabled.into();
        assert_eq!(err.code(), 2004);
        assert!(err.to_string().contains("ConfigError::NoAxesEnabled"));
    }
}
