// Configuration error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Configuration error code constants
///
/// Error code range: 2001-2010
pub struct ConfigErrorCodes {}

impl ConfigErrorCodes {
    /// Sample buffer capacity is zero or not a power of two
    pub const CAPACITY_NOT_POWER_OF_TWO: i32 = 2001;

    /// Vote window size is even or zero
    pub const WINDOW_SIZE_EVEN: i32 = 2002;

    /// Samples per packet does not divide the buffer capacity
    pub const PACKET_NOT_FACTOR: i32 = 2003;

    /// Neither accelerometer nor gyroscope enabled
    pub const NO_AXES_ENABLED: i32 = 2004;

    /// Sample rate not supported by the selected sensor model
    pub const SAMPLE_RATE_UNSUPPORTED: i32 = 2005;

    /// Accelerometer or gyroscope range not supported by the sensor model
    pub const RANGE_UNSUPPORTED: i32 = 2006;

    /// Class table inconsistent (too few classes, ids out of range)
    pub const CLASS_TABLE_INVALID: i32 = 2007;

    /// Indicator pattern is unusable (zero blink period)
    pub const PATTERN_INVALID: i32 = 2008;

    /// Configuration file could not be read
    pub const READ_FAILED: i32 = 2009;

    /// Configuration file is not valid JSON for the schema
    pub const PARSE_FAILED: i32 = 2010;
}

/// Log a configuration error with structured context
pub fn log_config_error(err: &ConfigError, context: &str) {
    error!(
        "Config error in {}: code={}, component=AppConfig, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Configuration errors
///
/// All of these are detected at startup, before the capture interrupt is
/// ever enabled.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Sample buffer capacity is zero or not a power of two
    CapacityNotPowerOfTwo { capacity: usize },

    /// Vote window size is even or zero
    WindowSizeEven { window_size: usize },

    /// Samples per packet does not divide the buffer capacity
    PacketNotFactor {
        samples_per_packet: usize,
        capacity: usize,
    },

    /// Neither accelerometer nor gyroscope enabled
    NoAxesEnabled,

    /// Sample rate not supported by the selected sensor model
    SampleRateUnsupported { sensor: &'static str, rate_hz: u32 },

    /// Range not supported by the selected sensor model
    RangeUnsupported {
        sensor: &'static str,
        kind: &'static str,
        value: u16,
    },

    /// Class table inconsistent
    ClassTableInvalid { reason: String },

    /// Indicator pattern is unusable
    PatternInvalid { class_id: Option<u8> },

    /// Configuration file could not be read
    ReadFailed { path: String, reason: String },

    /// Configuration file is not valid JSON for the schema
    ParseFailed { reason: String },
}

impl ErrorCode for ConfigError {
    fn code(&self) -> i32 {
        match self {
            ConfigError::CapacityNotPowerOfTwo { .. } => {
                ConfigErrorCodes::CAPACITY_NOT_POWER_OF_TWO
            }
            ConfigError::WindowSizeEven { .. } => ConfigErrorCodes::WINDOW_SIZE_EVEN,
            ConfigError::PacketNotFactor { .. } => ConfigErrorCodes::PACKET_NOT_FACTOR,
            ConfigError::NoAxesEnabled => ConfigErrorCodes::NO_AXES_ENABLED,
            ConfigError::SampleRateUnsupported { .. } => {
                ConfigErrorCodes::SAMPLE_RATE_UNSUPPORTED
            }
            ConfigError::RangeUnsupported { .. } => ConfigErrorCodes::RANGE_UNSUPPORTED,
            ConfigError::ClassTableInvalid { .. } => ConfigErrorCodes::CLASS_TABLE_INVALID,
            ConfigError::PatternInvalid { .. } => ConfigErrorCodes::PATTERN_INVALID,
            ConfigError::ReadFailed { .. } => ConfigErrorCodes::READ_FAILED,
            ConfigError::ParseFailed { .. } => ConfigErrorCodes::PARSE_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            ConfigError::CapacityNotPowerOfTwo { capacity } => {
                format!("Buffer capacity must be a non-zero power of two (got {})", capacity)
            }
            ConfigError::WindowSizeEven { window_size } => {
                format!("Vote window size must be odd (got {})", window_size)
            }
            ConfigError::PacketNotFactor {
                samples_per_packet,
                capacity,
            } => format!(
                "Samples per packet ({}) must be a factor of the buffer capacity ({})",
                samples_per_packet, capacity
            ),
            ConfigError::NoAxesEnabled => {
                "At least one of accelerometer or gyroscope must be enabled".to_string()
            }
            ConfigError::SampleRateUnsupported { sensor, rate_hz } => {
                format!("Sample rate {} Hz is not supported by {}", rate_hz, sensor)
            }
            ConfigError::RangeUnsupported {
                sensor,
                kind,
                value,
            } => format!("{} range {} is not supported by {}", kind, value, sensor),
            ConfigError::ClassTableInvalid { reason } => {
                format!("Invalid class table: {}", reason)
            }
            ConfigError::PatternInvalid { class_id } => match class_id {
                Some(id) => format!("Indicator pattern for class {} has a zero blink period", id),
                None => "Default indicator pattern has a zero blink period".to_string(),
            },
            ConfigError::ReadFailed { path, reason } => {
                format!("Failed to read config {}: {}", path, reason)
            }
            ConfigError::ParseFailed { reason } => format!("Failed to parse config: {}", reason),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConfigError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseFailed {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_codes() {
        assert_eq!(ConfigError::CapacityNotPowerOfTwo { capacity: 3 }.code(), 2001);
        assert_eq!(ConfigError::WindowSizeEven { window_size: 2 }.code(), 2002);
        assert_eq!(
            ConfigError::PacketNotFactor {
                samples_per_packet: 3,
                capacity: 32
            }
            .code(),
            2003
        );
        assert_eq!(ConfigError::NoAxesEnabled.code(), 2004);
        assert_eq!(
            ConfigError::ParseFailed {
                reason: "x".to_string()
            }
            .code(),
            2010
        );
    }

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::CapacityNotPowerOfTwo { capacity: 24 };
        assert!(err.message().contains("power of two"));
        assert!(err.message().contains("24"));

        let err = ConfigError::SampleRateUnsupported {
            sensor: "bmi160",
            rate_hz: 500,
        };
        assert!(err.message().contains("500 Hz"));
        assert!(err.message().contains("bmi160"));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: ConfigError = parse_err.into();
        assert_eq!(err.code(), ConfigErrorCodes::PARSE_FAILED);
    }
}
