// Sensor transport error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Sensor error code constants
///
/// Single source of truth for the numeric codes reported over the
/// diagnostic port and stored in the capture status cell.
///
/// Error code range: 1001-1006
pub struct SensorErrorCodes {}

impl SensorErrorCodes {
    /// Device did not acknowledge its bus address
    pub const BUS_NACK: i32 = 1001;

    /// Bus transaction did not complete in time
    pub const BUS_TIMEOUT: i32 = 1002;

    /// Generic communication failure reported by the device driver
    pub const COM_FAIL: i32 = 1003;

    /// Chip id did not match the configured sensor model
    pub const DEVICE_NOT_FOUND: i32 = 1004;

    /// Device refused the requested rate or range
    pub const CONFIG_REJECTED: i32 = 1005;

    /// Frame requested before init/configure succeeded
    pub const NOT_INITIALIZED: i32 = 1006;
}

/// Log a sensor error with structured context
///
/// The logging is non-blocking and will not panic on failure. Never call
/// this from interrupt context.
pub fn log_sensor_error(err: &SensorError, context: &str) {
    error!(
        "Sensor error in {}: code={}, component=SensorTransport, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Sensor transport errors
///
/// Any of these is fatal for the pipeline. The type is `Copy` and maps to a
/// small status byte so the interrupt handler can record it in an atomic
/// cell without allocating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Device did not acknowledge its bus address
    BusNack,

    /// Bus transaction did not complete in time
    BusTimeout,

    /// Generic communication failure reported by the device driver
    ComFail,

    /// Chip id did not match the configured sensor model
    DeviceNotFound,

    /// Device refused the requested rate or range
    ConfigRejected,

    /// Frame requested before init/configure succeeded
    NotInitialized,
}

impl SensorError {
    /// Status byte used by the capture status cell (0 is reserved for OK).
    pub fn status_byte(self) -> u8 {
        match self {
            SensorError::BusNack => 1,
            SensorError::BusTimeout => 2,
            SensorError::ComFail => 3,
            SensorError::DeviceNotFound => 4,
            SensorError::ConfigRejected => 5,
            SensorError::NotInitialized => 6,
        }
    }

    /// Inverse of [`SensorError::status_byte`]; `None` for 0 or unknown bytes.
    pub fn from_status_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(SensorError::BusNack),
            2 => Some(SensorError::BusTimeout),
            3 => Some(SensorError::ComFail),
            4 => Some(SensorError::DeviceNotFound),
            5 => Some(SensorError::ConfigRejected),
            6 => Some(SensorError::NotInitialized),
            _ => None,
        }
    }
}

impl ErrorCode for SensorError {
    fn code(&self) -> i32 {
        match self {
            SensorError::BusNack => SensorErrorCodes::BUS_NACK,
            SensorError::BusTimeout => SensorErrorCodes::BUS_TIMEOUT,
            SensorError::ComFail => SensorErrorCodes::COM_FAIL,
            SensorError::DeviceNotFound => SensorErrorCodes::DEVICE_NOT_FOUND,
            SensorError::ConfigRejected => SensorErrorCodes::CONFIG_REJECTED,
            SensorError::NotInitialized => SensorErrorCodes::NOT_INITIALIZED,
        }
    }

    fn message(&self) -> String {
        match self {
            SensorError::BusNack => "Sensor did not acknowledge its bus address".to_string(),
            SensorError::BusTimeout => "Sensor bus transaction timed out".to_string(),
            SensorError::ComFail => "Sensor communication failure".to_string(),
            SensorError::DeviceNotFound => {
                "Sensor chip id does not match the configured model".to_string()
            }
            SensorError::ConfigRejected => {
                "Sensor rejected the requested sample rate or range".to_string()
            }
            SensorError::NotInitialized => {
                "Sensor read before init/configure completed".to_string()
            }
        }
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SensorError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for SensorError {}
