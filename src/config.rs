//! Startup configuration for the acquisition pipeline
//!
//! Everything the pipeline needs to know is fixed before the capture
//! interrupt is armed: sensor model and ranges, buffer geometry, the vote
//! window and the indicator pattern table. Configuration is loaded from JSON
//! (every field optional, defaults match the fan-condition demo board) and
//! must pass [`AppConfig::validate`] before bring-up.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::board::SensorRanges;
use crate::capture::DEFAULT_CAPACITY;
use crate::error::ConfigError;
use crate::indicator::{default_patterns, ClassPattern, IndicatorPattern, DEFAULT_BLINK_MS};

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub sensor: SensorConfig,
    pub buffer: BufferConfig,
    pub voting: VotingConfig,
    pub indicator: IndicatorConfig,
    pub report: ReportConfig,
}

/// Supported IMU parts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorModel {
    Bmi160,
    Icm42688,
}

const ACCEL_RANGES_G: &[u16] = &[2, 4, 8, 16];

impl SensorModel {
    pub fn name(self) -> &'static str {
        match self {
            SensorModel::Bmi160 => "BMI160",
            SensorModel::Icm42688 => "ICM42688",
        }
    }

    pub fn sample_rates_hz(self) -> &'static [u32] {
        match self {
            SensorModel::Bmi160 => &[25, 50, 100, 200, 400, 800, 1600],
            SensorModel::Icm42688 => &[25, 50, 100, 200, 500, 1000, 2000, 4000, 8000, 16000],
        }
    }

    pub fn gyro_ranges_dps(self) -> &'static [u16] {
        match self {
            SensorModel::Bmi160 => &[125, 250, 500, 1000, 2000],
            SensorModel::Icm42688 => &[16, 31, 62, 125, 250, 500, 1000, 2000],
        }
    }

    pub fn accel_ranges_g(self) -> &'static [u16] {
        ACCEL_RANGES_G
    }
}

/// IMU sampling parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub model: SensorModel,
    /// Output data rate in Hz
    pub sample_rate_hz: u32,
    pub accel_enabled: bool,
    /// Accelerometer full scale in g
    pub accel_range_g: u16,
    pub gyro_enabled: bool,
    /// Gyroscope full scale in degrees per second
    pub gyro_range_dps: u16,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            model: SensorModel::Bmi160,
            sample_rate_hz: 100,
            accel_enabled: true,
            accel_range_g: 2,
            gyro_enabled: true,
            gyro_range_dps: 125,
        }
    }
}

impl SensorConfig {
    pub fn ranges(&self) -> SensorRanges {
        SensorRanges {
            accel_g: self.accel_enabled.then_some(self.accel_range_g),
            gyro_dps: self.gyro_enabled.then_some(self.gyro_range_dps),
        }
    }

    pub fn axis_count(&self) -> usize {
        self.ranges().axis_count()
    }
}

/// Sample ring buffer geometry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Frame slots; must be a power of two
    pub capacity: usize,
    /// Frames delivered per sensor interrupt; must divide `capacity`
    pub samples_per_packet: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            samples_per_packet: 1,
        }
    }
}

/// Majority-vote smoothing parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingConfig {
    /// Verdicts in the vote window (odd)
    pub window_size: usize,
    /// Class ids known to the classifier, including the unknown id
    pub num_classes: usize,
    /// Class the window is seeded with and shown at startup
    pub seed_class: u8,
    /// Id the classifier reports when nothing matches
    pub unknown_class: u8,
    /// Hold decisions until the window holds only real verdicts
    pub hold_until_primed: bool,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            window_size: 3,
            num_classes: 7,
            seed_class: 1,
            unknown_class: 0,
            hold_until_primed: false,
        }
    }
}

/// Indicator patterns and alert timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub patterns: Vec<ClassPattern>,
    /// Blink period for classes missing from `patterns`
    pub default_blink_ms: u32,
    /// How long the overrun alert is shown before capture resumes
    pub alert_duration_ms: u64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
            default_blink_ms: DEFAULT_BLINK_MS,
            alert_duration_ms: 5000,
        }
    }
}

/// Recognition report output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub enabled: bool,
    /// Append the feature vector to each report
    pub include_features: bool,
    /// Reports buffered between the loop and the writer
    pub queue_capacity: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_features: true,
            queue_capacity: 64,
        }
    }
}

impl AppConfig {
    /// Check every startup constraint.
    ///
    /// # Errors
    /// The first violated constraint, checked in order: buffer geometry,
    /// sensor axes/rate/ranges, vote window, class table, indicator patterns.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacity = self.buffer.capacity;
        if !capacity.is_power_of_two() {
            return Err(ConfigError::CapacityNotPowerOfTwo { capacity });
        }
        let per_packet = self.buffer.samples_per_packet;
        if per_packet == 0 || capacity % per_packet != 0 {
            return Err(ConfigError::PacketNotFactor {
                samples_per_packet: per_packet,
                capacity,
            });
        }

        let sensor = &self.sensor;
        let model = sensor.model;
        if !sensor.accel_enabled && !sensor.gyro_enabled {
            return Err(ConfigError::NoAxesEnabled);
        }
        if !model.sample_rates_hz().contains(&sensor.sample_rate_hz) {
            return Err(ConfigError::SampleRateUnsupported {
                sensor: model.name(),
                rate_hz: sensor.sample_rate_hz,
            });
        }
        if sensor.accel_enabled && !model.accel_ranges_g().contains(&sensor.accel_range_g) {
            return Err(ConfigError::RangeUnsupported {
                sensor: model.name(),
                kind: "accel",
                value: sensor.accel_range_g,
            });
        }
        if sensor.gyro_enabled && !model.gyro_ranges_dps().contains(&sensor.gyro_range_dps) {
            return Err(ConfigError::RangeUnsupported {
                sensor: model.name(),
                kind: "gyro",
                value: sensor.gyro_range_dps,
            });
        }

        let voting = &self.voting;
        if voting.window_size % 2 == 0 {
            return Err(ConfigError::WindowSizeEven {
                window_size: voting.window_size,
            });
        }
        if !(2..=256).contains(&voting.num_classes) {
            return Err(ConfigError::ClassTableInvalid {
                reason: format!("num_classes {} outside 2..=256", voting.num_classes),
            });
        }
        for (what, id) in [("seed_class", voting.seed_class), ("unknown_class", voting.unknown_class)] {
            if id as usize >= voting.num_classes {
                return Err(ConfigError::ClassTableInvalid {
                    reason: format!("{} {} not below num_classes {}", what, id, voting.num_classes),
                });
            }
        }

        if self.indicator.default_blink_ms == 0 {
            return Err(ConfigError::PatternInvalid { class_id: None });
        }
        for row in &self.indicator.patterns {
            let zero_blink = row.pattern == IndicatorPattern::Blink { period_ms: 0 };
            if zero_blink || row.class_id as usize >= voting.num_classes {
                return Err(ConfigError::PatternInvalid {
                    class_id: Some(row.class_id),
                });
            }
        }

        Ok(())
    }

    /// Strict load: read, parse and validate.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path).map_err(|err| ConfigError::ReadFailed {
            path: path.as_ref().display().to_string(),
            reason: err.to_string(),
        })?;
        let config: AppConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON file
    ///
    /// Falls back to defaults (with a warning) when the file is missing or
    /// not valid JSON. The result is not validated.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }
}
