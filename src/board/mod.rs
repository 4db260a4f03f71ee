//! Board abstractions for the reusable pipeline core.
//!
//! Each trait is a collaborator contract the pipeline consumes without
//! knowing the hardware behind it: the IMU transport, the indicator LEDs,
//! the capture interrupt line and the timer's sub-millisecond counter.
//! [`sim`] provides host implementations used by tests and the simulator.

use serde::{Deserialize, Serialize};

use crate::capture::{CaptureIsr, SampleFrame};
use crate::error::SensorError;

pub mod sim;

/// Enabled measurement ranges passed to [`SensorTransport::configure`].
///
/// `None` means the corresponding axis group is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorRanges {
    pub accel_g: Option<u16>,
    pub gyro_dps: Option<u16>,
}

impl SensorRanges {
    pub fn axis_count(&self) -> usize {
        3 * self.accel_g.is_some() as usize + 3 * self.gyro_dps.is_some() as usize
    }
}

/// Register-level IMU transport.
///
/// `read_frame` is called from interrupt context: it must complete in
/// bounded time and must not retry failed bus transactions.
pub trait SensorTransport: Send {
    fn init(&mut self) -> Result<(), SensorError>;
    fn configure(&mut self, sample_rate_hz: u32, ranges: SensorRanges) -> Result<(), SensorError>;
    fn read_frame(&mut self) -> Result<SampleFrame, SensorError>;
}

/// Physical indicators available on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Status,
    Red,
    Green,
    Blue,
}

impl Indicator {
    pub const ALL: [Indicator; 4] = [
        Indicator::Status,
        Indicator::Red,
        Indicator::Green,
        Indicator::Blue,
    ];

    pub fn index(self) -> usize {
        match self {
            Indicator::Status => 0,
            Indicator::Red => 1,
            Indicator::Green => 2,
            Indicator::Blue => 3,
        }
    }
}

/// Independently settable on/off outputs.
///
/// Takes `&self` because the timer tick toggles the status output while the
/// loop sets patterns; each call is a single pin write on hardware.
pub trait IndicatorOutput: Send + Sync {
    fn set(&self, indicator: Indicator, on: bool);
    fn toggle(&self, indicator: Indicator);

    fn all_off(&self) {
        for indicator in Indicator::ALL {
            self.set(indicator, false);
        }
    }
}

/// Enable/disable control of the capture interrupt source.
pub trait InterruptControl: Send + Sync {
    fn enable(&self);
    /// Mask the source. On return no handler is running and none will start
    /// until [`enable`](Self::enable); a handler already in flight is waited
    /// for.
    fn disable(&self);
    fn is_enabled(&self) -> bool;
}

/// Interrupt line that dispatches to a [`CaptureIsr`].
///
/// `attach` is called once during bring-up while the line is disabled.
pub trait CaptureInterrupt<S: SensorTransport>: InterruptControl {
    fn attach(&self, isr: CaptureIsr<S>);
}

/// Free-running sub-millisecond counter of the tick timer.
pub trait SubTickCounter: Send + Sync {
    /// Microseconds elapsed since the last millisecond tick (0..1000).
    fn elapsed_us(&self) -> u32;
}
