//! Capture interrupt handler and the state it shares with the acquisition loop.
//!
//! The handler runs once per sensor data-ready interrupt. It is a dedicated
//! type invoked by the board's interrupt dispatch and must stay real-time
//! safe:
//! - no heap allocation, no locks, no logging
//! - never retries a failed bus transaction
//! - never calls back into the loop
//!
//! # State machine
//! ```text
//! Idle --irq--> Capturing --slot + read ok--> Idle        (commit)
//!                         --no free slot----> Overrun     (flag set, no read)
//!                         --read error------> Faulted     (status recorded)
//! Overrun --irq--> Overrun                                 (no-op)
//! Overrun --loop recovery (disable, reset, clear, enable)--> Idle
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ring_buffer::SampleProducer;
use super::ProducerQuiesced;
use crate::board::SensorTransport;
use crate::error::SensorError;

const STATUS_OK: u8 = 0;

/// Flags and counters shared between the interrupt and the loop.
///
/// Every field has exactly one writer:
/// - `overrun`: set by the interrupt; cleared by the loop only while the
///   producer is quiesced
/// - `sensor_status`, `frames_captured`, `overruns`: interrupt only
#[derive(Debug, Default)]
pub struct CaptureShared {
    overrun: AtomicBool,
    sensor_status: AtomicU8,
    frames_captured: AtomicU64,
    overruns: AtomicU32,
}

/// Snapshot of capture counters for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub overruns: u32,
}

impl CaptureShared {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the interrupt has flagged an overrun not yet recovered.
    pub fn overrun_pending(&self) -> bool {
        self.overrun.load(Ordering::Acquire)
    }

    /// Persistent sensor fault recorded by the interrupt, if any.
    pub fn sensor_fault(&self) -> Option<SensorError> {
        SensorError::from_status_byte(self.sensor_status.load(Ordering::Acquire))
    }

    /// Clear the overrun flag (loop side, producer quiesced).
    pub fn clear_overrun(&self, _quiesced: &ProducerQuiesced<'_>) {
        self.overrun.store(false, Ordering::Release);
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }

    fn raise_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
        self.overrun.store(true, Ordering::Release);
    }

    fn record_fault(&self, err: SensorError) {
        self.sensor_status
            .store(err.status_byte(), Ordering::Release);
    }

    fn is_healthy(&self) -> bool {
        self.sensor_status.load(Ordering::Acquire) == STATUS_OK
    }
}

/// Result of one interrupt, mainly for tests and the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Packet committed; `remaining` free slots before this write.
    Captured { remaining: usize },
    /// No room for a whole packet; overrun flag raised, sensor not read.
    Overrun,
    /// Overrun still pending; nothing done.
    Suppressed,
    /// Sensor read failed; status recorded, slot not committed.
    Faulted(SensorError),
    /// A fault was recorded earlier; nothing done.
    Halted,
}

/// Capture interrupt handler. Owns the producer half and the sensor.
pub struct CaptureIsr<S: SensorTransport> {
    producer: SampleProducer,
    sensor: S,
    shared: Arc<CaptureShared>,
    packet: usize,
}

impl<S: SensorTransport> CaptureIsr<S> {
    pub fn new(producer: SampleProducer, sensor: S, shared: Arc<CaptureShared>) -> Self {
        Self {
            producer,
            sensor,
            shared,
            packet: 1,
        }
    }

    /// Frames read per interrupt (sensor FIFO watermark). Clamped to
    /// `1..=capacity`; a packet is only started when all of it fits.
    pub fn with_packet_size(mut self, frames: usize) -> Self {
        self.packet = frames.clamp(1, self.producer.capacity());
        self
    }

    pub fn packet_size(&self) -> usize {
        self.packet
    }

    /// Handle one data-ready interrupt.
    pub fn on_interrupt(&mut self) -> CaptureOutcome {
        // Errors flagged earlier must be acknowledged by the loop first
        if !self.shared.is_healthy() {
            return CaptureOutcome::Halted;
        }
        if self.shared.overrun_pending() {
            return CaptureOutcome::Suppressed;
        }

        let remaining = self.producer.remaining();
        if remaining < self.packet {
            self.shared.raise_overrun();
            return CaptureOutcome::Overrun;
        }

        // Frames committed before a failed read stay visible to the loop
        for _ in 0..self.packet {
            let Some(mut slot) = self.producer.try_get_write_slot() else {
                break;
            };
            match self.sensor.read_frame() {
                Ok(frame) => {
                    *slot.frame_mut() = frame;
                    slot.commit_write();
                    self.shared.frames_captured.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    self.shared.record_fault(err);
                    return CaptureOutcome::Faulted(err);
                }
            }
        }
        CaptureOutcome::Captured { remaining }
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }
}
