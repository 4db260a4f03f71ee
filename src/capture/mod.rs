// Capture module - interrupt-driven sensor acquisition into a lock-free ring

pub mod frame;
pub mod isr;
pub mod ring_buffer;

pub use frame::{SampleFrame, SampleValue, MAX_AXES};
pub use isr::{CaptureIsr, CaptureOutcome, CaptureShared, CaptureStats};
pub use ring_buffer::{
    SampleChannels, SampleConsumer, SampleProducer, SampleRingBuffer, WriteSlot, DEFAULT_CAPACITY,
};

use crate::board::InterruptControl;

/// Proof that the capture interrupt source is disabled and no handler is
/// mid-write.
///
/// Obtained by [`ProducerQuiesced::disable`] and required by the operations
/// that touch producer-owned state from the loop (buffer reset, overrun
/// clear). [`resume`](ProducerQuiesced::resume) consumes the token and
/// re-enables the source, so recovery steps can only happen in between.
#[must_use = "the interrupt stays disabled until resume() is called"]
pub struct ProducerQuiesced<'a> {
    irq: &'a dyn InterruptControl,
}

impl<'a> ProducerQuiesced<'a> {
    pub fn disable(irq: &'a dyn InterruptControl) -> Self {
        irq.disable();
        Self { irq }
    }

    pub fn resume(self) {
        self.irq.enable();
    }
}
