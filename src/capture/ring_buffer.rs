// SampleRingBuffer - lock-free single-producer/single-consumer frame buffer
//
// Fixed-capacity circular buffer of sample frames shared between the capture
// interrupt (producer) and the acquisition loop (consumer). All slots are
// allocated once at startup; neither side allocates, locks or blocks.
//
// Ownership of the shared fields:
// - write index: written only by the producer (and by `reset`, which can only
//   run while the producer is quiesced)
// - read index: written only by the consumer
// - slot contents: written by the producer for indices in [write, read+cap),
//   read by the consumer for indices in [read, write)
//
// Frame flow:
// 1. Interrupt asks for a write slot (none when full)
// 2. Interrupt fills the slot from the sensor
// 3. Interrupt commits, publishing the frame with Release ordering
// 4. Loop takes the contiguous unread run (Acquire on the write index)
// 5. Loop processes the frames and advances the read index (Release)
//
// Indices are free-running and masked on access, which is why the capacity
// must be a power of two.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::frame::SampleFrame;
use super::ProducerQuiesced;
use crate::error::ConfigError;

/// Default number of frame slots.
pub const DEFAULT_CAPACITY: usize = 32;

struct Shared {
    slots: Box<[UnsafeCell<SampleFrame>]>,
    mask: usize,
    write: AtomicUsize,
    read: AtomicUsize,
}

// SAFETY: slot access is partitioned between exactly one producer and one
// consumer by the write/read indices; see the module header.
unsafe impl Sync for Shared {}

impl Shared {
    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// Split ring buffer handles for producer/consumer separation
///
/// Returned by [`SampleRingBuffer::new`]. The producer moves into the capture
/// interrupt handler, the consumer into the acquisition loop.
pub struct SampleChannels {
    pub producer: SampleProducer,
    pub consumer: SampleConsumer,
}

/// Lock-free SPSC ring buffer of [`SampleFrame`]s
///
/// # Example
/// ```ignore
/// let SampleChannels { mut producer, mut consumer } = SampleRingBuffer::new(32, 6)?;
///
/// // Interrupt context:
/// if let Some(mut slot) = producer.try_get_write_slot() {
///     *slot.frame_mut() = sensor.read_frame()?;
///     slot.commit_write();
/// }
///
/// // Loop context:
/// let n = consumer.get_read_batch().len();
/// consumer.advance_read(n);
/// ```
pub struct SampleRingBuffer;

impl SampleRingBuffer {
    /// Allocate `capacity` slots of `axes`-wide frames.
    ///
    /// # Errors
    /// [`ConfigError::CapacityNotPowerOfTwo`] if `capacity` is zero or not a
    /// power of two.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(capacity: usize, axes: usize) -> Result<SampleChannels, ConfigError> {
        if !capacity.is_power_of_two() {
            return Err(ConfigError::CapacityNotPowerOfTwo { capacity });
        }

        // This is the only place where heap allocation occurs
        let slots: Box<[UnsafeCell<SampleFrame>]> = (0..capacity)
            .map(|_| UnsafeCell::new(SampleFrame::zeroed(axes)))
            .collect();

        let shared = Arc::new(Shared {
            slots,
            mask: capacity - 1,
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
        });

        Ok(SampleChannels {
            producer: SampleProducer {
                shared: Arc::clone(&shared),
            },
            consumer: SampleConsumer { shared },
        })
    }
}

/// Producer half. Used only from interrupt context.
pub struct SampleProducer {
    shared: Arc<Shared>,
}

impl SampleProducer {
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Number of free slots.
    pub fn remaining(&self) -> usize {
        let write = self.shared.write.load(Ordering::Relaxed);
        let read = self.shared.read.load(Ordering::Acquire);
        self.capacity() - write.wrapping_sub(read)
    }

    /// Reserve the next free slot, or `None` when the buffer is full.
    ///
    /// The write index only moves when [`WriteSlot::commit_write`] is called;
    /// dropping the slot abandons it.
    pub fn try_get_write_slot(&mut self) -> Option<WriteSlot<'_>> {
        let remaining = self.remaining();
        if remaining == 0 {
            return None;
        }
        let index = self.shared.write.load(Ordering::Relaxed);
        Some(WriteSlot {
            producer: self,
            index,
            remaining,
        })
    }
}

/// A reserved, not yet published, frame slot.
pub struct WriteSlot<'a> {
    producer: &'a mut SampleProducer,
    index: usize,
    remaining: usize,
}

impl WriteSlot<'_> {
    /// Free slots at the time of reservation, including this one.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn frame_mut(&mut self) -> &mut SampleFrame {
        let shared = &self.producer.shared;
        let cell = &shared.slots[self.index & shared.mask];
        // SAFETY: the slot lies in [write, read + capacity), which the consumer
        // never touches, and `&mut self` excludes other producer borrows.
        unsafe { &mut *cell.get() }
    }

    /// Publish the slot to the consumer.
    pub fn commit_write(self) {
        self.producer
            .shared
            .write
            .store(self.index.wrapping_add(1), Ordering::Release);
    }
}

/// Consumer half. Used only from the acquisition loop.
pub struct SampleConsumer {
    shared: Arc<Shared>,
}

impl SampleConsumer {
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Number of committed, unread frames (may span the wrap point).
    pub fn len(&self) -> usize {
        let write = self.shared.write.load(Ordering::Acquire);
        let read = self.shared.read.load(Ordering::Relaxed);
        write.wrapping_sub(read)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All contiguous unread frames, stopping at the physical wrap point.
    ///
    /// After draining this run with [`advance_read`](Self::advance_read), a
    /// second call exposes any frames that wrapped to the start of the array.
    pub fn get_read_batch(&self) -> &[SampleFrame] {
        let write = self.shared.write.load(Ordering::Acquire);
        let read = self.shared.read.load(Ordering::Relaxed);
        let available = write.wrapping_sub(read);
        if available == 0 {
            return &[];
        }

        let start = read & self.shared.mask;
        let contiguous = available.min(self.capacity() - start);

        // SAFETY: slots [read, read + contiguous) were published by the
        // producer (Acquire above) and it will not write them again until the
        // read index moves past them, which needs `&mut self`. `UnsafeCell<T>`
        // has the same layout as `T`.
        unsafe {
            let base = self.shared.slots.as_ptr().add(start) as *const SampleFrame;
            std::slice::from_raw_parts(base, contiguous)
        }
    }

    /// Mark `n` frames consumed, freeing their slots for the producer.
    ///
    /// `n` is clamped to the number of unread frames.
    pub fn advance_read(&mut self, n: usize) {
        let available = self.len();
        debug_assert!(n <= available, "advance_read({}) past {} unread frames", n, available);
        let n = n.min(available);
        let read = self.shared.read.load(Ordering::Relaxed);
        self.shared
            .read
            .store(read.wrapping_add(n), Ordering::Release);
    }

    /// Zero both indices, discarding unread frames.
    ///
    /// The [`ProducerQuiesced`] token proves the capture interrupt is disabled
    /// and any handler that was running has returned, so no write is in flight.
    pub fn reset(&mut self, _quiesced: &ProducerQuiesced<'_>) {
        self.shared.write.store(0, Ordering::Release);
        self.shared.read.store(0, Ordering::Release);
    }

    /// Raw `(write, read)` index pair, for diagnostics.
    pub fn indices(&self) -> (usize, usize) {
        (
            self.shared.write.load(Ordering::Acquire),
            self.shared.read.load(Ordering::Acquire),
        )
    }
}

#[cfg(test)]
#[path = "ring_buffer_tests.rs"]
mod tests;
