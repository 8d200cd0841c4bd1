//! Single-producer, multi-consumer frame queue over named shared memory.
//!
//! # Design
//! - **Producer**: never moves a consumer cursor. When a push overtakes the
//!   slowest registered consumer (`min_read_pos`) or wraps the ring, it raises
//!   `was_overwritten` on every active slot.
//! - **Consumers**: each registered handle owns one slot of
//!   `MAX_CONSUMERS`. A consumer that finds its cursor lapped, torn or pointing
//!   at garbage snaps to the producer's current `write_pos` and carries on.
//! - **Registration**: guarded by a spinlock in the segment. New consumers
//!   start at "now" and never see frames pushed before they registered.
//!
//! # Thread Safety
//! A handle is `Send` but not `Sync`; share the queue across threads by
//! opening one handle per consumer.

use crate::error::{PushError, QueueError};
use crate::layout::{FIRST_SEQUENCE, MAX_CONSUMERS, SpmcHeader};
use crate::ring::{Entry, Ring, admit};
use crate::segment::{self, Mapping};
use crate::view::FrameView;
use quartz_frame::{Frame, FrameRef};
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

/// Successful pops between attempts to refresh `min_read_pos`.
pub const MIN_READ_REFRESH_INTERVAL: u64 = 4;

/// Outcome of looking for the next entry on a consumer slot.
enum Next {
    Empty,
    Resync,
    Ready(Entry),
}

/// A handle on a multi-consumer frame queue.
///
/// The producer handle pushes; every consumer handle registers for a slot and
/// then pops independently. Dropping a registered handle frees its slot.
pub struct MultiConsumerFrameQueue<const MAX_FRAME_SIZE: usize> {
    map: Mapping<SpmcHeader>,
    consumer_id: Option<usize>,
    overruns: u64,
    pops: u64,
    /// Copy target of `try_pop_into`; swapped with the caller's frame on success.
    scratch: Frame,
}

impl<const MAX_FRAME_SIZE: usize> MultiConsumerFrameQueue<MAX_FRAME_SIZE> {
    /// Create the named queue, replacing any stale object with the same name.
    pub fn create(name: &str, frame_count: usize) -> Result<Self, QueueError> {
        segment::unlink(name)?;
        let map = Mapping::<SpmcHeader>::create(name, frame_count, MAX_FRAME_SIZE)?;
        info!(
            queue = map.name(),
            capacity = map.ring().capacity(),
            max_frame_size = MAX_FRAME_SIZE,
            max_consumers = MAX_CONSUMERS,
            "queue: created multi-consumer queue"
        );
        Ok(Self::with_mapping(map))
    }

    /// Attach to an existing queue. The handle pops nothing until
    /// [`register_consumer`](Self::register_consumer) succeeds.
    pub fn open(name: &str) -> Result<Self, QueueError> {
        let map = Mapping::<SpmcHeader>::open(name, MAX_FRAME_SIZE)?;
        info!(
            queue = map.name(),
            capacity = map.ring().capacity(),
            "queue: opened multi-consumer queue"
        );
        Ok(Self::with_mapping(map))
    }

    fn with_mapping(map: Mapping<SpmcHeader>) -> Self {
        Self {
            map,
            consumer_id: None,
            overruns: 0,
            pops: 0,
            scratch: Frame::default(),
        }
    }

    /// Unlink the named queue. Idempotent; existing mappings stay usable.
    pub fn close(name: &str) -> Result<(), QueueError> {
        segment::unlink(name)?;
        info!(queue = name, "queue: closed");
        Ok(())
    }

    /// Claim a consumer slot starting at the producer's current position.
    ///
    /// Registering an already registered handle returns its existing id.
    pub fn register_consumer(&mut self) -> Result<usize, QueueError> {
        if let Some(id) = self.consumer_id {
            return Ok(id);
        }

        let header = self.map.header();
        let _guard = header.registry.lock.lock();

        let id = header
            .slots
            .iter()
            .position(|s| !s.active.load(Ordering::Acquire))
            .ok_or(QueueError::FanOutExhausted { max: MAX_CONSUMERS })?;

        let slot = &header.slots[id];
        let write = header.producer.write_pos.load(Ordering::Acquire);
        slot.read_pos.store(write, Ordering::Release);
        slot.was_overwritten.store(false, Ordering::Release);
        slot.active.store(true, Ordering::Release);
        header.refresh_min_read_pos();

        info!(queue = self.map.name(), consumer = id, at = write, "queue: consumer registered");
        self.consumer_id = Some(id);
        Ok(id)
    }

    /// Release this handle's slot. Returns `false` if it held none.
    pub fn unregister_consumer(&mut self) -> bool {
        let Some(id) = self.consumer_id.take() else {
            return false;
        };

        let header = self.map.header();
        let _guard = header.registry.lock.lock();
        header.slots[id].active.store(false, Ordering::Release);
        header.refresh_min_read_pos();

        info!(queue = self.map.name(), consumer = id, "queue: consumer unregistered");
        true
    }

    /// Push a frame. Consumers that fall more than a ring behind lose data and
    /// resynchronise on their next pop.
    pub fn try_push<'f>(&mut self, frame: impl Into<FrameRef<'f>>) -> Result<(), PushError> {
        let frame = frame.into();
        let header = self.map.header();
        let ring = self.map.ring();

        let stride = match admit(&frame, MAX_FRAME_SIZE as u64, ring.capacity()) {
            Ok(stride) => stride,
            Err(e) => {
                warn!(queue = self.map.name(), error = %e, "queue: frame rejected");
                return Err(e);
            }
        };

        let write = header.producer.write_pos.load(Ordering::Relaxed);
        let start = ring.placement(write, stride);
        let end = start + stride;

        let min_read = header.registry.min_read_pos.load(Ordering::Acquire);
        let overtaking = end.saturating_sub(min_read) > ring.capacity();
        let wrapping = start != write;
        if overtaking || wrapping {
            for slot in header.active_slots() {
                slot.was_overwritten.store(true, Ordering::Release);
            }
            debug!(
                queue = self.map.name(),
                overtaking,
                wrapping,
                min_read,
                "queue: flagged consumers"
            );
        }

        let end = ring.write_claimed(&header.producer, write, start, &frame);
        header.producer.write_pos.store(end, Ordering::Release);
        Ok(())
    }

    fn next_entry(header: &SpmcHeader, ring: &Ring, id: usize) -> Next {
        let slot = &header.slots[id];
        if !slot.active.load(Ordering::Acquire) {
            return Next::Empty;
        }

        let read = slot.read_pos.load(Ordering::Acquire);
        let write = header.producer.write_pos.load(Ordering::Acquire);
        if read >= write {
            // Caught up: whatever the flag warned about has been consumed.
            slot.was_overwritten.store(false, Ordering::Release);
            return Next::Empty;
        }

        let pos = ring.skip_wrap_gap(&header.producer, read);
        if !ring.is_intact(&header.producer, pos) {
            return Next::Resync;
        }
        match ring.locate(pos) {
            Some(entry) if entry.end() <= write => Next::Ready(entry),
            _ => Next::Resync,
        }
    }

    /// Snap the slot to the producer's position.
    fn resync(header: &SpmcHeader, id: usize) -> u64 {
        let slot = &header.slots[id];
        let lost_from = slot.read_pos.load(Ordering::Relaxed);
        let write = header.producer.write_pos.load(Ordering::Acquire);
        slot.read_pos.store(write, Ordering::Release);
        slot.was_overwritten.store(false, Ordering::Release);
        write.saturating_sub(lost_from)
    }

    /// Shared pop path. `read` copies what it needs from the located entry;
    /// the copy is discarded if the producer reached the entry meanwhile.
    fn pop_with(&mut self, read: impl FnOnce(&Ring, &Entry)) -> Option<Entry> {
        let id = self.consumer_id?;
        let header = self.map.header();
        let ring = self.map.ring();

        let outcome = match Self::next_entry(header, ring, id) {
            Next::Empty => return None,
            Next::Resync => Next::Resync,
            Next::Ready(entry) => {
                read(ring, &entry);
                if ring.is_intact(&header.producer, entry.pos) {
                    Next::Ready(entry)
                } else {
                    Next::Resync
                }
            }
        };

        match outcome {
            Next::Ready(entry) => {
                let slot = &header.slots[id];
                slot.read_pos.store(entry.end(), Ordering::Release);
                slot.was_overwritten.store(false, Ordering::Release);
                self.after_pop();
                Some(entry)
            }
            _ => {
                let skipped = Self::resync(header, id);
                debug!(queue = self.map.name(), consumer = id, skipped, "queue: consumer resynced");
                self.overruns += 1;
                None
            }
        }
    }

    fn after_pop(&mut self) {
        self.pops += 1;
        if self.pops % MIN_READ_REFRESH_INTERVAL != 0 {
            return;
        }
        let header = self.map.header();
        if let Some(_guard) = header.registry.lock.try_lock() {
            header.refresh_min_read_pos();
        }
    }

    /// Pop the next frame for this consumer into a new allocation.
    pub fn try_pop(&mut self) -> Option<Frame> {
        let mut frame = Frame::default();
        self.try_pop_into(&mut frame).then_some(frame)
    }

    /// Pop the next frame for this consumer into `frame`, reusing its buffer.
    ///
    /// Returns `false` when unregistered, caught up, or after a resync; `frame`
    /// is then left as it was.
    pub fn try_pop_into(&mut self, frame: &mut Frame) -> bool {
        let mut scratch = std::mem::take(&mut self.scratch);
        let popped = self
            .pop_with(|ring, entry| scratch.assign(&entry.header, ring.payload(entry)))
            .is_some();
        if popped {
            std::mem::swap(frame, &mut scratch);
        }
        self.scratch = scratch;
        popped
    }

    /// Pop the next frame for this consumer without copying it.
    pub fn try_pop_zero_copy(&mut self) -> Option<FrameView<'_>> {
        let entry = self.pop_with(|_, _| {})?;
        let ring = self.map.ring();
        let frame = FrameRef::from_header(&entry.header, ring.payload(&entry));
        Some(FrameView::new(frame, entry.pos, ring, &self.map.header().producer))
    }

    /// Normalised shared-memory name, with a leading `/`.
    pub fn name(&self) -> &str {
        self.map.name()
    }

    /// Ring size in bytes.
    pub fn capacity(&self) -> u64 {
        self.map.ring().capacity()
    }

    /// Producer cursor: end of the last published entry.
    pub fn write_pos(&self) -> u64 {
        self.map.header().producer.write_pos.load(Ordering::Acquire)
    }

    /// Lowest read cursor among registered consumers as of the last refresh.
    pub fn min_read_pos(&self) -> u64 {
        self.map.header().registry.min_read_pos.load(Ordering::Acquire)
    }

    /// Slot held by this handle, if registered.
    pub fn consumer_id(&self) -> Option<usize> {
        self.consumer_id
    }

    /// Whether this handle holds a consumer slot.
    pub fn is_consumer(&self) -> bool {
        self.consumer_id.is_some()
    }

    /// This consumer's cursor, if registered.
    pub fn read_pos(&self) -> Option<u64> {
        let id = self.consumer_id?;
        Some(self.map.header().slots[id].read_pos.load(Ordering::Acquire))
    }

    /// Whether the producer flagged this consumer since its last pop.
    pub fn was_overwritten(&self) -> bool {
        self.consumer_id.is_some_and(|id| {
            self.map.header().slots[id].was_overwritten.load(Ordering::Acquire)
        })
    }

    /// Times this handle had to resynchronise.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Number of slots currently registered, across all processes.
    pub fn active_consumers(&self) -> usize {
        self.map.header().active_slots().count()
    }

    /// Frames pushed since the queue was created.
    pub fn frames_pushed(&self) -> u64 {
        let next = self.map.header().producer.next_sequence.load(Ordering::Relaxed);
        next - FIRST_SEQUENCE
    }
}

impl<const MAX_FRAME_SIZE: usize> Drop for MultiConsumerFrameQueue<MAX_FRAME_SIZE> {
    fn drop(&mut self) {
        self.unregister_consumer();
    }
}
