//! Single-producer, single-consumer frame queue over named shared memory.
//!
//! # Design
//! - **Producer**: owns `write_pos`. When a new entry would overlap bytes the
//!   consumer has not read, it evicts the oldest entries by advancing
//!   `read_pos` itself and raises `was_overwritten`.
//! - **Consumer**: owns `read_pos` otherwise. It commits every pop with a CAS,
//!   so an eviction that raced with the read is detected and the copy is
//!   dropped.
//!
//! The queue is lossy: overflow keeps the newest frames, in push order.

use crate::error::{PushError, QueueError};
use crate::layout::{FIRST_SEQUENCE, SpscHeader};
use crate::ring::{Entry, admit};
use crate::segment::{self, Mapping};
use crate::view::FrameView;
use quartz_frame::{Frame, FrameRef};
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

/// A handle on a single-consumer frame queue.
///
/// One process pushes, one process pops. `MAX_FRAME_SIZE` is the largest
/// payload in bytes; producer and consumer must agree on it, and `open`
/// rejects a segment created with a different value.
pub struct FrameQueue<const MAX_FRAME_SIZE: usize> {
    map: Mapping<SpscHeader>,
    overruns: u64,
    /// Copy target of `try_pop_into`; swapped with the caller's frame on success.
    scratch: Frame,
}

impl<const MAX_FRAME_SIZE: usize> FrameQueue<MAX_FRAME_SIZE> {
    /// Create (or recreate) the named queue with room for `frame_count` frames
    /// of `MAX_FRAME_SIZE` bytes. The ring is rounded up to whole pages.
    pub fn create(name: &str, frame_count: usize) -> Result<Self, QueueError> {
        let map = Mapping::<SpscHeader>::create(name, frame_count, MAX_FRAME_SIZE)?;
        info!(
            queue = map.name(),
            capacity = map.ring().capacity(),
            max_frame_size = MAX_FRAME_SIZE,
            "queue: created single-consumer queue"
        );
        Ok(Self::with_mapping(map))
    }

    /// Attach to a queue created by another process.
    pub fn open(name: &str) -> Result<Self, QueueError> {
        let map = Mapping::<SpscHeader>::open(name, MAX_FRAME_SIZE)?;
        info!(
            queue = map.name(),
            capacity = map.ring().capacity(),
            "queue: opened single-consumer queue"
        );
        Ok(Self::with_mapping(map))
    }

    fn with_mapping(map: Mapping<SpscHeader>) -> Self {
        Self {
            map,
            overruns: 0,
            scratch: Frame::default(),
        }
    }

    /// Unlink the named queue. Idempotent; existing mappings stay usable.
    pub fn close(name: &str) -> Result<(), QueueError> {
        segment::unlink(name)?;
        info!(queue = name, "queue: closed");
        Ok(())
    }

    /// Push a frame, evicting the oldest entries when the ring is full.
    ///
    /// Producer only. A rejected frame leaves the queue untouched.
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

        let evicted = self.evict_until_fits(write, start, end);
        if evicted > 0 {
            header.consumer.was_overwritten.store(true, Ordering::Release);
            debug!(queue = self.map.name(), evicted, "queue: evicted oldest frames");
        }
        if start != write {
            debug!(queue = self.map.name(), at = write, "queue: wrapped");
        }

        let end = ring.write_claimed(&header.producer, write, start, &frame);
        header.producer.write_pos.store(end, Ordering::Release);
        Ok(())
    }

    /// Advance `read_pos` entry by entry until `[.., end)` no longer overlaps
    /// unread bytes. Returns how many unread entries were dropped.
    fn evict_until_fits(&self, write: u64, start: u64, end: u64) -> u64 {
        let header = self.map.header();
        let ring = self.map.ring();
        let mut evicted = 0;

        loop {
            let read = header.consumer.read_pos.load(Ordering::Acquire);
            if end.saturating_sub(read) <= ring.capacity() {
                return evicted;
            }

            let (next, dropped) = if read >= write {
                // Nothing unread; only the wrap gap is in the way.
                (start, 0)
            } else {
                match ring.locate(ring.skip_wrap_gap(&header.producer, read)) {
                    Some(entry) if entry.end() <= write => (entry.end(), 1),
                    _ => (start, 1),
                }
            };

            // A failed CAS means the consumer moved first; re-check from there.
            if header
                .consumer
                .read_pos
                .compare_exchange(read, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                evicted += dropped;
            }
        }
    }

    /// Next readable entry and the `read_pos` it was found from.
    fn peek(&self) -> Option<(u64, Entry)> {
        let header = self.map.header();
        let ring = self.map.ring();

        let read = header.consumer.read_pos.load(Ordering::Acquire);
        let write = header.producer.write_pos.load(Ordering::Acquire);
        if read >= write {
            return None;
        }

        let entry = ring.locate(ring.skip_wrap_gap(&header.producer, read))?;
        (entry.end() <= write).then_some((read, entry))
    }

    /// Move `read_pos` past `entry`. Fails when the producer evicted it first.
    fn commit(&mut self, read: u64, entry: &Entry) -> bool {
        let consumer = &self.map.header().consumer;
        if consumer
            .read_pos
            .compare_exchange(read, entry.end(), Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if consumer.was_overwritten.swap(false, Ordering::AcqRel) {
            self.overruns += 1;
        }
        true
    }

    /// Pop the oldest frame into a new allocation.
    pub fn try_pop(&mut self) -> Option<Frame> {
        let mut frame = Frame::default();
        self.try_pop_into(&mut frame).then_some(frame)
    }

    /// Pop the oldest frame into `frame`, reusing its buffer.
    ///
    /// Consumer only. Returns `false` when the queue is empty or the entry was
    /// evicted while being copied; `frame` is then left as it was.
    pub fn try_pop_into(&mut self, frame: &mut Frame) -> bool {
        let Some((read, entry)) = self.peek() else {
            return false;
        };
        self.copy_and_commit(read, &entry, frame)
    }

    fn copy_and_commit(&mut self, read: u64, entry: &Entry, frame: &mut Frame) -> bool {
        self.scratch.assign(&entry.header, self.map.ring().payload(entry));
        if !self.commit(read, entry) {
            return false;
        }
        std::mem::swap(frame, &mut self.scratch);
        true
    }

    /// Pop the oldest frame without copying it out of shared memory.
    ///
    /// The view aliases the ring; see [`FrameView`] for how long it stays
    /// valid.
    pub fn try_pop_zero_copy(&mut self) -> Option<FrameView<'_>> {
        let (read, entry) = self.peek()?;
        if !self.commit(read, &entry) {
            return None;
        }
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

    /// Consumer cursor: start of the next entry to pop.
    pub fn read_pos(&self) -> u64 {
        self.map.header().consumer.read_pos.load(Ordering::Acquire)
    }

    /// Set by the producer when it evicted frames this consumer had not read.
    pub fn was_overwritten(&self) -> bool {
        self.map.header().consumer.was_overwritten.load(Ordering::Acquire)
    }

    /// Pops by this handle that followed an eviction.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Frames pushed since the queue was created.
    pub fn frames_pushed(&self) -> u64 {
        let next = self.map.header().producer.next_sequence.load(Ordering::Relaxed);
        next - FIRST_SEQUENCE
    }
}
