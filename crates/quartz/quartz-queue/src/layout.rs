//! Shared memory layout of a frame queue segment.
//!
//! Every field group sits on its own cache line so the producer's cursors,
//! each consumer's cursor and the registration bookkeeping never share a
//! line. All offsets are fixed; both sides of the queue compile the same
//! `#[repr(C)]` structs.
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Preamble        magic │ version │ kind │ capacity │ max_frame │  64B
//! ├──────────────────────────────────────────────────────────────┤
//! │ ProducerCursors write_pos │ claim_pos │ wrap_pos │ next_seq   │  64B
//! ├──────────────────────────────────────────────────────────────┤
//! │ single consumer:  ConsumerSlot                               │  64B
//! │ multi consumer:   Registry + ConsumerSlot[MAX_CONSUMERS]      │  64B × (1 + N)
//! ├──────────────────────────────────────────────────────────────┤
//! │ ring: [FrameHeader][payload][pad] [FrameHeader][payload] ...  │  capacity
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cursors are byte positions extended with a lap count: the ring offset is
//! `pos % capacity`, and wrapping jumps to the next multiple of `capacity`.
//! `read == write` therefore always means empty.

use crate::spinlock::RegistrationLock;
use quartz_frame::FRAME_HEADER_SIZE;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// ASCII "QUARTZRB" (Quartz Ring Buffer).
pub const QUEUE_MAGIC: u64 = 0x5155_4152_545A_5242;

/// Bump on any incompatible change to the structs below.
pub const QUEUE_VERSION: u32 = 1;

/// Upper bound on simultaneously registered consumers of one queue.
pub const MAX_CONSUMERS: usize = 8;

/// Alignment of every control-block group and of every ring entry.
pub const CACHE_LINE: u64 = 64;

/// First `next_sequence` value; 0 is reserved for frames never queued.
pub const FIRST_SEQUENCE: u64 = 1;

/// Which queue type a segment was created for, recorded in the preamble.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueKind {
    SingleConsumer = 1,
    MultiConsumer = 2,
}

/// Immutable description of the segment, written once by `create`.
#[repr(C, align(64))]
pub struct Preamble {
    /// Must equal [`QUEUE_MAGIC`].
    pub magic: u64,
    /// Must equal [`QUEUE_VERSION`].
    pub version: u32,
    /// A [`QueueKind`] discriminant.
    pub kind: u32,
    /// Ring bytes following the control block.
    pub capacity: u64,
    /// Largest payload a producer may push, in bytes.
    pub max_frame_size: u64,
}

impl Preamble {
    pub fn new(kind: QueueKind, capacity: u64, max_frame_size: u64) -> Self {
        Self {
            magic: QUEUE_MAGIC,
            version: QUEUE_VERSION,
            kind: kind as u32,
            capacity,
            max_frame_size,
        }
    }

    /// Check a preamble found in an existing segment.
    ///
    /// `capacity` is what the segment size implies; it must agree with the
    /// value recorded at creation.
    pub fn validate(
        &self,
        kind: QueueKind,
        capacity: u64,
        max_frame_size: u64,
    ) -> Result<(), &'static str> {
        if self.magic != QUEUE_MAGIC {
            return Err("bad magic");
        }
        if self.version != QUEUE_VERSION {
            return Err("wrong version");
        }
        if self.kind != kind as u32 {
            return Err("queue kind mismatch");
        }
        if self.capacity != capacity {
            return Err("capacity does not match segment size");
        }
        if self.capacity % CACHE_LINE != 0 {
            return Err("capacity must be cache-line aligned");
        }
        if self.max_frame_size != max_frame_size {
            return Err("max frame size mismatch");
        }
        Ok(())
    }
}

/// Cursors written only by the producer.
#[repr(C, align(64))]
pub struct ProducerCursors {
    /// End of the last published entry.
    pub write_pos: AtomicU64,
    /// End of the entry currently being written; published before its bytes.
    pub claim_pos: AtomicU64,
    /// Position where the latest lap's unused tail begins.
    pub wrap_pos: AtomicU64,
    /// Sequence number stamped on the next pushed frame.
    pub next_sequence: AtomicU64,
}

impl ProducerCursors {
    pub fn new() -> Self {
        Self {
            write_pos: AtomicU64::new(0),
            claim_pos: AtomicU64::new(0),
            wrap_pos: AtomicU64::new(u64::MAX),
            next_sequence: AtomicU64::new(FIRST_SEQUENCE),
        }
    }
}

/// One reader's cursor. The single-consumer queue has one, the
/// multi-consumer queue an array of `MAX_CONSUMERS`.
#[repr(C, align(64))]
pub struct ConsumerSlot {
    /// Start of the next entry this reader will pop.
    pub read_pos: AtomicU64,
    /// Set when the producer may have destroyed data this reader had not
    /// consumed yet; cleared by the reader.
    pub was_overwritten: AtomicBool,
    /// Multi-consumer only: slot is held by a registered reader.
    pub active: AtomicBool,
}

impl ConsumerSlot {
    pub fn new() -> Self {
        Self {
            read_pos: AtomicU64::new(0),
            was_overwritten: AtomicBool::new(false),
            active: AtomicBool::new(false),
        }
    }
}

/// Multi-consumer bookkeeping guarded by the registration lock.
#[repr(C, align(64))]
pub struct Registry {
    /// Lowest read cursor among active consumers.
    pub min_read_pos: AtomicU64,
    /// Serialises registration and `min_read_pos` refreshes.
    pub lock: RegistrationLock,
}

/// Control block of a single-consumer segment.
#[repr(C)]
pub struct SpscHeader {
    pub preamble: Preamble,
    pub producer: ProducerCursors,
    pub consumer: ConsumerSlot,
}

/// Control block of a multi-consumer segment.
#[repr(C)]
pub struct SpmcHeader {
    pub preamble: Preamble,
    pub producer: ProducerCursors,
    pub registry: Registry,
    pub slots: [ConsumerSlot; MAX_CONSUMERS],
}

impl SpmcHeader {
    /// Slots currently held by a registered consumer.
    pub fn active_slots(&self) -> impl Iterator<Item = &ConsumerSlot> {
        self.slots.iter().filter(|s| s.active.load(Ordering::Acquire))
    }

    /// Recompute `min_read_pos` from the active slots; with no consumers the
    /// watermark follows the producer.
    pub fn refresh_min_read_pos(&self) {
        let write = self.producer.write_pos.load(Ordering::Acquire);
        let min = self
            .active_slots()
            .map(|s| s.read_pos.load(Ordering::Acquire))
            .min()
            .unwrap_or(write);
        self.registry.min_read_pos.store(min, Ordering::Release);
    }
}

/// A control block that can sit at the start of a queue segment.
pub(crate) trait ControlBlock {
    const KIND: QueueKind;

    fn initial(capacity: u64, max_frame_size: u64) -> Self;

    fn preamble(&self) -> &Preamble;
}

impl ControlBlock for SpscHeader {
    const KIND: QueueKind = QueueKind::SingleConsumer;

    fn initial(capacity: u64, max_frame_size: u64) -> Self {
        Self {
            preamble: Preamble::new(Self::KIND, capacity, max_frame_size),
            producer: ProducerCursors::new(),
            consumer: ConsumerSlot::new(),
        }
    }

    fn preamble(&self) -> &Preamble {
        &self.preamble
    }
}

impl ControlBlock for SpmcHeader {
    const KIND: QueueKind = QueueKind::MultiConsumer;

    fn initial(capacity: u64, max_frame_size: u64) -> Self {
        Self {
            preamble: Preamble::new(Self::KIND, capacity, max_frame_size),
            producer: ProducerCursors::new(),
            registry: Registry {
                min_read_pos: AtomicU64::new(0),
                lock: RegistrationLock::new(),
            },
            slots: std::array::from_fn(|_| ConsumerSlot::new()),
        }
    }

    fn preamble(&self) -> &Preamble {
        &self.preamble
    }
}

/// Bytes one entry with `payload` bytes occupies in the ring: header plus
/// payload, padded so the next header is cache-line aligned.
#[inline]
pub fn entry_stride(payload: u64) -> u64 {
    (FRAME_HEADER_SIZE as u64 + payload).next_multiple_of(CACHE_LINE)
}

/// Ring capacity for `frame_count` frames of up to `max_frame_size` bytes,
/// rounded up to whole pages. `None` if the size does not fit in a `u64`.
pub fn ring_capacity(max_frame_size: usize, frame_count: usize) -> Option<u64> {
    let page = quartz_shm::page_size() as u64;
    let stride = (FRAME_HEADER_SIZE as u64)
        .checked_add(max_frame_size as u64)?
        .checked_next_multiple_of(CACHE_LINE)?;
    let raw = (frame_count as u64).checked_mul(stride)?;
    raw.checked_next_multiple_of(page)
}
