use crate::error::QueueError;
use crate::layout::{ControlBlock, ring_capacity};
use crate::ring::Ring;
use quartz_frame::FRAME_HEADER_SIZE;
use quartz_shm::ShmSegment;
use std::mem::size_of;
use std::ptr::{self, NonNull};

/// A mapped queue segment: control block `H` followed by the ring.
pub(crate) struct Mapping<H> {
    shm: ShmSegment,
    header: NonNull<H>,
    ring: Ring,
}

// SAFETY: the pointers target the mapping owned by `shm`, which moves with the
// struct. Cross-process access to the bytes goes through atomics.
unsafe impl<H> Send for Mapping<H> {}

impl<H: ControlBlock> Mapping<H> {
    /// Size, map and initialise a fresh segment for `frame_count` frames.
    pub fn create(name: &str, frame_count: usize, max_frame_size: usize) -> Result<Self, QueueError> {
        if frame_count == 0 {
            return Err(QueueError::Sizing("frame_count must be positive"));
        }
        if max_frame_size == 0 {
            return Err(QueueError::Sizing("max frame size must be positive"));
        }

        let (capacity, total) = ring_capacity(max_frame_size, frame_count)
            .and_then(|cap| Some((cap, cap.checked_add(size_of::<H>() as u64)?)))
            .ok_or(QueueError::Sizing("queue size overflows"))?;
        let mut shm = ShmSegment::create(name, total).map_err(|source| QueueError::Shm {
            name: name.to_string(),
            source,
        })?;

        let base = shm.as_mut_ptr();
        // SAFETY: the mapping is at least `size_of::<H>()` bytes, page aligned,
        // and nobody else can have observed a header in a segment that was
        // just truncated to zero.
        unsafe { ptr::write(base as *mut H, H::initial(capacity, max_frame_size as u64)) };

        Self::from_parts(shm, capacity)
    }

    /// Map an existing segment and check it was created for `H` with the same
    /// frame budget. Never writes to the control block.
    pub fn open(name: &str, max_frame_size: usize) -> Result<Self, QueueError> {
        let shm = ShmSegment::open(name).map_err(|source| QueueError::Shm {
            name: name.to_string(),
            source,
        })?;

        if shm.len() < size_of::<H>() + FRAME_HEADER_SIZE {
            return Err(QueueError::Layout {
                name: name.to_string(),
                reason: "segment too small for a queue",
            });
        }
        let capacity = (shm.len() - size_of::<H>()) as u64;

        let mapping = Self::from_parts(shm, capacity)?;
        mapping
            .header()
            .preamble()
            .validate(H::KIND, capacity, max_frame_size as u64)
            .map_err(|reason| QueueError::Layout {
                name: name.to_string(),
                reason,
            })?;
        Ok(mapping)
    }

    fn from_parts(mut shm: ShmSegment, capacity: u64) -> Result<Self, QueueError> {
        let base = shm.as_mut_ptr();
        let header = NonNull::new(base as *mut H).ok_or_else(|| QueueError::Layout {
            name: shm.name().to_string(),
            reason: "null mapping",
        })?;
        // SAFETY: the ring follows the control block inside the same mapping;
        // `size_of::<H>()` is a multiple of 64.
        let ring = unsafe { Ring::new(base.add(size_of::<H>()), capacity) };
        Ok(Self { shm, header, ring })
    }

    #[inline]
    pub fn header(&self) -> &H {
        // SAFETY: initialised by `create` or validated by `open`; the mapping
        // lives as long as `self`.
        unsafe { self.header.as_ref() }
    }

    #[inline]
    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    pub fn name(&self) -> &str {
        self.shm.name()
    }
}

/// Remove a queue's shared-memory object; a missing name is not an error.
pub(crate) fn unlink(name: &str) -> Result<(), QueueError> {
    ShmSegment::unlink(name).map_err(|source| QueueError::Shm {
        name: name.to_string(),
        source,
    })
}
