//! Byte ring holding `[FrameHeader][payload][pad]` entries.
//!
//! Positions handed to this module are lap-extended cursors (see
//! [`crate::layout`]). An entry never straddles the end of the ring: when it
//! does not fit before `capacity` the producer leaves a wrap marker behind and
//! places the entry at offset 0 of the next lap.
//!
//! ```text
//!  lap n                                              lap n+1
//!  ┌────────┬────────┬────────┬──────────────┐       ┌────────┬───
//!  │ entry  │ entry  │ entry  │ WRAP │ dead  │  -->  │ entry  │ ...
//!  └────────┴────────┴────────┴──────────────┘       └────────┴───
//!                             ^ wrap_pos              ^ next_lap(wrap_pos)
//! ```
//!
//! Torn-read detection uses `claim_pos`: the producer publishes the end of the
//! entry it is about to write before touching any byte, so the bytes at
//! logical position `p` are still intact as long as `claim_pos <= p + capacity`.

use crate::error::PushError;
use crate::layout::{ProducerCursors, entry_stride};
use quartz_frame::{FRAME_HEADER_SIZE, FrameHeader, FrameRef};
use std::ptr;
use std::sync::atomic::{Ordering, fence};

const HEADER_BYTES: u64 = FRAME_HEADER_SIZE as u64;

/// A located entry: its lap-extended position and the header found there.
#[derive(Clone, Copy, Debug)]
pub struct Entry {
    pub pos: u64,
    pub header: FrameHeader,
}

impl Entry {
    /// Position just past this entry's padding; where the next entry starts.
    #[inline]
    pub fn end(&self) -> u64 {
        self.pos + entry_stride(self.header.payload_size)
    }
}

/// View of the ring bytes inside a mapped segment.
#[derive(Clone, Copy)]
pub struct Ring {
    base: *mut u8,
    capacity: u64,
}

impl Ring {
    /// # Safety
    /// `base` must point to `capacity` writable bytes, aligned to 64, that stay
    /// mapped for as long as the ring is used.
    pub unsafe fn new(base: *mut u8, capacity: u64) -> Self {
        Self { base, capacity }
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    #[inline]
    pub fn offset(&self, pos: u64) -> u64 {
        pos % self.capacity
    }

    /// First position of the lap after the one containing `pos`.
    #[inline]
    pub fn next_lap(&self, pos: u64) -> u64 {
        (pos / self.capacity + 1) * self.capacity
    }

    /// Where an entry of `stride` bytes written at `write` actually starts.
    #[inline]
    pub fn placement(&self, write: u64, stride: u64) -> u64 {
        if self.offset(write) + stride <= self.capacity {
            write
        } else {
            self.next_lap(write)
        }
    }

    /// Whether bytes from `pos` onwards have not been reused by the producer.
    ///
    /// Call after reading the bytes; the fence orders those reads before the
    /// `claim_pos` load.
    #[inline]
    pub fn is_intact(&self, cursors: &ProducerCursors, pos: u64) -> bool {
        fence(Ordering::Acquire);
        cursors.claim_pos.load(Ordering::Relaxed) <= pos + self.capacity
    }

    /// Move `pos` past the dead tail of a lap when it sits exactly where the
    /// producer last wrapped.
    ///
    /// The wrap marker alone is not enough: an entry larger than the tail can
    /// overwrite it at offset 0 of the next lap.
    #[inline]
    pub fn skip_wrap_gap(&self, cursors: &ProducerCursors, pos: u64) -> u64 {
        if cursors.wrap_pos.load(Ordering::Acquire) == pos {
            self.next_lap(pos)
        } else {
            pos
        }
    }

    fn read_header(&self, pos: u64) -> FrameHeader {
        // SAFETY: offsets are multiples of 64 below `capacity`, and `capacity`
        // is a multiple of 64, so a whole aligned header is in bounds.
        unsafe {
            let p = self.base.add(self.offset(pos) as usize) as *const FrameHeader;
            ptr::read_volatile(p)
        }
    }

    /// Resolve the entry that starts at or after `pos`.
    ///
    /// Follows a wrap marker (or a header that could not have fit before the
    /// end of the ring) to the next lap once. Returns `None` when no valid
    /// entry is found.
    pub fn locate(&self, mut pos: u64) -> Option<Entry> {
        for _ in 0..2 {
            if self.offset(pos) + HEADER_BYTES > self.capacity {
                pos = self.next_lap(pos);
                continue;
            }

            let header = self.read_header(pos);
            if header.is_wrap_marker() {
                pos = self.next_lap(pos);
                continue;
            }
            if !header.is_valid(self.capacity) {
                return None;
            }
            if self.offset(pos) + entry_stride(header.payload_size) > self.capacity {
                if self.offset(pos) == 0 {
                    return None;
                }
                pos = self.next_lap(pos);
                continue;
            }
            return Some(Entry { pos, header });
        }
        None
    }

    /// Payload bytes of a located entry.
    ///
    /// The slice aliases shared memory; the producer may overwrite it once the
    /// entry is evicted or lapped.
    pub fn payload(&self, entry: &Entry) -> &[u8] {
        // SAFETY: `locate` only returns entries whose stride fits before the
        // end of the ring.
        unsafe {
            let start = self.base.add((self.offset(entry.pos) + HEADER_BYTES) as usize);
            std::slice::from_raw_parts(start, entry.header.payload_size as usize)
        }
    }

    fn write_wrap_marker(&self, pos: u64) {
        // SAFETY: see `read_header`.
        unsafe {
            let p = self.base.add(self.offset(pos) as usize) as *mut FrameHeader;
            ptr::write_volatile(p, FrameHeader::wrap_marker());
        }
    }

    fn write_entry(&self, pos: u64, header: &FrameHeader, payload: &[u8]) {
        // SAFETY: the caller placed the entry with `placement`, so header and
        // payload fit before the end of the ring.
        unsafe {
            let dst = self.base.add(self.offset(pos) as usize);
            ptr::write_volatile(dst as *mut FrameHeader, *header);
            ptr::copy_nonoverlapping(
                payload.as_ptr(),
                dst.add(FRAME_HEADER_SIZE),
                payload.len(),
            );
        }
    }

    /// Producer side: claim `[start, end)`, write the wrap marker if the entry
    /// moved to the next lap, then the header and payload. Returns `end`.
    ///
    /// Does not publish; the caller stores `write_pos` afterwards.
    pub fn write_claimed(
        &self,
        cursors: &ProducerCursors,
        write: u64,
        start: u64,
        frame: &FrameRef<'_>,
    ) -> u64 {
        let end = start + entry_stride(frame.data.len() as u64);
        let wrapping = start != write;

        if wrapping {
            cursors.wrap_pos.store(write, Ordering::Relaxed);
        }
        cursors.claim_pos.store(end, Ordering::Relaxed);
        // Readers must be able to see the claim before any overwritten byte.
        fence(Ordering::Release);

        if wrapping {
            self.write_wrap_marker(write);
        }
        let sequence = cursors.next_sequence.fetch_add(1, Ordering::Relaxed);
        self.write_entry(start, &frame.header(sequence), frame.data);
        end
    }
}

/// Check a frame against the queue's budgets. Returns the entry stride.
pub fn admit(frame: &FrameRef<'_>, max_frame_size: u64, capacity: u64) -> Result<u64, PushError> {
    if frame.data.is_empty() {
        return Err(PushError::EmptyFrame);
    }
    if frame.rows == 0 || frame.cols == 0 {
        return Err(PushError::ZeroDimension);
    }
    let payload = frame.data.len() as u64;
    if payload > max_frame_size {
        return Err(PushError::ExceedsFrameBudget {
            payload,
            max: max_frame_size,
        });
    }
    let required = entry_stride(payload);
    if required > capacity {
        return Err(PushError::TooLarge { required, capacity });
    }
    Ok(required)
}
