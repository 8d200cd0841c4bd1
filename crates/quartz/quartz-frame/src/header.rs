use crate::PixelFormat;
use std::mem::size_of;

/// `flags` bit marking the rest of the current lap as unused.
pub const FLAG_WRAP_MARKER: u32 = 1;

/// Metadata written in front of every payload in the ring.
///
/// `#[repr(C, align(64))]` keeps the record at exactly one cache line so every
/// entry header starts on a cache-line boundary inside the ring.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameHeader {
    pub rows: u32,
    pub cols: u32,
    pub pixel_format: PixelFormat,
    pub flags: u32,
    /// Bytes of payload immediately following the header.
    pub payload_size: u64,
    /// Bytes per row, 0 when rows are tightly packed.
    pub row_stride: u64,
    /// Producer-assigned, strictly increasing per queue.
    pub sequence: u64,
}

pub const FRAME_HEADER_SIZE: usize = size_of::<FrameHeader>();

impl FrameHeader {
    /// Header telling readers to continue at offset 0 of the next lap.
    pub fn wrap_marker() -> Self {
        Self {
            flags: FLAG_WRAP_MARKER,
            ..Self::default()
        }
    }

    #[inline]
    pub fn is_wrap_marker(&self) -> bool {
        self.flags & FLAG_WRAP_MARKER != 0
    }

    /// Whether this header describes a real entry in a ring of `capacity` bytes.
    #[inline]
    pub fn is_valid(&self, capacity: u64) -> bool {
        !self.is_wrap_marker()
            && self.rows > 0
            && self.cols > 0
            && self.payload_size > 0
            && self.payload_size <= capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::align_of;

    #[test]
    fn header_is_one_cache_line() {
        assert_eq!(FRAME_HEADER_SIZE, 64, "FrameHeader layout changed");
        assert_eq!(align_of::<FrameHeader>(), 64);
    }

    #[test]
    fn zeroed_header_is_not_an_entry() {
        assert!(!FrameHeader::default().is_valid(4096));
    }

    #[test]
    fn validity_checks_every_field() {
        let ok = FrameHeader {
            rows: 2,
            cols: 2,
            pixel_format: PixelFormat::GRAY8,
            payload_size: 4,
            ..FrameHeader::default()
        };
        assert!(ok.is_valid(4096));
        assert!(!FrameHeader { rows: 0, ..ok }.is_valid(4096));
        assert!(!FrameHeader { cols: 0, ..ok }.is_valid(4096));
        assert!(!FrameHeader { payload_size: 0, ..ok }.is_valid(4096));
        assert!(!ok.is_valid(3));
        assert!(!FrameHeader { flags: FLAG_WRAP_MARKER, ..ok }.is_valid(4096));
    }

    #[test]
    fn wrap_marker_round_trips() {
        let m = FrameHeader::wrap_marker();
        assert!(m.is_wrap_marker());
        assert!(!m.is_valid(u64::MAX));
    }
}
