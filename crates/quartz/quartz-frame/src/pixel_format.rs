// PixelFormat is opaque to the queue: it is copied into every FrameHeader and
// handed back on pop untouched. Producers and consumers agree on its meaning.
//
// The built-in codes pack three bytes:
//   bits  0..8   channel count
//   bits  8..16  bytes per channel
//   bits 16..24  channel order (gray / BGR / RGB / BGRA)
// Anything else is still a valid PixelFormat; the helpers just return 0.

#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PixelFormat(pub u32);

const ORDER_GRAY: u32 = 0;
const ORDER_BGR: u32 = 1;
const ORDER_RGB: u32 = 2;
const ORDER_BGRA: u32 = 3;

impl PixelFormat {
    pub const GRAY8: Self = Self::packed(1, 1, ORDER_GRAY);
    pub const GRAY16: Self = Self::packed(1, 2, ORDER_GRAY);
    pub const BGR8: Self = Self::packed(3, 1, ORDER_BGR);
    pub const RGB8: Self = Self::packed(3, 1, ORDER_RGB);
    pub const BGRA8: Self = Self::packed(4, 1, ORDER_BGRA);

    const fn packed(channels: u32, bytes_per_channel: u32, order: u32) -> Self {
        Self(channels | (bytes_per_channel << 8) | (order << 16))
    }

    #[inline]
    pub fn channels(self) -> u32 {
        self.0 & 0xFF
    }

    #[inline]
    pub fn bytes_per_channel(self) -> u32 {
        (self.0 >> 8) & 0xFF
    }

    /// Bytes per pixel for the packed encodings, 0 for opaque codes.
    #[inline]
    pub fn bytes_per_pixel(self) -> u32 {
        self.channels() * self.bytes_per_channel()
    }

    /// Look up a built-in format by its lowercase name (`"gray8"`, `"bgr8"`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "gray8" => Some(Self::GRAY8),
            "gray16" => Some(Self::GRAY16),
            "bgr8" => Some(Self::BGR8),
            "rgb8" => Some(Self::RGB8),
            "bgra8" => Some(Self::BGRA8),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn builtin_formats_report_pixel_size() {
        assert_eq!(PixelFormat::GRAY8.bytes_per_pixel(), 1);
        assert_eq!(PixelFormat::GRAY16.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::BGR8.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::RGB8.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::BGRA8.bytes_per_pixel(), 4);
        assert_ne!(PixelFormat::BGR8, PixelFormat::RGB8);
    }

    #[test]
    fn opaque_codes_have_no_pixel_size() {
        assert_eq!(PixelFormat(0).bytes_per_pixel(), 0);
    }

    #[test]
    fn names_map_to_builtins() {
        assert_eq!(PixelFormat::from_name("bgra8"), Some(PixelFormat::BGRA8));
        assert_eq!(PixelFormat::from_name("gray16"), Some(PixelFormat::GRAY16));
        assert_eq!(PixelFormat::from_name("yuv420"), None);
    }

    #[test]
    fn pixel_format_is_pod() {
        assert_eq!(size_of::<PixelFormat>(), 4);
    }
}
