#![forbid(unsafe_code)]

pub mod frame;
pub mod header;
pub mod pixel_format;

pub use frame::{Frame, FrameError, FrameRef};
pub use header::{FRAME_HEADER_SIZE, FrameHeader};
pub use pixel_format::PixelFormat;
