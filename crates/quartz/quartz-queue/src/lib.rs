//! Shared-memory frame queues.
//!
//! [`FrameQueue`] carries variable-size image frames from one producer process
//! to one consumer process; [`MultiConsumerFrameQueue`] fans the same stream
//! out to up to [`MAX_CONSUMERS`] independent readers. Both live in a named
//! POSIX shared-memory object, never block, and drop the oldest frames when a
//! reader falls behind.

mod error;
mod layout;
mod ring;
mod segment;
mod spinlock;
mod spmc;
mod spsc;
mod verified;
mod view;

pub use error::{PushError, QueueError};
pub use layout::{FIRST_SEQUENCE, MAX_CONSUMERS, entry_stride, ring_capacity};
pub use spmc::{MIN_READ_REFRESH_INTERVAL, MultiConsumerFrameQueue};
pub use spsc::FrameQueue;
pub use verified::{SharedFrameQueue, open_verified};
pub use view::FrameView;

pub use quartz_frame::{FRAME_HEADER_SIZE, Frame, FrameHeader, FrameRef, PixelFormat};
