use crate::layout::ProducerCursors;
use crate::ring::Ring;
use quartz_frame::{Frame, FrameRef};
use std::ops::Deref;

/// A frame read in place from shared memory.
///
/// The view holds the queue handle borrowed, so the same handle cannot pop
/// again while it is alive. It does not stop the producer: once the entry is
/// evicted or lapped its bytes are overwritten underneath the view. Call
/// [`FrameView::is_intact`] after using the data to find out whether that
/// happened.
pub struct FrameView<'a> {
    frame: FrameRef<'a>,
    pos: u64,
    ring: &'a Ring,
    cursors: &'a ProducerCursors,
}

impl<'a> FrameView<'a> {
    pub(crate) fn new(
        frame: FrameRef<'a>,
        pos: u64,
        ring: &'a Ring,
        cursors: &'a ProducerCursors,
    ) -> Self {
        Self {
            frame,
            pos,
            ring,
            cursors,
        }
    }

    /// Whether the producer has not yet started overwriting this entry.
    ///
    /// Only meaningful after the bytes were read: a `true` result covers every
    /// read made before the call.
    pub fn is_intact(&self) -> bool {
        self.ring.is_intact(self.cursors, self.pos)
    }

    pub fn frame(&self) -> FrameRef<'a> {
        self.frame
    }

    /// Copy the payload out of shared memory.
    pub fn to_frame(&self) -> Frame {
        self.frame.to_frame()
    }
}

impl<'a> Deref for FrameView<'a> {
    type Target = FrameRef<'a>;

    fn deref(&self) -> &Self::Target {
        &self.frame
    }
}
