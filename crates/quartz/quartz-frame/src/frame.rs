use crate::{FrameHeader, PixelFormat};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame dimensions must be positive (got {rows}x{cols})")]
    ZeroDimension { rows: u32, cols: u32 },

    #[error("frame payload is empty")]
    EmptyPayload,

    #[error("row stride {stride} x {rows} rows needs {needed} bytes, payload has {actual}")]
    ShortPayload {
        stride: u64,
        rows: u32,
        needed: u64,
        actual: u64,
    },
}

/// An image frame owning its pixel bytes.
///
/// The payload is stored exactly as supplied; when `row_stride` is non-zero
/// each row starts `row_stride` bytes after the previous one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    rows: u32,
    cols: u32,
    pixel_format: PixelFormat,
    row_stride: u64,
    sequence: u64,
    data: Vec<u8>,
}

/// Borrowed counterpart of [`Frame`]; what the queues push and what
/// zero-copy pops hand out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRef<'a> {
    pub rows: u32,
    pub cols: u32,
    pub pixel_format: PixelFormat,
    pub row_stride: u64,
    pub sequence: u64,
    pub data: &'a [u8],
}

impl Frame {
    pub fn new(
        rows: u32,
        cols: u32,
        pixel_format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if rows == 0 || cols == 0 {
            return Err(FrameError::ZeroDimension { rows, cols });
        }
        if data.is_empty() {
            return Err(FrameError::EmptyPayload);
        }
        Ok(Self {
            rows,
            cols,
            pixel_format,
            row_stride: 0,
            sequence: 0,
            data,
        })
    }

    /// A tightly packed frame with every byte set to `value`.
    ///
    /// Opaque pixel formats are treated as one byte per pixel.
    pub fn filled(rows: u32, cols: u32, pixel_format: PixelFormat, value: u8) -> Result<Self, FrameError> {
        let bpp = pixel_format.bytes_per_pixel().max(1) as usize;
        let len = rows as usize * cols as usize * bpp;
        Self::new(rows, cols, pixel_format, vec![value; len])
    }

    /// Declare a padded layout; the payload must cover `stride * rows` bytes.
    pub fn with_row_stride(mut self, stride: u64) -> Result<Self, FrameError> {
        let needed = stride * self.rows as u64;
        let actual = self.data.len() as u64;
        if stride != 0 && actual < needed {
            return Err(FrameError::ShortPayload {
                stride,
                rows: self.rows,
                needed,
                actual,
            });
        }
        self.row_stride = stride;
        Ok(self)
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> u32 {
        self.cols
    }

    #[inline]
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    #[inline]
    pub fn row_stride(&self) -> u64 {
        self.row_stride
    }

    /// Sequence number assigned by the producer; 0 for frames never queued.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, index: u32) -> Option<&[u8]> {
        self.as_frame_ref().row(index)
    }

    pub fn as_frame_ref(&self) -> FrameRef<'_> {
        FrameRef {
            rows: self.rows,
            cols: self.cols,
            pixel_format: self.pixel_format,
            row_stride: self.row_stride,
            sequence: self.sequence,
            data: &self.data,
        }
    }

    /// Overwrite this frame from a ring entry, reusing the existing allocation.
    pub fn assign(&mut self, header: &FrameHeader, payload: &[u8]) {
        self.rows = header.rows;
        self.cols = header.cols;
        self.pixel_format = header.pixel_format;
        self.row_stride = header.row_stride;
        self.sequence = header.sequence;
        self.data.clear();
        self.data.extend_from_slice(payload);
    }
}

impl<'a> FrameRef<'a> {
    pub fn from_header(header: &FrameHeader, data: &'a [u8]) -> Self {
        Self {
            rows: header.rows,
            cols: header.cols,
            pixel_format: header.pixel_format,
            row_stride: header.row_stride,
            sequence: header.sequence,
            data,
        }
    }

    /// Header describing this frame, stamped with `sequence`.
    pub fn header(&self, sequence: u64) -> FrameHeader {
        FrameHeader {
            rows: self.rows,
            cols: self.cols,
            pixel_format: self.pixel_format,
            flags: 0,
            payload_size: self.data.len() as u64,
            row_stride: self.row_stride,
            sequence,
        }
    }

    /// Bytes between the start of two consecutive rows.
    pub fn effective_stride(&self) -> usize {
        if self.row_stride != 0 {
            self.row_stride as usize
        } else if self.rows > 0 {
            self.data.len() / self.rows as usize
        } else {
            0
        }
    }

    pub fn row(&self, index: u32) -> Option<&'a [u8]> {
        if index >= self.rows {
            return None;
        }
        let stride = self.effective_stride();
        let start = index as usize * stride;
        let data: &'a [u8] = self.data;
        data.get(start..start + stride)
    }

    pub fn to_frame(&self) -> Frame {
        Frame {
            rows: self.rows,
            cols: self.cols,
            pixel_format: self.pixel_format,
            row_stride: self.row_stride,
            sequence: self.sequence,
            data: self.data.to_vec(),
        }
    }
}

impl<'a> From<&'a Frame> for FrameRef<'a> {
    fn from(frame: &'a Frame) -> Self {
        frame.as_frame_ref()
    }
}
