//! Synthetic test pattern standing in for a camera.
//!
//! Every frame gets a white border, a diagonal and a grid on a dark
//! background that brightens with the frame index. The index itself is
//! stamped little-endian into the first 8 payload bytes so consumers can
//! check what they received.

use quartz_queue::Frame;

const GRID_SPACING: u32 = 32;
const BORDER: u32 = 2;
pub const STAMP_LEN: usize = 8;

pub fn render(frame: &mut Frame, index: u64) {
    let rows = frame.rows();
    let cols = frame.cols();
    let bpp = frame.pixel_format().bytes_per_pixel().max(1) as usize;
    let background = (index % 64) as u8;
    let stride = frame.as_frame_ref().effective_stride();

    let data = frame.data_mut();
    for r in 0..rows {
        let row = &mut data[r as usize * stride..][..cols as usize * bpp];
        for c in 0..cols {
            let border = r < BORDER || c < BORDER || r >= rows.saturating_sub(BORDER) || c >= cols.saturating_sub(BORDER);
            let diagonal = r * cols / rows == c;
            let grid = r % GRID_SPACING == 0 || c % GRID_SPACING == 0;
            let value = match (border, diagonal, grid) {
                (true, _, _) | (_, true, _) => 0xFF,
                (_, _, true) => 0x80,
                _ => background,
            };
            row[c as usize * bpp..][..bpp].fill(value);
        }
    }

    if data.len() >= STAMP_LEN {
        data[..STAMP_LEN].copy_from_slice(&index.to_le_bytes());
    }
}

/// Index stamped by [`render`], if the payload is long enough to carry one.
pub fn stamp(data: &[u8]) -> Option<u64> {
    let bytes: [u8; STAMP_LEN] = data.get(..STAMP_LEN)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quartz_queue::PixelFormat;

    #[test]
    fn stamp_round_trips() {
        let mut f = Frame::filled(48, 64, PixelFormat::BGR8, 0).unwrap();
        render(&mut f, 1234);
        assert_eq!(stamp(f.data()), Some(1234));
    }

    #[test]
    fn border_and_grid_are_drawn() {
        let mut f = Frame::filled(64, 64, PixelFormat::GRAY8, 0).unwrap();
        render(&mut f, 3);
        let px = |r: usize, c: usize| f.data()[r * 64 + c];
        assert_eq!(px(63, 10), 0xFF);
        assert_eq!(px(10, 63), 0xFF);
        assert_eq!(px(32, 10), 0x80);
        assert_eq!(px(20, 10), 3);
        assert_eq!(px(40, 40), 0xFF);
    }

    #[test]
    fn short_payloads_have_no_stamp() {
        assert_eq!(stamp(&[1, 2, 3]), None);
    }
}
