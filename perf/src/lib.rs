use quartz_queue::{Frame, PixelFormat};

/// Largest frame the benchmarks push: 1920x1080 BGR.
pub const BENCH_MAX_FRAME: usize = 1920 * 1080 * 3;

/// Frame shapes benchmarked by size, smallest first.
pub const FRAME_SHAPES: &[(&str, u32, u32)] = &[
    ("64x64", 64, 64),
    ("vga", 480, 640),
    ("720p", 720, 1280),
    ("1080p", 1080, 1920),
];

pub fn temp_shm_name(label: &str) -> String {
    let pid = std::process::id();
    format!("quartz_bench_{label}_{pid}")
}

/// BGR frame with a byte ramp so copies touch distinct cache lines.
pub fn make_test_frame(rows: u32, cols: u32) -> Frame {
    let len = rows as usize * cols as usize * 3;
    let data = (0..len).map(|i| i as u8).collect();
    Frame::new(rows, cols, PixelFormat::BGR8, data).unwrap_or_default()
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_fit_the_budget() {
        for &(_, rows, cols) in FRAME_SHAPES {
            assert!(make_test_frame(rows, cols).data().len() <= BENCH_MAX_FRAME);
        }
    }

    #[test]
    fn bytes_are_human_readable() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(12_288), "12.0 KB");
        assert_eq!(format_bytes(6_220_800), "5.9 MB");
    }
}
