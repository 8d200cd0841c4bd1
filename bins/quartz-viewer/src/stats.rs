/// Per-queue counters, reset every report window except for the last
/// sequence seen.
#[derive(Debug, Default)]
pub struct StreamStats {
    frames: u64,
    bytes: u64,
    gaps: u64,
    torn: u64,
    last_sequence: Option<u64>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Window {
    pub frames: u64,
    pub bytes: u64,
    /// Sequence numbers skipped since the previous frame.
    pub gaps: u64,
    /// Zero-copy views overwritten before they were checked.
    pub torn: u64,
}

impl StreamStats {
    pub fn record(&mut self, sequence: u64, bytes: usize) {
        if let Some(last) = self.last_sequence {
            self.gaps += sequence.saturating_sub(last + 1);
        }
        self.last_sequence = Some(sequence);
        self.frames += 1;
        self.bytes += bytes as u64;
    }

    pub fn record_torn(&mut self) {
        self.torn += 1;
    }

    pub fn take_window(&mut self) -> Window {
        let window = Window {
            frames: self.frames,
            bytes: self.bytes,
            gaps: self.gaps,
            torn: self.torn,
        };
        self.frames = 0;
        self.bytes = 0;
        self.gaps = 0;
        self.torn = 0;
        window
    }
}
