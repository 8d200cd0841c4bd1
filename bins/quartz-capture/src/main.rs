mod pattern;

use anyhow::{Context, Result, ensure};
use quartz_config::{CaptureConfig, MAX_FRAME_SIZE};
use quartz_queue::{Frame, FrameQueue, MultiConsumerFrameQueue, PixelFormat, PushError};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

enum Producer {
    Single(FrameQueue<MAX_FRAME_SIZE>),
    Multi(MultiConsumerFrameQueue<MAX_FRAME_SIZE>),
}

impl Producer {
    fn create(cfg: &CaptureConfig) -> Result<Self> {
        // The multi-consumer create already replaces a stale segment.
        let producer = if cfg.multi_consumer {
            Self::Multi(MultiConsumerFrameQueue::create(&cfg.shm_name, cfg.frame_count)?)
        } else {
            FrameQueue::<MAX_FRAME_SIZE>::close(&cfg.shm_name)?;
            Self::Single(FrameQueue::create(&cfg.shm_name, cfg.frame_count)?)
        };
        Ok(producer)
    }

    fn try_push(&mut self, frame: &Frame) -> Result<(), PushError> {
        match self {
            Self::Single(q) => q.try_push(frame),
            Self::Multi(q) => q.try_push(frame),
        }
    }

    fn capacity(&self) -> u64 {
        match self {
            Self::Single(q) => q.capacity(),
            Self::Multi(q) => q.capacity(),
        }
    }
}

fn load_config() -> Result<CaptureConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            CaptureConfig::load(&path).with_context(|| format!("loading capture config {path}"))
        }
        None => Ok(CaptureConfig::default()),
    }
}

fn main() -> Result<()> {
    let cfg = load_config()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level)),
        )
        .init();

    let pixel_format = PixelFormat::from_name(&cfg.pixel_format)
        .with_context(|| format!("unknown pixel format '{}'", cfg.pixel_format))?;
    let mut frame = Frame::filled(cfg.rows, cfg.cols, pixel_format, 0)?;
    ensure!(
        frame.data().len() <= MAX_FRAME_SIZE,
        "{}x{} {} frames need {} bytes, budget is {MAX_FRAME_SIZE}",
        cfg.rows,
        cfg.cols,
        cfg.pixel_format,
        frame.data().len()
    );

    let mut producer = Producer::create(&cfg)
        .with_context(|| format!("creating queue '{}'", cfg.shm_name))?;
    info!(
        queue = %cfg.shm_name,
        capacity = producer.capacity(),
        rows = cfg.rows,
        cols = cfg.cols,
        fps = cfg.fps,
        multi_consumer = cfg.multi_consumer,
        "capture: publishing test pattern"
    );

    let interval = (cfg.fps > 0).then(|| Duration::from_secs_f64(1.0 / cfg.fps as f64));
    let mut next_tick = Instant::now();
    let mut last_report = Instant::now();
    let mut pushed: u64 = 0;
    let mut rejected: u64 = 0;
    let mut index: u64 = 0;

    loop {
        pattern::render(&mut frame, index);
        match producer.try_push(&frame) {
            Ok(()) => pushed += 1,
            Err(e) => {
                rejected += 1;
                warn!(error = %e, "capture: push rejected");
            }
        }
        index += 1;

        if last_report.elapsed() >= Duration::from_secs(1) {
            let rate = pushed as f64 / last_report.elapsed().as_secs_f64();
            info!(rate = rate.round() as u64, rejected, total = index, "capture: frames/s");
            pushed = 0;
            rejected = 0;
            last_report = Instant::now();
        }

        match interval {
            Some(interval) => {
                next_tick += interval;
                let now = Instant::now();
                if next_tick > now {
                    std::thread::sleep(next_tick - now);
                } else {
                    next_tick = now;
                }
            }
            None => std::hint::spin_loop(),
        }
    }
}
