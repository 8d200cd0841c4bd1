mod stats;

use anyhow::{Context, Result};
use quartz_config::{MAX_FRAME_SIZE, ViewerConfig};
use quartz_queue::{Frame, FrameQueue, MultiConsumerFrameQueue, SharedFrameQueue, open_verified};
use stats::StreamStats;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn load_config() -> Result<ViewerConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            ViewerConfig::load(&path).with_context(|| format!("loading viewer config {path}"))
        }
        None => Ok(ViewerConfig::default()),
    }
}

fn main() -> Result<()> {
    let cfg = load_config()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level)),
        )
        .init();

    if cfg.multi_consumer {
        let mut queues =
            open_verified::<MultiConsumerFrameQueue<MAX_FRAME_SIZE>, _>(cfg.shm_names.as_slice())
                .context("opening queues")?;
        for (name, queue) in queues.iter_mut() {
            let id = queue
                .register_consumer()
                .with_context(|| format!("registering on '{name}'"))?;
            info!(queue = %name, consumer = id, "viewer: registered");
        }
        run(queues, &cfg)
    } else {
        let queues = open_verified::<FrameQueue<MAX_FRAME_SIZE>, _>(cfg.shm_names.as_slice())
            .context("opening queues")?;
        run(queues, &cfg)
    }
}

/// Poll every queue round-robin and report per-queue rates.
fn run<Q: SharedFrameQueue>(queues: HashMap<String, Q>, cfg: &ViewerConfig) -> Result<()> {
    let mut streams: Vec<(String, Q, StreamStats)> = queues
        .into_iter()
        .map(|(name, q)| (name, q, StreamStats::default()))
        .collect();
    streams.sort_by(|a, b| a.0.cmp(&b.0));

    info!(
        queues = streams.len(),
        zero_copy = cfg.zero_copy,
        "viewer: consuming"
    );

    let poll_interval = Duration::from_micros(cfg.poll_interval_us);
    let report_interval = Duration::from_millis(cfg.report_interval_ms);
    let mut frame = Frame::default();
    let mut last_report = Instant::now();

    loop {
        let mut idle = true;

        for (_, queue, stats) in streams.iter_mut() {
            if cfg.zero_copy {
                if let Some(view) = queue.try_pop_zero_copy() {
                    idle = false;
                    let (sequence, len) = (view.sequence, view.data.len());
                    if view.is_intact() {
                        stats.record(sequence, len);
                    } else {
                        stats.record_torn();
                    }
                }
            } else if queue.try_pop_into(&mut frame) {
                idle = false;
                stats.record(frame.sequence(), frame.data().len());
            }
        }

        let elapsed = last_report.elapsed();
        if elapsed >= report_interval {
            for (name, queue, stats) in streams.iter_mut() {
                let window = stats.take_window();
                let fps = window.frames as f64 / elapsed.as_secs_f64();
                let mbps = window.bytes as f64 / elapsed.as_secs_f64() / 1e6;
                info!(
                    queue = %name,
                    fps = fps.round() as u64,
                    mb_per_s = mbps.round() as u64,
                    gaps = window.gaps,
                    torn = window.torn,
                    overruns = queue.overruns(),
                    "viewer: stream"
                );
            }
            last_report = Instant::now();
        }

        if idle {
            std::thread::sleep(poll_interval);
        }
    }
}
