//! End-to-end two-process test for the shared-memory frame queue.
//!
//! The test binary spawns itself twice, once as producer and once as consumer,
//! selected through an environment variable. Both processes run at the same
//! time over the same queue name:
//!
//! ```text
//!                    Time -->
//!
//! [Producer] ----[create]----[push frames...]----------------[done]
//!                   |             |    |    |
//!                   v             v    v    v
//!              [shm segment]   (concurrent pops)
//!                   |             ^    ^    ^
//!                   v             |    |    |
//! [Consumer] -------[open]-------[pop frames...]-------------[done]
//! ```
//!
//! The consumer checks that every frame it receives is intact and that
//! sequence numbers only ever increase.
//!
//! ```bash
//! cargo test -p quartz-queue --test e2e_shm -- --nocapture
//! ```

use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use quartz_queue::{Frame, FrameQueue, PixelFormat};

/// Writes to stderr with immediate flush to bypass test output capture.
macro_rules! log {
    ($($arg:tt)*) => {{
        let _ = writeln!(std::io::stderr(), $($arg)*);
        let _ = std::io::stderr().flush();
    }};
}

const ENV_ROLE: &str = "QUARTZ_E2E_ROLE";
const ENV_NAME: &str = "QUARTZ_E2E_NAME";
const ROLE_PRODUCER: &str = "producer";
const ROLE_CONSUMER: &str = "consumer";

const ROWS: u32 = 64;
const COLS: u32 = 64;
const MAX_FRAME: usize = (ROWS * COLS) as usize;
const FRAME_COUNT: usize = 32;
const FRAMES_TO_PUSH: u64 = 20_000;

const PRODUCER_BATCH_SIZE: u64 = 100;
const PRODUCER_BATCH_DELAY_US: u64 = 200;

type Queue = FrameQueue<MAX_FRAME>;

fn queue_name() -> String {
    format!("quartz_e2e_{}", std::process::id())
}

/// Frame `i` carries its index in the first 8 bytes and `i as u8` elsewhere.
fn stamped_frame(frame: &mut Frame, i: u64) {
    frame.data_mut().fill(i as u8);
    frame.data_mut()[..8].copy_from_slice(&i.to_le_bytes());
}

fn check_frame(frame: &Frame) -> u64 {
    let data = frame.data();
    assert_eq!(data.len(), MAX_FRAME, "payload length");
    let mut index = [0u8; 8];
    index.copy_from_slice(&data[..8]);
    let i = u64::from_le_bytes(index);
    assert!(
        data[8..].iter().all(|&b| b == i as u8),
        "frame {i} payload corrupted"
    );
    assert_eq!(frame.sequence(), i + 1, "sequence does not match stamp");
    i
}

fn run_producer(name: &str) {
    log!("[PRODUCER] Creating queue {name}");
    log!("[PRODUCER]   frames: {FRAMES_TO_PUSH} of {MAX_FRAME} bytes, ring of {FRAME_COUNT}");

    let mut queue = Queue::create(name, FRAME_COUNT).expect("producer: failed to create queue");
    let mut frame = Frame::filled(ROWS, COLS, PixelFormat::GRAY8, 0).unwrap();

    let start = Instant::now();
    for i in 0..FRAMES_TO_PUSH {
        stamped_frame(&mut frame, i);
        queue.try_push(&frame).expect("producer: push rejected");

        if (i + 1) % PRODUCER_BATCH_SIZE == 0 {
            std::thread::sleep(Duration::from_micros(PRODUCER_BATCH_DELAY_US));
        }
    }

    let elapsed = start.elapsed();
    let rate = FRAMES_TO_PUSH as f64 / elapsed.as_secs_f64();
    log!("[PRODUCER] Complete: {FRAMES_TO_PUSH} frames in {elapsed:?} ({rate:.0} frames/s)");
}

fn run_consumer(name: &str) {
    log!("[CONSUMER] Waiting for queue {name}");

    let open_deadline = Instant::now() + Duration::from_secs(5);
    let mut queue = loop {
        match Queue::open(name) {
            Ok(q) => break q,
            Err(_) if Instant::now() < open_deadline => {
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) => panic!("[CONSUMER] Failed to open queue: {e}"),
        }
    };

    let read_deadline = Instant::now() + Duration::from_secs(10);
    let mut frame = Frame::default();
    let mut received = 0u64;
    let mut last: Option<u64> = None;
    let mut idle_polls = 0u32;

    while Instant::now() < read_deadline {
        if queue.try_pop_into(&mut frame) {
            let i = check_frame(&frame);
            if let Some(prev) = last {
                assert!(i > prev, "frame {i} arrived after {prev}");
            }
            last = Some(i);
            received += 1;
            idle_polls = 0;

            if last == Some(FRAMES_TO_PUSH - 1) {
                break;
            }
        } else {
            idle_polls += 1;
            if idle_polls > 1_000_000 && received > 0 {
                log!("[CONSUMER] No new frames, producer appears done");
                break;
            }
            std::hint::spin_loop();
        }
    }

    log!("[CONSUMER] Complete");
    log!("[CONSUMER]   frames received: {received}");
    log!("[CONSUMER]   overruns: {}", queue.overruns());
    log!("[CONSUMER]   last frame: {last:?}");

    assert!(received > 0, "consumer did not receive any frames");
}

#[test]
fn e2e_two_process_frame_queue() {
    if let Ok(role) = env::var(ENV_ROLE) {
        let name = env::var(ENV_NAME).expect("QUARTZ_E2E_NAME not set");
        match role.as_str() {
            ROLE_PRODUCER => run_producer(&name),
            ROLE_CONSUMER => run_consumer(&name),
            other => panic!("Unknown role: {other}"),
        }
        return;
    }

    let name = queue_name();
    let exe = env::current_exe().expect("Failed to get current executable path");
    let spawn = |role: &str| {
        Command::new(&exe)
            .arg("--exact")
            .arg("e2e_two_process_frame_queue")
            .env(ENV_ROLE, role)
            .env(ENV_NAME, &name)
            .stderr(Stdio::inherit())
            .spawn()
            .expect("Failed to spawn child process")
    };

    log!("[ORCHESTRATOR] Spawning producer and consumer for {name}");
    let mut producer = spawn(ROLE_PRODUCER);
    std::thread::sleep(Duration::from_millis(5));
    let mut consumer = spawn(ROLE_CONSUMER);

    let producer_status = producer.wait().expect("Failed to wait for producer");
    let consumer_status = consumer.wait().expect("Failed to wait for consumer");

    let _ = Queue::close(&name);

    assert!(producer_status.success(), "producer failed: {producer_status}");
    assert!(consumer_status.success(), "consumer failed: {consumer_status}");
}
