//! Behaviour of the single-consumer queue as seen by one producer handle and
//! one consumer handle in the same process.

use quartz_queue::{FRAME_HEADER_SIZE, Frame, FrameQueue, PixelFormat, PushError, entry_stride};
use quartz_shm::ShmSegment;

const MAX: usize = 960;
type Queue = FrameQueue<MAX>;

fn unique_name(tag: &str) -> String {
    format!("quartz_spsc_{tag}_{}", std::process::id())
}

/// 30x32 gray frame (960 bytes) whose first byte is `i` and the rest a ramp.
fn numbered(i: u8) -> Frame {
    let mut f = Frame::filled(30, 32, PixelFormat::GRAY8, 0).unwrap();
    for (k, b) in f.data_mut().iter_mut().enumerate() {
        *b = (k as u8).wrapping_add(i);
    }
    f.data_mut()[0] = i;
    f
}

/// Removes the queue even when an assertion fails.
struct Cleanup(String);

impl Drop for Cleanup {
    fn drop(&mut self) {
        let _ = Queue::close(&self.0);
    }
}

#[test]
fn frames_arrive_in_order_and_intact() {
    let name = unique_name("fifo");
    let _c = Cleanup(name.clone());
    let mut producer = Queue::create(&name, 8).unwrap();
    let mut consumer = Queue::open(&name).unwrap();

    let sent: Vec<Frame> = (0..5).map(numbered).collect();
    for f in &sent {
        producer.try_push(f).unwrap();
    }

    for expected in &sent {
        let got = consumer.try_pop().unwrap();
        assert_eq!(got.data(), expected.data());
        assert_eq!(got.rows(), 30);
        assert_eq!(got.cols(), 32);
        assert_eq!(got.pixel_format(), PixelFormat::GRAY8);
    }
    assert!(consumer.try_pop().is_none());
    assert_eq!(consumer.overruns(), 0);
}

#[test]
fn mixed_sizes_survive_many_wraps() {
    let name = unique_name("wraps");
    let _c = Cleanup(name.clone());
    let mut q = Queue::create(&name, 4).unwrap();

    // Pushing and popping in lock-step never overflows, so nothing is lost
    // however often the producer wraps.
    let mut i = 0u64;
    while q.write_pos() < 5 * q.capacity() {
        let rows = 1 + (i % 30) as u32;
        let f = Frame::filled(rows, 32, PixelFormat::GRAY8, i as u8).unwrap();
        q.try_push(&f).unwrap();

        let got = q.try_pop().unwrap();
        assert_eq!(got.rows(), rows);
        assert_eq!(got.data(), f.data());
        assert_eq!(got.sequence(), i + 1);
        i += 1;
    }
    assert!(!q.was_overwritten());
    assert_eq!(q.overruns(), 0);
}

#[test]
fn overflow_keeps_newest_suffix_in_push_order() {
    let name = unique_name("suffix");
    let _c = Cleanup(name.clone());
    let mut q = Queue::create(&name, 4).unwrap();

    let total = 3 * (q.capacity() / entry_stride(MAX as u64)) as u8;
    for i in 0..total {
        q.try_push(&numbered(i)).unwrap();
    }

    let popped: Vec<u8> = std::iter::from_fn(|| q.try_pop())
        .map(|f| f.data()[0])
        .collect();

    assert_eq!(*popped.last().unwrap(), total - 1);
    assert!(popped.windows(2).all(|w| w[1] == w[0] + 1));
    assert!(popped.len() as u64 >= q.capacity() / entry_stride(MAX as u64) - 1);
    assert_eq!(q.overruns(), 1);
}

/// Ring of exactly `n` entries: pushing `n` fills it without loss, one more
/// evicts only the oldest. Pops stay in push order, newest last.
#[test]
fn exact_fit_overflow_drops_only_the_oldest() {
    // Stride of 512 bytes divides any page size.
    const FIT: usize = 448;
    type Fit = FrameQueue<FIT>;

    let name = unique_name("exact");
    let mut q = Fit::create(&name, quartz_shm::page_size() / 512).unwrap();
    let n = (q.capacity() / entry_stride(FIT as u64)) as u8;
    assert_eq!(q.capacity(), n as u64 * 512);

    let frame = |v: u8| Frame::filled(14, 32, PixelFormat::GRAY8, v).unwrap();
    for i in 0..n {
        q.try_push(&frame(i)).unwrap();
    }
    assert!(!q.was_overwritten());
    q.try_push(&frame(n)).unwrap();
    assert!(q.was_overwritten());

    let popped: Vec<u8> = std::iter::from_fn(|| q.try_pop())
        .map(|f| f.data()[0])
        .collect();
    assert_eq!(popped, (1..=n).collect::<Vec<u8>>());
    assert_eq!(q.overruns(), 1);
    Fit::close(&name).unwrap();
}

/// Ring of about four and a half entries: pushing five then one more evicts
/// the two oldest and keeps the rest in order.
#[test]
fn overflow_with_partial_tail() {
    const BUDGET: usize = 16320;
    type Small = FrameQueue<BUDGET>;

    let name = unique_name("tail");
    let mut q = Small::create(&name, 1).unwrap();

    // Stride between cap/5 and cap/4, so the fifth entry wraps.
    let stride = (q.capacity() * 2 / 9) / 64 * 64;
    let rows = ((stride - FRAME_HEADER_SIZE as u64) / 64) as u32;
    assert!(4 * stride <= q.capacity() && 5 * stride > q.capacity());
    assert_eq!(entry_stride(rows as u64 * 64), stride);

    let frame = |v: u8| Frame::filled(rows, 64, PixelFormat::GRAY8, v).unwrap();
    for i in 0..5 {
        q.try_push(&frame(i)).unwrap();
    }
    q.try_push(&frame(6)).unwrap();

    let popped: Vec<u8> = std::iter::from_fn(|| q.try_pop())
        .map(|f| f.data()[0])
        .collect();
    assert_eq!(popped, vec![2, 3, 4, 6]);
    Small::close(&name).unwrap();
}

/// A garbage header at the read cursor reads as an empty queue.
#[test]
fn zeroed_header_pops_nothing() {
    let name = unique_name("zeroed");
    let _c = Cleanup(name.clone());
    let mut producer = Queue::create(&name, 4).unwrap();
    let mut consumer = Queue::open(&name).unwrap();
    producer.try_push(&numbered(1)).unwrap();

    let mut raw = ShmSegment::open(&name).unwrap();
    let ring_start = raw.len() - consumer.capacity() as usize;
    let at = ring_start + (consumer.read_pos() % consumer.capacity()) as usize;
    // SAFETY: `at` is the first entry header inside the mapped ring.
    unsafe { std::ptr::write_bytes(raw.as_mut_ptr().add(at), 0, FRAME_HEADER_SIZE) };

    assert!(consumer.try_pop().is_none());
    assert!(consumer.try_pop_zero_copy().is_none());
    let mut out = Frame::default();
    assert!(!consumer.try_pop_into(&mut out));
    assert_eq!(consumer.read_pos(), 0);
}

#[test]
fn rejected_frames_leave_queue_untouched() {
    let name = unique_name("reject");
    let _c = Cleanup(name.clone());
    let mut q = Queue::create(&name, 4).unwrap();
    q.try_push(&numbered(1)).unwrap();
    let write = q.write_pos();

    let big = Frame::filled(31, 32, PixelFormat::GRAY8, 0).unwrap();
    assert_eq!(
        q.try_push(&big),
        Err(PushError::ExceedsFrameBudget { payload: 992, max: 960 })
    );
    assert_eq!(q.write_pos(), write);
    assert_eq!(q.frames_pushed(), 1);

    assert_eq!(q.try_pop().unwrap().data()[0], 1);
    assert!(q.try_pop().is_none());
}

#[test]
fn zero_copy_view_reads_in_place() {
    let name = unique_name("zc");
    let _c = Cleanup(name.clone());
    let mut q = Queue::create(&name, 4).unwrap();
    let sent = numbered(7);
    q.try_push(&sent).unwrap();

    {
        let view = q.try_pop_zero_copy().unwrap();
        assert_eq!(view.data, sent.data());
        assert_eq!(view.rows, 30);
        assert_eq!(view.sequence, 1);
        assert!(view.is_intact());
        assert_eq!(view.to_frame().data(), sent.data());
    }
    assert!(q.try_pop_zero_copy().is_none());
}

#[test]
fn zero_copy_view_detects_overwrite() {
    let name = unique_name("zc_lap");
    let _c = Cleanup(name.clone());
    let mut producer = Queue::create(&name, 4).unwrap();
    let mut consumer = Queue::open(&name).unwrap();

    producer.try_push(&numbered(0)).unwrap();
    let view = consumer.try_pop_zero_copy().unwrap();
    assert!(view.is_intact());

    let slots = producer.capacity() / entry_stride(MAX as u64);
    for i in 1..=slots as u8 {
        producer.try_push(&numbered(i)).unwrap();
    }
    assert!(!view.is_intact());
}

#[test]
fn pop_into_reuses_buffer_and_keeps_stride() {
    let name = unique_name("into");
    let _c = Cleanup(name.clone());
    let mut q = Queue::create(&name, 4).unwrap();

    // Two rows of 30 BGR pixels padded to 96 bytes each.
    let padded = Frame::new(2, 30, PixelFormat::BGR8, vec![5u8; 192])
        .unwrap()
        .with_row_stride(96)
        .unwrap();
    q.try_push(&padded).unwrap();
    q.try_push(&numbered(3)).unwrap();

    let mut out = Frame::default();
    assert!(q.try_pop_into(&mut out));
    assert_eq!(out.row_stride(), 96);
    assert_eq!(out.row(1).map(<[u8]>::len), Some(96));
    assert_eq!(out.pixel_format(), PixelFormat::BGR8);

    assert!(q.try_pop_into(&mut out));
    assert_eq!(out.data()[0], 3);
    assert_eq!(out.row_stride(), 0);
    assert!(!q.try_pop_into(&mut out));
}
