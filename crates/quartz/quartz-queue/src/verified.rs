use crate::error::QueueError;
use crate::spmc::MultiConsumerFrameQueue;
use crate::spsc::FrameQueue;
use crate::view::FrameView;
use quartz_frame::Frame;
use std::collections::HashMap;
use tracing::info;

/// Operations shared by both queue flavours, from a consumer's point of view.
pub trait SharedFrameQueue: Sized {
    fn open(name: &str) -> Result<Self, QueueError>;

    fn name(&self) -> &str;

    fn capacity(&self) -> u64;

    fn try_pop_into(&mut self, frame: &mut Frame) -> bool;

    fn try_pop_zero_copy(&mut self) -> Option<FrameView<'_>>;

    fn overruns(&self) -> u64;
}

impl<const N: usize> SharedFrameQueue for FrameQueue<N> {
    fn open(name: &str) -> Result<Self, QueueError> {
        FrameQueue::open(name)
    }

    fn name(&self) -> &str {
        FrameQueue::name(self)
    }

    fn capacity(&self) -> u64 {
        FrameQueue::capacity(self)
    }

    fn try_pop_into(&mut self, frame: &mut Frame) -> bool {
        FrameQueue::try_pop_into(self, frame)
    }

    fn try_pop_zero_copy(&mut self) -> Option<FrameView<'_>> {
        FrameQueue::try_pop_zero_copy(self)
    }

    fn overruns(&self) -> u64 {
        FrameQueue::overruns(self)
    }
}

impl<const N: usize> SharedFrameQueue for MultiConsumerFrameQueue<N> {
    fn open(name: &str) -> Result<Self, QueueError> {
        MultiConsumerFrameQueue::open(name)
    }

    fn name(&self) -> &str {
        MultiConsumerFrameQueue::name(self)
    }

    fn capacity(&self) -> u64 {
        MultiConsumerFrameQueue::capacity(self)
    }

    fn try_pop_into(&mut self, frame: &mut Frame) -> bool {
        MultiConsumerFrameQueue::try_pop_into(self, frame)
    }

    fn try_pop_zero_copy(&mut self) -> Option<FrameView<'_>> {
        MultiConsumerFrameQueue::try_pop_zero_copy(self)
    }

    fn overruns(&self) -> u64 {
        MultiConsumerFrameQueue::overruns(self)
    }
}

/// Open every named queue, keyed by the name as given.
///
/// Fails on the first name that is missing or not a compatible queue, and when
/// `names` is empty.
pub fn open_verified<Q, S>(names: &[S]) -> Result<HashMap<String, Q>, QueueError>
where
    Q: SharedFrameQueue,
    S: AsRef<str>,
{
    if names.is_empty() {
        return Err(QueueError::NoQueues);
    }

    let mut queues = HashMap::with_capacity(names.len());
    for name in names {
        let name = name.as_ref();
        let queue = Q::open(name)?;
        queues.insert(name.to_string(), queue);
    }
    info!(count = queues.len(), "queue: opened verified set");
    Ok(queues)
}
