use std::io;

/// Failures opening, creating or registering on a queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("shared memory '{name}' unavailable")]
    Shm {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("shared memory '{name}' is not a compatible queue: {reason}")]
    Layout { name: String, reason: &'static str },

    #[error("invalid queue sizing: {0}")]
    Sizing(&'static str),

    #[error("all {max} consumer slots are taken")]
    FanOutExhausted { max: usize },

    #[error("no queue names given")]
    NoQueues,
}

/// Reasons a frame was refused by `try_push`. Nothing was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    #[error("frame has no payload")]
    EmptyFrame,

    #[error("frame dimensions must be positive")]
    ZeroDimension,

    #[error("payload of {payload} bytes exceeds the {max} byte frame budget")]
    ExceedsFrameBudget { payload: u64, max: u64 },

    #[error("entry of {required} bytes exceeds ring capacity {capacity}")]
    TooLarge { required: u64, capacity: u64 },
}
