mod config;

pub use config::{CaptureConfig, ConfigError, MAX_FRAME_SIZE, ViewerConfig};
