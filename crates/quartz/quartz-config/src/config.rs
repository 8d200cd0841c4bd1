use serde::Deserialize;
use std::path::Path;

/// Largest frame payload the drivers are built for: 1920x1080 at 4 bytes per
/// pixel. Producer and consumer must be compiled with the same value.
pub const MAX_FRAME_SIZE: usize = 1920 * 1080 * 4;

/// Settings for the producer driver.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    #[serde(default = "defaults::shm_name")]
    pub shm_name: String,
    #[serde(default = "defaults::frame_count")]
    pub frame_count: usize,
    #[serde(default = "defaults::rows")]
    pub rows: u32,
    #[serde(default = "defaults::cols")]
    pub cols: u32,
    #[serde(default = "defaults::pixel_format")]
    pub pixel_format: String,
    /// Target push rate; 0 pushes as fast as possible.
    #[serde(default = "defaults::fps")]
    pub fps: u32,
    #[serde(default)]
    pub multi_consumer: bool,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

/// Settings for the consumer driver.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    #[serde(default = "defaults::shm_names")]
    pub shm_names: Vec<String>,
    #[serde(default)]
    pub multi_consumer: bool,
    #[serde(default)]
    pub zero_copy: bool,
    #[serde(default = "defaults::poll_interval_us")]
    pub poll_interval_us: u64,
    #[serde(default = "defaults::report_interval_ms")]
    pub report_interval_ms: u64,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid '{field}': {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

mod defaults {
    pub fn shm_name() -> String {
        "quartz_frames".into()
    }

    pub fn shm_names() -> Vec<String> {
        vec![shm_name()]
    }

    pub fn frame_count() -> usize {
        8
    }

    pub fn rows() -> u32 {
        480
    }

    pub fn cols() -> u32 {
        640
    }

    pub fn pixel_format() -> String {
        "bgr8".into()
    }

    pub fn fps() -> u32 {
        30
    }

    pub fn poll_interval_us() -> u64 {
        100
    }

    pub fn report_interval_ms() -> u64 {
        1000
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

fn read(path: impl AsRef<Path> + ToString) -> Result<String, ConfigError> {
    std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })
}

impl CaptureConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        Self::parse(&read(path)?)
    }

    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let config: CaptureConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.shm_name.is_empty() {
            return Err(invalid("shm_name", "must not be empty"));
        }
        if self.frame_count == 0 {
            return Err(invalid("frame_count", "must be positive"));
        }
        if self.rows == 0 || self.cols == 0 {
            return Err(invalid("rows/cols", "must be positive"));
        }
        Ok(())
    }
}

impl ViewerConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        Self::parse(&read(path)?)
    }

    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let config: ViewerConfig = toml::from_str(toml_str)?;
        if config.shm_names.is_empty() {
            return Err(invalid("shm_names", "needs at least one queue"));
        }
        Ok(config)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            shm_name: defaults::shm_name(),
            frame_count: defaults::frame_count(),
            rows: defaults::rows(),
            cols: defaults::cols(),
            pixel_format: defaults::pixel_format(),
            fps: defaults::fps(),
            multi_consumer: false,
            log_level: defaults::log_level(),
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            shm_names: defaults::shm_names(),
            multi_consumer: false,
            zero_copy: false,
            poll_interval_us: defaults::poll_interval_us(),
            report_interval_ms: defaults::report_interval_ms(),
            log_level: defaults::log_level(),
        }
    }
}

fn invalid(field: &'static str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid { field, reason }
}
