use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub recorder: RecorderConfig,
    pub storage: StorageConfig,
    pub http: HttpConfig,
}

/// Capture and visualization settings for a recording session
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Burst length of the streaming backend
    pub timeslice_ms: u64,
    /// Delay between analyser readiness checks
    pub poll_interval_ms: u64,
    /// Readiness checks before giving up
    pub poll_attempts: u32,
    pub fft_size: usize,
    /// Lowest frequency bins left out of the volume sum
    pub skip_bins: usize,
    pub smoothing: f32,
    /// Volume sampling cadence
    pub frame_rate: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            timeslice_ms: 10,
            poll_interval_ms: 100,
            poll_attempts: 200, // 20 seconds
            fft_size: 512,
            skip_bins: 32,
            smoothing: 0.3,
            frame_rate: 60,
        }
    }
}

impl RecorderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.frame_rate.max(1)))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "~/.voicememo/memos".to_string(),
        }
    }
}

impl StorageConfig {
    /// Storage directory with `~` and environment variables expanded
    pub fn resolved_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.path)
            .with_context(|| format!("Failed to expand storage path: {}", self.path))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8088,
        }
    }
}

impl Config {
    /// Load `path` (any format the config crate understands, extension
    /// optional) and apply `VOICEMEMO__SECTION__KEY` environment overrides.
    /// A missing file falls back to defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("VOICEMEMO").separator("__"))
            .build()
            .context("Failed to read configuration")?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}
