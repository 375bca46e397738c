//! Configuration for the VahanaIO daemon
//!
//! Loads configuration from a TOML file. Every field has a default, so an
//! empty file (or no file at all) yields a runnable server on `wlan0` with
//! the mock camera and motor. A rover selects its hardware backends
//! explicitly, as below.
//!
//! ```toml
//! [network]
//! interface = "wlan0"
//! command_port = 5000
//! video_port = 8000
//!
//! [camera]
//! backend = "command"
//! width = 400
//! height = 300
//!
//! [motor]
//! backend = "pca9685"
//! i2c_bus = "/dev/i2c-1"
//! address = 0x40
//!
//! [logging]
//! level = "info"
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub motor: MotorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener and per-connection settings shared by both channels
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Network interface whose IPv4 address both listeners bind to
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Explicit bind address, skips interface discovery when set
    #[serde(default)]
    pub bind_address: Option<IpAddr>,

    /// Command channel port (default: 5000)
    #[serde(default = "default_command_port")]
    pub command_port: u16,

    /// Video channel port (default: 8000)
    #[serde(default = "default_video_port")]
    pub video_port: u16,

    /// Maximum concurrent clients per channel (default: 1)
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// Sleep between non-blocking accept attempts; bounds how long an
    /// accept loop takes to notice shutdown (clamped to 1s)
    #[serde(default = "default_accept_poll_ms")]
    pub accept_poll_ms: u64,

    /// Inactivity timeout on command connections
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Write timeout on every client socket; a stalled peer is dropped
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,

    /// Size of a single command read
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

/// Video broadcast pacing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    /// Minimum delay between two frame sends (30ms ≈ 33 fps ceiling)
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Poll interval while no video client is connected
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

/// Camera backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    /// Synthetic frames, no hardware required
    #[default]
    Mock,
    /// MJPEG from an external capture process (e.g. `rpicam-vid`)
    Command,
    /// Replays JPEG files from a directory
    Directory,
}

/// Camera settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub backend: CameraBackend,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// JPEG quality (1-100)
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Frame production rate for backends that pace themselves
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Capture program for the `command` backend
    #[serde(default = "default_camera_command")]
    pub command: String,

    /// Source directory for the `directory` backend
    #[serde(default)]
    pub frames_dir: Option<PathBuf>,
}

/// Motor backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MotorBackend {
    /// Records speeds in memory
    #[default]
    Mock,
    /// PCA9685 PWM controller over Linux i2c-dev
    Pca9685,
}

/// Motor settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotorConfig {
    #[serde(default)]
    pub backend: MotorBackend,

    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: PathBuf,

    /// 7-bit I2C address of the PCA9685
    #[serde(default = "default_i2c_address")]
    pub address: u16,

    #[serde(default = "default_pwm_frequency")]
    pub pwm_frequency_hz: f32,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Accept loops must observe shutdown within this bound
const MAX_ACCEPT_POLL_MS: u64 = 1000;

fn default_interface() -> String {
    "wlan0".to_string()
}
fn default_command_port() -> u16 {
    5000
}
fn default_video_port() -> u16 {
    8000
}
fn default_max_clients() -> usize {
    1
}
fn default_accept_poll_ms() -> u64 {
    10
}
fn default_read_timeout_secs() -> u64 {
    60
}
fn default_write_timeout_secs() -> u64 {
    5
}
fn default_read_buffer_size() -> usize {
    1024
}
fn default_frame_interval_ms() -> u64 {
    30
}
fn default_idle_poll_ms() -> u64 {
    100
}
fn default_width() -> u32 {
    400
}
fn default_height() -> u32 {
    300
}
fn default_quality() -> u8 {
    70
}
fn default_fps() -> u32 {
    30
}
fn default_camera_command() -> String {
    "rpicam-vid".to_string()
}
fn default_i2c_bus() -> PathBuf {
    PathBuf::from("/dev/i2c-1")
}
fn default_i2c_address() -> u16 {
    0x40
}
fn default_pwm_frequency() -> f32 {
    50.0
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            bind_address: None,
            command_port: default_command_port(),
            video_port: default_video_port(),
            max_clients: default_max_clients(),
            accept_poll_ms: default_accept_poll_ms(),
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

impl NetworkConfig {
    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms.clamp(1, MAX_ACCEPT_POLL_MS))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs.max(1))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs.max(1))
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: default_frame_interval_ms(),
            idle_poll_ms: default_idle_poll_ms(),
        }
    }
}

impl StreamingConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms.max(1))
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: CameraBackend::default(),
            width: default_width(),
            height: default_height(),
            quality: default_quality(),
            fps: default_fps(),
            command: default_camera_command(),
            frames_dir: None,
        }
    }
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            backend: MotorBackend::default(),
            i2c_bus: default_i2c_bus(),
            address: default_i2c_address(),
            pwm_frequency_hz: default_pwm_frequency(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use vahana_io::config::Config;
    ///
    /// let config = Config::load("vahana.toml")?;
    /// # Ok::<(), vahana_io::Error>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            log::info!("Config {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }
}
