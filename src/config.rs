//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{CrsfLinkError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub crsf: CrsfConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Device paths in failover order (primary first)
    #[serde(default = "default_serial_ports")]
    pub ports: Vec<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Read poll timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default = "default_reconnect_max_interval_ms")]
    pub reconnect_max_interval_ms: u64,
}

/// CRSF link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CrsfConfig {
    #[serde(default = "default_packet_rate_hz")]
    pub packet_rate_hz: u32,

    /// Link is considered down when no valid frame arrived for this long
    #[serde(default = "default_link_timeout_ms")]
    pub link_timeout_ms: u64,

    /// Low-pass coefficient for filtered attitude (1.0 = no filtering)
    #[serde(default = "default_attitude_filter_alpha")]
    pub attitude_filter_alpha: f32,

    /// Minimum time on a port before a silent link moves to the next port
    #[serde(default = "default_failover_holdoff_ms")]
    pub failover_holdoff_ms: u64,
}

/// Cross-process telemetry publisher configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PublisherConfig {
    #[serde(default = "default_publisher_enabled")]
    pub enabled: bool,

    #[serde(default = "default_publisher_path")]
    pub path: String,

    #[serde(default = "default_publish_interval_ms")]
    pub interval_ms: u64,

    /// Readers reject records whose heartbeat is older than this
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files; empty logs to stdout only
    #[serde(default)]
    pub dir: String,
}

// Default value functions
fn default_serial_ports() -> Vec<String> {
    vec!["/dev/ttyAMA0".to_string(), "/dev/ttyS0".to_string()]
}
fn default_baud_rate() -> u32 { 420000 }
fn default_timeout_ms() -> u64 { 20 }
fn default_write_timeout_ms() -> u64 { 50 }
fn default_reconnect_interval_ms() -> u64 { 250 }
fn default_reconnect_max_interval_ms() -> u64 { 5000 }

fn default_packet_rate_hz() -> u32 { 100 }
fn default_link_timeout_ms() -> u64 { 1000 }
fn default_attitude_filter_alpha() -> f32 { 0.2 }
fn default_failover_holdoff_ms() -> u64 { 2000 }

fn default_publisher_enabled() -> bool { true }
fn default_publisher_path() -> String { "/tmp/crsf_telemetry.dat".to_string() }
fn default_publish_interval_ms() -> u64 { 100 }
fn default_stale_after_ms() -> u64 { 2000 }

fn default_log_level() -> String { "info".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            ports: default_serial_ports(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            reconnect_max_interval_ms: default_reconnect_max_interval_ms(),
        }
    }
}

impl Default for CrsfConfig {
    fn default() -> Self {
        Self {
            packet_rate_hz: default_packet_rate_hz(),
            link_timeout_ms: default_link_timeout_ms(),
            attitude_filter_alpha: default_attitude_filter_alpha(),
            failover_holdoff_ms: default_failover_holdoff_ms(),
        }
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            enabled: default_publisher_enabled(),
            path: default_publisher_path(),
            interval_ms: default_publish_interval_ms(),
            stale_after_ms: default_stale_after_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: String::new(),
        }
    }
}

impl CrsfConfig {
    /// Channel transmit period derived from the packet rate
    pub fn packet_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.packet_rate_hz.max(1)))
    }

    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms)
    }

    /// How long a port must stay silent before failing over to the next one
    pub fn failover_dwell(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms.max(self.failover_holdoff_ms))
    }
}

fn invalid(message: impl std::fmt::Display) -> CrsfLinkError {
    CrsfLinkError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use crsf_link::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.ports.is_empty() || self.serial.ports.iter().any(|p| p.is_empty()) {
            return Err(invalid("serial ports must be a non-empty list of device paths"));
        }

        if ![115200, 400000, 420000, 921600, 1870000, 3750000].contains(&self.serial.baud_rate) {
            return Err(invalid(
                "baud_rate must be one of: 115200, 400000, 420000, 921600, 1870000, 3750000",
            ));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 1000 {
            return Err(invalid("timeout_ms must be between 1 and 1000"));
        }

        if self.serial.write_timeout_ms == 0 || self.serial.write_timeout_ms > 1000 {
            return Err(invalid("write_timeout_ms must be between 1 and 1000"));
        }

        if self.serial.reconnect_interval_ms == 0 || self.serial.reconnect_interval_ms > 60000 {
            return Err(invalid("reconnect_interval_ms must be between 1 and 60000"));
        }

        if self.serial.reconnect_max_interval_ms < self.serial.reconnect_interval_ms
            || self.serial.reconnect_max_interval_ms > 60000
        {
            return Err(invalid(
                "reconnect_max_interval_ms must be between reconnect_interval_ms and 60000",
            ));
        }

        // 20-250 Hz covers the 4-50 ms CRSF frame intervals
        if !(20..=250).contains(&self.crsf.packet_rate_hz) {
            return Err(invalid("packet_rate_hz must be between 20 and 250"));
        }

        if self.crsf.link_timeout_ms == 0 || self.crsf.link_timeout_ms > 60000 {
            return Err(invalid("link_timeout_ms must be between 1 and 60000"));
        }

        if !(self.crsf.attitude_filter_alpha > 0.0 && self.crsf.attitude_filter_alpha <= 1.0) {
            return Err(invalid("attitude_filter_alpha must be in (0.0, 1.0]"));
        }

        if self.crsf.failover_holdoff_ms > 60000 {
            return Err(invalid("failover_holdoff_ms must be at most 60000"));
        }

        if self.publisher.enabled && self.publisher.path.is_empty() {
            return Err(invalid("publisher path cannot be empty when enabled"));
        }

        if self.publisher.interval_ms == 0 || self.publisher.interval_ms > 60000 {
            return Err(invalid("publisher interval_ms must be between 1 and 60000"));
        }

        if self.publisher.stale_after_ms <= self.publisher.interval_ms {
            return Err(invalid("publisher stale_after_ms must exceed interval_ms"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("logging level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}
