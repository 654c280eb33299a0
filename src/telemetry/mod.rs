//! # Telemetry Module
//!
//! Live telemetry state and its cross-process publication.
//!
//! This module handles:
//! - Applying decoded frames to the current snapshot
//! - Packet counters and link freshness
//! - Attitude filtering
//! - Publishing snapshots to a shared file for other processes

pub mod publisher;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::channels::WorkMode;
use crate::crsf::protocol::{LinkStatistics, CRSF_NUM_CHANNELS};

pub use publisher::{PublishedRecord, TelemetryPublisher, TelemetryReader};
pub use store::TelemetryStore;

/// GPS position and speed
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsTelemetry {
    /// Degrees
    pub latitude: f64,
    /// Degrees
    pub longitude: f64,
    /// Meters
    pub altitude: f32,
    /// km/h
    pub speed: f32,
}

/// Battery state
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryTelemetry {
    /// Volts
    pub voltage: f32,
    /// Amperes
    pub current: f32,
    /// Used capacity, mAh
    pub capacity: f32,
    /// Percent
    pub remaining: f32,
}

/// Roll, pitch and yaw in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AttitudeTelemetry {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// Consistent copy of the live telemetry state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// A valid frame arrived within the link timeout
    pub link_up: bool,
    /// Index of the open serial port (0 = primary)
    pub active_port: u8,
    /// Unix time (ms) of the last valid frame, 0 if none yet
    pub last_receive: i64,
    /// Unix time (ms) this snapshot was taken
    pub timestamp: i64,
    /// Last received RC channels in µs, zero until the first channels frame
    pub channels: [u16; CRSF_NUM_CHANNELS],
    pub packets_received: u64,
    pub packets_sent: u64,
    pub packets_lost: u64,
    /// Valid frames of types the engine does not interpret
    pub unknown_frames: u64,
    pub link: LinkStatistics,
    pub gps: GpsTelemetry,
    pub battery: BatteryTelemetry,
    pub attitude: AttitudeTelemetry,
    pub attitude_raw: AttitudeTelemetry,
}

/// Telemetry plus work mode, as returned to bindings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    #[serde(flatten)]
    pub telemetry: TelemetrySnapshot,
    pub work_mode: WorkMode,
}
