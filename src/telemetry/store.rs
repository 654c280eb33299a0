//! Live telemetry state, written by the receive path and read by anyone
//!
//! The whole state lives behind an `ArcSwap`: the writer builds a new state
//! and swaps it in, readers load the current `Arc` without blocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::time::Instant;

use super::{AttitudeTelemetry, TelemetrySnapshot};
use crate::config::CrsfConfig;
use crate::crsf::decoder::{
    decode_attitude, decode_battery_sensor, decode_gps, decode_link_statistics,
    decode_rc_channels, FrameError,
};
use crate::crsf::protocol::*;

/// A decoded telemetry frame
#[derive(Debug, Clone, PartialEq)]
enum TelemetryUpdate {
    Link(LinkStatistics),
    Battery(BatterySensor),
    Gps(GpsData),
    Attitude(AttitudeData),
    Channels(RcChannels),
    Unknown,
}

impl TelemetryUpdate {
    fn parse(frame: &CrsfFrame) -> Result<Self, FrameError> {
        let payload = &frame.payload;
        Ok(match frame.frame_type {
            CRSF_FRAMETYPE_LINK_STATISTICS => Self::Link(decode_link_statistics(payload)?),
            CRSF_FRAMETYPE_BATTERY_SENSOR => Self::Battery(decode_battery_sensor(payload)?),
            CRSF_FRAMETYPE_GPS => Self::Gps(decode_gps(payload)?),
            CRSF_FRAMETYPE_ATTITUDE => Self::Attitude(decode_attitude(payload)?),
            CRSF_FRAMETYPE_RC_CHANNELS_PACKED => Self::Channels(decode_rc_channels(payload)?),
            _ => Self::Unknown,
        })
    }
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    snapshot: TelemetrySnapshot,
    /// Valid frame seen since the last transport failure
    link_active: bool,
    last_frame_at: Option<Instant>,
    attitude_primed: bool,
}

/// Shift an angle in degrees into [-180, 180)
fn wrap_degrees(angle: f32) -> f32 {
    (angle + 180.0).rem_euclid(360.0) - 180.0
}

/// Exponential low-pass, following the shortest way around the circle
fn smooth_angle(previous: f32, raw: f32, alpha: f32) -> f32 {
    wrap_degrees(previous + alpha * wrap_degrees(raw - previous))
}

/// Telemetry state store
#[derive(Debug)]
pub struct TelemetryStore {
    state: ArcSwap<StoreState>,
    packets_sent: AtomicU64,
    link_timeout: Duration,
    filter_alpha: f32,
}

impl TelemetryStore {
    pub fn new(config: &CrsfConfig) -> Self {
        Self::with_settings(config.link_timeout(), config.attitude_filter_alpha)
    }

    pub fn with_settings(link_timeout: Duration, filter_alpha: f32) -> Self {
        Self {
            state: ArcSwap::from_pointee(StoreState::default()),
            packets_sent: AtomicU64::new(0),
            link_timeout,
            filter_alpha,
        }
    }

    fn modify(&self, mut change: impl FnMut(&mut StoreState)) {
        self.state.rcu(|current| {
            let mut next = StoreState::clone(current);
            change(&mut next);
            next
        });
    }

    /// Apply a CRC-valid frame received now
    ///
    /// # Errors
    ///
    /// Returns the payload error for a known frame type whose payload is
    /// truncated; the frame is counted as lost
    pub fn update(&self, frame: &CrsfFrame) -> Result<(), FrameError> {
        self.update_at(frame, Instant::now())
    }

    /// Apply a CRC-valid frame received at `now`
    pub fn update_at(&self, frame: &CrsfFrame, now: Instant) -> Result<(), FrameError> {
        let update = match TelemetryUpdate::parse(frame) {
            Ok(update) => update,
            Err(e) => {
                self.record_loss();
                return Err(e);
            }
        };

        let received_ms = chrono::Utc::now().timestamp_millis();
        let alpha = self.filter_alpha;

        self.modify(|state| {
            state.link_active = true;
            state.last_frame_at = Some(now);

            let snapshot = &mut state.snapshot;
            snapshot.packets_received += 1;
            snapshot.last_receive = received_ms;

            match &update {
                TelemetryUpdate::Link(stats) => snapshot.link = *stats,
                TelemetryUpdate::Battery(battery) => {
                    snapshot.battery.voltage = battery.voltage;
                    snapshot.battery.current = battery.current;
                    snapshot.battery.capacity = battery.capacity_used as f32;
                    snapshot.battery.remaining = f32::from(battery.remaining_percent);
                }
                TelemetryUpdate::Gps(gps) => {
                    snapshot.gps.latitude = gps.latitude;
                    snapshot.gps.longitude = gps.longitude;
                    snapshot.gps.altitude = gps.altitude as f32;
                    snapshot.gps.speed = gps.ground_speed;
                }
                TelemetryUpdate::Attitude(attitude) => {
                    let raw = AttitudeTelemetry {
                        roll: attitude.roll,
                        pitch: attitude.pitch,
                        yaw: attitude.yaw,
                    };
                    snapshot.attitude = if state.attitude_primed {
                        let previous = snapshot.attitude;
                        AttitudeTelemetry {
                            roll: smooth_angle(previous.roll, raw.roll, alpha),
                            pitch: smooth_angle(previous.pitch, raw.pitch, alpha),
                            yaw: smooth_angle(previous.yaw, raw.yaw, alpha),
                        }
                    } else {
                        raw
                    };
                    snapshot.attitude_raw = raw;
                    state.attitude_primed = true;
                }
                TelemetryUpdate::Channels(raw) => snapshot.channels = raw.map(crsf_to_us),
                TelemetryUpdate::Unknown => snapshot.unknown_frames += 1,
            }
        });

        Ok(())
    }

    /// Count a malformed frame
    pub fn record_loss(&self) {
        self.modify(|state| state.snapshot.packets_lost += 1);
    }

    /// Count a transmitted channel frame
    pub fn record_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Transport failed: the link stays down until a fresh frame arrives
    pub fn mark_link_down(&self) {
        if self.state.load().link_active {
            self.modify(|state| state.link_active = false);
        }
    }

    pub fn set_active_port(&self, port: u8) {
        self.modify(|state| state.snapshot.active_port = port);
    }

    /// Whether the link is up right now
    pub fn link_up(&self) -> bool {
        self.link_up_at(Instant::now())
    }

    pub fn link_up_at(&self, now: Instant) -> bool {
        self.is_fresh(&self.state.load(), now)
    }

    fn is_fresh(&self, state: &StoreState, now: Instant) -> bool {
        state.link_active
            && state
                .last_frame_at
                .is_some_and(|at| now.saturating_duration_since(at) <= self.link_timeout)
    }

    /// Consistent copy of the current telemetry
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> TelemetrySnapshot {
        let state: Arc<StoreState> = self.state.load_full();
        let mut snapshot = state.snapshot.clone();
        snapshot.link_up = self.is_fresh(&state, now);
        snapshot.packets_sent = self.packets_sent.load(Ordering::Relaxed);
        snapshot.timestamp = chrono::Utc::now().timestamp_millis();
        snapshot
    }
}
