//! # CRSF Protocol Constants and Types
//!
//! Core protocol definitions for CRSF (Crossfire) communication.
//!
//! Wire layout: `[address][length][type][payload...][crc]` where `length`
//! counts type + payload + crc.

use serde::{Deserialize, Serialize};

use crate::error::{CrsfLinkError, Result};

/// CRSF frame sync byte (flight controller address, used for outbound frames)
pub const CRSF_SYNC_BYTE: u8 = 0xC8;

/// Radio transmitter (handset) address
pub const CRSF_ADDRESS_RADIO_TRANSMITTER: u8 = 0xEA;

/// CRSF receiver address
pub const CRSF_ADDRESS_CRSF_RECEIVER: u8 = 0xEC;

/// CRSF transmitter module address
pub const CRSF_ADDRESS_CRSF_TRANSMITTER: u8 = 0xEE;

/// GPS packet type
pub const CRSF_FRAMETYPE_GPS: u8 = 0x02;

/// Battery Sensor packet type
pub const CRSF_FRAMETYPE_BATTERY_SENSOR: u8 = 0x08;

/// Link Statistics packet type
pub const CRSF_FRAMETYPE_LINK_STATISTICS: u8 = 0x14;

/// RC Channels packet type
pub const CRSF_FRAMETYPE_RC_CHANNELS_PACKED: u8 = 0x16;

/// Attitude packet type
pub const CRSF_FRAMETYPE_ATTITUDE: u8 = 0x1E;

/// Maximum CRSF frame size including address and length bytes
pub const CRSF_MAX_FRAME_SIZE: usize = 64;

/// Maximum CRSF payload size
/// Frame structure: sync(1) + length(1) + type(1) + payload(N) + crc(1)
pub const CRSF_MAX_PAYLOAD_SIZE: usize = CRSF_MAX_FRAME_SIZE - 4;

/// Smallest valid length byte (type + crc, empty payload)
pub const CRSF_MIN_FRAME_LENGTH: u8 = 2;

/// Largest valid length byte (type + 60-byte payload + crc)
pub const CRSF_MAX_FRAME_LENGTH: u8 = (CRSF_MAX_PAYLOAD_SIZE + 2) as u8;

/// RC channels payload size (22 bytes for 16 channels × 11 bits)
pub const CRSF_RC_CHANNELS_PAYLOAD_SIZE: usize = 22;

/// RC channels frame length (type + payload + crc)
pub const CRSF_RC_CHANNELS_FRAME_LENGTH: u8 = 0x18; // 24 bytes

/// Number of RC channels
pub const CRSF_NUM_CHANNELS: usize = 16;

/// Raw channel value range (11-bit: 0-2047)
pub const CRSF_CHANNEL_VALUE_MIN: u16 = 0;
pub const CRSF_CHANNEL_VALUE_MAX: u16 = 2047;

/// Raw value corresponding to 1500 µs
pub const CRSF_CHANNEL_VALUE_MID: u16 = 992;

/// Pulse-width channel range in microseconds
pub const CHANNEL_US_MIN: u16 = 1000;
pub const CHANNEL_US_MAX: u16 = 2000;
pub const CHANNEL_US_CENTER: u16 = 1500;

/// Link Statistics payload size
pub const CRSF_LINK_STATS_PAYLOAD_SIZE: usize = 10;

/// Battery Sensor payload size
pub const CRSF_BATTERY_SENSOR_PAYLOAD_SIZE: usize = 8;

/// GPS payload size
pub const CRSF_GPS_PAYLOAD_SIZE: usize = 15;

/// Attitude payload size
pub const CRSF_ATTITUDE_PAYLOAD_SIZE: usize = 6;

/// Raw RC channels array type (16 channels, 11-bit values)
pub type RcChannels = [u16; CRSF_NUM_CHANNELS];

/// Whether `byte` is an address byte that may start a frame
pub fn is_sync_byte(byte: u8) -> bool {
    matches!(
        byte,
        CRSF_SYNC_BYTE
            | CRSF_ADDRESS_RADIO_TRANSMITTER
            | CRSF_ADDRESS_CRSF_RECEIVER
            | CRSF_ADDRESS_CRSF_TRANSMITTER
    )
}

/// Convert a pulse width in microseconds to a raw 11-bit CRSF value
///
/// 1000 µs maps to 172, 1500 µs to 992 and 2000 µs to 1811.
pub fn us_to_crsf(us: u16) -> u16 {
    let offset = (f32::from(us) - f32::from(CHANNEL_US_CENTER)) * 1.6;
    let raw = offset.round() as i32 + i32::from(CRSF_CHANNEL_VALUE_MID);
    raw.clamp(i32::from(CRSF_CHANNEL_VALUE_MIN), i32::from(CRSF_CHANNEL_VALUE_MAX)) as u16
}

/// Convert a raw 11-bit CRSF value to a pulse width in microseconds
pub fn crsf_to_us(raw: u16) -> u16 {
    let offset = (f32::from(raw) - f32::from(CRSF_CHANNEL_VALUE_MID)) * 0.625;
    (offset.round() as i32 + i32::from(CHANNEL_US_CENTER)).max(0) as u16
}

/// Link statistics telemetry data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatistics {
    /// Uplink RSSI (antenna 1) in -dBm
    pub uplink_rssi_1: u8,

    /// Uplink RSSI (antenna 2) in -dBm (diversity)
    pub uplink_rssi_2: u8,

    /// Uplink link quality (0-100%)
    pub uplink_lq: u8,

    /// Uplink SNR in dB
    pub uplink_snr: i8,

    /// Active antenna (0 or 1)
    pub active_antenna: u8,

    /// RF mode / packet rate
    pub rf_mode: u8,

    /// Uplink TX power (encoded)
    pub uplink_tx_power: u8,

    /// Downlink RSSI in -dBm
    pub downlink_rssi: u8,

    /// Downlink link quality (0-100%)
    pub downlink_lq: u8,

    /// Downlink SNR in dB
    pub downlink_snr: i8,
}

/// Battery sensor telemetry data
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatterySensor {
    /// Battery voltage in volts
    pub voltage: f32,

    /// Current draw in amperes
    pub current: f32,

    /// Capacity used in mAh
    pub capacity_used: u32,

    /// Battery remaining percentage (0-100%)
    pub remaining_percent: u8,
}

/// GPS telemetry data
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsData {
    /// Latitude in degrees
    pub latitude: f64,

    /// Longitude in degrees
    pub longitude: f64,

    /// Ground speed in km/h
    pub ground_speed: f32,

    /// Heading in degrees
    pub heading: f32,

    /// Altitude in meters
    pub altitude: i32,

    /// Number of satellites
    pub satellites: u8,
}

/// Attitude telemetry data, in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttitudeData {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
}

/// CRSF frame structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrsfFrame {
    /// Frame type
    pub frame_type: u8,

    /// Payload data
    pub payload: Vec<u8>,
}

impl CrsfFrame {
    /// Create a new CRSF frame
    ///
    /// # Errors
    ///
    /// Returns error if payload exceeds CRSF_MAX_PAYLOAD_SIZE (60 bytes)
    pub fn new(frame_type: u8, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > CRSF_MAX_PAYLOAD_SIZE {
            return Err(CrsfLinkError::CrsfProtocol(format!(
                "Payload size {} exceeds maximum {}",
                payload.len(),
                CRSF_MAX_PAYLOAD_SIZE
            )));
        }

        Ok(Self { frame_type, payload })
    }

    /// Get frame length byte (type + payload + crc)
    ///
    /// Cannot overflow since payload is validated to be ≤ 60 bytes
    pub fn length(&self) -> u8 {
        (1 + self.payload.len() + 1) as u8
    }
}
