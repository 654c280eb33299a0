//! # CRSF Packet Decoder
//!
//! Stream decoding of CRSF frames and telemetry payload parsing
//! (Link Statistics, Battery, GPS, Attitude, RC Channels).

use bytes::{Buf, BytesMut};
use thiserror::Error;

use super::crc::frame_crc;
use super::protocol::*;

/// Reasons a frame is rejected by the codec
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("invalid frame length {len}, must be between 2 and 62")]
    InvalidLength { len: u8 },

    #[error("CRC mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    CrcMismatch { expected: u8, actual: u8 },

    #[error("payload for frame type 0x{frame_type:02X} too short: {len} bytes")]
    PayloadTooShort { frame_type: u8, len: usize },
}

/// Outcome of one decode step over a byte buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete, CRC-valid frame occupying the first `consumed` bytes
    Frame { frame: CrsfFrame, consumed: usize },
    /// A malformed frame; drop `consumed` bytes and count a loss
    Malformed { error: FrameError, consumed: usize },
    /// Bytes before the next sync byte; drop them silently
    Skip { consumed: usize },
    /// More bytes are needed
    Incomplete,
}

/// Decode the frame at the start of `buf`
///
/// Scans for an address byte, then validates length and CRC. An invalid
/// length drops only the address byte so the scan restarts right after it.
/// On a CRC mismatch the claimed frame span is searched for a real frame
/// first: if one starts inside it, the bytes before it were noise and are
/// skipped silently. Otherwise the whole corrupt frame is dropped.
pub fn decode(buf: &[u8]) -> Decoded {
    match buf.iter().position(|&b| is_sync_byte(b)) {
        Some(0) => {}
        Some(start) => return Decoded::Skip { consumed: start },
        None if buf.is_empty() => return Decoded::Incomplete,
        None => return Decoded::Skip { consumed: buf.len() },
    }

    match decode_at_sync(buf) {
        Decoded::Malformed {
            error: error @ FrameError::CrcMismatch { .. },
            consumed,
        } => resync_within(buf, consumed).unwrap_or(Decoded::Malformed { error, consumed }),
        other => other,
    }
}

/// Look for a frame starting inside the first `span` bytes, after the header
///
/// Returns `Skip` up to that frame, `Incomplete` while a candidate still
/// needs more bytes, or `None` if no frame starts in the span.
fn resync_within(buf: &[u8], span: usize) -> Option<Decoded> {
    for offset in 1..span {
        if !is_sync_byte(buf[offset]) {
            continue;
        }
        match decode_at_sync(&buf[offset..]) {
            Decoded::Frame { .. } => return Some(Decoded::Skip { consumed: offset }),
            Decoded::Incomplete => return Some(Decoded::Incomplete),
            _ => {}
        }
    }
    None
}

/// Decode a frame whose address byte is `buf[0]`
fn decode_at_sync(buf: &[u8]) -> Decoded {
    let Some(&len) = buf.get(1) else {
        return Decoded::Incomplete;
    };

    if !(CRSF_MIN_FRAME_LENGTH..=CRSF_MAX_FRAME_LENGTH).contains(&len) {
        return Decoded::Malformed {
            error: FrameError::InvalidLength { len },
            consumed: 1,
        };
    }

    let total = len as usize + 2;
    if buf.len() < total {
        return Decoded::Incomplete;
    }

    let frame_type = buf[2];
    let payload = &buf[3..total - 1];
    let actual = buf[total - 1];
    let expected = frame_crc(frame_type, payload);

    if expected != actual {
        return Decoded::Malformed {
            error: FrameError::CrcMismatch { expected, actual },
            consumed: total,
        };
    }

    Decoded::Frame {
        frame: CrsfFrame {
            frame_type,
            payload: payload.to_vec(),
        },
        consumed: total,
    }
}

/// Incremental decoder that accepts bytes in arbitrary chunks
///
/// # Examples
///
/// ```
/// use crsf_link::crsf::decoder::FrameDecoder;
/// use crsf_link::crsf::encoder::encode_rc_channels_frame;
///
/// let bytes = encode_rc_channels_frame(&[992; 16]);
/// let mut decoder = FrameDecoder::new();
///
/// decoder.push(&bytes[..10]);
/// assert!(decoder.next_frame().is_none());
///
/// decoder.push(&bytes[10..]);
/// let frame = decoder.next_frame().unwrap().unwrap();
/// assert_eq!(frame.frame_type, 0x16);
/// ```
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(CRSF_MAX_FRAME_SIZE * 4),
        }
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Drop any partial frame, e.g. after reconnecting
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of buffered, not yet decoded bytes
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Pull the next frame or frame error out of the buffer
    ///
    /// Returns `None` once the buffer holds no complete frame.
    pub fn next_frame(&mut self) -> Option<Result<CrsfFrame, FrameError>> {
        loop {
            match decode(&self.buffer) {
                Decoded::Frame { frame, consumed } => {
                    self.buffer.advance(consumed);
                    return Some(Ok(frame));
                }
                Decoded::Malformed { error, consumed } => {
                    self.buffer.advance(consumed);
                    return Some(Err(error));
                }
                Decoded::Skip { consumed } => self.buffer.advance(consumed),
                Decoded::Incomplete => return None,
            }
        }
    }
}

fn require(frame_type: u8, payload: &[u8], size: usize) -> Result<(), FrameError> {
    if payload.len() < size {
        return Err(FrameError::PayloadTooShort {
            frame_type,
            len: payload.len(),
        });
    }
    Ok(())
}

/// Decode Link Statistics telemetry packet (10 bytes)
pub fn decode_link_statistics(payload: &[u8]) -> Result<LinkStatistics, FrameError> {
    require(CRSF_FRAMETYPE_LINK_STATISTICS, payload, CRSF_LINK_STATS_PAYLOAD_SIZE)?;

    Ok(LinkStatistics {
        uplink_rssi_1: payload[0],
        uplink_rssi_2: payload[1],
        uplink_lq: payload[2],
        uplink_snr: payload[3] as i8,
        active_antenna: payload[4],
        rf_mode: payload[5],
        uplink_tx_power: payload[6],
        downlink_rssi: payload[7],
        downlink_lq: payload[8],
        downlink_snr: payload[9] as i8,
    })
}

/// Decode Battery Sensor telemetry packet (8 bytes)
pub fn decode_battery_sensor(payload: &[u8]) -> Result<BatterySensor, FrameError> {
    require(CRSF_FRAMETYPE_BATTERY_SENSOR, payload, CRSF_BATTERY_SENSOR_PAYLOAD_SIZE)?;

    // Voltage: 2 bytes, big-endian, in 0.1 V
    let voltage = u16::from_be_bytes([payload[0], payload[1]]) as f32 / 10.0;

    // Current: 2 bytes, big-endian, in 0.1 A
    let current = u16::from_be_bytes([payload[2], payload[3]]) as f32 / 10.0;

    // Capacity: 3 bytes, big-endian, in mAh
    let capacity_used = u32::from_be_bytes([0, payload[4], payload[5], payload[6]]);

    Ok(BatterySensor {
        voltage,
        current,
        capacity_used,
        remaining_percent: payload[7],
    })
}

/// Decode GPS telemetry packet (15 bytes)
pub fn decode_gps(payload: &[u8]) -> Result<GpsData, FrameError> {
    require(CRSF_FRAMETYPE_GPS, payload, CRSF_GPS_PAYLOAD_SIZE)?;

    // Latitude / longitude: degrees × 10^7
    let lat_raw = i32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let lon_raw = i32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);

    // Ground speed: km/h × 10
    let speed_raw = u16::from_be_bytes([payload[8], payload[9]]);

    // Heading: degrees × 100
    let heading_raw = u16::from_be_bytes([payload[10], payload[11]]);

    // Altitude: meters + 1000
    let altitude_raw = u16::from_be_bytes([payload[12], payload[13]]);

    Ok(GpsData {
        latitude: lat_raw as f64 / 10_000_000.0,
        longitude: lon_raw as f64 / 10_000_000.0,
        ground_speed: speed_raw as f32 / 10.0,
        heading: heading_raw as f32 / 100.0,
        altitude: altitude_raw as i32 - 1000,
        satellites: payload[14],
    })
}

/// Decode Attitude telemetry packet (6 bytes)
pub fn decode_attitude(payload: &[u8]) -> Result<AttitudeData, FrameError> {
    require(CRSF_FRAMETYPE_ATTITUDE, payload, CRSF_ATTITUDE_PAYLOAD_SIZE)?;

    let angle = |hi: u8, lo: u8| (i16::from_be_bytes([hi, lo]) as f32 / 10_000.0).to_degrees();

    Ok(AttitudeData {
        pitch: angle(payload[0], payload[1]),
        roll: angle(payload[2], payload[3]),
        yaw: angle(payload[4], payload[5]),
    })
}

/// Unpack RC channels payload (22 bytes) into raw 11-bit values
pub fn decode_rc_channels(payload: &[u8]) -> Result<RcChannels, FrameError> {
    require(CRSF_FRAMETYPE_RC_CHANNELS_PACKED, payload, CRSF_RC_CHANNELS_PAYLOAD_SIZE)?;

    let mut channels = [0u16; CRSF_NUM_CHANNELS];
    let mut accumulator: u32 = 0;
    let mut bits = 0;
    let mut index = 0;

    for &byte in &payload[..CRSF_RC_CHANNELS_PAYLOAD_SIZE] {
        accumulator |= (byte as u32) << bits;
        bits += 8;

        if bits >= 11 {
            channels[index] = (accumulator & 0x07FF) as u16;
            accumulator >>= 11;
            bits -= 11;
            index += 1;
        }
    }

    Ok(channels)
}
