//! # CRSF Packet Encoder
//!
//! Serializes frames for the wire and builds RC channel and telemetry payloads.

use super::crc::frame_crc;
use super::protocol::*;

/// Encode a frame into its complete wire form, addressed to the flight controller
///
/// # Returns
///
/// * `Vec<u8>` - Sync + Length + Type + Payload + CRC
///
/// # Examples
///
/// ```
/// use crsf_link::crsf::encoder::encode_frame;
/// use crsf_link::crsf::protocol::CrsfFrame;
///
/// let frame = CrsfFrame::new(0x16, vec![0u8; 22]).unwrap();
/// let bytes = encode_frame(&frame);
/// assert_eq!(bytes.len(), 26);
/// assert_eq!(bytes[25], 0xEF);
/// ```
pub fn encode_frame(frame: &CrsfFrame) -> Vec<u8> {
    encode_frame_to(CRSF_SYNC_BYTE, frame)
}

/// Encode a frame with an explicit address byte
pub fn encode_frame_to(address: u8, frame: &CrsfFrame) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frame.payload.len() + 4);
    bytes.push(address);
    bytes.push(frame.length());
    bytes.push(frame.frame_type);
    bytes.extend_from_slice(&frame.payload);
    bytes.push(frame_crc(frame.frame_type, &frame.payload));
    bytes
}

/// Encode raw RC channels into a complete CRSF frame
///
/// # Arguments
///
/// * `channels` - Array of 16 channel values (11-bit: 0-2047)
///
/// # Returns
///
/// * `Vec<u8>` - Complete CRSF frame (26 bytes)
pub fn encode_rc_channels_frame(channels: &RcChannels) -> Vec<u8> {
    let frame = CrsfFrame {
        frame_type: CRSF_FRAMETYPE_RC_CHANNELS_PACKED,
        payload: encode_rc_channels_payload(channels),
    };
    encode_frame(&frame)
}

/// Encode pulse-width channels (1000-2000 µs) into a complete CRSF frame
pub fn encode_channels_us_frame(channels_us: &[u16; CRSF_NUM_CHANNELS]) -> Vec<u8> {
    encode_rc_channels_frame(&channels_us.map(us_to_crsf))
}

/// Encode RC channels into payload (22 bytes)
///
/// Packs 16 channels (11 bits each) into 22 bytes as a continuous
/// bitstream, LSB first:
/// ```text
/// Byte 0: Ch1[0:7]
/// Byte 1: Ch1[8:10] | Ch2[0:4]
/// Byte 2: Ch2[5:10] | Ch3[0:1]
/// ...
/// ```
pub fn encode_rc_channels_payload(channels: &RcChannels) -> Vec<u8> {
    let mut payload = vec![0u8; CRSF_RC_CHANNELS_PAYLOAD_SIZE];
    let mut bit_index = 0;

    for &channel in channels.iter() {
        let value = channel.min(CRSF_CHANNEL_VALUE_MAX);

        for bit in 0..11 {
            if (value >> bit) & 1 == 1 {
                payload[bit_index / 8] |= 1 << (bit_index % 8);
            }
            bit_index += 1;
        }
    }

    payload
}

/// Encode Link Statistics payload (10 bytes)
pub fn encode_link_statistics(stats: &LinkStatistics) -> Vec<u8> {
    vec![
        stats.uplink_rssi_1,
        stats.uplink_rssi_2,
        stats.uplink_lq,
        stats.uplink_snr as u8,
        stats.active_antenna,
        stats.rf_mode,
        stats.uplink_tx_power,
        stats.downlink_rssi,
        stats.downlink_lq,
        stats.downlink_snr as u8,
    ]
}

/// Encode Battery Sensor payload (8 bytes, big-endian)
pub fn encode_battery_sensor(battery: &BatterySensor) -> Vec<u8> {
    let voltage = (battery.voltage * 10.0).round() as u16;
    let current = (battery.current * 10.0).round() as u16;
    let capacity = battery.capacity_used.min(0x00FF_FFFF).to_be_bytes();

    let mut payload = Vec::with_capacity(CRSF_BATTERY_SENSOR_PAYLOAD_SIZE);
    payload.extend_from_slice(&voltage.to_be_bytes());
    payload.extend_from_slice(&current.to_be_bytes());
    payload.extend_from_slice(&capacity[1..]);
    payload.push(battery.remaining_percent);
    payload
}

/// Encode GPS payload (15 bytes, big-endian)
pub fn encode_gps(gps: &GpsData) -> Vec<u8> {
    let latitude = (gps.latitude * 10_000_000.0).round() as i32;
    let longitude = (gps.longitude * 10_000_000.0).round() as i32;
    let speed = (gps.ground_speed * 10.0).round() as u16;
    let heading = (gps.heading * 100.0).round() as u16;
    let altitude = gps.altitude.saturating_add(1000).clamp(0, i32::from(u16::MAX)) as u16;

    let mut payload = Vec::with_capacity(CRSF_GPS_PAYLOAD_SIZE);
    payload.extend_from_slice(&latitude.to_be_bytes());
    payload.extend_from_slice(&longitude.to_be_bytes());
    payload.extend_from_slice(&speed.to_be_bytes());
    payload.extend_from_slice(&heading.to_be_bytes());
    payload.extend_from_slice(&altitude.to_be_bytes());
    payload.push(gps.satellites);
    payload
}

/// Encode Attitude payload (6 bytes: pitch, roll, yaw in 1e-4 rad)
pub fn encode_attitude(attitude: &AttitudeData) -> Vec<u8> {
    let to_raw = |degrees: f32| (degrees.to_radians() * 10_000.0).round() as i16;

    let mut payload = Vec::with_capacity(CRSF_ATTITUDE_PAYLOAD_SIZE);
    payload.extend_from_slice(&to_raw(attitude.pitch).to_be_bytes());
    payload.extend_from_slice(&to_raw(attitude.roll).to_be_bytes());
    payload.extend_from_slice(&to_raw(attitude.yaw).to_be_bytes());
    payload
}

/// Clamp a raw channel value to valid CRSF range (0-2047)
pub fn clamp_channel_value(value: u16) -> u16 {
    value.min(CRSF_CHANNEL_VALUE_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_rc_channels_frame_structure() {
        let frame = encode_rc_channels_frame(&[CRSF_CHANNEL_VALUE_MID; CRSF_NUM_CHANNELS]);

        assert_eq!(frame.len(), 26);
        assert_eq!(frame[0], CRSF_SYNC_BYTE);
        assert_eq!(frame[1], CRSF_RC_CHANNELS_FRAME_LENGTH);
        assert_eq!(frame[2], CRSF_FRAMETYPE_RC_CHANNELS_PACKED);
        assert_eq!(frame[25], 0xAD);
    }

    #[test]
    fn test_encode_channels_us_centered() {
        let frame = encode_channels_us_frame(&[CHANNEL_US_CENTER; CRSF_NUM_CHANNELS]);
        assert_eq!(frame, encode_rc_channels_frame(&[992; CRSF_NUM_CHANNELS]));
    }

    #[test]
    fn test_encode_rc_channels_all_max() {
        let payload = encode_rc_channels_payload(&[CRSF_CHANNEL_VALUE_MAX; CRSF_NUM_CHANNELS]);
        // 16 channels × 11 bits = 176 bits = 22 bytes, all ones
        assert_eq!(payload, vec![0xFFu8; 22]);
    }

    #[test]
    fn test_encode_rc_channels_single_channel() {
        let mut channels = [0u16; CRSF_NUM_CHANNELS];
        channels[0] = 0x7FF;

        let payload = encode_rc_channels_payload(&channels);

        assert_eq!(payload[0], 0xFF);
        assert_eq!(payload[1], 0x07);
        assert!(payload[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_encode_rc_channels_clamping() {
        let mut channels = [0u16; CRSF_NUM_CHANNELS];
        channels[0] = 5000;

        let payload = encode_rc_channels_payload(&channels);

        assert_eq!(payload[0], 0xFF);
        assert_eq!(payload[1] & 0x07, 0x07);
        assert_eq!(clamp_channel_value(u16::MAX), 2047);
    }

    #[test]
    fn test_encode_frame_with_address() {
        let frame = CrsfFrame::new(CRSF_FRAMETYPE_LINK_STATISTICS, vec![1; 10]).unwrap();
        let bytes = encode_frame_to(CRSF_ADDRESS_RADIO_TRANSMITTER, &frame);
        assert_eq!(bytes[0], 0xEA);
        assert_eq!(bytes[1], 12);
        assert_eq!(bytes.len(), 14);
    }

    #[test]
    fn test_encode_battery_sensor_layout() {
        let payload = encode_battery_sensor(&BatterySensor {
            voltage: 16.8,
            current: 12.5,
            capacity_used: 1000,
            remaining_percent: 75,
        });
        assert_eq!(payload, vec![0x00, 0xA8, 0x00, 0x7D, 0x00, 0x03, 0xE8, 0x4B]);
    }

    #[test]
    fn test_encode_gps_layout() {
        let payload = encode_gps(&GpsData {
            latitude: 0.0,
            longitude: 0.0,
            ground_speed: 25.5,
            heading: 90.0,
            altitude: 100,
            satellites: 12,
        });
        assert_eq!(payload.len(), CRSF_GPS_PAYLOAD_SIZE);
        assert_eq!(&payload[8..], &[0x00, 0xFF, 0x23, 0x28, 0x04, 0x4C, 12]);
    }

    #[test]
    fn test_encode_gps_altitude_saturates() {
        let gps = |altitude| GpsData {
            latitude: 0.0,
            longitude: 0.0,
            ground_speed: 0.0,
            heading: 0.0,
            altitude,
            satellites: 0,
        };

        assert_eq!(&encode_gps(&gps(i32::MAX))[12..14], &[0xFF, 0xFF]);
        assert_eq!(&encode_gps(&gps(i32::MIN))[12..14], &[0x00, 0x00]);
        assert_eq!(&encode_gps(&gps(-1000))[12..14], &[0x00, 0x00]);
    }
}
