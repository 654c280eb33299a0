//! # CRC8-DVB-S2 Implementation
//!
//! CRC-8-DVB-S2 checksum used by CRSF. The checksum covers the frame type
//! and payload bytes; address and length bytes are excluded.
//!
//! **Polynomial**: 0xD5 (x^8 + x^7 + x^6 + x^4 + x^2 + 1)
//! **Initial Value**: 0x00

/// CRC-8-DVB-S2 polynomial
const CRC8_POLY: u8 = 0xD5;

/// Precomputed CRC8 lookup table
const CRC8_TABLE: [u8; 256] = generate_crc8_table();

/// Generate CRC8 lookup table at compile time
const fn generate_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ CRC8_POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Calculate CRC8-DVB-S2 checksum
///
/// # Arguments
///
/// * `data` - Byte slice to checksum (Type + Payload)
///
/// # Examples
///
/// ```
/// use crsf_link::crsf::crc::crc8_dvb_s2;
///
/// let mut data = vec![0x16];
/// data.extend_from_slice(&[0u8; 22]);
/// assert_eq!(crc8_dvb_s2(&data), 0xEF);
/// ```
pub fn crc8_dvb_s2(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |crc, &byte| CRC8_TABLE[(crc ^ byte) as usize])
}

/// Checksum a frame type followed by its payload without concatenating them
pub fn frame_crc(frame_type: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(CRC8_TABLE[frame_type as usize], |crc, &byte| {
            CRC8_TABLE[(crc ^ byte) as usize]
        })
}
