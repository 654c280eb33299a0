//! # CRSF Protocol Module
//!
//! Implementation of the Crossfire (CRSF) frame codec.
//!
//! This module handles:
//! - Frame encoding with length field and CRC
//! - Stream decoding with resynchronization on arbitrary chunk boundaries
//! - RC channels packing (16 channels, 11-bit resolution)
//! - Telemetry payloads (Link Stats, Battery, GPS, Attitude)
//! - CRC8-DVB-S2 checksum calculation

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod crc;
