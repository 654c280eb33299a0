//! # CRSF Link Library
//!
//! Host-side engine for the CRSF (Crossfire) serial protocol used by
//! ExpressLRS and TBS radio links.
//!
//! The engine keeps a serial link to a CRSF device open, decodes inbound
//! telemetry frames into a consistent snapshot, transmits 16 RC channels at
//! a fixed rate, and publishes telemetry for other processes.

pub mod channels;
pub mod config;
pub mod crsf;
pub mod engine;
pub mod error;
pub mod serial;
pub mod telemetry;

pub use engine::{EngineHandle, EngineRegistry, LinkClient, LinkEngine};
pub use error::{CrsfLinkError, ErrorKind, Result};
