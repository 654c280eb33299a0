//! Binding surface bound to one engine handle or to published telemetry
//!
//! Mirrors what a foreign-language wrapper needs: attach with a handle, then
//! query telemetry and drive channels. Inputs arrive as wide integers and
//! strings and are validated here before they reach the engine. A client in
//! another process attaches to the producer's telemetry file instead and
//! can only read.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{EngineHandle, EngineRegistry, LinkEngine};
use crate::channels::WorkMode;
use crate::crsf::protocol::{CHANNEL_US_MAX, CHANNEL_US_MIN, CRSF_NUM_CHANNELS};
use crate::error::{CrsfLinkError, Result};
use crate::telemetry::{TelemetryReader, TelemetryRecord};

fn valid_value(value: i64) -> bool {
    (i64::from(CHANNEL_US_MIN)..=i64::from(CHANNEL_US_MAX)).contains(&value)
}

#[derive(Debug)]
enum Attachment {
    Engine(Arc<LinkEngine>),
    Published(TelemetryReader),
}

/// Client for one attached engine
#[derive(Debug, Default)]
pub struct LinkClient {
    attachment: Option<Attachment>,
}

impl LinkClient {
    /// Unattached client; every call fails with `NotInitialized` until [`init`](Self::init)
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach to the engine identified by `handle`
    ///
    /// # Errors
    ///
    /// Returns `InvalidHandle` if the registry does not know the handle; the
    /// client keeps its previous attachment
    pub fn init(&mut self, registry: &EngineRegistry, handle: EngineHandle) -> Result<()> {
        self.attachment = Some(Attachment::Engine(registry.resolve(handle)?));
        Ok(())
    }

    /// Attach to the telemetry file of a producer running in another process
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the file does not exist; the client keeps its
    /// previous attachment
    pub fn attach_file(&mut self, path: impl Into<PathBuf>, stale_after: Duration) -> Result<()> {
        let reader = TelemetryReader::open(path, stale_after)?;
        self.attachment = Some(Attachment::Published(reader));
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.attachment.is_some()
    }

    /// In-process engine, required for anything that drives the link
    fn engine(&self) -> Result<&LinkEngine> {
        match &self.attachment {
            Some(Attachment::Engine(engine)) => Ok(engine),
            Some(Attachment::Published(_)) => Err(CrsfLinkError::ReadOnlyAttachment),
            None => Err(CrsfLinkError::NotInitialized),
        }
    }

    /// Latest telemetry plus work mode
    ///
    /// # Errors
    ///
    /// `NotInitialized` before attaching. A file attachment also fails when
    /// the producer's record is missing, stale or of another format version.
    pub fn get_telemetry(&self) -> Result<TelemetryRecord> {
        match &self.attachment {
            Some(Attachment::Engine(engine)) => Ok(engine.telemetry_record()),
            Some(Attachment::Published(reader)) => reader.read_telemetry(),
            None => Err(CrsfLinkError::NotInitialized),
        }
    }

    /// Set the work mode from its name (`"joystick"` or `"manual"`)
    pub fn set_work_mode(&self, mode: &str) -> Result<()> {
        let engine = self.engine()?;
        engine.set_work_mode(mode.parse()?);
        Ok(())
    }

    pub fn get_work_mode(&self) -> Result<WorkMode> {
        match &self.attachment {
            Some(Attachment::Engine(engine)) => Ok(engine.work_mode()),
            Some(Attachment::Published(reader)) => Ok(reader.read()?.work_mode),
            None => Err(CrsfLinkError::NotInitialized),
        }
    }

    /// Set one channel
    ///
    /// # Errors
    ///
    /// `ChannelOutOfRange` for a channel outside 1-16, `ValueOutOfRange` for a
    /// value outside 1000-2000
    pub fn set_channel(&self, channel: i64, value: i64) -> Result<()> {
        let engine = self.engine()?;

        if !(1..=CRSF_NUM_CHANNELS as i64).contains(&channel) {
            return Err(CrsfLinkError::ChannelOutOfRange { channel });
        }
        if !valid_value(value) {
            return Err(CrsfLinkError::ValueOutOfRange { channel, value });
        }

        engine.set_channel(channel as usize, value as u16)
    }

    /// Set all 16 channels
    ///
    /// # Errors
    ///
    /// `ChannelCount` unless exactly 16 values are given, then
    /// `InvalidChannelValue` for the first out-of-range value
    pub fn set_channels(&self, values: &[i64]) -> Result<()> {
        let engine = self.engine()?;

        if values.len() != CRSF_NUM_CHANNELS {
            return Err(CrsfLinkError::ChannelCount {
                expected: CRSF_NUM_CHANNELS,
                actual: values.len(),
            });
        }

        let values = values
            .iter()
            .enumerate()
            .map(|(index, &value)| {
                if valid_value(value) {
                    Ok(value as u16)
                } else {
                    Err(CrsfLinkError::InvalidChannelValue { index, value })
                }
            })
            .collect::<Result<Vec<u16>>>()?;

        engine.set_channels(&values)
    }

    /// Transmit the current channels immediately
    pub fn send_channels(&self) -> Result<()> {
        self.engine()?.send_channels();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorKind;
    use crate::serial::port_trait::mocks::QueuedOpener;
    use crate::telemetry::{TelemetryPublisher, TelemetrySnapshot};
    use tempfile::tempdir;

    fn attached() -> (LinkClient, Arc<LinkEngine>) {
        let registry = EngineRegistry::new();
        let engine = LinkEngine::new(Config::default(), Arc::new(QueuedOpener::new()));
        let handle = registry.register(engine.clone());

        let mut client = LinkClient::new();
        client.init(&registry, handle).unwrap();
        (client, engine)
    }

    #[test]
    fn test_get_telemetry_before_init() {
        let client = LinkClient::new();

        let err = client.get_telemetry().unwrap_err();
        assert!(matches!(err, CrsfLinkError::NotInitialized));
        assert_eq!(err.kind(), ErrorKind::NotInitialized);
        assert!(!client.is_initialized());
    }

    #[test]
    fn test_every_call_before_init_is_rejected() {
        let client = LinkClient::new();

        assert_eq!(client.get_work_mode().unwrap_err().kind(), ErrorKind::NotInitialized);
        assert_eq!(client.set_work_mode("manual").unwrap_err().kind(), ErrorKind::NotInitialized);
        assert_eq!(client.set_channel(1, 1500).unwrap_err().kind(), ErrorKind::NotInitialized);
        assert_eq!(client.set_channels(&[1500; 16]).unwrap_err().kind(), ErrorKind::NotInitialized);
        assert_eq!(client.send_channels().unwrap_err().kind(), ErrorKind::NotInitialized);
    }

    #[test]
    fn test_init_with_unknown_handle() {
        let registry = EngineRegistry::new();
        let mut client = LinkClient::new();

        let err = client.init(&registry, EngineHandle::from_raw(99)).unwrap_err();
        assert!(matches!(err, CrsfLinkError::InvalidHandle(99)));
        assert!(!client.is_initialized());
    }

    #[test]
    fn test_get_telemetry_after_init() {
        let (client, _engine) = attached();

        let record = client.get_telemetry().unwrap();
        assert!(!record.telemetry.link_up);
        assert_eq!(record.telemetry.packets_received, 0);
        assert_eq!(record.work_mode, WorkMode::Manual);
    }

    #[test]
    fn test_work_mode_by_name() {
        let (client, engine) = attached();

        client.set_work_mode("joystick").unwrap();
        assert_eq!(client.get_work_mode().unwrap(), WorkMode::Joystick);
        assert_eq!(engine.work_mode(), WorkMode::Joystick);

        let err = client.set_work_mode("autopilot").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(client.get_work_mode().unwrap(), WorkMode::Joystick);
    }

    #[test]
    fn test_set_channel_validation() {
        let (client, engine) = attached();

        client.set_channel(16, 2000).unwrap();
        assert_eq!(engine.channels()[15], 2000);

        assert!(matches!(
            client.set_channel(0, 1500),
            Err(CrsfLinkError::ChannelOutOfRange { channel: 0 })
        ));
        assert!(matches!(
            client.set_channel(-3, 1500),
            Err(CrsfLinkError::ChannelOutOfRange { channel: -3 })
        ));
        assert!(matches!(
            client.set_channel(2, 70_000),
            Err(CrsfLinkError::ValueOutOfRange { channel: 2, value: 70_000 })
        ));
        assert_eq!(engine.channels()[1], 1500);
    }

    #[test]
    fn test_set_channels_validation_order() {
        let (client, engine) = attached();

        // count is checked before values
        let err = client.set_channels(&[5000; 4]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Count);

        let mut values = [1500i64; 16];
        values[2] = 999;
        values[7] = 3000;
        match client.set_channels(&values) {
            Err(CrsfLinkError::InvalidChannelValue { index, value }) => {
                assert_eq!(index, 2);
                assert_eq!(value, 999);
            }
            other => panic!("Expected InvalidChannelValue, got {:?}", other),
        }
        assert_eq!(engine.channels(), [1500; 16]);

        let values: Vec<i64> = (0..16).map(|i| 1000 + i * 10).collect();
        client.set_channels(&values).unwrap();
        assert_eq!(engine.channels()[15], 1150);
    }

    #[test]
    fn test_send_channels_after_init() {
        let (client, _engine) = attached();
        assert!(client.send_channels().is_ok());
    }

    #[test]
    fn test_attach_file_reads_published_telemetry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crsf_telemetry.dat");
        let snapshot = TelemetrySnapshot {
            link_up: true,
            packets_received: 7,
            ..Default::default()
        };
        TelemetryPublisher::new(&path).publish(&snapshot, WorkMode::Joystick).unwrap();

        let mut client = LinkClient::new();
        client.attach_file(&path, Duration::from_secs(2)).unwrap();
        assert!(client.is_initialized());

        let record = client.get_telemetry().unwrap();
        assert_eq!(record.telemetry.packets_received, 7);
        assert_eq!(record.work_mode, WorkMode::Joystick);
        assert_eq!(client.get_work_mode().unwrap(), WorkMode::Joystick);
    }

    #[test]
    fn test_attach_file_without_producer() {
        let dir = tempdir().unwrap();
        let mut client = LinkClient::new();

        let err = client
            .attach_file(dir.path().join("crsf_telemetry.dat"), Duration::from_secs(2))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(!client.is_initialized());
        assert!(matches!(client.get_telemetry(), Err(CrsfLinkError::NotInitialized)));
    }

    #[test]
    fn test_file_attachment_is_read_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crsf_telemetry.dat");
        let publisher = TelemetryPublisher::new(&path);
        publisher.publish(&TelemetrySnapshot::default(), WorkMode::Manual).unwrap();

        let mut client = LinkClient::new();
        client.attach_file(&path, Duration::from_secs(2)).unwrap();

        assert!(matches!(client.set_channel(1, 1500), Err(CrsfLinkError::ReadOnlyAttachment)));
        assert!(matches!(client.set_work_mode("joystick"), Err(CrsfLinkError::ReadOnlyAttachment)));
        assert!(matches!(client.send_channels(), Err(CrsfLinkError::ReadOnlyAttachment)));

        // producer gone: reads report it instead of returning old data
        publisher.remove().unwrap();
        assert!(matches!(client.get_telemetry(), Err(CrsfLinkError::Unavailable { .. })));
    }
}
