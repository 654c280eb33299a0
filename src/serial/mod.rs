//! # Serial Communication Module
//!
//! Owns the UART connection to the CRSF device.
//!
//! This module handles:
//! - Opening the primary port, falling back to the secondary
//! - Short-timeout reads and bounded writes on independent halves
//! - Marking the link down on I/O failure
//! - Reconnect backoff

pub mod port_trait;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::SerialConfig;
use crate::error::{CrsfLinkError, Result};
use port_trait::{BoxedPort, PortOpener};

/// CRSF baud rate (420,000 baud)
pub const CRSF_BAUD_RATE: u32 = 420_000;

/// Bytes requested per read
const READ_CHUNK_SIZE: usize = 256;

/// Serial transport with reconnect support
///
/// Reads and writes go through separate halves behind separate locks, so a
/// stalled write never holds up the receive path.
pub struct SerialTransport {
    opener: Arc<dyn PortOpener>,
    ports: Vec<String>,
    read_timeout: Duration,
    write_timeout: Duration,
    reader: Mutex<Option<ReadHalf<BoxedPort>>>,
    writer: Mutex<Option<WriteHalf<BoxedPort>>>,
    connected: AtomicBool,
    active_port: AtomicUsize,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("ports", &self.ports)
            .field("connected", &self.is_connected())
            .field("active_port", &self.active_port())
            .finish_non_exhaustive()
    }
}

impl SerialTransport {
    pub fn new(opener: Arc<dyn PortOpener>, config: &SerialConfig) -> Self {
        Self {
            opener,
            ports: config.ports.clone(),
            read_timeout: Duration::from_millis(config.timeout_ms),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            connected: AtomicBool::new(false),
            active_port: AtomicUsize::new(0),
        }
    }

    /// Open a port, trying the last active one first
    ///
    /// # Returns
    ///
    /// * `Result<usize>` - Index of the opened port in the configured list
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` if no configured port could be opened
    pub async fn connect(&self) -> Result<usize> {
        let first = self.active_port();
        let count = self.ports.len();

        for index in (0..count).map(|offset| (first + offset) % count) {
            let path = &self.ports[index];
            debug!("Trying to open serial port: {}", path);

            match self.opener.open(path) {
                Ok(port) => {
                    let (read_half, write_half) = tokio::io::split(port);
                    *self.reader.lock().await = Some(read_half);
                    *self.writer.lock().await = Some(write_half);
                    self.active_port.store(index, Ordering::SeqCst);
                    self.connected.store(true, Ordering::SeqCst);
                    info!("Opened CRSF device at {} (port {})", path, index);
                    return Ok(index);
                }
                Err(e) => warn!("Failed to open {}: {}", path, e),
            }
        }

        Err(CrsfLinkError::SerialPortNotFound(self.ports.join(", ")))
    }

    /// Close both halves and mark the transport down
    pub async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.reader.lock().await.take();
        self.writer.lock().await.take();
    }

    /// Flag the transport down without waiting on the port locks
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Index of the currently (or last) open port
    pub fn active_port(&self) -> usize {
        self.active_port.load(Ordering::SeqCst)
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Close the current port and make the next configured port the first
    /// one tried on reconnect
    ///
    /// # Returns
    ///
    /// * `usize` - Index of the port the next `connect` tries first
    pub async fn switch_to_next_port(&self) -> usize {
        self.disconnect().await;
        let next = (self.active_port() + 1) % self.ports.len().max(1);
        self.active_port.store(next, Ordering::SeqCst);
        next
    }

    /// Path of the currently (or last) open port
    pub fn device_path(&self) -> &str {
        self.ports
            .get(self.active_port())
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Read whatever bytes arrive within the read timeout
    ///
    /// Returns an empty buffer when the timeout elapses without data.
    ///
    /// # Errors
    ///
    /// Returns error if the transport is not connected, the device reached
    /// end of stream, or the read failed
    pub async fn read_available(&self) -> Result<Vec<u8>> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(CrsfLinkError::NotConnected)?;

        let mut buf = [0u8; READ_CHUNK_SIZE];
        match timeout(self.read_timeout, reader.read(&mut buf)).await {
            Err(_) => Ok(Vec::new()),
            Ok(Ok(0)) => Err(CrsfLinkError::Serial("Device closed the connection".to_string())),
            Ok(Ok(n)) => Ok(buf[..n].to_vec()),
            Ok(Err(e)) => Err(CrsfLinkError::Serial(format!("Failed to read: {}", e))),
        }
    }

    /// Write a complete frame, bounded by the write timeout
    ///
    /// # Errors
    ///
    /// Returns error if the transport is not connected, or the write failed
    /// or timed out
    pub async fn write(&self, packet: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(CrsfLinkError::NotConnected)?;

        let write = async {
            writer.write_all(packet).await?;
            writer.flush().await
        };

        match timeout(self.write_timeout, write).await {
            Err(_) => Err(CrsfLinkError::Serial("Write timed out".to_string())),
            Ok(Err(e)) => Err(CrsfLinkError::Serial(format!("Failed to write packet: {}", e))),
            Ok(Ok(())) => {
                debug!("Sent CRSF packet ({} bytes)", packet.len());
                Ok(())
            }
        }
    }
}

/// Exponential reconnect backoff
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn from_config(config: &SerialConfig) -> Self {
        Self::new(
            Duration::from_millis(config.reconnect_interval_ms),
            Duration::from_millis(config.reconnect_max_interval_ms),
        )
    }

    /// Delay before the next attempt; doubles up to the maximum
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use port_trait::mocks::QueuedOpener;
    use port_trait::MockPortOpener;
    use tokio::io::AsyncWriteExt;

    fn config(ports: &[&str]) -> SerialConfig {
        SerialConfig {
            ports: ports.iter().map(|p| p.to_string()).collect(),
            ..SerialConfig::default()
        }
    }

    #[test]
    fn test_constants() {
        assert_eq!(CRSF_BAUD_RATE, 420_000);
    }

    #[tokio::test]
    async fn test_connect_falls_back_to_secondary() {
        let mut opener = MockPortOpener::new();
        opener
            .expect_open()
            .withf(|path| path == "/dev/ttyAMA0")
            .times(1)
            .returning(|path| Err(CrsfLinkError::Serial(format!("Failed to open {}", path))));
        opener
            .expect_open()
            .withf(|path| path == "/dev/ttyS0")
            .times(1)
            .returning(|_| Ok(Box::new(tokio::io::duplex(64).0)));

        let transport =
            SerialTransport::new(Arc::new(opener), &config(&["/dev/ttyAMA0", "/dev/ttyS0"]));

        assert_eq!(transport.connect().await.unwrap(), 1);
        assert!(transport.is_connected());
        assert_eq!(transport.device_path(), "/dev/ttyS0");
    }

    #[tokio::test]
    async fn test_connect_without_devices_lists_paths() {
        let mut opener = MockPortOpener::new();
        opener
            .expect_open()
            .times(2)
            .returning(|path| Err(CrsfLinkError::Serial(format!("Failed to open {}", path))));

        let transport =
            SerialTransport::new(Arc::new(opener), &config(&["/dev/nonexistent0", "/dev/nonexistent1"]));

        match transport.connect().await {
            Err(CrsfLinkError::SerialPortNotFound(msg)) => {
                assert!(msg.contains("/dev/nonexistent0"));
                assert!(msg.contains("/dev/nonexistent1"));
            }
            other => panic!("Expected SerialPortNotFound, got: {:?}", other),
        }
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_reconnect_prefers_last_active_port() {
        let opener = Arc::new(QueuedOpener::new());
        let transport = SerialTransport::new(opener.clone(), &config(&["/dev/a", "/dev/b"]));

        // Nothing plugged in yet: both ports fail
        assert!(transport.connect().await.is_err());
        let _remote = opener.attach();
        transport.active_port.store(1, Ordering::SeqCst);
        assert_eq!(transport.connect().await.unwrap(), 1);

        transport.disconnect().await;
        let _remote = opener.attach();
        assert_eq!(transport.connect().await.unwrap(), 1);

        assert_eq!(opener.attempts(), vec!["/dev/a", "/dev/b", "/dev/b", "/dev/b"]);
    }

    #[tokio::test]
    async fn test_switch_to_next_port_wraps_around() {
        let opener = Arc::new(QueuedOpener::new());
        let transport = SerialTransport::new(opener.clone(), &config(&["/dev/a", "/dev/b"]));
        let _first = opener.attach();
        assert_eq!(transport.connect().await.unwrap(), 0);

        assert_eq!(transport.switch_to_next_port().await, 1);
        assert!(!transport.is_connected());
        let _second = opener.attach();
        assert_eq!(transport.connect().await.unwrap(), 1);
        assert_eq!(transport.device_path(), "/dev/b");

        assert_eq!(transport.switch_to_next_port().await, 0);
        assert_eq!(opener.attempts(), vec!["/dev/a", "/dev/b"]);
    }

    #[tokio::test]
    async fn test_read_available_returns_received_bytes() {
        let opener = Arc::new(QueuedOpener::new());
        let mut remote = opener.attach();
        let transport = SerialTransport::new(opener, &config(&["/dev/a"]));
        transport.connect().await.unwrap();

        remote.write_all(&[0xC8, 0x18, 0x16]).await.unwrap();
        assert_eq!(transport.read_available().await.unwrap(), vec![0xC8, 0x18, 0x16]);
    }

    #[tokio::test]
    async fn test_read_available_with_scripted_port() {
        let mut opener = MockPortOpener::new();
        opener.expect_open().returning(|_| {
            Ok(Box::new(
                tokio_test::io::Builder::new().read(&[0xEE, 0x0C, 0x14]).build(),
            ))
        });

        let transport = SerialTransport::new(Arc::new(opener), &config(&["/dev/a"]));
        transport.connect().await.unwrap();
        assert_eq!(transport.read_available().await.unwrap(), vec![0xEE, 0x0C, 0x14]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_available_times_out_empty() {
        let opener = Arc::new(QueuedOpener::new());
        let _remote = opener.attach();
        let transport = SerialTransport::new(opener, &config(&["/dev/a"]));
        transport.connect().await.unwrap();

        assert!(transport.read_available().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_after_device_closed_is_error() {
        let opener = Arc::new(QueuedOpener::new());
        let remote = opener.attach();
        let transport = SerialTransport::new(opener, &config(&["/dev/a"]));
        transport.connect().await.unwrap();

        drop(remote);
        assert!(matches!(transport.read_available().await, Err(CrsfLinkError::Serial(_))));
    }

    #[tokio::test]
    async fn test_write_reaches_device() {
        use tokio::io::AsyncReadExt;

        let opener = Arc::new(QueuedOpener::new());
        let mut remote = opener.attach();
        let transport = SerialTransport::new(opener, &config(&["/dev/a"]));
        transport.connect().await.unwrap();

        transport.write(&[1, 2, 3]).await.unwrap();
        let mut buf = [0u8; 3];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [1, 2, 3]);
    }

    #[tokio::test]
    async fn test_io_when_disconnected() {
        let transport = SerialTransport::new(Arc::new(QueuedOpener::new()), &config(&["/dev/a"]));

        assert!(matches!(transport.write(&[0]).await, Err(CrsfLinkError::NotConnected)));
        assert!(matches!(transport.read_available().await, Err(CrsfLinkError::NotConnected)));
    }

    #[test]
    fn test_backoff_doubles_up_to_max() {
        let mut backoff = Backoff::new(Duration::from_millis(250), Duration::from_millis(1000));

        assert_eq!(backoff.next_delay(), Duration::from_millis(250));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(250));
    }
}
