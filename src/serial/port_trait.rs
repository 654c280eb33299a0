//! Trait abstraction for opening serial ports, so the transport can run
//! against in-memory streams in tests

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{CrsfLinkError, Result};

/// Byte stream usable as a CRSF serial port
pub trait SerialIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> SerialIo for T {}

/// Opened serial port
pub type BoxedPort = Box<dyn SerialIo>;

/// Opens serial devices by path
#[cfg_attr(test, mockall::automock)]
pub trait PortOpener: Send + Sync {
    /// Open the device at `path`
    fn open(&self, path: &str) -> Result<BoxedPort>;
}

/// Opens real UART devices through `tokio_serial` with CRSF line settings (8N1)
#[derive(Debug, Clone)]
pub struct TokioSerialOpener {
    baud_rate: u32,
}

impl TokioSerialOpener {
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }
}

impl PortOpener for TokioSerialOpener {
    fn open(&self, path: &str) -> Result<BoxedPort> {
        use tokio_serial::SerialPortBuilderExt;

        let port = tokio_serial::new(path, self.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| CrsfLinkError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(Box::new(port))
    }
}
