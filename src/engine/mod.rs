//! # Link Engine
//!
//! Ties the transport, codec and state stores together.
//!
//! This module handles:
//! - Spawning the receive, transmit and publish loops
//! - The channel and work-mode API used by the binding layer
//! - Link up/down notifications
//! - Instance handles ([`EngineRegistry`]) and the handle-bound [`LinkClient`]

pub mod client;
pub mod registry;
mod scheduler;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::channels::{ChannelStore, ChannelVector, WorkMode};
use crate::config::Config;
use crate::error::Result;
use crate::serial::port_trait::PortOpener;
use crate::serial::SerialTransport;
use crate::telemetry::{TelemetryRecord, TelemetrySnapshot, TelemetryStore};

pub use client::LinkClient;
pub use registry::{EngineHandle, EngineRegistry};

/// One running CRSF link: a serial device plus its telemetry and channel state
pub struct LinkEngine {
    config: Config,
    transport: SerialTransport,
    telemetry: TelemetryStore,
    channels: ChannelStore,
    work_mode: AtomicU8,
    send_now: Notify,
    shutdown: watch::Sender<bool>,
    link_state: watch::Sender<bool>,
}

impl std::fmt::Debug for LinkEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkEngine")
            .field("transport", &self.transport)
            .field("work_mode", &self.work_mode())
            .field("link_up", &*self.link_state.borrow())
            .finish_non_exhaustive()
    }
}

/// Handles of the spawned engine loops
#[derive(Debug)]
pub struct LinkTasks {
    handles: Vec<JoinHandle<()>>,
}

impl LinkTasks {
    /// Wait for every loop to exit (after [`LinkEngine::shutdown`])
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("Engine task ended abnormally: {}", e);
            }
        }
    }
}

impl LinkEngine {
    pub fn new(config: Config, opener: Arc<dyn PortOpener>) -> Arc<Self> {
        let transport = SerialTransport::new(opener, &config.serial);
        let telemetry = TelemetryStore::new(&config.crsf);

        Arc::new(Self {
            config,
            transport,
            telemetry,
            channels: ChannelStore::new(),
            work_mode: AtomicU8::new(WorkMode::default().to_u8()),
            send_now: Notify::new(),
            shutdown: watch::Sender::new(false),
            link_state: watch::Sender::new(false),
        })
    }

    /// Spawn the engine loops on the current tokio runtime
    pub fn start(self: &Arc<Self>) -> LinkTasks {
        info!(
            "Starting CRSF link on {} at {}Hz",
            self.config.serial.ports.join(", "),
            self.config.crsf.packet_rate_hz
        );

        let mut handles = vec![
            tokio::spawn(scheduler::receive_loop(self.clone(), self.shutdown.subscribe())),
            tokio::spawn(scheduler::transmit_loop(self.clone(), self.shutdown.subscribe())),
        ];
        if self.config.publisher.enabled {
            handles.push(tokio::spawn(scheduler::publish_loop(
                self.clone(),
                self.shutdown.subscribe(),
            )));
        }

        LinkTasks { handles }
    }

    /// Ask every loop to exit; pair with [`LinkTasks::join`]
    pub fn shutdown(&self) {
        info!("Stopping CRSF link");
        self.shutdown.send_replace(true);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Latest telemetry; never waits for the next frame
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    pub fn telemetry_record(&self) -> TelemetryRecord {
        TelemetryRecord {
            telemetry: self.snapshot(),
            work_mode: self.work_mode(),
        }
    }

    /// Set channel 1-16 to 1000-2000 µs; picked up by the next transmit
    pub fn set_channel(&self, channel: usize, value: u16) -> Result<()> {
        self.channels.set(channel, value)
    }

    /// Replace all 16 channel values at once
    pub fn set_channels(&self, values: &[u16]) -> Result<()> {
        self.channels.set_all(values)
    }

    pub fn channels(&self) -> ChannelVector {
        self.channels.get()
    }

    /// Transmit the current channels now, ahead of the periodic schedule
    pub fn send_channels(&self) {
        self.send_now.notify_one();
    }

    pub fn set_work_mode(&self, mode: WorkMode) {
        let previous = WorkMode::from_u8(self.work_mode.swap(mode.to_u8(), Ordering::SeqCst));
        if previous != mode {
            info!("Work mode changed: {} -> {}", previous, mode);
        }
    }

    pub fn work_mode(&self) -> WorkMode {
        WorkMode::from_u8(self.work_mode.load(Ordering::SeqCst))
    }

    /// Watch link up/down transitions
    pub fn subscribe_link(&self) -> watch::Receiver<bool> {
        self.link_state.subscribe()
    }

    /// Whether a serial device is currently open
    pub fn is_transport_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Publish the current link state to watchers if it changed
    fn refresh_link_state(&self) {
        let up = self.telemetry.link_up();
        let device = self.transport.device_path();

        self.link_state.send_if_modified(|current| {
            if *current == up {
                return false;
            }
            *current = up;
            if up {
                info!("CRSF link up on {}", device);
            } else {
                warn!("CRSF link down on {}", device);
            }
            true
        });
    }
}
