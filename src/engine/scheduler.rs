//! Engine loops: receive, transmit and publish
//!
//! Each loop runs as its own task and exits when the shutdown flag flips.
//! The receive loop owns reconnection; the transmit loop only flags the
//! transport down when a write fails.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::LinkEngine;
use crate::crsf::decoder::FrameDecoder;
use crate::crsf::encoder::encode_channels_us_frame;
use crate::serial::Backoff;
use crate::telemetry::TelemetryPublisher;

/// Number of packets between status log messages
const LOG_INTERVAL_PACKETS: u64 = 1000;

/// Drain the serial device into the codec and apply frames to telemetry
pub(super) async fn receive_loop(engine: Arc<LinkEngine>, mut shutdown: watch::Receiver<bool>) {
    let mut decoder = FrameDecoder::new();
    let mut backoff = Backoff::from_config(&engine.config.serial);
    let dwell = engine.config.crsf.failover_dwell();
    let mut connected_at = Instant::now();

    loop {
        if *shutdown.borrow() {
            break;
        }

        if !engine.transport.is_connected() {
            // release a port the transmit side flagged as failed
            engine.transport.disconnect().await;
            match engine.transport.connect().await {
                Ok(port) => {
                    backoff.reset();
                    decoder.reset();
                    engine.telemetry.set_active_port(port as u8);
                    connected_at = Instant::now();
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!("{}; retrying in {}ms", e, delay.as_millis());
                    engine.refresh_link_state();
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = shutdown.changed() => {}
                    }
                    continue;
                }
            }
        }

        let read = tokio::select! {
            read = engine.transport.read_available() => read,
            _ = shutdown.changed() => break,
        };

        match read {
            Ok(bytes) => ingest(&engine, &mut decoder, &bytes),
            Err(e) => {
                warn!("Serial read failed on {}: {}", engine.transport.device_path(), e);
                engine.transport.disconnect().await;
                engine.telemetry.mark_link_down();
            }
        }

        engine.refresh_link_state();

        if should_fail_over(&engine, connected_at, dwell) {
            let silent = engine.transport.device_path().to_string();
            let next = engine.transport.switch_to_next_port().await;
            engine.telemetry.mark_link_down();
            warn!(
                "No CRSF link on {} for {}ms, switching to port {}",
                silent,
                connected_at.elapsed().as_millis(),
                next
            );
        }
    }

    engine.transport.disconnect().await;
    engine.telemetry.mark_link_down();
    engine.refresh_link_state();
    debug!("Receive loop stopped");
}

/// An open port with no live link after the dwell time gives way to the next port
fn should_fail_over(engine: &LinkEngine, connected_at: Instant, dwell: Duration) -> bool {
    engine.transport.port_count() > 1
        && engine.transport.is_connected()
        && !engine.telemetry.link_up()
        && connected_at.elapsed() >= dwell
}

fn ingest(engine: &LinkEngine, decoder: &mut FrameDecoder, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    decoder.push(bytes);

    while let Some(result) = decoder.next_frame() {
        match result {
            Ok(frame) => match engine.telemetry.update(&frame) {
                Ok(()) => debug!(
                    "Received frame 0x{:02X} ({} bytes)",
                    frame.frame_type,
                    frame.payload.len()
                ),
                Err(e) => debug!("Dropped frame 0x{:02X}: {}", frame.frame_type, e),
            },
            Err(e) => {
                debug!("Dropped malformed frame: {}", e);
                engine.telemetry.record_loss();
            }
        }
    }
}

/// Send the channel vector at the packet rate, and on demand
pub(super) async fn transmit_loop(engine: Arc<LinkEngine>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(engine.config.crsf.packet_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut packet_count: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = engine.send_now.notified() => {}
            _ = shutdown.changed() => break,
        }

        if !engine.transport.is_connected() {
            continue;
        }

        let packet = encode_channels_us_frame(&engine.channels.get());
        match engine.transport.write(&packet).await {
            Ok(()) => {
                engine.telemetry.record_sent();
                packet_count += 1;
                if packet_count % LOG_INTERVAL_PACKETS == 0 {
                    info!("Sent {} channel packets", packet_count);
                }
            }
            Err(e) => {
                warn!("Failed to send channels: {}", e);
                engine.transport.mark_disconnected();
                engine.telemetry.mark_link_down();
            }
        }
    }

    debug!("Transmit loop stopped after {} packets", packet_count);
}

/// Refresh the shared telemetry file; remove it on exit
pub(super) async fn publish_loop(engine: Arc<LinkEngine>, mut shutdown: watch::Receiver<bool>) {
    let settings = &engine.config.publisher;
    let publisher = TelemetryPublisher::new(&settings.path);
    let mut ticker = interval(Duration::from_millis(settings.interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Publishing telemetry to {}", publisher.path().display());

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        // file writes stay off the runtime threads
        let snapshot = engine.snapshot();
        let work_mode = engine.work_mode();
        let writer = publisher.clone();
        match tokio::task::spawn_blocking(move || writer.publish(&snapshot, work_mode)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to publish telemetry: {}", e),
            Err(e) => warn!("Telemetry publish task failed: {}", e),
        }
    }

    if let Err(e) = publisher.remove() {
        warn!("Failed to remove {}: {}", publisher.path().display(), e);
    }
}
