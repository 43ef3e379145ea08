//! # Bridge loop
//!
//! [`BridgeServer`] ties the queue files to a [`MeshTransport`]. It starts in
//! [`BridgeState::Connecting`] while the directory is built and the station address is
//! published, becomes [`BridgeState::Ready`] once announced, and ends in
//! [`BridgeState::Draining`].
//!
//! While ready it takes at most one pipe line per poll tick and sends it, and formats every
//! received text packet for the outbound queue. Errors come back typed; the supervisor counts
//! and logs send failures and malformed packets and ends the loop on anything else. A lost
//! radio connection is logged and the loop keeps running without reconnecting.

pub mod session;

use std::future::Future;
use std::time::Duration;

use chrono::Local;
use log::{debug, error, info, warn};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::Config;
use crate::directory::{self, NodeDirectory};
use crate::error::BridgeError;
use crate::format::{format_inbound, format_outbound, InboundMailLine, SENDER_TAG};
use crate::logutil::escape_log;
use crate::meshtastic::{MeshTransport, RadioEvent};
use crate::packet::{inspect_packet, RawPacket};
use crate::pipes;

pub use session::BridgeSession;

/// Error context for directory failures.
pub const DIRECTORY_CONTEXT: &str = "processing node info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Connecting,
    Ready,
    Draining,
}

pub struct BridgeServer<T: MeshTransport> {
    config: Config,
    transport: T,
    state: BridgeState,
    session: BridgeSession,
    directory: Option<NodeDirectory>,
}

impl<T: MeshTransport> BridgeServer<T> {
    pub fn new(config: Config, transport: T) -> Self {
        Self {
            config,
            transport,
            state: BridgeState::Connecting,
            session: BridgeSession::new(),
            directory: None,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn session(&self) -> &BridgeSession {
        &self.session
    }

    pub fn directory(&self) -> Option<&NodeDirectory> {
        self.directory.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Replace the directory from the station record and node table.
    pub fn refresh_directory(
        &mut self,
        station: &RawPacket,
        nodes: &[RawPacket],
    ) -> Result<&NodeDirectory, BridgeError> {
        let station_seen = inspect_packet(station, "mynode");
        debug!("Station record has {} scalar fields", station_seen.fields.len());

        let wrap = |source| BridgeError::Directory {
            context: DIRECTORY_CONTEXT,
            source,
        };
        let dir = if self.config.bridge.strict_directory {
            directory::refresh(station, nodes).map_err(wrap)?
        } else {
            let (dir, skipped) = directory::refresh_lenient(station, nodes).map_err(wrap)?;
            if !skipped.is_empty() {
                warn!("{} node records skipped", skipped.len());
                self.session.errors += skipped.len() as u64;
            }
            dir
        };
        dir.log_summary();
        Ok(self.directory.insert(dir))
    }

    /// Write the station id to the side channel, if one is configured.
    pub async fn publish_station_address(&self) -> Result<(), BridgeError> {
        let (Some(path), Some(dir)) = (&self.config.pipes.station_address_file, &self.directory)
        else {
            return Ok(());
        };
        pipes::write_station_address(path, &dir.station.address_token()).await
    }

    /// Broadcast the startup announcement and enter [`BridgeState::Ready`]. A failed
    /// announcement means the link is unusable.
    pub fn announce(&mut self) -> Result<(), BridgeError> {
        if self.config.bridge.announce {
            let text = format!(
                "{} active [{}]",
                self.config.bridge.station_name,
                Local::now().format("%H:%M:%S")
            );
            self.transport
                .send_text(&text, None, false)
                .map_err(|e| BridgeError::Connection(format!("startup announcement: {}", e)))?;
            self.session.packets_sent += 1;
            info!("Announced: {}", text);
        }
        self.state = BridgeState::Ready;
        Ok(())
    }

    /// Send one pipe line. `Ok(None)` when the line does not match the pipe format.
    pub fn dispatch_pipe_line(&mut self, line: &str) -> Result<Option<u32>, BridgeError> {
        let Some(directive) = format_outbound(line, self.config.bridge.mode) else {
            self.session.lines_dropped += 1;
            debug!("Dropping pipe line '{}'", escape_log(line));
            return Ok(None);
        };
        let id = self
            .transport
            .send_text(directive.text(), directive.destination(), true)?;
        self.session.packets_sent += 1;
        info!(
            "Sent to {} from {}: '{}'",
            directive.destination().unwrap_or("all"),
            SENDER_TAG,
            escape_log(directive.text().trim_end_matches('\n'))
        );
        Ok(Some(id))
    }

    /// Inspect a received packet and build its queue line, if it carries text.
    pub fn handle_radio_packet(
        &mut self,
        packet: &RawPacket,
    ) -> Result<Option<InboundMailLine>, BridgeError> {
        self.session.packets_received += 1;
        let seen = inspect_packet(packet, "packet");
        if seen.last_section.is_some() {
            self.session.last_packet_type = seen.last_section;
        }
        let Some(line) = format_inbound(packet, self.config.bridge.mode)? else {
            return Ok(None);
        };
        self.session.messages_delivered += 1;
        info!(
            "Incoming message from {}: '{}'",
            packet.get_str("fromId").unwrap_or("?"),
            escape_log(line.as_str().trim_end_matches('\n'))
        );
        Ok(Some(line))
    }

    /// Apply the error policy: count and continue, or hand the error back as fatal.
    pub fn supervise(&mut self, err: BridgeError, action: &str) -> Result<(), BridgeError> {
        if err.is_fatal() {
            error!("{} failed: {}", action, err);
            return Err(err);
        }
        self.session.errors += 1;
        warn!("{} failed: {} (continuing)", action, err);
        Ok(())
    }

    /// Run until `shutdown` resolves or a fatal error occurs.
    pub async fn run<S>(
        &mut self,
        mut lines: UnboundedReceiver<String>,
        mut radio: UnboundedReceiver<RadioEvent>,
        mail_tx: UnboundedSender<InboundMailLine>,
        shutdown: S,
    ) -> Result<(), BridgeError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.state = BridgeState::Ready;

        let poll = Duration::from_millis(self.config.bridge.poll_interval_ms.max(1));
        let mut poll_tick = interval_at(Instant::now() + poll, poll);
        poll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let heartbeat_secs = self.config.meshtastic.heartbeat_interval_secs;
        let heartbeat_every = Duration::from_secs(heartbeat_secs.max(1));
        let mut heartbeat = interval_at(Instant::now() + heartbeat_every, heartbeat_every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Bridge ready ({} mode): {} -> radio -> {}",
            self.config.bridge.mode,
            self.config.pipes.inbound.display(),
            self.config.pipes.outbound.display()
        );

        let mut radio_open = true;
        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Received shutdown signal");
                    break Ok(());
                }

                _ = poll_tick.tick() => {
                    match lines.try_recv() {
                        Ok(line) => {
                            if let Err(e) = self.dispatch_pipe_line(&line) {
                                if let Err(fatal) = self.supervise(e, "sending pipe line") {
                                    break Err(fatal);
                                }
                            }
                        }
                        Err(TryRecvError::Empty) => {}
                        Err(TryRecvError::Disconnected) => {
                            break Err(BridgeError::pipe(
                                &self.config.pipes.inbound,
                                "inbound queue reader stopped",
                            ));
                        }
                    }
                }

                event = radio.recv(), if radio_open => match event {
                    Some(RadioEvent::Packet(packet)) => match self.handle_radio_packet(&packet) {
                        Ok(Some(line)) => {
                            if mail_tx.send(line).is_err() {
                                break Err(BridgeError::pipe(
                                    &self.config.pipes.outbound,
                                    "outbound queue writer stopped",
                                ));
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            if let Err(fatal) = self.supervise(e, "handling radio packet") {
                                break Err(fatal);
                            }
                        }
                    },
                    Some(RadioEvent::NodeUpdated { num, name }) => {
                        debug!(
                            "Node updated: 0x{:08x} {}",
                            num,
                            escape_log(name.as_deref().unwrap_or(""))
                        );
                    }
                    Some(RadioEvent::ConnectionLost(reason)) => {
                        // no reconnect; later sends fail and are counted
                        error!("Connection lost: {}", reason);
                        self.session.errors += 1;
                    }
                    None => {
                        warn!("Radio reader stopped, no further packets will arrive");
                        radio_open = false;
                    }
                },

                _ = heartbeat.tick(), if heartbeat_secs > 0 => {
                    if let Err(e) = self.transport.send_heartbeat() {
                        if let Err(fatal) = self.supervise(e, "heartbeat") {
                            break Err(fatal);
                        }
                    }
                }
            }
        };
        self.state = BridgeState::Draining;
        result
    }

    /// Best-effort disconnect and final statistics.
    pub fn shutdown(&mut self) {
        self.state = BridgeState::Draining;
        self.transport.disconnect();
        info!("Session: {}", self.session.summary());
    }
}
