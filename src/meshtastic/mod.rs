//! # Meshtastic client API transport
//!
//! A small client for the firmware's stream API, covering what the bridge needs: open a serial
//! or TCP link, run the `want_config` handshake to learn our node number and the node database,
//! send text packets, and receive packets on a background thread.
//!
//! ```rust,no_run
//! use meshpipe::meshtastic::{LinkTarget, RadioInterface, RadioSettings, MeshTransport};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let target = LinkTarget::Tcp { host: "192.168.1.20".into(), port: 4403 };
//!     let (mut radio, snapshot, reader) =
//!         RadioInterface::connect(target, RadioSettings::default()).await?;
//!     println!("connected as 0x{:08x}, {} nodes", snapshot.my_node_num, snapshot.nodes.len());
//!     let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!     tokio::task::spawn_blocking(move || reader.run(tx));
//!     radio.send_text("hello mesh\n", None, false)?;
//!     while let Some(event) = rx.recv().await {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod framer;
pub mod link;
pub mod reader;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use prost::Message;

use crate::address::parse_wire_address;
use crate::config::MeshtasticConfig;
use crate::error::BridgeError;
use crate::logutil::{hex_snippet, truncate_for_log};
use crate::packet::RawPacket;
use crate::protobuf::meshtastic_generated as proto;

use framer::{encode_frame, StreamFramer};
pub use link::{open_link, LinkTarget, RadioLink, SharedLink, DEFAULT_TCP_PORT};
use link::{read_available, write_frame, ReadOutcome};
pub use reader::RadioReader;

/// Interval between `want_config_id` resends while the radio has not answered.
const WANT_CONFIG_RESEND: Duration = Duration::from_secs(7);

/// Events produced by the receiver thread.
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    Packet(RawPacket),
    NodeUpdated { num: u32, name: Option<String> },
    ConnectionLost(String),
}

/// What the radio reported during the configuration handshake.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSnapshot {
    pub my_node_num: u32,
    pub nodes: Vec<proto::NodeInfo>,
}

impl DeviceSnapshot {
    /// Our own node record; only `num` when the radio did not list itself.
    pub fn station_record(&self) -> RawPacket {
        self.nodes
            .iter()
            .find(|n| n.num == self.my_node_num)
            .map(RawPacket::from_node_info)
            .unwrap_or_else(|| RawPacket::new().with("num", self.my_node_num))
    }

    pub fn node_table(&self) -> Vec<RawPacket> {
        self.nodes.iter().map(RawPacket::from_node_info).collect()
    }
}

/// Sending side of a mesh connection.
pub trait MeshTransport: Send {
    /// Send `text` to `destination` (wire address form, `None` broadcasts). Returns the
    /// packet id.
    fn send_text(
        &mut self,
        text: &str,
        destination: Option<&str>,
        want_ack: bool,
    ) -> Result<u32, BridgeError>;

    fn send_heartbeat(&mut self) -> Result<(), BridgeError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), BridgeError> {
        Ok(())
    }

    /// Best-effort [`close`](Self::close); a failure is logged, not returned.
    fn disconnect(&mut self) -> bool {
        match self.close() {
            Ok(()) => true,
            Err(e) => {
                warn!("Disconnect failed: {}", e);
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioSettings {
    pub channel: u32,
    pub hop_limit: u32,
    pub connect_timeout: Duration,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            channel: 0,
            hop_limit: 3,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&MeshtasticConfig> for RadioSettings {
    fn from(cfg: &MeshtasticConfig) -> Self {
        Self {
            channel: cfg.channel,
            hop_limit: cfg.hop_limit,
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
        }
    }
}

pub struct RadioInterface {
    link: SharedLink,
    target: LinkTarget,
    settings: RadioSettings,
    my_node_num: u32,
    shutdown: Arc<AtomicBool>,
}

impl RadioInterface {
    /// Open the link, complete the handshake and hand back the sender, the handshake result
    /// and a reader ready to be run on a blocking thread.
    pub async fn connect(
        target: LinkTarget,
        settings: RadioSettings,
    ) -> Result<(RadioInterface, DeviceSnapshot, RadioReader), BridgeError> {
        info!("Connecting to {}", target);
        let open_target = target.clone();
        let timeout = settings.connect_timeout;
        let (link, handshake) = tokio::task::spawn_blocking(move || {
            let link: SharedLink = Arc::new(Mutex::new(open_link(&open_target)?));
            let handshake = run_handshake(&link, timeout)?;
            Ok::<_, BridgeError>((link, handshake))
        })
        .await
        .map_err(|e| BridgeError::Connection(format!("connect task failed: {}", e)))??;

        let shutdown = Arc::new(AtomicBool::new(false));
        let snapshot = DeviceSnapshot {
            my_node_num: handshake.my_node_num,
            nodes: handshake.nodes,
        };
        info!(
            "Radio config complete: node 0x{:08x}, {} nodes known",
            snapshot.my_node_num,
            snapshot.nodes.len()
        );
        let reader = RadioReader::new(
            link.clone(),
            handshake.framer,
            handshake.backlog,
            shutdown.clone(),
        );
        let iface = RadioInterface {
            link,
            target,
            settings,
            my_node_num: snapshot.my_node_num,
            shutdown,
        };
        Ok((iface, snapshot, reader))
    }

    fn send_toradio(&self, msg: &proto::ToRadio) -> Result<(), BridgeError> {
        let payload = msg.encode_to_vec();
        let frame = encode_frame(&payload)?;
        write_frame(&self.link, &frame)?;
        trace!("ToRadio {} bytes: {}", payload.len(), hex_snippet(&payload, 64));
        Ok(())
    }
}

impl MeshTransport for RadioInterface {
    fn send_text(
        &mut self,
        text: &str,
        destination: Option<&str>,
        want_ack: bool,
    ) -> Result<u32, BridgeError> {
        use proto::mesh_packet::PayloadVariant as MPPayload;
        use proto::to_radio::PayloadVariant as TRPayload;

        if self.shutdown.load(Ordering::SeqCst) {
            return Err(BridgeError::Send("radio link is closed".into()));
        }
        let to = match destination {
            None => proto::BROADCAST_ADDR,
            Some(addr) => parse_wire_address(addr, Some(self.my_node_num))?,
        };
        if text.len() > proto::DATA_PAYLOAD_LEN {
            return Err(BridgeError::Send(format!(
                "text of {} bytes exceeds the {} byte payload limit",
                text.len(),
                proto::DATA_PAYLOAD_LEN
            )));
        }
        let id = random_nonzero();
        let pkt = proto::MeshPacket {
            from: self.my_node_num,
            to,
            channel: self.settings.channel,
            id,
            hop_limit: self.settings.hop_limit,
            want_ack,
            payload_variant: Some(MPPayload::Decoded(proto::Data {
                portnum: proto::PortNum::TextMessageApp as i32,
                payload: text.as_bytes().to_vec().into(),
                ..Default::default()
            })),
            ..Default::default()
        };
        self.send_toradio(&proto::ToRadio {
            payload_variant: Some(TRPayload::Packet(pkt)),
        })?;
        debug!(
            "Sent text id=0x{:08x} to=0x{:08x} channel={} want_ack={} text='{}'",
            id,
            to,
            self.settings.channel,
            want_ack,
            truncate_for_log(text, 80)
        );
        Ok(id)
    }

    fn send_heartbeat(&mut self) -> Result<(), BridgeError> {
        let msg = proto::ToRadio {
            payload_variant: Some(proto::to_radio::PayloadVariant::Heartbeat(
                proto::Heartbeat {
                    nonce: rand::random(),
                },
            )),
        };
        self.send_toradio(&msg)?;
        trace!("Sent heartbeat");
        Ok(())
    }

    fn close(&mut self) -> Result<(), BridgeError> {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let msg = proto::ToRadio {
            payload_variant: Some(proto::to_radio::PayloadVariant::Disconnect(true)),
        };
        debug!("Sending disconnect to {}", self.target);
        self.send_toradio(&msg)
    }
}

fn random_nonzero() -> u32 {
    loop {
        let v: u32 = rand::random();
        if v != 0 {
            return v;
        }
    }
}

struct Handshake {
    my_node_num: u32,
    nodes: Vec<proto::NodeInfo>,
    backlog: Vec<proto::MeshPacket>,
    framer: StreamFramer,
}

fn send_want_config(link: &SharedLink, id: u32) -> Result<(), BridgeError> {
    let msg = proto::ToRadio {
        payload_variant: Some(proto::to_radio::PayloadVariant::WantConfigId(id)),
    };
    let frame = encode_frame(&msg.encode_to_vec())?;
    write_frame(link, &frame).map_err(|e| BridgeError::Connection(e.to_string()))
}

/// Request the config push and collect it until the radio echoes our id. Blocking.
fn run_handshake(link: &SharedLink, timeout: Duration) -> Result<Handshake, BridgeError> {
    use proto::from_radio::PayloadVariant as FRPayload;

    let config_id = random_nonzero();
    debug!("Requesting config (want_config_id=0x{:08x})", config_id);
    send_want_config(link, config_id)?;
    let mut last_sent = Instant::now();
    let deadline = Instant::now() + timeout;

    let mut framer = StreamFramer::new();
    let mut buf = [0u8; 1024];
    let mut my_info: Option<proto::MyNodeInfo> = None;
    let mut nodes: BTreeMap<u32, proto::NodeInfo> = BTreeMap::new();
    let mut backlog = Vec::new();

    loop {
        if Instant::now() >= deadline {
            return Err(BridgeError::Connection(format!(
                "radio did not complete configuration within {}s",
                timeout.as_secs()
            )));
        }
        if last_sent.elapsed() >= WANT_CONFIG_RESEND {
            debug!("Resending want_config_id=0x{:08x}", config_id);
            send_want_config(link, config_id)?;
            last_sent = Instant::now();
        }
        match read_available(link, &mut buf)? {
            ReadOutcome::Data(n) => framer.push(&buf[..n]),
            ReadOutcome::Idle => continue,
            ReadOutcome::Closed => {
                return Err(BridgeError::Connection(
                    "link closed during configuration".into(),
                ))
            }
        }
        for line in framer.take_console_lines() {
            debug!("radio console: {}", truncate_for_log(&line, 200));
        }
        let mut complete = false;
        while let Some(frame) = framer.next_frame() {
            let msg = match proto::FromRadio::decode(frame.as_slice()) {
                Ok(m) => m,
                Err(e) => {
                    warn!("Undecodable FromRadio during config: {}", e);
                    continue;
                }
            };
            match msg.payload_variant {
                Some(FRPayload::MyInfo(info)) => {
                    debug!("my_info: node 0x{:08x}", info.my_node_num);
                    my_info = Some(info);
                }
                Some(FRPayload::NodeInfo(node)) => {
                    trace!("node_info 0x{:08x}", node.num);
                    nodes.insert(node.num, node);
                }
                Some(FRPayload::Packet(pkt)) => backlog.push(pkt),
                Some(FRPayload::ConfigCompleteId(id)) if id == config_id => complete = true,
                Some(FRPayload::ConfigCompleteId(id)) => {
                    debug!("Ignoring config_complete_id=0x{:08x} from another client", id)
                }
                Some(FRPayload::Rebooted(_)) => warn!("Radio rebooted during configuration"),
                None => {}
            }
        }
        if complete {
            break;
        }
    }

    let my_info = my_info.ok_or_else(|| {
        BridgeError::Connection("radio completed configuration without my_info".into())
    })?;
    Ok(Handshake {
        my_node_num: my_info.my_node_num,
        nodes: nodes.into_values().collect(),
        backlog,
        framer,
    })
}

#[cfg(test)]
mod tests {
    use super::link::testing::ScriptedLink;
    use super::*;
    use proto::from_radio::PayloadVariant as FRPayload;
    use std::collections::VecDeque;

    fn frame(msg: proto::FromRadio) -> Vec<u8> {
        encode_frame(&msg.encode_to_vec()).unwrap()
    }

    fn from_radio(v: FRPayload) -> proto::FromRadio {
        proto::FromRadio {
            id: 0,
            payload_variant: Some(v),
        }
    }

    /// Decode every ToRadio written so far.
    fn written_messages(written: &Arc<Mutex<Vec<u8>>>) -> Vec<proto::ToRadio> {
        let mut f = StreamFramer::new();
        f.push(&written.lock().unwrap());
        let mut out = Vec::new();
        while let Some(fr) = f.next_frame() {
            out.push(proto::ToRadio::decode(fr.as_slice()).unwrap());
        }
        out
    }

    #[test]
    fn handshake_times_out_without_config_complete() {
        let link: SharedLink = Arc::new(Mutex::new(Box::new(ScriptedLink {
            inbound: VecDeque::new(),
            written: Arc::new(Mutex::new(Vec::new())),
            close_when_drained: false,
        })));
        let err = run_handshake(&link, Duration::from_millis(50)).err().unwrap();
        assert!(matches!(err, BridgeError::Connection(_)));
    }

    #[test]
    fn handshake_fails_when_link_closes() {
        let link: SharedLink = Arc::new(Mutex::new(Box::new(ScriptedLink {
            inbound: VecDeque::new(),
            written: Arc::new(Mutex::new(Vec::new())),
            close_when_drained: true,
        })));
        let err = run_handshake(&link, Duration::from_secs(5)).err().unwrap();
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn snapshot_station_record_falls_back_to_num() {
        let snap = DeviceSnapshot {
            my_node_num: 7,
            nodes: vec![],
        };
        assert_eq!(snap.station_record().get_u64("num"), Some(7));
        assert!(snap.station_record().get("user").is_none());
    }

    #[test]
    fn send_text_frames_a_text_packet() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let link: SharedLink = Arc::new(Mutex::new(Box::new(ScriptedLink {
            inbound: VecDeque::new(),
            written: written.clone(),
            close_when_drained: false,
        })));
        let mut iface = RadioInterface {
            link,
            target: LinkTarget::Tcp {
                host: "localhost".into(),
                port: DEFAULT_TCP_PORT,
            },
            settings: RadioSettings::default(),
            my_node_num: 0x10,
            shutdown: Arc::new(AtomicBool::new(false)),
        };
        let id = iface.send_text("abc|hi\n", Some("!0A1B2C3D"), true).unwrap();
        assert_ne!(id, 0);
        assert!(iface.send_text("x", Some("nope"), true).is_err());
        assert!(iface.send_text(&"y".repeat(300), None, true).is_err());

        let msgs = written_messages(&written);
        assert_eq!(msgs.len(), 1);
        match &msgs[0].payload_variant {
            Some(proto::to_radio::PayloadVariant::Packet(p)) => {
                assert_eq!(p.to, 0x0A1B_2C3D);
                assert_eq!(p.id, id);
                assert!(p.want_ack);
                assert_eq!(p.hop_limit, 3);
                match &p.payload_variant {
                    Some(proto::mesh_packet::PayloadVariant::Decoded(d)) => {
                        assert_eq!(d.portnum, proto::PortNum::TextMessageApp as i32);
                        assert_eq!(&d.payload[..], b"abc|hi\n");
                    }
                    other => panic!("unexpected payload {:?}", other),
                }
            }
            other => panic!("unexpected message {:?}", other),
        }

        iface.close().unwrap();
        assert!(iface.send_text("late", None, false).is_err());
        let msgs = written_messages(&written);
        assert!(matches!(
            msgs.last().and_then(|m| m.payload_variant.clone()),
            Some(proto::to_radio::PayloadVariant::Disconnect(true))
        ));
    }

    #[test]
    fn handshake_collects_nodes_and_backlog() {
        // the config id is random, so answer through a link that echoes it back
        struct EchoLink {
            written: Vec<u8>,
            queued: VecDeque<Vec<u8>>,
        }
        impl std::io::Read for EchoLink {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                match self.queued.pop_front() {
                    Some(chunk) => {
                        buf[..chunk.len()].copy_from_slice(&chunk);
                        Ok(chunk.len())
                    }
                    None => Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "idle")),
                }
            }
        }
        impl std::io::Write for EchoLink {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.written.extend_from_slice(buf);
                let mut f = StreamFramer::new();
                f.push(&self.written);
                if let Some(fr) = f.next_frame() {
                    if let Ok(proto::ToRadio {
                        payload_variant: Some(proto::to_radio::PayloadVariant::WantConfigId(id)),
                    }) = proto::ToRadio::decode(fr.as_slice())
                    {
                        self.written.clear();
                        self.queued.push_back(frame(from_radio(FRPayload::MyInfo(
                            proto::MyNodeInfo {
                                my_node_num: 0xAB,
                                ..Default::default()
                            },
                        ))));
                        self.queued.push_back(frame(from_radio(FRPayload::NodeInfo(
                            proto::NodeInfo {
                                num: 0xAB,
                                ..Default::default()
                            },
                        ))));
                        self.queued.push_back(frame(from_radio(FRPayload::Packet(
                            proto::MeshPacket {
                                from: 0xCD,
                                ..Default::default()
                            },
                        ))));
                        self.queued
                            .push_back(frame(from_radio(FRPayload::ConfigCompleteId(id))));
                    }
                }
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        impl RadioLink for EchoLink {
            fn describe(&self) -> String {
                "echo".into()
            }
        }

        let link: SharedLink = Arc::new(Mutex::new(Box::new(EchoLink {
            written: Vec::new(),
            queued: VecDeque::new(),
        })));
        let hs = run_handshake(&link, Duration::from_secs(5)).unwrap();
        assert_eq!(hs.my_node_num, 0xAB);
        assert_eq!(hs.nodes.len(), 1);
        assert_eq!(hs.backlog.len(), 1);
        assert_eq!(hs.backlog[0].from, 0xCD);
    }
}
