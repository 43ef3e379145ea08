//! Receiver side of the radio link, run on a blocking thread.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use prost::Message;
use tokio::sync::mpsc::UnboundedSender;

use super::framer::StreamFramer;
use super::link::{read_available, ReadOutcome, SharedLink};
use super::RadioEvent;
use crate::logutil::{hex_snippet, truncate_for_log};
use crate::packet::RawPacket;
use crate::protobuf::meshtastic_generated as proto;

/// Pause after each read so senders can take the link lock.
const READ_GAP: Duration = Duration::from_millis(10);

pub struct RadioReader {
    link: SharedLink,
    framer: StreamFramer,
    backlog: Vec<proto::MeshPacket>,
    shutdown: Arc<AtomicBool>,
}

impl RadioReader {
    pub(crate) fn new(
        link: SharedLink,
        framer: StreamFramer,
        backlog: Vec<proto::MeshPacket>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            link,
            framer,
            backlog,
            shutdown,
        }
    }

    /// Read until the link closes, the interface shuts down or the event channel is dropped.
    /// Packets received during the handshake are delivered first.
    pub fn run(mut self, tx: UnboundedSender<RadioEvent>) {
        info!("Radio reader started");
        for pkt in std::mem::take(&mut self.backlog) {
            if tx.send(RadioEvent::Packet(RawPacket::from_mesh_packet(&pkt))).is_err() {
                return;
            }
        }
        // bytes left over from the handshake
        if !self.drain_frames(&tx) {
            return;
        }

        let mut buf = [0u8; 1024];
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match read_available(&self.link, &mut buf) {
                Ok(ReadOutcome::Data(n)) => {
                    trace!("RAW {} bytes: {}", n, hex_snippet(&buf[..n], 64));
                    self.framer.push(&buf[..n]);
                    if !self.drain_frames(&tx) {
                        break;
                    }
                }
                Ok(ReadOutcome::Idle) => {}
                Ok(ReadOutcome::Closed) => {
                    if !self.shutdown.load(Ordering::SeqCst) {
                        let _ = tx.send(RadioEvent::ConnectionLost("link closed by radio".into()));
                    }
                    break;
                }
                Err(e) => {
                    if !self.shutdown.load(Ordering::SeqCst) {
                        let _ = tx.send(RadioEvent::ConnectionLost(e.to_string()));
                    }
                    break;
                }
            }
            std::thread::sleep(READ_GAP);
        }
        info!("Radio reader stopped");
    }

    /// Decode every buffered frame. Returns false once the event channel is gone.
    fn drain_frames(&mut self, tx: &UnboundedSender<RadioEvent>) -> bool {
        use proto::from_radio::PayloadVariant as FRPayload;

        for line in self.framer.take_console_lines() {
            debug!("radio console: {}", truncate_for_log(&line, 200));
        }
        while let Some(frame) = self.framer.next_frame() {
            let msg = match proto::FromRadio::decode(frame.as_slice()) {
                Ok(m) => m,
                Err(e) => {
                    warn!(
                        "Undecodable FromRadio ({} bytes, {}): {}",
                        frame.len(),
                        hex_snippet(&frame, 16),
                        e
                    );
                    continue;
                }
            };
            let event = match msg.payload_variant {
                Some(FRPayload::Packet(pkt)) => {
                    RadioEvent::Packet(RawPacket::from_mesh_packet(&pkt))
                }
                Some(FRPayload::NodeInfo(node)) => RadioEvent::NodeUpdated {
                    num: node.num,
                    name: node.user.map(|u| u.long_name),
                },
                Some(FRPayload::Rebooted(_)) => {
                    warn!("Radio reports a reboot");
                    continue;
                }
                Some(FRPayload::MyInfo(info)) => {
                    debug!("my_info update: node 0x{:08x}", info.my_node_num);
                    continue;
                }
                Some(FRPayload::ConfigCompleteId(id)) => {
                    debug!("config_complete_id=0x{:08x}", id);
                    continue;
                }
                None => continue,
            };
            if tx.send(event).is_err() {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::super::framer::encode_frame;
    use super::super::link::testing::ScriptedLink;
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn frame(v: proto::from_radio::PayloadVariant) -> Vec<u8> {
        let msg = proto::FromRadio {
            id: 0,
            payload_variant: Some(v),
        };
        encode_frame(&msg.encode_to_vec()).unwrap()
    }

    #[test]
    fn emits_backlog_then_stream_then_connection_lost() {
        use proto::from_radio::PayloadVariant as FRPayload;
        let mut stream = b"boot log line\n".to_vec();
        stream.extend(frame(FRPayload::Packet(proto::MeshPacket {
            from: 2,
            ..Default::default()
        })));
        stream.extend(frame(FRPayload::NodeInfo(proto::NodeInfo {
            num: 3,
            user: Some(proto::User {
                long_name: "Three".into(),
                ..Default::default()
            }),
            ..Default::default()
        })));
        let link: SharedLink = Arc::new(Mutex::new(Box::new(ScriptedLink {
            inbound: VecDeque::from(vec![stream]),
            written: Arc::new(Mutex::new(Vec::new())),
            close_when_drained: true,
        })));
        let reader = RadioReader::new(
            link,
            StreamFramer::new(),
            vec![proto::MeshPacket {
                from: 1,
                ..Default::default()
            }],
            Arc::new(AtomicBool::new(false)),
        );
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        reader.run(tx);

        let mut froms = Vec::new();
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let RadioEvent::Packet(p) = &ev {
                froms.push(p.get_u64("from").unwrap());
            }
            events.push(ev);
        }
        assert_eq!(froms, vec![1, 2]);
        assert!(events.contains(&RadioEvent::NodeUpdated {
            num: 3,
            name: Some("Three".into())
        }));
        assert!(matches!(events.last(), Some(RadioEvent::ConnectionLost(_))));
    }

    #[test]
    fn stops_quietly_after_shutdown() {
        let link: SharedLink = Arc::new(Mutex::new(Box::new(ScriptedLink {
            inbound: VecDeque::new(),
            written: Arc::new(Mutex::new(Vec::new())),
            close_when_drained: true,
        })));
        let reader = RadioReader::new(
            link,
            StreamFramer::new(),
            Vec::new(),
            Arc::new(AtomicBool::new(true)),
        );
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        reader.run(tx);
        assert!(rx.try_recv().is_err());
    }
}
