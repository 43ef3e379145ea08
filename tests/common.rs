//! Test doubles and packet fixtures shared by the integration tests.
#![allow(dead_code)]

use meshpipe::config::Config;
use meshpipe::error::BridgeError;
use meshpipe::format::BridgeMode;
use meshpipe::meshtastic::MeshTransport;
use meshpipe::packet::RawPacket;

#[derive(Debug, Clone, PartialEq)]
pub struct SentText {
    pub text: String,
    pub destination: Option<String>,
    pub want_ack: bool,
}

/// Transport that records every send instead of talking to a radio.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub sent: Vec<SentText>,
    pub heartbeats: usize,
    pub closed: bool,
    /// When set, every send fails with this reason.
    pub fail_with: Option<String>,
    pub fail_close: bool,
    pub next_id: u32,
}

impl RecordingTransport {
    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            ..Default::default()
        }
    }
}

impl MeshTransport for RecordingTransport {
    fn send_text(
        &mut self,
        text: &str,
        destination: Option<&str>,
        want_ack: bool,
    ) -> Result<u32, BridgeError> {
        if let Some(reason) = &self.fail_with {
            return Err(BridgeError::Send(reason.clone()));
        }
        self.sent.push(SentText {
            text: text.to_string(),
            destination: destination.map(str::to_string),
            want_ack,
        });
        self.next_id += 1;
        Ok(self.next_id)
    }

    fn send_heartbeat(&mut self) -> Result<(), BridgeError> {
        self.heartbeats += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), BridgeError> {
        if self.fail_close {
            return Err(BridgeError::Send("link already closed".into()));
        }
        self.closed = true;
        Ok(())
    }
}

/// Config with pipes under `dir` and a fast poll interval.
pub fn test_config(dir: &std::path::Path, mode: BridgeMode) -> Config {
    let mut cfg = Config::preset(mode);
    cfg.pipes.inbound = dir.join("in");
    cfg.pipes.outbound = dir.join("out");
    if cfg.pipes.station_address_file.is_some() {
        cfg.pipes.station_address_file = Some(dir.join("serveraddress"));
    }
    cfg.bridge.poll_interval_ms = 10;
    cfg
}

/// Received text packet as the transport would deliver it.
pub fn text_packet(from: u32, text: &str) -> RawPacket {
    RawPacket::new()
        .with("from", from)
        .with("to", 0xFFFF_FFFFu32)
        .with("fromId", format!("!{:08x}", from))
        .with(
            "decoded",
            RawPacket::new()
                .with("portnum", "TEXT_MESSAGE_APP")
                .with("text", text),
        )
}

/// Node database record with the fields the directory requires.
pub fn node_record(num: u32, long_name: &str) -> RawPacket {
    RawPacket::new().with("num", num).with(
        "user",
        RawPacket::new()
            .with("id", format!("!{:08x}", num))
            .with("longName", long_name)
            .with("shortName", &long_name[..1])
            .with("macaddr", "de:ad:be:ef:00:01")
            .with("hwModel", "RAK4631"),
    )
}
