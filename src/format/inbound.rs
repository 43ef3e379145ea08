//! Received radio text to pipe line.
use std::fmt;

use thiserror::Error;

use super::{BridgeMode, FIELD_SEPARATOR};
use crate::address::to_pipe_token;
use crate::packet::{FieldValue, RawPacket};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("text packet without a numeric sender")]
    MissingSender,
}

/// One line ready for the outbound queue, terminator included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMailLine(String);

impl InboundMailLine {
    pub fn new(line: impl Into<String>) -> Self {
        Self(line.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for InboundMailLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the queue line for a received packet. Packets without (or with empty)
/// `decoded.text` produce `Ok(None)`.
pub fn format_inbound(
    packet: &RawPacket,
    mode: BridgeMode,
) -> Result<Option<InboundMailLine>, FormatError> {
    let text = match packet.lookup("decoded.text").and_then(FieldValue::as_str) {
        Some(t) if !t.is_empty() => t,
        _ => return Ok(None),
    };
    match mode {
        BridgeMode::Plain => Ok(Some(InboundMailLine::new(text))),
        BridgeMode::Addressed => {
            let from = packet
                .get_u64("from")
                .and_then(|v| u32::try_from(v).ok())
                .ok_or(FormatError::MissingSender)?;
            Ok(Some(InboundMailLine(format!(
                "{}{}{}\n",
                to_pipe_token(from),
                FIELD_SEPARATOR,
                text
            ))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(from: Option<u32>, text: Option<&str>) -> RawPacket {
        let mut p = RawPacket::new();
        if let Some(f) = from {
            p.insert("from", f);
        }
        let mut decoded = RawPacket::new().with("portnum", "TEXT_MESSAGE_APP");
        if let Some(t) = text {
            decoded.insert("text", t);
        }
        p.insert("decoded", decoded);
        p
    }

    #[test]
    fn addressed_line_carries_sender_token() {
        let line = format_inbound(&packet(Some(0x0A1B2C3D), Some("hi")), BridgeMode::Addressed)
            .unwrap()
            .unwrap();
        assert_eq!(line.as_str(), "0A1B2C3D|hi\n");
    }

    #[test]
    fn missing_or_empty_text_is_skipped() {
        assert_eq!(
            format_inbound(&packet(Some(1), None), BridgeMode::Addressed),
            Ok(None)
        );
        assert_eq!(
            format_inbound(&packet(Some(1), Some("")), BridgeMode::Addressed),
            Ok(None)
        );
        assert_eq!(
            format_inbound(&RawPacket::new().with("from", 1u32), BridgeMode::Addressed),
            Ok(None)
        );
    }

    #[test]
    fn text_without_sender_is_an_error() {
        assert_eq!(
            format_inbound(&packet(None, Some("hi")), BridgeMode::Addressed),
            Err(FormatError::MissingSender)
        );
    }

    #[test]
    fn plain_mode_writes_text_only() {
        let line = format_inbound(&packet(None, Some("hello")), BridgeMode::Plain)
            .unwrap()
            .unwrap();
        assert_eq!(line.as_str(), "hello");
    }
}
