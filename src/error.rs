//! Bridge error type and the policy attached to each kind.
use std::path::PathBuf;

use thiserror::Error;

use crate::address::AddressError;
use crate::directory::DirectoryError;
use crate::format::FormatError;
use crate::meshtastic::framer::FrameError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("connection failure: {0}")]
    Connection(String),
    #[error("send failure: {0}")]
    Send(String),
    #[error("{context}: {source}")]
    Directory {
        context: &'static str,
        #[source]
        source: DirectoryError,
    },
    #[error("malformed packet: {0}")]
    Packet(String),
    #[error("queue file {}: {reason}", path.display())]
    Pipe { path: PathBuf, reason: String },
    #[error("configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Whether the bridge loop must stop. Send failures and malformed packets are counted
    /// and the loop carries on.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BridgeError::Send(_) | BridgeError::Packet(_))
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            BridgeError::Config(_) => 2,
            BridgeError::Connection(_) => 3,
            BridgeError::Send(_) => 4,
            BridgeError::Directory { .. } => 5,
            BridgeError::Pipe { .. } => 6,
            BridgeError::Packet(_) => 1,
        }
    }

    pub fn pipe(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        BridgeError::Pipe {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<AddressError> for BridgeError {
    fn from(e: AddressError) -> Self {
        BridgeError::Send(e.to_string())
    }
}

impl From<FrameError> for BridgeError {
    fn from(e: FrameError) -> Self {
        BridgeError::Send(e.to_string())
    }
}

impl From<FormatError> for BridgeError {
    fn from(e: FormatError) -> Self {
        BridgeError::Packet(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_and_packet_errors_are_not_fatal() {
        assert!(!BridgeError::Send("x".into()).is_fatal());
        assert!(!BridgeError::Packet("x".into()).is_fatal());
        assert!(BridgeError::Connection("x".into()).is_fatal());
        assert!(BridgeError::pipe("/tmp/q", "not a FIFO").is_fatal());
    }

    #[test]
    fn exit_codes_are_distinct_per_kind() {
        let dir = BridgeError::Directory {
            context: "processing node info",
            source: DirectoryError::MissingField {
                record: "node 1".into(),
                field: "user",
            },
        };
        assert_eq!(dir.exit_code(), 5);
        assert_eq!(
            dir.to_string(),
            "processing node info: node 1: missing field 'user'"
        );
        assert_eq!(BridgeError::Config("x".into()).exit_code(), 2);
        assert_eq!(BridgeError::Connection("x".into()).exit_code(), 3);
        assert_eq!(BridgeError::pipe("/tmp/q", "gone").exit_code(), 6);
        assert_eq!(BridgeError::Packet("x".into()).exit_code(), 1);
    }
}
