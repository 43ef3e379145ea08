//! Translation between pipe lines and mesh text.
//!
//! Two bridge modes exist. `addressed` speaks the mail agent's `|`-delimited protocol and can
//! target single stations; `plain` relays every line as a broadcast and writes bare message
//! text back.

pub mod inbound;
pub mod outbound;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use inbound::{format_inbound, FormatError, InboundMailLine};
pub use outbound::{format_outbound, OutboundDirective};

pub const FIELD_SEPARATOR: char = '|';

/// Sender label used in send confirmations for lines originating from the pipe.
pub const SENDER_TAG: &str = "BaseStation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMode {
    /// `recipient|sender|body` and `sender|body` lines; inbound lines carry the sender id.
    #[default]
    Addressed,
    /// Every line is broadcast verbatim; inbound text is written as-is.
    Plain,
}

impl fmt::Display for BridgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeMode::Addressed => f.write_str("addressed"),
            BridgeMode::Plain => f.write_str("plain"),
        }
    }
}
