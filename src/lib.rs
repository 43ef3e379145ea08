//! # meshpipe - FIFO message bridge for Meshtastic networks
//!
//! meshpipe relays text between a local mail agent and a Meshtastic mesh. The agent writes
//! lines to an inbound named pipe; meshpipe sends them over the radio, either broadcast or to a
//! single station, and writes every text message heard on the mesh to an outbound named pipe.
//!
//! ## Pipe formats
//!
//! In the default `addressed` mode:
//!
//! ```text
//! inbound   <recipientHex>|<sender>|<body>   sent to !recipientHex as "<sender>|<body>"
//!           <sender>|<body>                  broadcast as-is
//! outbound  <senderHex8>|<text>              one line per received message
//! ```
//!
//! The `plain` mode broadcasts every inbound line and writes received text unchanged.
//!
//! ## Module Organization
//!
//! - [`bridge`] - the poll/dispatch loop, its session counters and error policy
//! - [`format`] - pipe line <-> mesh text translation
//! - [`directory`] - station identity and known nodes
//! - [`address`] - pipe tokens and mesh node addresses
//! - [`packet`] - untyped packet maps and the diagnostic inspector
//! - [`pipes`] - FIFO checks, queue reader and writer tasks
//! - [`meshtastic`] - serial/TCP client API transport
//! - [`protobuf`] - the Meshtastic protobuf messages used on the link
//! - [`config`] - TOML configuration
//!
//! ```text
//! inbound FIFO -> pipes -> bridge -> format -> meshtastic -> radio
//! radio -> meshtastic -> packet -> bridge -> format -> pipes -> outbound FIFO
//! ```

pub mod address;
pub mod bridge;
pub mod config;
pub mod directory;
pub mod error;
pub mod format;
pub mod logutil;
pub mod meshtastic;
pub mod packet;
pub mod pipes;
pub mod protobuf;

pub use error::BridgeError;
