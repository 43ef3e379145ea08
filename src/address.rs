//! Conversions between pipe address tokens and mesh node numbers.
//!
//! The mail agent addresses stations by their bare 8 digit hex id (`0A1B2C3D`); the mesh
//! side uses the same number prefixed with `!`. Two pseudo addresses are understood when
//! resolving a destination: `^all` (broadcast) and `^local` (our own node).
use thiserror::Error;

use crate::protobuf::meshtastic_generated::BROADCAST_ADDR;

pub const BROADCAST_TOKEN: &str = "^all";
pub const LOCAL_TOKEN: &str = "^local";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid node address '{0}'")]
    Invalid(String),
    #[error("local node number is not known yet")]
    LocalUnknown,
}

/// Mesh-native form of a pipe token. The token is not validated here; a malformed one fails
/// when the transport resolves it.
pub fn to_wire_address(token: &str) -> String {
    format!("!{}", token)
}

/// Eight uppercase hex digits, zero padded.
pub fn to_pipe_token(node: u32) -> String {
    format!("{:08X}", node)
}

/// Node id as Meshtastic prints it (`!0a1b2c3d`).
pub fn node_id(node: u32) -> String {
    format!("!{:08x}", node)
}

/// Resolve a destination string to a node number.
pub fn parse_wire_address(addr: &str, local: Option<u32>) -> Result<u32, AddressError> {
    match addr {
        BROADCAST_TOKEN => Ok(BROADCAST_ADDR),
        LOCAL_TOKEN => local.ok_or(AddressError::LocalUnknown),
        _ => match addr.strip_prefix('!') {
            Some(hex) => parse_hex(hex).ok_or_else(|| AddressError::Invalid(addr.to_string())),
            None => Err(AddressError::Invalid(addr.to_string())),
        },
    }
}

fn parse_hex(hex: &str) -> Option<u32> {
    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_token_is_padded_uppercase() {
        assert_eq!(to_pipe_token(0xAB), "000000AB");
        assert_eq!(to_pipe_token(0x0a1b2c3d), "0A1B2C3D");
        assert_eq!(node_id(0x0a1b2c3d), "!0a1b2c3d");
    }

    #[test]
    fn wire_round_trip() {
        for id in [0u32, 1, 0x0A1B_2C3D, 0xDEAD_BEEF, u32::MAX - 1] {
            let wire = to_wire_address(&to_pipe_token(id));
            assert_eq!(parse_wire_address(&wire, None), Ok(id));
        }
    }

    #[test]
    fn pseudo_addresses() {
        assert_eq!(parse_wire_address("^all", None), Ok(BROADCAST_ADDR));
        assert_eq!(parse_wire_address("^local", Some(5)), Ok(5));
        assert_eq!(
            parse_wire_address("^local", None),
            Err(AddressError::LocalUnknown)
        );
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(parse_wire_address("!", None).is_err());
        assert!(parse_wire_address("!xyz", None).is_err());
        assert!(parse_wire_address("!123456789", None).is_err());
        assert!(parse_wire_address("0A1B2C3D", None).is_err());
        assert!(parse_wire_address("!+1", None).is_err());
    }
}
