//! Pipe line to radio send.
use super::{BridgeMode, FIELD_SEPARATOR};
use crate::address::to_wire_address;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundDirective {
    Broadcast { text: String },
    Targeted { destination: String, text: String },
}

impl OutboundDirective {
    pub fn text(&self) -> &str {
        match self {
            OutboundDirective::Broadcast { text } => text,
            OutboundDirective::Targeted { text, .. } => text,
        }
    }

    /// Wire address for targeted sends, `None` for broadcast.
    pub fn destination(&self) -> Option<&str> {
        match self {
            OutboundDirective::Broadcast { .. } => None,
            OutboundDirective::Targeted { destination, .. } => Some(destination),
        }
    }
}

/// Decide what to send for one pipe line (newline already stripped).
///
/// In addressed mode two fields (`sender|body`) broadcast the whole line and three fields
/// (`recipient|sender|body`) send `sender|body` to `!recipient`. Any other field count, and
/// an empty line in either mode, yields `None`.
pub fn format_outbound(line: &str, mode: BridgeMode) -> Option<OutboundDirective> {
    if line.is_empty() {
        return None;
    }
    if mode == BridgeMode::Plain {
        return Some(OutboundDirective::Broadcast {
            text: format!("{}\n", line),
        });
    }
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    match fields.as_slice() {
        [_, _] => Some(OutboundDirective::Broadcast {
            text: format!("{}\n", line),
        }),
        [recipient, sender, body] => Some(OutboundDirective::Targeted {
            destination: to_wire_address(recipient),
            text: format!("{}{}{}\n", sender, FIELD_SEPARATOR, body),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_fields_broadcast_whole_line() {
        let d = format_outbound("alice|hello", BridgeMode::Addressed).unwrap();
        assert_eq!(
            d,
            OutboundDirective::Broadcast {
                text: "alice|hello\n".into()
            }
        );
        assert_eq!(d.destination(), None);
    }

    #[test]
    fn three_fields_target_recipient() {
        let d = format_outbound("0A1B2C3D|alice|hello", BridgeMode::Addressed).unwrap();
        assert_eq!(d.destination(), Some("!0A1B2C3D"));
        assert_eq!(d.text(), "alice|hello\n");
    }

    #[test]
    fn other_field_counts_are_dropped() {
        assert!(format_outbound("a|b|c|d", BridgeMode::Addressed).is_none());
        assert!(format_outbound("no separators", BridgeMode::Addressed).is_none());
        assert!(format_outbound("", BridgeMode::Addressed).is_none());
    }

    #[test]
    fn empty_fields_still_count() {
        let d = format_outbound("|", BridgeMode::Addressed).unwrap();
        assert_eq!(d.text(), "|\n");
        let d = format_outbound("||body", BridgeMode::Addressed).unwrap();
        assert_eq!(d.destination(), Some("!"));
    }

    #[test]
    fn plain_mode_ignores_separators() {
        let d = format_outbound("a|b|c|d", BridgeMode::Plain).unwrap();
        assert_eq!(d.text(), "a|b|c|d\n");
        assert_eq!(d.destination(), None);
        assert!(format_outbound("", BridgeMode::Plain).is_none());
    }
}
