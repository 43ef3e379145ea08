//! Diagnostic walk over received packets.
//!
//! Every scalar field is logged with its section path (`PACKET/DECODED/POSITION`). Nested maps
//! are descended depth first with an explicit stack, so depth is unbounded. Byte blobs and the
//! `raw` encoding are skipped.
use std::slice;

use log::{debug, warn};

use super::{FieldValue, RawPacket};
use crate::logutil::escape_log;

/// Key holding the re-encoded protobuf; never printed.
const RAW_KEY: &str = "raw";

#[derive(Debug, Clone, PartialEq)]
pub struct InspectedField {
    pub path: String,
    pub key: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inspection {
    pub fields: Vec<InspectedField>,
    /// Uppercased name of the last nested section visited, if any.
    pub last_section: Option<String>,
}

/// Walk `value` if it is a packet map; anything else is reported and ignored.
pub fn inspect(value: &FieldValue, label: &str) -> Option<Inspection> {
    match value {
        FieldValue::Map(packet) => Some(inspect_packet(packet, label)),
        other => {
            warn!("Not a packet ({}): {}", label, other.kind());
            None
        }
    }
}

/// Pre-order walk: a nested section is entered as soon as it is met, so scalars after it are
/// reported after everything inside it.
pub fn inspect_packet(packet: &RawPacket, label: &str) -> Inspection {
    let mut result = Inspection::default();
    let mut stack: Vec<(String, slice::Iter<'_, (String, FieldValue)>)> =
        vec![(label.to_uppercase(), packet.fields.iter())];

    while let Some((path, fields)) = stack.last_mut() {
        let Some((key, value)) = fields.next() else {
            stack.pop();
            continue;
        };
        match value {
            FieldValue::Map(child) => {
                let section = format!("{}/{}", path, key).to_uppercase();
                result.last_section = Some(key.to_uppercase());
                stack.push((section, child.fields.iter()));
            }
            FieldValue::Bytes(_) => {}
            _ if key == RAW_KEY => {}
            scalar => {
                let shown = match scalar {
                    FieldValue::Text(s) => escape_log(s),
                    other => other.to_string(),
                };
                debug!("{}: {} = {}", path, key, shown);
                result.fields.push(InspectedField {
                    path: path.clone(),
                    key: key.clone(),
                    value: scalar.clone(),
                });
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn walks_nested_sections_and_skips_blobs() {
        let packet = RawPacket::new()
            .with("from", 7u32)
            .with(
                "decoded",
                RawPacket::new()
                    .with("portnum", "TEXT_MESSAGE_APP")
                    .with("payload", Bytes::from_static(b"hi"))
                    .with("text", "hi"),
            )
            .with("raw", Bytes::from_static(&[1, 2, 3]));

        let seen = inspect_packet(&packet, "packet");
        let paths: Vec<_> = seen
            .fields
            .iter()
            .map(|f| format!("{}:{}", f.path, f.key))
            .collect();
        assert_eq!(
            paths,
            vec!["PACKET:from", "PACKET/DECODED:portnum", "PACKET/DECODED:text"]
        );
        assert_eq!(seen.last_section.as_deref(), Some("DECODED"));
        assert_eq!(seen.fields[2].value, FieldValue::Text("hi".into()));
    }

    #[test]
    fn sections_are_visited_in_packet_order() {
        let packet = RawPacket::new()
            .with("id", 1u32)
            .with(
                "decoded",
                RawPacket::new().with("inner", RawPacket::new().with("x", 1u32)),
            )
            .with("hopLimit", 3u32)
            .with("user", RawPacket::new().with("y", 2u32));

        let seen = inspect_packet(&packet, "packet");
        let paths: Vec<_> = seen
            .fields
            .iter()
            .map(|f| format!("{}:{}", f.path, f.key))
            .collect();
        assert_eq!(
            paths,
            vec![
                "PACKET:id",
                "PACKET/DECODED/INNER:x",
                "PACKET:hopLimit",
                "PACKET/USER:y"
            ]
        );
        assert_eq!(seen.last_section.as_deref(), Some("USER"));
    }

    #[test]
    fn deep_nesting_is_walked_without_recursion() {
        let mut packet = RawPacket::new().with("leaf", true);
        for i in 0..500 {
            packet = RawPacket::new().with(format!("n{}", i % 3), packet);
        }
        let seen = inspect_packet(&packet, "deep");
        assert_eq!(seen.fields.len(), 1);
        assert_eq!(seen.fields[0].key, "leaf");
    }

    #[test]
    fn scalar_input_is_not_a_packet() {
        assert!(inspect(&FieldValue::UInt(3), "packet").is_none());
        let map = FieldValue::Map(RawPacket::new().with("a", 1u32));
        assert_eq!(inspect(&map, "packet").unwrap().fields.len(), 1);
    }
}
