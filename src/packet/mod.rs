//! Untyped packet representation.
//!
//! Radio packets and node database entries are turned into a [`RawPacket`]: an ordered,
//! nested key/value map using the camelCase names Meshtastic clients expose (`from`,
//! `decoded.text`, `user.longName`, `position.latitude`, ...). The formatters, the directory
//! and the inspector all read packets through this shape, which keeps them independent of the
//! protobuf structs and easy to build by hand in tests.

pub mod inspect;

use std::fmt;

use bytes::Bytes;
use prost::Message;

use crate::address::node_id;
use crate::protobuf::meshtastic_generated as proto;

pub use inspect::{inspect, inspect_packet, InspectedField, Inspection};

/// One value in a [`RawPacket`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Bytes),
    Map(RawPacket),
}

impl FieldValue {
    pub fn as_map(&self) -> Option<&RawPacket> {
        match self {
            FieldValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Unsigned view; non-negative signed integers qualify.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::UInt(v) => Some(*v),
            FieldValue::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    /// Numeric view of any integer or float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Short type name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "int",
            FieldValue::UInt(_) => "uint",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
            FieldValue::Bytes(_) => "bytes",
            FieldValue::Map(_) => "map",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::UInt(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            FieldValue::Map(m) => write!(f, "{{{} fields}}", m.len()),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::UInt(v as u64)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UInt(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v as f64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<Bytes> for FieldValue {
    fn from(v: Bytes) -> Self {
        FieldValue::Bytes(v)
    }
}

impl From<RawPacket> for FieldValue {
    fn from(v: RawPacket) -> Self {
        FieldValue::Map(v)
    }
}

/// Ordered nested key/value packet. Insertion order is preserved so diagnostics read in the
/// same order the fields were decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPacket {
    fields: Vec<(String, FieldValue)>,
}

impl RawPacket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing an existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(FieldValue::as_u64)
    }

    /// Resolve a dotted path such as `decoded.text`.
    pub fn lookup(&self, path: &str) -> Option<&FieldValue> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.get(first)?;
        for part in parts {
            current = current.as_map()?.get(part)?;
        }
        Some(current)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Flatten a received mesh packet. Default-valued scalars are omitted, matching what
    /// clients see after protobuf-to-dict conversion.
    pub fn from_mesh_packet(pkt: &proto::MeshPacket) -> Self {
        let mut out = RawPacket::new()
            .with("from", pkt.from)
            .with("to", pkt.to)
            .with("fromId", node_id(pkt.from))
            .with(
                "toId",
                if pkt.to == proto::BROADCAST_ADDR {
                    "^all".to_string()
                } else {
                    node_id(pkt.to)
                },
            );
        if pkt.channel != 0 {
            out.insert("channel", pkt.channel);
        }
        match &pkt.payload_variant {
            Some(proto::mesh_packet::PayloadVariant::Decoded(data)) => {
                out.insert("decoded", decoded_map(data));
            }
            Some(proto::mesh_packet::PayloadVariant::Encrypted(blob)) => {
                out.insert("encrypted", blob.clone());
            }
            None => {}
        }
        if pkt.id != 0 {
            out.insert("id", pkt.id);
        }
        if pkt.rx_time != 0 {
            out.insert("rxTime", pkt.rx_time);
        }
        if pkt.rx_snr != 0.0 {
            out.insert("rxSnr", pkt.rx_snr);
        }
        if pkt.hop_limit != 0 {
            out.insert("hopLimit", pkt.hop_limit);
        }
        if pkt.want_ack {
            out.insert("wantAck", true);
        }
        if let Ok(priority) = proto::mesh_packet::Priority::try_from(pkt.priority) {
            if priority != proto::mesh_packet::Priority::Unset {
                out.insert("priority", priority.as_str_name());
            }
        }
        if pkt.rx_rssi != 0 {
            out.insert("rxRssi", pkt.rx_rssi);
        }
        if pkt.via_mqtt {
            out.insert("viaMqtt", true);
        }
        if pkt.hop_start != 0 {
            out.insert("hopStart", pkt.hop_start);
        }
        out.insert("raw", Bytes::from(pkt.encode_to_vec()));
        out
    }

    /// Flatten a node database entry the way `nodes` / `getMyNodeInfo()` present it.
    pub fn from_node_info(info: &proto::NodeInfo) -> Self {
        let mut out = RawPacket::new().with("num", info.num);
        if let Some(user) = &info.user {
            out.insert("user", user_map(user));
        }
        if let Some(pos) = &info.position {
            let map = position_map(pos);
            if !map.is_empty() {
                out.insert("position", map);
            }
        }
        if info.snr != 0.0 {
            out.insert("snr", info.snr);
        }
        if info.last_heard != 0 {
            out.insert("lastHeard", info.last_heard);
        }
        if let Some(metrics) = &info.device_metrics {
            out.insert("deviceMetrics", metrics_map(metrics));
        }
        if info.channel != 0 {
            out.insert("channel", info.channel);
        }
        if info.via_mqtt {
            out.insert("viaMqtt", true);
        }
        if let Some(hops) = info.hops_away {
            out.insert("hopsAway", hops);
        }
        out
    }
}

impl fmt::Display for RawPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match v {
                FieldValue::Map(m) => write!(f, "{}: {}", k, m)?,
                FieldValue::Text(s) => write!(f, "{}: {:?}", k, s)?,
                other => write!(f, "{}: {}", k, other)?,
            }
        }
        f.write_str("}")
    }
}

fn decoded_map(data: &proto::Data) -> RawPacket {
    use proto::PortNum;

    let port = PortNum::try_from(data.portnum).ok();
    let mut out = RawPacket::new();
    match port {
        Some(p) => out.insert("portnum", p.as_str_name()),
        None => out.insert("portnum", data.portnum),
    }
    out.insert("payload", data.payload.clone());
    match port {
        Some(PortNum::TextMessageApp) => {
            out.insert("text", String::from_utf8_lossy(&data.payload).into_owned());
        }
        Some(PortNum::PositionApp) => {
            if let Ok(pos) = proto::Position::decode(data.payload.as_ref()) {
                out.insert("position", position_map(&pos));
            }
        }
        Some(PortNum::NodeinfoApp) => {
            if let Ok(user) = proto::User::decode(data.payload.as_ref()) {
                out.insert("user", user_map(&user));
            }
        }
        Some(PortNum::TelemetryApp) => {
            if let Ok(t) = proto::Telemetry::decode(data.payload.as_ref()) {
                let mut tele = RawPacket::new();
                if t.time != 0 {
                    tele.insert("time", t.time);
                }
                if let Some(proto::telemetry::Variant::DeviceMetrics(m)) = &t.variant {
                    tele.insert("deviceMetrics", metrics_map(m));
                }
                out.insert("telemetry", tele);
            }
        }
        Some(PortNum::RoutingApp) => {
            if let Ok(r) = proto::Routing::decode(data.payload.as_ref()) {
                let mut routing = RawPacket::new();
                if let Some(proto::routing::Variant::ErrorReason(code)) = r.variant {
                    match proto::routing::Error::try_from(code) {
                        Ok(e) => routing.insert("errorReason", e.as_str_name()),
                        Err(_) => routing.insert("errorReason", code),
                    }
                }
                out.insert("routing", routing);
            }
        }
        _ => {}
    }
    if data.want_response {
        out.insert("wantResponse", true);
    }
    if data.request_id != 0 {
        out.insert("requestId", data.request_id);
    }
    if data.reply_id != 0 {
        out.insert("replyId", data.reply_id);
    }
    if data.emoji != 0 {
        out.insert("emoji", data.emoji);
    }
    if let Some(bits) = data.bitfield {
        out.insert("bitfield", bits);
    }
    out
}

fn user_map(user: &proto::User) -> RawPacket {
    let mut out = RawPacket::new()
        .with("id", user.id.clone())
        .with("longName", user.long_name.clone())
        .with("shortName", user.short_name.clone())
        .with("macaddr", format_mac(&user.macaddr))
        .with("hwModel", proto::hardware_model_name(user.hw_model));
    if user.is_licensed {
        out.insert("isLicensed", true);
    }
    out
}

fn position_map(pos: &proto::Position) -> RawPacket {
    let mut out = RawPacket::new();
    if let Some(lat) = pos.latitude_i {
        out.insert("latitudeI", lat);
        out.insert("latitude", lat as f64 * 1e-7);
    }
    if let Some(lon) = pos.longitude_i {
        out.insert("longitudeI", lon);
        out.insert("longitude", lon as f64 * 1e-7);
    }
    if let Some(alt) = pos.altitude {
        out.insert("altitude", alt);
    }
    if pos.time != 0 {
        out.insert("time", pos.time);
    }
    out
}

fn metrics_map(m: &proto::DeviceMetrics) -> RawPacket {
    let mut out = RawPacket::new();
    if let Some(v) = m.battery_level {
        out.insert("batteryLevel", v);
    }
    if let Some(v) = m.voltage {
        out.insert("voltage", v);
    }
    if let Some(v) = m.channel_utilization {
        out.insert("channelUtilization", v);
    }
    if let Some(v) = m.air_util_tx {
        out.insert("airUtilTx", v);
    }
    if let Some(v) = m.uptime_seconds {
        out.insert("uptimeSeconds", v);
    }
    out
}

/// Colon separated lowercase hex, the form node listings show.
pub fn format_mac(raw: &[u8]) -> String {
    raw.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
