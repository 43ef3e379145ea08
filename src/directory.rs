//! Station identity and known-node snapshot.
//!
//! Both are rebuilt from the radio's node database
//! (see [`crate::packet::RawPacket::from_node_info`]) and replaced wholesale on every refresh.
use std::collections::BTreeMap;
use std::f64::consts::PI;

use chrono::{DateTime, Local, TimeZone};
use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::address::to_pipe_token;
use crate::logutil::escape_log;
use crate::packet::{FieldValue, RawPacket};

/// Zoom level used for the tile coordinates shown per node.
pub const TILE_ZOOM: u32 = 10;

const LAST_HEARD_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("{record}: missing field '{field}'")]
    MissingField { record: String, field: &'static str },
    #[error("{record}: field '{field}' is {found}, expected {expected}")]
    WrongType {
        record: String,
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub zoom: u32,
}

/// Slippy-map tile containing `pos` at `zoom`.
pub fn tile_for(pos: GeoPosition, zoom: u32) -> TileCoord {
    let n = 2f64.powi(zoom as i32);
    let lat_rad = pos.latitude.to_radians();
    let x = ((pos.longitude + 180.0) / 360.0 * n).floor();
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor();
    TileCoord {
        x: x as u32,
        y: y as u32,
        zoom,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationIdentity {
    pub node_num: u32,
    /// Mesh id as reported by the radio (`!0a1b2c3d`).
    pub node_id: String,
    pub long_name: String,
    pub hw_model: String,
    pub mac: String,
    pub position: Option<GeoPosition>,
    pub battery_level: Option<u32>,
}

impl StationIdentity {
    /// Bare hex id published for the mail agent: the user id without its `!`, or the
    /// zero-padded node number when the id is not in the usual form.
    pub fn address_token(&self) -> String {
        match self.node_id.strip_prefix('!') {
            Some(hex) if !hex.is_empty() => hex.to_string(),
            _ => to_pipe_token(self.node_num),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerNode {
    pub node_num: u32,
    pub node_id: String,
    pub long_name: String,
    pub mac: String,
    pub position: Option<GeoPosition>,
    pub tile: Option<TileCoord>,
    pub battery_level: Option<u32>,
    pub last_heard: Option<DateTime<Local>>,
}

impl PeerNode {
    pub fn last_heard_display(&self) -> Option<String> {
        self.last_heard.map(|t| t.format(LAST_HEARD_FORMAT).to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDirectory {
    pub station: StationIdentity,
    pub peers: BTreeMap<u32, PeerNode>,
}

impl NodeDirectory {
    pub fn peer(&self, node_num: u32) -> Option<&PeerNode> {
        self.peers.get(&node_num)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Log the station and every peer at info level.
    pub fn log_summary(&self) {
        let s = &self.station;
        info!(
            "Station {} '{}' hw={} mac={}",
            s.node_id,
            escape_log(&s.long_name),
            s.hw_model,
            s.mac
        );
        if let Some(pos) = s.position {
            info!("Station position {:.5},{:.5}", pos.latitude, pos.longitude);
        }
        if let Some(b) = s.battery_level {
            info!("Station battery {}%", b);
        }
        for peer in self.peers.values() {
            let mut line = format!(
                "Node {} ({}) '{}' mac={}",
                peer.node_num,
                peer.node_id,
                escape_log(&peer.long_name),
                peer.mac
            );
            if let (Some(pos), Some(tile)) = (peer.position, peer.tile) {
                line.push_str(&format!(
                    " tile={}/{} lat={} lon={}",
                    tile.x, tile.y, pos.latitude, pos.longitude
                ));
            }
            if let Some(b) = peer.battery_level {
                line.push_str(&format!(" battery={}", b));
            }
            if let Some(heard) = peer.last_heard_display() {
                line.push_str(&format!(" last_heard={}", heard));
            }
            info!("{}", line);
        }
    }
}

/// Typed field access that reports which record and field failed.
struct Fields<'a> {
    record: &'a RawPacket,
    label: &'a str,
}

impl<'a> Fields<'a> {
    fn missing(&self, field: &'static str) -> DirectoryError {
        DirectoryError::MissingField {
            record: self.label.to_string(),
            field,
        }
    }

    fn wrong(
        &self,
        field: &'static str,
        expected: &'static str,
        found: &FieldValue,
    ) -> DirectoryError {
        DirectoryError::WrongType {
            record: self.label.to_string(),
            field,
            expected,
            found: found.kind(),
        }
    }

    fn map(&self, field: &'static str) -> Result<&'a RawPacket, DirectoryError> {
        let v = self.record.get(field).ok_or_else(|| self.missing(field))?;
        v.as_map().ok_or_else(|| self.wrong(field, "map", v))
    }

    fn opt_map(&self, field: &'static str) -> Result<Option<&'a RawPacket>, DirectoryError> {
        match self.record.get(field) {
            None => Ok(None),
            Some(v) => v.as_map().map(Some).ok_or_else(|| self.wrong(field, "map", v)),
        }
    }

    fn text(&self, field: &'static str) -> Result<&'a str, DirectoryError> {
        let v = self.record.get(field).ok_or_else(|| self.missing(field))?;
        v.as_str().ok_or_else(|| self.wrong(field, "text", v))
    }

    fn opt_text(&self, field: &'static str) -> Result<Option<&'a str>, DirectoryError> {
        match self.record.get(field) {
            None => Ok(None),
            Some(v) => v.as_str().map(Some).ok_or_else(|| self.wrong(field, "text", v)),
        }
    }

    fn num(&self, field: &'static str) -> Result<u32, DirectoryError> {
        let v = self.record.get(field).ok_or_else(|| self.missing(field))?;
        v.as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| self.wrong(field, "u32", v))
    }

    fn opt_num(&self, field: &'static str) -> Result<Option<u32>, DirectoryError> {
        match self.record.get(field) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| self.wrong(field, "u32", v)),
        }
    }

    fn opt_float(&self, field: &'static str) -> Result<Option<f64>, DirectoryError> {
        match self.record.get(field) {
            None => Ok(None),
            Some(v) => v.as_f64().map(Some).ok_or_else(|| self.wrong(field, "number", v)),
        }
    }
}

fn record_label(record: &RawPacket, kind: &str) -> String {
    match record.get_u64("num") {
        Some(n) => format!("{} {}", kind, n),
        None => kind.to_string(),
    }
}

/// Position only when both coordinates are present.
fn parse_position(
    position: Option<&RawPacket>,
    label: &str,
) -> Result<Option<GeoPosition>, DirectoryError> {
    let Some(pos) = position else {
        return Ok(None);
    };
    let f = Fields { record: pos, label };
    match (f.opt_float("latitude")?, f.opt_float("longitude")?) {
        (Some(latitude), Some(longitude)) => Ok(Some(GeoPosition { latitude, longitude })),
        _ => Ok(None),
    }
}

fn parse_battery(record: &RawPacket, label: &str) -> Result<Option<u32>, DirectoryError> {
    let f = Fields { record, label };
    if let Some(pos) = f.opt_map("position")? {
        let level = Fields { record: pos, label }.opt_num("batteryLevel")?;
        if level.is_some() {
            return Ok(level);
        }
    }
    match f.opt_map("deviceMetrics")? {
        Some(m) => Fields { record: m, label }.opt_num("batteryLevel"),
        None => Ok(None),
    }
}

/// Build the local station identity from its own node record.
pub fn parse_station(record: &RawPacket) -> Result<StationIdentity, DirectoryError> {
    let label = record_label(record, "station");
    let f = Fields { record, label: &label };
    let node_num = f.num("num")?;
    let user_map = f.map("user")?;
    let user = Fields { record: user_map, label: &label };
    let position = parse_position(f.opt_map("position")?, &label)?;
    Ok(StationIdentity {
        node_num,
        node_id: user.text("id")?.to_string(),
        long_name: user.text("longName")?.to_string(),
        hw_model: user.opt_text("hwModel")?.unwrap_or("UNSET").to_string(),
        mac: user.opt_text("macaddr")?.unwrap_or_default().to_string(),
        position,
        battery_level: parse_battery(record, &label)?,
    })
}

/// Build one peer entry; `user`, `user.longName`, `user.id` and `user.macaddr` are required.
pub fn parse_peer(record: &RawPacket) -> Result<PeerNode, DirectoryError> {
    let label = record_label(record, "node");
    let f = Fields { record, label: &label };
    let node_num = f.num("num")?;
    let user_map = f.map("user")?;
    let user = Fields { record: user_map, label: &label };
    let long_name = user.text("longName")?.to_string();
    let node_id = user.text("id")?.to_string();
    let mac = user.text("macaddr")?.to_string();
    let position = parse_position(f.opt_map("position")?, &label)?;
    let last_heard = f
        .opt_num("lastHeard")?
        .and_then(|secs| Local.timestamp_opt(i64::from(secs), 0).single());
    Ok(PeerNode {
        node_num,
        node_id,
        long_name,
        mac,
        tile: position.map(|p| tile_for(p, TILE_ZOOM)),
        position,
        battery_level: parse_battery(record, &label)?,
        last_heard,
    })
}

/// Rebuild the directory; the first malformed record aborts the refresh.
pub fn refresh(station: &RawPacket, nodes: &[RawPacket]) -> Result<NodeDirectory, DirectoryError> {
    let station = parse_station(station)?;
    let mut peers = BTreeMap::new();
    for record in nodes {
        let peer = parse_peer(record)?;
        peers.insert(peer.node_num, peer);
    }
    Ok(NodeDirectory { station, peers })
}

/// Rebuild the directory, skipping malformed peer records. The station record is still
/// required. Skipped records are returned so the caller can report them.
pub fn refresh_lenient(
    station: &RawPacket,
    nodes: &[RawPacket],
) -> Result<(NodeDirectory, Vec<DirectoryError>), DirectoryError> {
    let station = parse_station(station)?;
    let mut peers = BTreeMap::new();
    let mut skipped = Vec::new();
    for record in nodes {
        match parse_peer(record) {
            Ok(peer) => {
                peers.insert(peer.node_num, peer);
            }
            Err(e) => {
                warn!("Skipping node record: {}", e);
                skipped.push(e);
            }
        }
    }
    Ok((NodeDirectory { station, peers }, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(num: u32, name: &str) -> RawPacket {
        RawPacket::new().with("num", num).with(
            "user",
            RawPacket::new()
                .with("id", format!("!{:08x}", num))
                .with("longName", name)
                .with("macaddr", "aa:bb:cc:dd:ee:ff")
                .with("hwModel", "TBEAM"),
        )
    }

    #[test]
    fn tile_of_null_island() {
        let t = tile_for(GeoPosition { latitude: 0.0, longitude: 0.0 }, 10);
        assert_eq!((t.x, t.y, t.zoom), (512, 512, 10));
    }

    #[test]
    fn tile_of_helsinki() {
        let t = tile_for(
            GeoPosition { latitude: 60.1699, longitude: 24.9384 },
            10,
        );
        assert_eq!((t.x, t.y), (582, 296));
    }

    #[test]
    fn station_reads_position_and_battery_fallback() {
        let rec = node(0x0A1B2C3D, "Base")
            .with(
                "position",
                RawPacket::new().with("latitude", 60.0).with("longitude", 25.0),
            )
            .with("deviceMetrics", RawPacket::new().with("batteryLevel", 71u32));
        let s = parse_station(&rec).unwrap();
        assert_eq!(s.address_token(), "0a1b2c3d");
        assert_eq!(s.hw_model, "TBEAM");
        assert_eq!(s.position, Some(GeoPosition { latitude: 60.0, longitude: 25.0 }));
        assert_eq!(s.battery_level, Some(71));
    }

    #[test]
    fn position_needs_both_coordinates() {
        let rec = node(5, "Half").with("position", RawPacket::new().with("latitude", 1.0));
        let p = parse_peer(&rec).unwrap();
        assert!(p.position.is_none());
        assert!(p.tile.is_none());
    }

    #[test]
    fn position_battery_wins_over_metrics() {
        let rec = node(5, "Both")
            .with("position", RawPacket::new().with("batteryLevel", 10u32))
            .with("deviceMetrics", RawPacket::new().with("batteryLevel", 90u32));
        assert_eq!(parse_peer(&rec).unwrap().battery_level, Some(10));
    }

    #[test]
    fn peer_missing_mac_is_rejected() {
        let rec = RawPacket::new().with("num", 9u32).with(
            "user",
            RawPacket::new().with("id", "!00000009").with("longName", "X"),
        );
        assert_eq!(
            parse_peer(&rec),
            Err(DirectoryError::MissingField {
                record: "node 9".into(),
                field: "macaddr"
            })
        );
    }

    #[test]
    fn wrong_scalar_type_is_rejected() {
        let rec = node(3, "Y").with("lastHeard", "yesterday");
        assert!(matches!(
            parse_peer(&rec),
            Err(DirectoryError::WrongType { field: "lastHeard", .. })
        ));
    }

    #[test]
    fn strict_refresh_fails_on_one_bad_peer_lenient_keeps_good() {
        let station = node(1, "Base");
        let nodes = vec![node(1, "Base"), node(2, "Peer"), RawPacket::new().with("num", 3u32)];
        assert!(refresh(&station, &nodes).is_err());

        let (dir, skipped) = refresh_lenient(&station, &nodes).unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.peer(2).unwrap().long_name, "Peer");
        assert_eq!(skipped.len(), 1);
    }

    #[test]
    fn last_heard_is_local_wall_clock() {
        let rec = node(4, "Z").with("lastHeard", 1_700_000_000u32);
        let peer = parse_peer(&rec).unwrap();
        let expected = Local
            .timestamp_opt(1_700_000_000, 0)
            .unwrap()
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        assert_eq!(peer.last_heard_display(), Some(expected));
    }
}
