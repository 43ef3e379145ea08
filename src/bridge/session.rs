use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters for one radio connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeSession {
    pub packets_received: u64,
    pub packets_sent: u64,
    pub messages_delivered: u64,
    pub lines_dropped: u64,
    pub errors: u64,
    /// Section name of the last nested map seen in a received packet (`DECODED`, `USER`, ...).
    pub last_packet_type: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl Default for BridgeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeSession {
    pub fn new() -> Self {
        Self {
            packets_received: 0,
            packets_sent: 0,
            messages_delivered: 0,
            lines_dropped: 0,
            errors: 0,
            last_packet_type: None,
            started_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> String {
        let uptime = Utc::now().signed_duration_since(self.started_at);
        format!(
            "uptime {}s, received {}, sent {}, delivered {}, dropped {}, errors {}, last type {}",
            uptime.num_seconds(),
            self.packets_received,
            self.packets_sent,
            self.messages_delivered,
            self.lines_dropped,
            self.errors,
            self.last_packet_type.as_deref().unwrap_or("-")
        )
    }
}
