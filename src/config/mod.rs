//! # Configuration
//!
//! TOML configuration with built-in defaults. A missing file is not an error; every section
//! and most keys may be omitted.
//!
//! ```toml
//! [meshtastic]
//! port = "/dev/ttyACM0"     # or: host = "192.168.1.20" (exactly one)
//! baud_rate = 115200
//! channel = 0
//! hop_limit = 3
//!
//! [pipes]
//! inbound = "/tmp/meshmail_in"
//! outbound = "/tmp/meshmail_out"
//! station_address_file = "/tmp/serveraddress"
//! create_missing = true
//!
//! [bridge]
//! mode = "addressed"        # or "plain"
//! station_name = "meshpipe-server"
//! poll_interval_ms = 2000
//!
//! [logging]
//! level = "info"
//! ```
//!
//! `meshpipe init --mode plain` writes the preset matching the single-pipe setup
//! (`/tmp/msgincoming` -> radio, radio -> `/tmp/msgchannel`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::BridgeError;
use crate::format::BridgeMode;
use crate::meshtastic::{LinkTarget, DEFAULT_TCP_PORT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshtasticConfig {
    /// Serial device of a USB attached radio.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Network attached radio, `host` or `host:port`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub tcp_port: u16,
    pub baud_rate: u32,
    pub channel: u32,
    pub hop_limit: u32,
    pub connect_timeout_secs: u64,
    /// 0 disables heartbeats.
    pub heartbeat_interval_secs: u64,
}

impl Default for MeshtasticConfig {
    fn default() -> Self {
        Self {
            port: None,
            host: None,
            tcp_port: DEFAULT_TCP_PORT,
            baud_rate: 115200,
            channel: 0,
            hop_limit: 3,
            connect_timeout_secs: 30,
            heartbeat_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipesConfig {
    pub inbound: PathBuf,
    pub outbound: PathBuf,
    /// Omitted in a `[pipes]` section means no station address is published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_address_file: Option<PathBuf>,
    pub create_missing: bool,
}

impl Default for PipesConfig {
    fn default() -> Self {
        Self::preset(BridgeMode::Addressed)
    }
}

impl PipesConfig {
    pub fn preset(mode: BridgeMode) -> Self {
        match mode {
            BridgeMode::Addressed => Self {
                inbound: PathBuf::from("/tmp/meshmail_in"),
                outbound: PathBuf::from("/tmp/meshmail_out"),
                station_address_file: Some(PathBuf::from("/tmp/serveraddress")),
                create_missing: true,
            },
            BridgeMode::Plain => Self {
                inbound: PathBuf::from("/tmp/msgincoming"),
                outbound: PathBuf::from("/tmp/msgchannel"),
                station_address_file: None,
                create_missing: false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub mode: BridgeMode,
    /// Prefix of the startup announcement.
    pub station_name: String,
    pub poll_interval_ms: u64,
    pub announce: bool,
    /// Abort the directory refresh on the first malformed node record.
    pub strict_directory: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::preset(BridgeMode::Addressed)
    }
}

impl BridgeConfig {
    pub fn preset(mode: BridgeMode) -> Self {
        Self {
            mode,
            station_name: match mode {
                BridgeMode::Addressed => "meshpipe-server".to_string(),
                BridgeMode::Plain => "meshpipe".to_string(),
            },
            poll_interval_ms: 2000,
            announce: true,
            strict_directory: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub meshtastic: MeshtasticConfig,
    pub pipes: PipesConfig,
    pub bridge: BridgeConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Defaults for one bridge mode.
    pub fn preset(mode: BridgeMode) -> Self {
        Self {
            meshtastic: MeshtasticConfig::default(),
            pipes: PipesConfig::preset(mode),
            bridge: BridgeConfig::preset(mode),
            logging: LoggingConfig::default(),
        }
    }

    /// Load and validate a configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            BridgeError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        let config: Config = toml::from_str(content).map_err(|e| e.to_string())?;
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }

    /// Write the preset for `mode` to `path`. An existing file is kept unless `force`.
    pub async fn create_default(
        path: impl AsRef<Path>,
        mode: BridgeMode,
        force: bool,
    ) -> Result<(), BridgeError> {
        let path = path.as_ref();
        if !force && fs::try_exists(path).await.unwrap_or(false) {
            return Err(BridgeError::Config(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }
        let content = toml::to_string_pretty(&Self::preset(mode))
            .map_err(|e| BridgeError::Config(format!("failed to serialize defaults: {}", e)))?;
        fs::write(path, content).await.map_err(|e| {
            BridgeError::Config(format!("failed to write {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.bridge.poll_interval_ms == 0 {
            return Err(BridgeError::Config(
                "bridge.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if !(1..=7).contains(&self.meshtastic.hop_limit) {
            return Err(BridgeError::Config(format!(
                "meshtastic.hop_limit must be between 1 and 7 (got {})",
                self.meshtastic.hop_limit
            )));
        }
        if self.meshtastic.port.is_some() && self.meshtastic.host.is_some() {
            return Err(BridgeError::Config(
                "meshtastic.port and meshtastic.host are mutually exclusive".into(),
            ));
        }
        if self.meshtastic.connect_timeout_secs == 0 {
            return Err(BridgeError::Config(
                "meshtastic.connect_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.pipes.inbound == self.pipes.outbound {
            return Err(BridgeError::Config(
                "pipes.inbound and pipes.outbound must differ".into(),
            ));
        }
        Ok(())
    }

    /// Pick the radio link. Command line values win over the file; exactly one of serial port
    /// or host must be known in the end.
    pub fn resolve_target(
        &self,
        cli_port: Option<&str>,
        cli_host: Option<&str>,
    ) -> Result<LinkTarget, BridgeError> {
        let (port, host) = match (cli_port, cli_host) {
            (Some(_), Some(_)) => {
                return Err(BridgeError::Config(
                    "--port and --host are mutually exclusive".into(),
                ))
            }
            (Some(p), None) => (Some(p), None),
            (None, Some(h)) => (None, Some(h)),
            (None, None) => (self.meshtastic.port.as_deref(), self.meshtastic.host.as_deref()),
        };
        match (port, host) {
            (Some(path), None) => Ok(LinkTarget::Serial {
                path: path.to_string(),
                baud_rate: self.meshtastic.baud_rate,
            }),
            (None, Some(h)) => parse_host(h, self.meshtastic.tcp_port),
            (Some(_), Some(_)) => Err(BridgeError::Config(
                "meshtastic.port and meshtastic.host are mutually exclusive".into(),
            )),
            (None, None) => Err(BridgeError::Config(
                "no radio given: use --port <device> or --host <address>".into(),
            )),
        }
    }
}

/// `host`, `host:port` or `[v6]:port`.
fn parse_host(input: &str, default_port: u16) -> Result<LinkTarget, BridgeError> {
    let bad = || BridgeError::Config(format!("invalid host '{}'", input));
    if input.is_empty() {
        return Err(bad());
    }
    if let Some(rest) = input.strip_prefix('[') {
        let (addr, tail) = rest.split_once(']').ok_or_else(bad)?;
        let port = match tail.strip_prefix(':') {
            Some(p) => p.parse().map_err(|_| bad())?,
            None if tail.is_empty() => default_port,
            None => return Err(bad()),
        };
        return Ok(LinkTarget::Tcp {
            host: addr.to_string(),
            port,
        });
    }
    match input.rsplit_once(':') {
        // a bare IPv6 address has several colons and no port
        Some((h, p)) if !h.contains(':') => Ok(LinkTarget::Tcp {
            host: h.to_string(),
            port: p.parse().map_err(|_| bad())?,
        }),
        _ => Ok(LinkTarget::Tcp {
            host: input.to_string(),
            port: default_port,
        }),
    }
}
