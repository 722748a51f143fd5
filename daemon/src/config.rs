use log::{info, warn};
use pouw_common::{config::DEFAULT_QUORUM, logger::LogConfig};
use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path, time::Duration};
use thiserror::Error;

// ===== P2P =====

// Listen on every interface by default
pub const DEFAULT_P2P_BIND_HOST: &str = "0.0.0.0";
// 0 lets the OS pick a free port
pub const DEFAULT_P2P_PORT: u16 = 0;

// Maximum size in bytes of a root or proof string in a received frame
// Frames above it are treated as a protocol violation and the peer is dropped
pub const PEER_MAX_FIELD_SIZE: usize = 4096;

// Delay before accepting again after an accept error
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);
// Timeout of the loopback connection used to wake the accept thread on stop
pub const WAKE_TIMEOUT: Duration = Duration::from_millis(500);
// A peer that does not drain its socket within this delay is dropped
pub const PEER_WRITE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default values for configuration
pub mod defaults {
    use super::*;

    pub const BIND_HOST: &str = DEFAULT_P2P_BIND_HOST;
    pub const PORT: u16 = DEFAULT_P2P_PORT;
    pub const QUORUM: usize = DEFAULT_QUORUM;
    pub const STATS_INTERVAL_SECS: u64 = 0;
    pub const MAX_FIELD_SIZE: usize = PEER_MAX_FIELD_SIZE;
    pub const WRITE_TIMEOUT: Duration = PEER_WRITE_TIMEOUT;

    // Validation limits
    pub const MIN_FIELD_SIZE: usize = 64;
    pub const MAX_FIELD_SIZE_LIMIT: usize = 1024 * 1024;
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to write config file '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Invalid peer address '{0}', expected host:port")]
    InvalidPeerAddress(String),
    #[error("Quorum must be at least 1")]
    InvalidQuorum,
    #[error("Invalid max field size {value}, must be between {min} and {max}")]
    InvalidFieldSize { value: usize, min: usize, max: usize },
}

/// Settings of a gossip node
#[derive(Clone, Debug)]
pub struct GossipConfig {
    pub bind_host: String,
    pub max_field_size: usize,
    /// Must be non zero
    pub write_timeout: Duration,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            bind_host: defaults::BIND_HOST.to_string(),
            max_field_size: defaults::MAX_FIELD_SIZE,
            write_timeout: defaults::WRITE_TIMEOUT,
        }
    }
}

impl GossipConfig {
    /// Loopback only, used by tests and short lived clients
    pub fn local() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            ..Self::default()
        }
    }
}

/// Daemon configuration, loadable from a JSON file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Peers to dial at startup, as host:port
    #[serde(default)]
    pub peers: Vec<String>,

    /// Print network statistics every N seconds, 0 disables it
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,

    /// Attestations needed before a checkpoint may finalize
    #[serde(default = "default_quorum")]
    pub quorum: usize,

    #[serde(default = "default_max_field_size")]
    pub max_field_size: usize,

    #[serde(default)]
    pub log: LogConfig,
}

fn default_bind_host() -> String {
    defaults::BIND_HOST.to_string()
}
fn default_port() -> u16 {
    defaults::PORT
}
fn default_stats_interval_secs() -> u64 {
    defaults::STATS_INTERVAL_SECS
}
fn default_quorum() -> usize {
    defaults::QUORUM
}
fn default_max_field_size() -> usize {
    defaults::MAX_FIELD_SIZE
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            port: default_port(),
            peers: Vec::new(),
            stats_interval_secs: default_stats_interval_secs(),
            quorum: default_quorum(),
            max_field_size: default_max_field_size(),
            log: LogConfig {
                filename_log: "pouw-daemon.log".to_string(),
                ..Default::default()
            },
        }
    }
}

impl NodeConfig {
    /// Load and validate a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let display = path.as_ref().display().to_string();
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;

        let config: NodeConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: display.clone(),
                source,
            })?;

        config.validate()?;
        if log::log_enabled!(log::Level::Info) {
            info!(
                "Configuration loaded from {} ({} peers)",
                display,
                config.peers.len()
            );
        }

        Ok(config)
    }

    /// Write the default configuration as a template
    pub fn generate_template<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let display = path.as_ref().display().to_string();
        let mut template = Self::default();
        template.peers.push("127.0.0.1:7000".to_string());

        let content = serde_json::to_string_pretty(&template).map_err(|source| {
            ConfigError::Parse {
                path: display.clone(),
                source,
            }
        })?;

        fs::write(&path, content).map_err(|source| ConfigError::Write {
            path: display,
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quorum == 0 {
            return Err(ConfigError::InvalidQuorum);
        }

        if self.max_field_size < defaults::MIN_FIELD_SIZE
            || self.max_field_size > defaults::MAX_FIELD_SIZE_LIMIT
        {
            return Err(ConfigError::InvalidFieldSize {
                value: self.max_field_size,
                min: defaults::MIN_FIELD_SIZE,
                max: defaults::MAX_FIELD_SIZE_LIMIT,
            });
        }

        for peer in &self.peers {
            parse_peer_address(peer)?;
        }

        if self.max_field_size < PEER_MAX_FIELD_SIZE {
            warn!(
                "max field size {} is below the default {}, larger proofs from peers will be refused",
                self.max_field_size, PEER_MAX_FIELD_SIZE
            );
        }

        Ok(())
    }

    pub fn gossip_config(&self) -> GossipConfig {
        GossipConfig {
            bind_host: self.bind_host.clone(),
            max_field_size: self.max_field_size,
            ..GossipConfig::default()
        }
    }
}

/// Split `host:port`, the port must be non zero
pub fn parse_peer_address(value: &str) -> Result<(String, u16), ConfigError> {
    let invalid = || ConfigError::InvalidPeerAddress(value.to_string());
    let (host, port) = value.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() {
        return Err(invalid());
    }

    let port: u16 = port.parse().map_err(|_| invalid())?;
    if port == 0 {
        return Err(invalid());
    }

    Ok((host.to_string(), port))
}
