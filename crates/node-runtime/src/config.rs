//! # Node Configuration
//!
//! Unified configuration for the tracker, its peers and the runtime.
//!
//! ## Sources
//!
//! 1. Built-in defaults
//! 2. A TOML file (path from the first argument or `FD_CONFIG`)
//! 3. Environment overrides:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `FD_FRAGMENT_SIZE` | `tracker.fragment_size` |
//! | `FD_TIMEOUT_MS` | `tracker.timeout_ms` and `peer.timeout_ms` |
//! | `FD_DESIRED_REPLICAS` | `tracker.desired_replicas` |
//! | `FD_PEERS` | `peer.count` |
//!
//! ## Example
//!
//! ```toml
//! [tracker]
//! fragment_size = 65536
//! desired_replicas = 2
//!
//! [peer]
//! count = 4
//! catalog_dir = "./catalogs"
//!
//! [demo]
//! file_size = 500000
//! ```

use fd_03_tracker::{TrackerConfig, TrackerConfigError};
use fd_04_peer::{PeerConfig, PeerConfigError};
use serde::Deserialize;
use shared_bus::{SeenEventCache, DEFAULT_CHANNEL_CAPACITY};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "FD_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum NodeConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Tracker: {0}")]
    Tracker(#[from] TrackerConfigError),

    #[error("Peer: {0}")]
    Peer(#[from] PeerConfigError),

    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub tracker: TrackerConfig,
    pub peer: PeerSection,
    pub bus: BusConfig,
    pub dedup: DedupConfig,
    pub demo: DemoConfig,
}

/// Peers hosted by this node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PeerSection {
    /// Number of peers to start.
    pub count: usize,
    /// Timeout of every waiting phase, in milliseconds.
    pub timeout_ms: u64,
    /// Base URI peers serve fragments under; each peer appends its id.
    pub endpoint_base: String,
    /// Directory of JSON catalogs, one per peer. In-memory when unset.
    pub catalog_dir: Option<PathBuf>,
}

impl Default for PeerSection {
    fn default() -> Self {
        Self {
            count: 3,
            timeout_ms: PeerConfig::default().timeout_ms,
            endpoint_base: "fd://nodes".to_string(),
            catalog_dir: None,
        }
    }
}

impl PeerSection {
    #[must_use]
    pub fn service_config(&self) -> PeerConfig {
        PeerConfig::default().with_timeout_ms(self.timeout_ms)
    }

    /// Client id of the peer at `index`.
    #[must_use]
    pub fn peer_id(index: usize) -> String {
        format!("peer-{}", index + 1)
    }

    /// Fetch endpoint advertised by `peer_id`.
    #[must_use]
    pub fn endpoint_for(&self, peer_id: &str) -> String {
        format!("{}/{peer_id}/", self.endpoint_base.trim_end_matches('/'))
    }
}

/// In-memory event bus.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Messages buffered per subscriber before it lags.
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Duplicate suppression applied by every node's dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub retention_secs: u64,
    pub capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention_secs: SeenEventCache::DEFAULT_RETENTION.as_secs(),
            capacity: SeenEventCache::DEFAULT_CAPACITY,
        }
    }
}

impl DedupConfig {
    #[must_use]
    pub fn seen_cache(&self) -> SeenEventCache {
        SeenEventCache::with_config(Duration::from_secs(self.retention_secs), self.capacity)
    }
}

/// Demo file replicated once the network is up.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub enabled: bool,
    /// Size of the generated file in bytes.
    pub file_size: usize,
    /// Seed of the generated content.
    pub seed: u64,
    /// Shut down after the demo instead of waiting for a signal.
    pub exit_when_done: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file_size: 200_000,
            seed: 7,
            exit_when_done: true,
        }
    }
}

impl NodeConfig {
    /// Parse a TOML document. Missing sections and keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns the TOML error if the document is malformed.
    pub fn from_toml_str(document: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(document)
    }

    /// Load from `path`, or defaults when no path is given.
    ///
    /// # Errors
    ///
    /// Returns `Read` or `Parse` if the file cannot be used.
    pub fn load(path: Option<&Path>) -> Result<Self, NodeConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let document = std::fs::read_to_string(path).map_err(|source| NodeConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&document).map_err(|source| NodeConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load, apply environment overrides from `lookup`, then validate.
    ///
    /// # Errors
    ///
    /// Returns the first loading, override or validation error.
    pub fn resolve<F>(path: Option<&Path>, lookup: F) -> Result<Self, NodeConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::load(path)?;
        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FD_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEnv` for a value that does not parse.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), NodeConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(size) = parse_env(&lookup, "FD_FRAGMENT_SIZE")? {
            self.tracker.fragment_size = size;
        }
        if let Some(timeout_ms) = parse_env(&lookup, "FD_TIMEOUT_MS")? {
            self.tracker.timeout_ms = timeout_ms;
            self.peer.timeout_ms = timeout_ms;
        }
        if let Some(replicas) = parse_env(&lookup, "FD_DESIRED_REPLICAS")? {
            self.tracker.desired_replicas = replicas;
        }
        if let Some(count) = parse_env(&lookup, "FD_PEERS")? {
            self.peer.count = count;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the first out-of-range setting.
    pub fn validate(&self) -> Result<(), NodeConfigError> {
        self.tracker.validate()?;
        self.peer.service_config().validate()?;
        if self.peer.count == 0 {
            return Err(NodeConfigError::Zero("peer.count"));
        }
        if self.bus.capacity == 0 {
            return Err(NodeConfigError::Zero("bus.capacity"));
        }
        if self.dedup.capacity == 0 {
            return Err(NodeConfigError::Zero("dedup.capacity"));
        }
        if self.demo.enabled && self.demo.file_size == 0 {
            return Err(NodeConfigError::Zero("demo.file_size"));
        }
        Ok(())
    }
}

fn parse_env<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, NodeConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| NodeConfigError::InvalidEnv { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tracker.fragment_size, 80_000);
        assert_eq!(config.peer.count, 3);
        assert_eq!(config.dedup.retention_secs, 600);
        assert_eq!(config.dedup.capacity, 100_000);
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = NodeConfig::from_toml_str(
            r#"
            [tracker]
            fragment_size = 1024

            [peer]
            count = 5
            catalog_dir = "/var/lib/fd"

            [demo]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.tracker.fragment_size, 1024);
        assert_eq!(config.tracker.timeout_ms, 5_000);
        assert_eq!(config.peer.count, 5);
        assert_eq!(config.peer.catalog_dir, Some(PathBuf::from("/var/lib/fd")));
        assert!(!config.demo.enabled);
        assert_eq!(config.bus, BusConfig::default());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = NodeConfig::default();
        config
            .apply_env_overrides(env(&[
                ("FD_FRAGMENT_SIZE", "4096"),
                ("FD_TIMEOUT_MS", " 250 "),
                ("FD_DESIRED_REPLICAS", "2"),
                ("FD_PEERS", "6"),
            ]))
            .unwrap();

        assert_eq!(config.tracker.fragment_size, 4096);
        assert_eq!(config.tracker.timeout_ms, 250);
        assert_eq!(config.peer.timeout_ms, 250);
        assert_eq!(config.tracker.desired_replicas, 2);
        assert_eq!(config.peer.count, 6);
    }

    #[test]
    fn test_unparsable_env_rejected() {
        let mut config = NodeConfig::default();
        let result = config.apply_env_overrides(env(&[("FD_PEERS", "many")]));
        assert!(matches!(
            result,
            Err(NodeConfigError::InvalidEnv { var: "FD_PEERS", .. })
        ));
    }

    #[test]
    fn test_validation_catches_bad_sections() {
        let mut config = NodeConfig::default();
        config.tracker.fragment_size = 0;
        assert!(matches!(config.validate(), Err(NodeConfigError::Tracker(_))));

        let mut config = NodeConfig::default();
        config.peer.timeout_ms = 0;
        assert!(matches!(config.validate(), Err(NodeConfigError::Peer(_))));

        let mut config = NodeConfig::default();
        config.peer.count = 0;
        assert!(matches!(config.validate(), Err(NodeConfigError::Zero("peer.count"))));
    }

    #[test]
    fn test_resolve_reads_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "[peer]\ncount = 2\n").unwrap();

        let config =
            NodeConfig::resolve(Some(&path), env(&[("FD_DESIRED_REPLICAS", "2")])).unwrap();
        assert_eq!(config.peer.count, 2);
        assert_eq!(config.tracker.desired_replicas, 2);

        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            NodeConfig::resolve(Some(&missing), env(&[])),
            Err(NodeConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_endpoint_for_joins_base_and_id() {
        let section = PeerSection {
            endpoint_base: "http://host:8080/".to_string(),
            ..PeerSection::default()
        };
        assert_eq!(section.endpoint_for("peer-1"), "http://host:8080/peer-1/");
        assert_eq!(PeerSection::peer_id(0), "peer-1");
    }
}
