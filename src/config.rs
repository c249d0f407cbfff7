//! Configuration types, loading, and the runtime-mutable store.
//!
//! The session core never touches disk directly: it reads and mutates
//! configuration through the [`ConfigStore`] collaborator, which is expected
//! to persist changes durably. [`FileConfig`] is the TOML-file-backed
//! implementation used by the host process.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mask::{matches_mask, normalize_mask};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The network this session connects to.
    pub network: NetworkConfig,
}

/// Network and identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Display name of the network (e.g., "ExampleNet").
    pub name: String,
    /// Hostname of the IRC server.
    pub host: String,
    /// Port to connect on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// The session's nickname.
    pub nickname: String,
    /// Realname sent during registration; defaults to the nickname.
    #[serde(default)]
    pub realname: Option<String>,
    /// User modes applied after registration, one character each.
    #[serde(default = "default_modes")]
    pub modes: String,
    /// Channels joined after registration, in order.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Hostmask patterns whose messages are dropped.
    #[serde(default)]
    pub ignores: Vec<String>,
    /// Prometheus metrics HTTP port. Absent or 0 disables the endpoint.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_port() -> u16 {
    6667
}

fn default_modes() -> String {
    "B".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Externally-persisted, runtime-mutable configuration.
///
/// Channel membership and the ignore list change while the session runs;
/// implementations persist every mutation durably. All mutations are
/// idempotent and report whether anything changed.
pub trait ConfigStore: Send + Sync {
    /// Network display name.
    fn network_name(&self) -> String;

    /// Connection target as (host, port).
    fn target(&self) -> (String, u16);

    /// Configured nickname.
    fn nickname(&self) -> String;

    /// Realname for registration.
    fn realname(&self) -> String;

    /// User mode characters applied after registration.
    fn modes(&self) -> String;

    /// Channels to join, in configured order.
    fn channels(&self) -> Vec<String>;

    /// Add a channel to the membership list. Returns whether it was added.
    fn add_channel(&self, channel: &str) -> bool;

    /// Remove a channel from the membership list. Returns whether it was
    /// present.
    fn remove_channel(&self, channel: &str) -> bool;

    /// Add an ignore mask. Returns the normalized mask if it was new.
    fn add_ignore(&self, mask: &str) -> Option<String>;

    /// Remove every ignore entry matching `mask`. Returns the removed
    /// entries (empty when nothing matched).
    fn remove_ignore(&self, mask: &str) -> Vec<String>;

    /// Whether a sender mask is filtered out.
    fn is_ignored(&self, mask: &str) -> bool;
}

/// [`ConfigStore`] backed by a TOML file.
///
/// Mutations update an in-memory snapshot under a `RwLock` and write the
/// file back. A write failure is logged; the in-memory change stands.
pub struct FileConfig {
    path: Option<PathBuf>,
    inner: RwLock<Config>,
}

impl FileConfig {
    /// Load from a TOML file, remembering the path for write-back.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<FileConfig, ConfigError> {
        let config = Config::load(&path)?;
        Ok(FileConfig {
            path: Some(path.as_ref().to_path_buf()),
            inner: RwLock::new(config),
        })
    }

    /// Wrap an in-memory configuration without persistence.
    pub fn from_config(config: Config) -> FileConfig {
        FileConfig {
            path: None,
            inner: RwLock::new(config),
        }
    }

    /// Metrics port, if the endpoint is enabled.
    pub fn metrics_port(&self) -> Option<u16> {
        self.inner.read().network.metrics_port
    }

    fn persist(&self, config: &Config) {
        let Some(path) = &self.path else {
            return;
        };
        let result = toml::to_string_pretty(config)
            .map_err(ConfigError::from)
            .and_then(|content| std::fs::write(path, content).map_err(ConfigError::from));
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "failed to persist config");
        }
    }
}

impl ConfigStore for FileConfig {
    fn network_name(&self) -> String {
        self.inner.read().network.name.clone()
    }

    fn target(&self) -> (String, u16) {
        let guard = self.inner.read();
        (guard.network.host.clone(), guard.network.port)
    }

    fn nickname(&self) -> String {
        self.inner.read().network.nickname.clone()
    }

    fn realname(&self) -> String {
        let guard = self.inner.read();
        guard
            .network
            .realname
            .clone()
            .unwrap_or_else(|| guard.network.nickname.clone())
    }

    fn modes(&self) -> String {
        self.inner.read().network.modes.clone()
    }

    fn channels(&self) -> Vec<String> {
        self.inner.read().network.channels.clone()
    }

    fn add_channel(&self, channel: &str) -> bool {
        let mut guard = self.inner.write();
        if guard.network.channels.iter().any(|c| c == channel) {
            return false;
        }
        guard.network.channels.push(channel.to_string());
        self.persist(&guard);
        true
    }

    fn remove_channel(&self, channel: &str) -> bool {
        let mut guard = self.inner.write();
        let before = guard.network.channels.len();
        guard.network.channels.retain(|c| c != channel);
        let changed = guard.network.channels.len() != before;
        if changed {
            self.persist(&guard);
        }
        changed
    }

    fn add_ignore(&self, mask: &str) -> Option<String> {
        let normalized = normalize_mask(mask);
        let mut guard = self.inner.write();
        if guard.network.ignores.iter().any(|m| m == &normalized) {
            return None;
        }
        guard.network.ignores.push(normalized.clone());
        self.persist(&guard);
        Some(normalized)
    }

    fn remove_ignore(&self, mask: &str) -> Vec<String> {
        let pattern = normalize_mask(mask);
        let mut guard = self.inner.write();
        let (removed, kept): (Vec<String>, Vec<String>) = guard
            .network
            .ignores
            .drain(..)
            .partition(|entry| matches_mask(&pattern, &normalize_mask(entry)));
        guard.network.ignores = kept;
        if !removed.is_empty() {
            self.persist(&guard);
        }
        removed
    }

    fn is_ignored(&self, mask: &str) -> bool {
        let mask = normalize_mask(mask);
        self.inner
            .read()
            .network
            .ignores
            .iter()
            .any(|entry| matches_mask(&normalize_mask(entry), &mask))
    }
}
