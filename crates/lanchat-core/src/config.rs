//! Configuration system for lanchat.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $LANCHAT_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/lanchat/config.toml
//!   3. ~/.config/lanchat/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Well-known hub port.
pub const DEFAULT_PORT: u16 = 6776;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LanchatConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Display name announced to other nodes.
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port the hub listens on and peers dial.
    pub port: u16,
    /// Probe 127.0.0.1 before scanning the subnet.
    pub local: bool,
    /// Probe 127.0.0.1 only. Useful for several nodes on one machine.
    pub loopback_only: bool,
    /// Skip discovery and become the hub unconditionally.
    pub force_host: bool,
    /// Concurrent connection probes during a subnet scan.
    pub scan_workers: usize,
    /// Per-candidate connect timeout, in milliseconds.
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Seconds between liveness pings.
    pub ping_interval_secs: u64,
    /// Upper bound (exclusive) of the randomized restart backoff, in milliseconds.
    pub backoff_ceiling_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            username: "noone".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            local: false,
            loopback_only: false,
            force_host: false,
            scan_workers: 10,
            probe_timeout_ms: 100,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 3,
            backoff_ceiling_ms: 8000,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("lanchat")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

fn flag(v: &str) -> bool {
    v == "true" || v == "1"
}

impl LanchatConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            LanchatConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("LANCHAT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&LanchatConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply LANCHAT_* overrides, reading each key through `lookup`.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("LANCHAT_IDENTITY__USERNAME") {
            if !v.is_empty() {
                self.identity.username = v;
            }
        }
        if let Some(v) = lookup("LANCHAT_NETWORK__PORT") {
            if let Ok(p) = v.parse() {
                self.network.port = p;
            }
        }
        if let Some(v) = lookup("LANCHAT_NETWORK__LOCAL") {
            self.network.local = flag(&v);
        }
        if let Some(v) = lookup("LANCHAT_NETWORK__LOOPBACK_ONLY") {
            self.network.loopback_only = flag(&v);
        }
        if let Some(v) = lookup("LANCHAT_NETWORK__FORCE_HOST") {
            self.network.force_host = flag(&v);
        }
    }
}
