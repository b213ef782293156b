//! Config loader using TOML and serde, with `COMMITY_*` environment overrides.
//!
//! Every field has a default so an empty file (or no file at all) yields a
//! config suitable for a local devnet.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::move_call::CLOCK_OBJECT_ID;
use crate::types::{ObjectId, TypeError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl From<TypeError> for ConfigError {
    fn from(e: TypeError) -> Self {
        ConfigError::Invalid {
            key: "package_id",
            reason: e.to_string(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// NETWORK
// ════════════════════════════════════════════════════════════════════════════════

/// Where the contract lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Published package id (hex).
    pub package_id: String,
    /// Move module holding the entry points.
    pub module: String,
    /// Shared clock object.
    pub clock_id: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            package_id: "0x0".to_string(),
            module: "commity".to_string(),
            clock_id: CLOCK_OBJECT_ID.to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn package(&self) -> Result<ObjectId, ConfigError> {
        Ok(ObjectId::parse(&self.package_id)?)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = env::var("COMMITY_PACKAGE_ID") {
            self.package_id = v;
        }
        if let Ok(v) = env::var("COMMITY_MODULE") {
            self.module = v;
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// BACKEND
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Listen address (e.g., "127.0.0.1:3001").
    pub bind_addr: String,
    /// Chain JSON-RPC endpoint.
    pub rpc_url: String,
    /// Sponsor keypair, hex. Absent ⇒ a fresh key is generated at startup.
    pub sponsor_key_hex: Option<String>,
    pub gas_budget: u64,
    pub gas_price: u64,
    /// Interval between chain event polls for the indexer.
    pub index_interval_ms: u64,
    pub network: NetworkConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".to_string(),
            rpc_url: "http://127.0.0.1:9000".to_string(),
            sponsor_key_hex: None,
            gas_budget: 50_000_000,
            gas_price: 1_000,
            index_interval_ms: 2_000,
            network: NetworkConfig::default(),
        }
    }
}

impl BackendConfig {
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = env::var("COMMITY_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Ok(v) = env::var("COMMITY_RPC_URL") {
            self.rpc_url = v;
        }
        if let Ok(v) = env::var("COMMITY_SPONSOR_KEY") {
            self.sponsor_key_hex = Some(v);
        }
        if let Ok(v) = env::var("COMMITY_GAS_BUDGET") {
            self.gas_budget = v.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                key: "gas_budget",
                reason: e.to_string(),
            })?;
        }
        if let Ok(v) = env::var("COMMITY_INDEX_INTERVAL_MS") {
            self.index_interval_ms = v.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                key: "index_interval_ms",
                reason: e.to_string(),
            })?;
        }
        self.network.apply_env();
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// CLIENT
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub backend_url: String,
    pub ws_url: String,
    pub rpc_url: String,
    /// Third-party sponsor API for zkLogin wallets.
    pub sponsor_api_url: Option<String>,
    pub sponsor_api_key: Option<String>,
    /// Messaging service base URL. Absent ⇒ chat channels are skipped.
    pub messaging_url: Option<String>,
    pub request_timeout_ms: u64,
    /// Fixed interval for REST polling once push gives up (5–10 s).
    pub poll_interval_ms: u64,
    /// File holding the persisted session (auth token, wallet bookkeeping).
    pub session_path: String,
    pub network: NetworkConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:3001".to_string(),
            ws_url: "ws://127.0.0.1:3001/ws".to_string(),
            rpc_url: "http://127.0.0.1:9000".to_string(),
            sponsor_api_url: None,
            sponsor_api_key: None,
            messaging_url: None,
            request_timeout_ms: 10_000,
            poll_interval_ms: 5_000,
            session_path: ".commity/session.json".to_string(),
            network: NetworkConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = env::var("COMMITY_BACKEND_URL") {
            self.backend_url = v;
        }
        if let Ok(v) = env::var("COMMITY_WS_URL") {
            self.ws_url = v;
        }
        if let Ok(v) = env::var("COMMITY_RPC_URL") {
            self.rpc_url = v;
        }
        if let Ok(v) = env::var("COMMITY_SPONSOR_API_URL") {
            self.sponsor_api_url = Some(v);
        }
        if let Ok(v) = env::var("COMMITY_SPONSOR_API_KEY") {
            self.sponsor_api_key = Some(v);
        }
        if let Ok(v) = env::var("COMMITY_MESSAGING_URL") {
            self.messaging_url = Some(v);
        }
        if let Ok(v) = env::var("COMMITY_SESSION_PATH") {
            self.session_path = v;
        }
        self.network.apply_env();
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(5_000..=10_000).contains(&self.poll_interval_ms) {
            return Err(ConfigError::Invalid {
                key: "poll_interval_ms",
                reason: format!("{} is outside 5000..=10000", self.poll_interval_ms),
            });
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// LOADERS
// ════════════════════════════════════════════════════════════════════════════════

/// Load backend config from a TOML file path.
/// If file is missing or parse fails, an error is returned.
pub fn load_backend_config(path: impl AsRef<Path>) -> Result<BackendConfig, ConfigError> {
    let s = fs::read_to_string(path.as_ref())?;
    Ok(toml::from_str(&s)?)
}

/// Load client config from a TOML file path and validate it.
pub fn load_client_config(path: impl AsRef<Path>) -> Result<ClientConfig, ConfigError> {
    let s = fs::read_to_string(path.as_ref())?;
    let cfg: ClientConfig = toml::from_str(&s)?;
    cfg.validate()?;
    Ok(cfg)
}
