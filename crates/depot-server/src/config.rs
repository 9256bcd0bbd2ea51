use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use depot_protocol::{DepotCodec, Framing, MAX_MESSAGE_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub repos_root: PathBuf,
    /// Maximum number of connections handled at once.
    pub workers: usize,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// Largest accepted request. Responses, such as pulled archives, are
    /// not bounded by it.
    pub max_message_size: usize,
    pub framing: Framing,
    /// Recompute blob and tree hashes on write and reject mismatches.
    pub verify_hashes: bool,
    pub compat: CompatConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            repos_root: PathBuf::from("repositories"),
            workers: 16,
            read_timeout_ms: 30_000,
            write_timeout_ms: 30_000,
            max_message_size: MAX_MESSAGE_SIZE,
            framing: Framing::default(),
            verify_hashes: true,
            compat: CompatConfig::default(),
        }
    }
}

/// Switches that reproduce behaviour older clients depend on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatConfig {
    /// Send the acknowledgement after pull and list payloads too.
    pub trailing_ack: bool,
    /// Answer failures with an error document instead of the acknowledgement.
    pub report_errors: bool,
}

impl ServerConfig {
    /// Load a TOML config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.workers == 0 {
            return Err(ServerError::Config("workers must be at least 1".into()));
        }
        if self.read_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err(ServerError::Config("timeouts must be non-zero".into()));
        }
        if self.max_message_size == 0 {
            return Err(ServerError::Config("max_message_size must be non-zero".into()));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn codec(&self) -> DepotCodec {
        DepotCodec::new(self.framing).with_max_message_size(self.max_message_size)
    }
}
