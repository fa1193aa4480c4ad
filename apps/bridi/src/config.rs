//! # Configuration
//!
//! `bridi.toml`, parsed with `toml`. Every key has a default and command
//! line flags override file values.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//!
//! [storage]
//! database = "bridi.db"
//! backend = "redb"        # or "memory"
//!
//! [query]
//! debounce_ms = 50
//!
//! [access]
//! genesis_owner = "genesis"
//! ```
//!
//! The HTTP layer is configured through the environment instead
//! (`BRIDI_API_KEY`, `BRIDI_RATE_LIMIT`, `BRIDI_CORS_ORIGINS`).

use bridi_core::{
    GraphError, SemanticGraph, UserId,
    primitives::{DEFAULT_DEBOUNCE_MS, GENESIS_OWNER},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Read from the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "bridi.toml";

const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// BACKEND
// =============================================================================

/// Where entity documents live.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Seeded in-memory graph, discarded on exit.
    Memory,
    /// redb database file.
    #[default]
    Redb,
}

impl Backend {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::Redb => "redb",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// SECTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub database: PathBuf,
    pub backend: Backend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("bridi.db"),
            backend: Backend::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    /// Quiet period before a live query re-evaluates.
    pub debounce_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessConfig {
    /// Owner of the seed data. Its documents are readable by everyone.
    pub genesis_owner: String,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            genesis_owner: GENESIS_OWNER.to_string(),
        }
    }
}

// =============================================================================
// APP CONFIG
// =============================================================================

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub query: QueryConfig,
    pub access: AccessConfig,
}

/// Values given on the command line. `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub backend: Option<Backend>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl AppConfig {
    pub fn from_toml(text: &str) -> Result<Self, GraphError> {
        toml::from_str(text)
            .map_err(|e| GraphError::SerializationError(format!("Invalid configuration: {}", e)))
    }

    /// Load the configuration.
    ///
    /// An explicit path must exist. Without one, `bridi.toml` in the
    /// working directory is read if present and defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, GraphError> {
        match path {
            Some(path) => Self::read(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::read(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn read(path: &Path) -> Result<Self, GraphError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            GraphError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(GraphError::SerializationError(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            GraphError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(database) = &overrides.database {
            self.storage.database = database.clone();
        }
        if let Some(backend) = overrides.backend {
            self.storage.backend = backend;
        }
        if let Some(host) = &overrides.host {
            self.server.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        self
    }

    #[must_use]
    pub fn genesis_owner(&self) -> UserId {
        UserId::new(self.access.genesis_owner.as_str())
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.query.debounce_ms)
    }

    /// `host:port` to bind the HTTP server to.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Open the configured graph. The memory backend starts from the seed
    /// set on every run.
    pub fn open_graph(&self) -> Result<SemanticGraph, GraphError> {
        match self.storage.backend {
            Backend::Memory => SemanticGraph::seeded_for(self.genesis_owner()),
            Backend::Redb => SemanticGraph::open(&self.storage.database, self.genesis_owner()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
