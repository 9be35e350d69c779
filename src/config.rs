//! Configuration Module
//!
//! This module defines all configuration structures for the loader.
//! Configuration is loaded from TOML files and parsed using serde.

use serde::Deserialize;
use std::fs;

use crate::strategy::StrategyType;

/// Main configuration structure
///
/// Contains all configuration sections for the loader.
/// Loaded from a TOML file (e.g., config/default.toml).
///
/// # Example TOML
/// ```toml
/// [database]
/// url = "sqlite://customers.db?mode=rwc"
/// column_width = 255
/// chunk_size = 3
///
/// [pool]
/// workers = 4
///
/// [load]
/// names = ["John Woo", "Jeff Dean", "Josh Bloch", "Josh Long"]
/// partitions = 2
/// search_first_name = "Josh"
/// strategies = ["sequential", "concurrent", "async"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub load: LoadConfig,
}

/// Database configuration
///
/// Settings for the customer record store.
///
/// # Fields
/// - `url`: SQLite connection URL (e.g., "sqlite://customers.db?mode=rwc" or "sqlite::memory:")
/// - `max_connections`: Upper bound on pooled connections (forced to 1 for in-memory databases)
/// - `column_width`: Maximum length of the `first_name` / `last_name` columns
/// - `id_start`: First id handed out after the table is recreated (at least 1)
/// - `chunk_size`: Rows per transport-level insert chunk
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub column_width: usize,
    pub id_start: i64,
    pub chunk_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://customers.db?mode=rwc".to_string(),
            max_connections: 4,
            column_width: 255,
            id_start: 1001,
            chunk_size: 3,
        }
    }
}

impl DatabaseConfig {
    /// In-memory database settings, used by tests and ad-hoc runs
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            ..Self::default()
        }
    }
}

/// Worker pool configuration
///
/// # Fields
/// - `workers`: Number of pool workers (and runtime threads)
/// - `join_timeout_ms`: Optional deadline for joining all submitted tasks
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
    pub join_timeout_ms: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            join_timeout_ms: None,
        }
    }
}

/// Load run configuration
///
/// Describes the dataset, how it is split and which strategies run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Raw "First Last" names to load
    pub names: Vec<String>,
    /// Number of sub-batches for the concurrent and async strategies
    pub partitions: usize,
    /// First name looked up after every run
    pub search_first_name: String,
    /// Strategies executed in order
    pub strategies: Vec<StrategyType>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            names: ["John Woo", "Jeff Dean", "Josh Bloch", "Josh Long"]
                .iter()
                .map(|name| name.to_string())
                .collect(),
            partitions: 2,
            search_first_name: "Josh".to_string(),
            strategies: vec![
                StrategyType::Sequential,
                StrategyType::Concurrent,
                StrategyType::Async,
            ],
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields fall back to their defaults.
    ///
    /// # Arguments
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    /// * `Ok(Config)` if the file was successfully loaded, parsed and validated
    /// * `Err` if the file couldn't be read, the TOML is invalid or a value is out of range
    ///
    /// # Example
    /// ```no_run
    /// # use customer_loader::Config;
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn load(path: &str) -> anyhow::Result<Self> {
        // Read the file contents as a string
        let content = fs::read_to_string(path)?;

        // Parse the TOML into our Config structure
        let config: Config = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Reject settings the loader cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pool.workers == 0 {
            anyhow::bail!("pool.workers must be at least 1");
        }
        if self.database.chunk_size == 0 {
            anyhow::bail!("database.chunk_size must be at least 1");
        }
        if self.database.column_width == 0 {
            anyhow::bail!("database.column_width must be at least 1");
        }
        if self.database.id_start < 1 {
            anyhow::bail!("database.id_start must be at least 1");
        }
        if self.load.partitions == 0 {
            anyhow::bail!("load.partitions must be at least 1");
        }
        Ok(())
    }
}


/// Throwaway on-disk database under the system temp directory
///
/// Uses the shipped file-database settings (WAL, pooled connections). The
/// database and its WAL side files are removed on drop.
#[cfg(test)]
pub(crate) struct TempDatabase {
    path: std::path::PathBuf,
    pub(crate) config: DatabaseConfig,
}

#[cfg(test)]
impl TempDatabase {
    pub(crate) fn new(tag: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "customer_loader_{}_{}.db",
            tag,
            std::process::id()
        ));
        let temp = Self {
            config: DatabaseConfig {
                url: format!("sqlite://{}?mode=rwc", path.display()),
                ..DatabaseConfig::default()
            },
            path,
        };
        temp.remove_files();
        temp
    }

    fn remove_files(&self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = fs::remove_file(file);
        }
    }
}

#[cfg(test)]
impl Drop for TempDatabase {
    fn drop(&mut self) {
        self.remove_files();
    }
}
