//! Configuration for tidemark.

use serde::{Deserialize, Serialize};

#[cfg(feature = "config")]
use crate::error::{CoreError, CoreResult};
use crate::ident::Ident;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TidemarkConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Schema migration behaviour.
    #[serde(default)]
    pub migration: MigrationConfig,
}

#[cfg(feature = "config")]
impl TidemarkConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `tidemark.toml` in the current directory (if present)
    /// 3. Environment variables with `TIDEMARK_` prefix
    pub fn load() -> CoreResult<Self> {
        Self::from_file("tidemark.toml")
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> CoreResult<Self> {
        use figment::providers::{Env, Format, Toml};
        use figment::Figment;

        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("TIDEMARK_").split("__"))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Schema set as `search_path` on every pooled connection.
    #[serde(default)]
    pub schema: Option<Ident>,
}

fn default_database_url() -> String {
    "postgres://localhost/tidemark".to_owned()
}

const fn default_max_connections() -> u32 {
    5
}

const fn default_min_connections() -> u32 {
    0
}

const fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            schema: None,
        }
    }
}

/// How an existing table is converted when a partitioned field is added to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStrategy {
    /// Convert the table where it is, moving existing rows into chunks.
    #[default]
    InPlace,

    /// Copy rows into a freshly created hypertable and swap it in.
    ///
    /// Not supported; requesting it fails the migration.
    FreshTable,
}

impl MigrationStrategy {
    /// Get the strategy name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InPlace => "in_place",
            Self::FreshTable => "fresh_table",
        }
    }
}

impl std::fmt::Display for MigrationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema migration behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct MigrationConfig {
    /// Strategy for converting tables that already hold rows.
    #[serde(default)]
    pub strategy: MigrationStrategy,

    /// Issue `CREATE EXTENSION IF NOT EXISTS timescaledb` before migrating.
    #[serde(default = "default_prepare_extension")]
    pub prepare_extension: bool,
}

const fn default_prepare_extension() -> bool {
    true
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            strategy: MigrationStrategy::default(),
            prepare_extension: default_prepare_extension(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TidemarkConfig::default();
        assert_eq!(config.database.url, "postgres://localhost/tidemark");
        assert_eq!(config.database.max_connections, 5);
        assert!(config.database.schema.is_none());
        assert_eq!(config.migration.strategy, MigrationStrategy::InPlace);
        assert!(config.migration.prepare_extension);
    }

    #[test]
    fn config_from_toml() {
        let toml = r#"
            [database]
            url = "postgres://user:pass@db:5432/metrics"
            max_connections = 20
            schema = "telemetry"

            [migration]
            strategy = "fresh_table"
            prepare_extension = false
        "#;

        let config: TidemarkConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.database.url, "postgres://user:pass@db:5432/metrics");
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.database.min_connections, 0);
        assert_eq!(
            config.database.schema.as_ref().map(Ident::as_str),
            Some("telemetry")
        );
        assert_eq!(config.migration.strategy, MigrationStrategy::FreshTable);
        assert!(!config.migration.prepare_extension);
    }

    #[test]
    fn invalid_schema_name_is_rejected() {
        let toml = r#"
            [database]
            schema = "public; drop table x"
        "#;
        assert!(toml::from_str::<TidemarkConfig>(toml).is_err());
    }

    #[cfg(feature = "config")]
    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = TidemarkConfig::from_file("/nonexistent/tidemark.toml").unwrap();
        assert_eq!(config.database.connect_timeout_secs, 5);
    }
}
