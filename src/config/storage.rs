//! Storage configuration types.

use serde::Deserialize;

use crate::storage::RemovalPolicy;

/// Storage type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Sqlite,
    Mongodb,
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// MongoDB-specific configuration.
    pub mongodb: MongodbConfig,
    /// SQLite-specific configuration.
    pub sqlite: SqliteConfig,
    /// Whether removing a member purges or retains their account snapshots.
    pub removal_policy: RemovalPolicy,
}

/// MongoDB-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MongodbConfig {
    /// MongoDB connection URI. Transactions require a replica set.
    pub uri: String,
    /// Database name.
    pub database: String,
}

impl Default for MongodbConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "guilds".to_string(),
        }
    }
}

/// SQLite-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Path to database file, or `:memory:`.
    pub path: String,
    /// Pool size. In-memory databases always use one connection.
    pub max_connections: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "./data/guilds.db".to_string(),
            max_connections: 5,
        }
    }
}
