//! Storage interfaces and implementations.
//!
//! Each concern gets its own trait: `GuildStore`, `MemberStore`,
//! `PortfolioStore` and `DenomStore`. Backends implement all four on one type
//! and expose it through the `GuildsDatabase` supertrait, which adds the
//! index and lifecycle operations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

use crate::config::{StorageConfig, StorageType};
use crate::model::{Address, GuildId};

mod denom_store;
mod guild_store;
pub mod helpers;
mod member_store;
pub mod mock;
mod portfolio_store;

#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mongodb")]
pub mod mongodb;

pub use denom_store::DenomStore;
pub use guild_store::GuildStore;
pub use member_store::MemberStore;
pub use mock::MockStorage;
pub use portfolio_store::PortfolioStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

#[cfg(feature = "mongodb")]
pub use mongodb::MongoStorage;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Not found: {entity} {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Member exceeds capacity: guild={guild_id}, capacity={capacity}")]
    MemberExceedsCapacity { guild_id: GuildId, capacity: u32 },

    #[error("Already member: {address}")]
    AlreadyMember { address: Address },

    #[error("Deletion count mismatch: expected {expected}, deleted {actual}")]
    DeletionCountMismatch { expected: u64, actual: u64 },

    #[error("Member count out of sync with member records: guild={guild_id}")]
    MemberCountDrift { guild_id: GuildId },

    #[error("Invalid guild id {input:?}: {source}")]
    InvalidGuildId {
        input: String,
        #[source]
        source: uuid::Error,
    },

    #[error("Invalid injective address: {0:?}")]
    InvalidAddress(String),

    #[error("Malformed stored record: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection not established within {0:?}")]
    ConnectTimeout(Duration),

    #[error("Unsupported storage backend: {0}")]
    UnsupportedBackend(String),

    #[error("Mock storage error: {0}")]
    Mock(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "mongodb")]
    #[error("MongoDB error: {0}")]
    Mongo(#[from] ::mongodb::error::Error),

    #[cfg(feature = "mongodb")]
    #[error("BSON serialization error: {0}")]
    BsonSerialize(#[from] ::mongodb::bson::ser::Error),

    #[cfg(feature = "mongodb")]
    #[error("BSON deserialization error: {0}")]
    BsonDeserialize(#[from] ::mongodb::bson::de::Error),

    #[cfg(feature = "mongodb")]
    #[error("BSON field error: {0}")]
    BsonField(#[from] ::mongodb::bson::document::ValueAccessError),
}

impl StorageError {
    pub fn guild_not_found(guild_id: &GuildId) -> Self {
        Self::NotFound {
            entity: "guild",
            key: guild_id.to_string(),
        }
    }

    /// True for failures a fresh attempt of the same transaction may not hit:
    /// MongoDB write conflicts and SQLite lock contention. Invariant
    /// violations are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "mongodb")]
            Self::Mongo(e) => e.contains_label(::mongodb::error::TRANSIENT_TRANSACTION_ERROR),
            #[cfg(feature = "sqlite")]
            Self::Database(e) => sqlite::is_lock_contention(e),
            _ => false,
        }
    }
}

/// What happens to a departed member's account snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    /// Delete the member's snapshots for that guild in the removal transaction.
    #[default]
    Purge,
    /// Keep snapshot history after the member leaves.
    Retain,
}

/// Complete guild persistence interface.
///
/// Implementations:
/// - `MongoStorage`: MongoDB storage
/// - `SqliteStorage`: SQLite storage
/// - `MockStorage`: In-memory mock for testing
#[async_trait]
pub trait GuildsDatabase: GuildStore + MemberStore + PortfolioStore + DenomStore {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Declare uniqueness and lookup indexes. Idempotent.
    async fn ensure_indexes(&self) -> Result<()>;

    /// Close the underlying client or pool. Call once.
    async fn disconnect(&self) -> Result<()>;
}

/// Initialize storage based on configuration.
///
/// Connects, applies the removal policy and declares indexes before handing
/// the database out.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn GuildsDatabase>> {
    let database: Arc<dyn GuildsDatabase> = match config.storage_type {
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            info!(path = %config.sqlite.path, "Storage: sqlite");
            let storage = SqliteStorage::open_path(
                &config.sqlite.path,
                config.sqlite.max_connections,
            )
            .await?;
            Arc::new(storage.with_removal_policy(config.removal_policy))
        }
        #[cfg(feature = "mongodb")]
        StorageType::Mongodb => {
            info!(database = %config.mongodb.database, "Storage: mongodb");
            let storage =
                MongoStorage::connect(&config.mongodb.uri, &config.mongodb.database).await?;
            Arc::new(storage.with_removal_policy(config.removal_policy))
        }
        #[allow(unreachable_patterns)]
        ref other => {
            error!(backend = ?other, "Storage backend requested but its feature is not enabled");
            return Err(StorageError::UnsupportedBackend(format!("{:?}", other)));
        }
    };

    database.ensure_indexes().await?;
    Ok(database)
}
