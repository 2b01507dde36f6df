//! GuildStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::model::{Guild, GuildId, NewGuild};

/// Interface for guild records.
///
/// Guild ids arrive as caller-supplied strings; every operation that takes
/// one rejects malformed input with `StorageError::InvalidGuildId` before
/// touching the database.
#[async_trait]
pub trait GuildStore: Send + Sync {
    /// Insert a guild with an empty member counter and return its identity.
    async fn add_guild(&self, guild: NewGuild) -> Result<GuildId>;

    /// Fetch one guild, or `StorageError::NotFound`.
    async fn get_single_guild(&self, guild_id: &str) -> Result<Guild>;

    /// Every guild, unfiltered and unpaginated.
    ///
    /// Guild cardinality is expected to stay small; this is a scaling limit,
    /// not a correctness issue.
    async fn list_all_guilds(&self) -> Result<Vec<Guild>>;

    /// Delete a guild together with its members, account snapshots and guild
    /// snapshots in one transaction.
    ///
    /// Deleting an unknown guild is `StorageError::NotFound` and removes
    /// nothing.
    async fn delete_guild(&self, guild_id: &str) -> Result<()>;
}
