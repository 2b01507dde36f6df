//! MemberStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::model::{Address, GuildMember, MemberFilter};

/// Interface for guild membership.
///
/// Membership mutations keep `Guild::member_count` equal to the number of
/// non-default member records and never above `Guild::capacity`. The counter
/// update and the member record change commit or roll back together.
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Add `address` to a guild.
    ///
    /// Non-default members consume capacity: a full guild yields
    /// `StorageError::MemberExceedsCapacity`. Default members skip capacity
    /// accounting entirely. An address already in any guild yields
    /// `StorageError::AlreadyMember` and leaves the counter untouched.
    async fn add_member(&self, guild_id: &str, address: &Address, is_default_member: bool)
        -> Result<()>;

    /// Remove `address` from a guild.
    ///
    /// Exactly one member record must match, otherwise
    /// `StorageError::DeletionCountMismatch`. Account snapshots of the departed
    /// member are handled according to the store's `RemovalPolicy`.
    async fn remove_member(&self, guild_id: &str, address: &Address) -> Result<()>;

    /// Members matching the filter. No match is an empty vector.
    async fn list_guild_members(&self, filter: &MemberFilter) -> Result<Vec<GuildMember>>;

    /// Recompute `member_count` from the non-default member records and
    /// store it. Returns the repaired count.
    async fn reconcile_member_count(&self, guild_id: &str) -> Result<u32>;
}
