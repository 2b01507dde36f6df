//! Guild and membership records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Address, GuildId};

/// Fields a caller supplies when creating a guild.
///
/// Identity, counter and creation time are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGuild {
    pub name: String,
    pub description: String,
    pub master_address: Address,
    /// Maximum number of non-default members.
    pub capacity: u32,
}

/// A stored guild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guild {
    pub id: GuildId,
    pub name: String,
    pub description: String,
    pub master_address: Address,
    pub capacity: u32,
    /// Number of non-default members. Maintained transactionally by the
    /// member store, never written directly.
    pub member_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Guild {
    pub fn from_new(id: GuildId, new: NewGuild, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: new.name,
            description: new.description,
            master_address: new.master_address,
            capacity: new.capacity,
            member_count: 0,
            created_at,
        }
    }

    pub fn is_full(&self) -> bool {
        self.member_count >= self.capacity
    }
}

/// Membership of one address in one guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildMember {
    pub injective_address: Address,
    pub guild_id: GuildId,
    /// Default members are exempt from capacity accounting.
    pub is_default_guild_member: bool,
    pub since: DateTime<Utc>,
}

/// Optional filters for member listing. All unset means every member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberFilter {
    pub guild_id: Option<GuildId>,
    pub is_default_member: Option<bool>,
    pub injective_address: Option<Address>,
}

impl MemberFilter {
    pub fn in_guild(guild_id: GuildId) -> Self {
        Self {
            guild_id: Some(guild_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, member: &GuildMember) -> bool {
        self.guild_id.map_or(true, |id| member.guild_id == id)
            && self
                .is_default_member
                .map_or(true, |flag| member.is_default_guild_member == flag)
            && self
                .injective_address
                .as_ref()
                .map_or(true, |address| &member.injective_address == address)
    }
}
