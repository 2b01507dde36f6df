//! Mock storage implementation for testing.
//!
//! All state sits behind one `RwLock`. Every mutation holds the write lock
//! for its whole body and validates before it writes, so each call is atomic
//! and calls are serialized.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::helpers::{now_millis, select_window};
use super::{
    DenomStore, GuildStore, GuildsDatabase, MemberStore, PortfolioStore, RemovalPolicy, Result,
    StorageError,
};
use crate::model::{
    AccountPortfolio, AccountPortfoliosFilter, Address, Denom, Guild, GuildId, GuildMember,
    GuildPortfolio, GuildPortfoliosFilter, MemberFilter, NewGuild,
};

#[derive(Default)]
struct MockState {
    guilds: HashMap<GuildId, Guild>,
    members: HashMap<Address, GuildMember>,
    account_portfolios: Vec<AccountPortfolio>,
    guild_portfolios: Vec<GuildPortfolio>,
    denoms: BTreeMap<String, Denom>,
}

impl MockState {
    fn guild(&self, guild_id: &GuildId) -> Result<&Guild> {
        self.guilds
            .get(guild_id)
            .ok_or_else(|| StorageError::guild_not_found(guild_id))
    }

    fn guild_mut(&mut self, guild_id: &GuildId) -> Result<&mut Guild> {
        self.guilds
            .get_mut(guild_id)
            .ok_or_else(|| StorageError::guild_not_found(guild_id))
    }

    fn counted_members(&self, guild_id: &GuildId) -> u32 {
        self.members
            .values()
            .filter(|m| m.guild_id == *guild_id && !m.is_default_guild_member)
            .count() as u32
    }
}

/// Mock guild database that stores records in memory.
#[derive(Default)]
pub struct MockStorage {
    state: RwLock<MockState>,
    removal_policy: RemovalPolicy,
    fail_on_write: RwLock<bool>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }

    /// Make every mutating call fail with a storage error, to exercise
    /// callers' error paths.
    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    /// Overwrite a guild's counter without touching members, to simulate
    /// drift.
    pub async fn set_member_count(&self, guild_id: &GuildId, member_count: u32) -> Result<()> {
        let mut state = self.state.write().await;
        state.guild_mut(guild_id)?.member_count = member_count;
        Ok(())
    }

    async fn check_writable(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StorageError::Mock("write rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl GuildStore for MockStorage {
    async fn add_guild(&self, guild: NewGuild) -> Result<GuildId> {
        self.check_writable().await?;
        let id = GuildId::new();
        let guild = Guild::from_new(id, guild, now_millis());
        self.state.write().await.guilds.insert(id, guild);
        Ok(id)
    }

    async fn get_single_guild(&self, guild_id: &str) -> Result<Guild> {
        let guild_id = GuildId::parse(guild_id)?;
        let state = self.state.read().await;
        state.guild(&guild_id).cloned()
    }

    async fn list_all_guilds(&self) -> Result<Vec<Guild>> {
        let state = self.state.read().await;
        let mut guilds: Vec<Guild> = state.guilds.values().cloned().collect();
        guilds.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(guilds)
    }

    async fn delete_guild(&self, guild_id: &str) -> Result<()> {
        let guild_id = GuildId::parse(guild_id)?;
        self.check_writable().await?;

        let mut state = self.state.write().await;
        if state.guilds.remove(&guild_id).is_none() {
            return Err(StorageError::guild_not_found(&guild_id));
        }
        state.members.retain(|_, m| m.guild_id != guild_id);
        state.account_portfolios.retain(|p| p.guild_id != guild_id);
        state.guild_portfolios.retain(|p| p.guild_id != guild_id);
        Ok(())
    }
}

#[async_trait]
impl MemberStore for MockStorage {
    async fn add_member(
        &self,
        guild_id: &str,
        address: &Address,
        is_default_member: bool,
    ) -> Result<()> {
        let guild_id = GuildId::parse(guild_id)?;
        self.check_writable().await?;

        let mut state = self.state.write().await;
        let guild = state.guild(&guild_id)?;
        if !is_default_member && guild.is_full() {
            debug!(%guild_id, capacity = guild.capacity, "Guild is full");
            return Err(StorageError::MemberExceedsCapacity {
                guild_id,
                capacity: guild.capacity,
            });
        }
        if state.members.contains_key(address) {
            return Err(StorageError::AlreadyMember {
                address: address.clone(),
            });
        }

        if !is_default_member {
            state.guild_mut(&guild_id)?.member_count += 1;
        }
        state.members.insert(
            address.clone(),
            GuildMember {
                injective_address: address.clone(),
                guild_id,
                is_default_guild_member: is_default_member,
                since: now_millis(),
            },
        );
        Ok(())
    }

    async fn remove_member(&self, guild_id: &str, address: &Address) -> Result<()> {
        let guild_id = GuildId::parse(guild_id)?;
        self.check_writable().await?;

        let mut state = self.state.write().await;
        let is_default = match state.members.get(address) {
            Some(m) if m.guild_id == guild_id => m.is_default_guild_member,
            _ => {
                return Err(StorageError::DeletionCountMismatch {
                    expected: 1,
                    actual: 0,
                })
            }
        };

        if !is_default {
            let guild = state.guild_mut(&guild_id)?;
            if guild.member_count == 0 {
                return Err(StorageError::MemberCountDrift { guild_id });
            }
            guild.member_count -= 1;
        }
        state.members.remove(address);

        if self.removal_policy == RemovalPolicy::Purge {
            state
                .account_portfolios
                .retain(|p| !(p.guild_id == guild_id && p.injective_address == *address));
        }
        Ok(())
    }

    async fn list_guild_members(&self, filter: &MemberFilter) -> Result<Vec<GuildMember>> {
        let state = self.state.read().await;
        let mut members: Vec<GuildMember> = state
            .members
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        members.sort_by(|a, b| a.injective_address.cmp(&b.injective_address));
        Ok(members)
    }

    async fn reconcile_member_count(&self, guild_id: &str) -> Result<u32> {
        let guild_id = GuildId::parse(guild_id)?;
        self.check_writable().await?;

        let mut state = self.state.write().await;
        let actual = state.counted_members(&guild_id);
        let guild = state.guild_mut(&guild_id)?;
        if guild.member_count != actual {
            warn!(%guild_id, stored = guild.member_count, actual, "Repaired member count drift");
            guild.member_count = actual;
        }
        Ok(actual)
    }
}

#[async_trait]
impl PortfolioStore for MockStorage {
    async fn add_account_portfolios(&self, portfolios: Vec<AccountPortfolio>) -> Result<()> {
        if portfolios.is_empty() {
            return Ok(());
        }
        self.check_writable().await?;
        self.state
            .write()
            .await
            .account_portfolios
            .extend(portfolios);
        Ok(())
    }

    async fn add_guild_portfolios(&self, portfolios: Vec<GuildPortfolio>) -> Result<()> {
        if portfolios.is_empty() {
            return Ok(());
        }
        self.check_writable().await?;
        self.state.write().await.guild_portfolios.extend(portfolios);
        Ok(())
    }

    async fn get_account_portfolio(&self, address: &Address) -> Result<AccountPortfolio> {
        let state = self.state.read().await;
        state
            .account_portfolios
            .iter()
            .filter(|p| p.injective_address == *address)
            .max_by_key(|p| p.updated_at)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                entity: "account portfolio",
                key: address.to_string(),
            })
    }

    async fn get_guild_portfolio(&self, guild_id: &str) -> Result<GuildPortfolio> {
        let guild_id = GuildId::parse(guild_id)?;
        let state = self.state.read().await;
        state
            .guild_portfolios
            .iter()
            .filter(|p| p.guild_id == guild_id)
            .max_by_key(|p| p.updated_at)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                entity: "guild portfolio",
                key: guild_id.to_string(),
            })
    }

    async fn list_account_portfolios(
        &self,
        filter: &AccountPortfoliosFilter,
    ) -> Result<Vec<AccountPortfolio>> {
        let state = self.state.read().await;
        let matching = state
            .account_portfolios
            .iter()
            .filter(|p| p.injective_address == filter.injective_address)
            .cloned();
        Ok(select_window(matching, &filter.window(), |p| p.updated_at))
    }

    async fn list_guild_portfolios(
        &self,
        filter: &GuildPortfoliosFilter,
    ) -> Result<Vec<GuildPortfolio>> {
        let guild_id = GuildId::parse(&filter.guild_id)?;
        let state = self.state.read().await;
        let matching = state
            .guild_portfolios
            .iter()
            .filter(|p| p.guild_id == guild_id)
            .cloned();
        Ok(select_window(matching, &filter.window(), |p| p.updated_at))
    }
}

#[async_trait]
impl DenomStore for MockStorage {
    async fn upsert_denoms(&self, denoms: Vec<Denom>) -> Result<()> {
        self.check_writable().await?;
        let mut state = self.state.write().await;
        for denom in denoms {
            state.denoms.insert(denom.denom.clone(), denom);
        }
        Ok(())
    }

    async fn get_denom(&self, denom: &str) -> Result<Denom> {
        let state = self.state.read().await;
        state
            .denoms
            .get(denom)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                entity: "denom",
                key: denom.to_string(),
            })
    }

    async fn list_denoms(&self) -> Result<Vec<Denom>> {
        Ok(self.state.read().await.denoms.values().cloned().collect())
    }
}

#[async_trait]
impl GuildsDatabase for MockStorage {
    fn backend(&self) -> &'static str {
        "mock"
    }

    async fn ensure_indexes(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}
