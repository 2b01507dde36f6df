//! MongoDB MemberStore implementation.
//!
//! The capacity check and the counter increment are one conditional update
//! (`$expr: member_count < capacity`), so two transactions racing for the
//! last slot cannot both pass it. Uniqueness comes from the unique index on
//! `injective_address`.

use async_trait::async_trait;
use backon::Retryable;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOptions, UpdateOptions};
use mongodb::ClientSession;
use tracing::{debug, warn};

use super::{bson_datetime, finish, is_duplicate_key, member_from_document, MongoStorage};
use crate::model::{Address, GuildId, GuildMember, MemberFilter};
use crate::storage::helpers::{counter_from_i64, now_millis};
use crate::storage::{MemberStore, RemovalPolicy, Result, StorageError};
use crate::utils::retry::{is_retryable, log_retry, transaction_backoff};

impl MongoStorage {
    /// Stored counter and capacity of a guild, or `NotFound`.
    async fn load_counters(
        &self,
        session: &mut ClientSession,
        guild_id: &GuildId,
    ) -> Result<(u32, u32)> {
        let guild = self
            .guilds
            .find_one(doc! { "_id": guild_id.to_string() })
            .session(&mut *session)
            .await?
            .ok_or_else(|| StorageError::guild_not_found(guild_id))?;

        Ok((
            counter_from_i64(guild.get_i64("member_count")?, "member_count")?,
            counter_from_i64(guild.get_i64("capacity")?, "capacity")?,
        ))
    }

    async fn insert_member(
        &self,
        session: &mut ClientSession,
        guild_id: &GuildId,
        address: &Address,
        is_default_member: bool,
    ) -> Result<()> {
        let id = guild_id.to_string();

        if is_default_member {
            self.load_counters(session, guild_id).await?;
        } else {
            let reserved = self
                .guilds
                .update_one(
                    doc! {
                        "_id": &id,
                        "$expr": { "$lt": ["$member_count", "$capacity"] },
                    },
                    doc! { "$inc": { "member_count": 1_i64 } },
                )
                .session(&mut *session)
                .await?;

            if reserved.matched_count == 0 {
                let (_, capacity) = self.load_counters(session, guild_id).await?;
                debug!(%guild_id, capacity, "Guild is full");
                return Err(StorageError::MemberExceedsCapacity {
                    guild_id: *guild_id,
                    capacity,
                });
            }
        }

        let already_member = || StorageError::AlreadyMember {
            address: address.clone(),
        };

        let options = UpdateOptions::builder().upsert(true).build();
        let inserted = self
            .members
            .update_one(
                doc! { "injective_address": address.as_str() },
                doc! {
                    "$setOnInsert": {
                        "guild_id": &id,
                        "is_default_guild_member": is_default_member,
                        "since": bson_datetime(&now_millis()),
                    }
                },
            )
            .with_options(options)
            .session(&mut *session)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    already_member()
                } else {
                    StorageError::from(e)
                }
            })?;

        if inserted.upserted_id.is_none() {
            debug!(%address, "Address already belongs to a guild");
            return Err(already_member());
        }
        Ok(())
    }

    async fn delete_member(
        &self,
        session: &mut ClientSession,
        guild_id: &GuildId,
        address: &Address,
    ) -> Result<()> {
        let id = guild_id.to_string();

        let removed = self
            .members
            .find_one_and_delete(doc! { "injective_address": address.as_str(), "guild_id": &id })
            .session(&mut *session)
            .await?
            .ok_or(StorageError::DeletionCountMismatch {
                expected: 1,
                actual: 0,
            })?;

        if !removed.get_bool("is_default_guild_member")? {
            let released = self
                .guilds
                .update_one(
                    doc! { "_id": &id, "member_count": { "$gt": 0_i64 } },
                    doc! { "$inc": { "member_count": -1_i64 } },
                )
                .session(&mut *session)
                .await?;

            if released.matched_count == 0 {
                self.load_counters(session, guild_id).await?;
                return Err(StorageError::MemberCountDrift {
                    guild_id: *guild_id,
                });
            }
        }

        if self.removal_policy == RemovalPolicy::Purge {
            let purged = self
                .account_portfolios
                .delete_many(doc! { "injective_address": address.as_str(), "guild_id": &id })
                .session(&mut *session)
                .await?;
            debug!(%address, purged = purged.deleted_count, "Purged account snapshots");
        }
        Ok(())
    }

    async fn recount_members(&self, session: &mut ClientSession, guild_id: &GuildId) -> Result<u32> {
        let id = guild_id.to_string();
        let (stored, _) = self.load_counters(session, guild_id).await?;

        let counted = self
            .members
            .count_documents(doc! { "guild_id": &id, "is_default_guild_member": false })
            .session(&mut *session)
            .await?;
        let actual = u32::try_from(counted)
            .map_err(|_| StorageError::Decode(format!("member count out of range: {counted}")))?;

        if stored != actual {
            self.guilds
                .update_one(
                    doc! { "_id": &id },
                    doc! { "$set": { "member_count": i64::from(actual) } },
                )
                .session(&mut *session)
                .await?;
            warn!(%guild_id, stored, actual, "Repaired member count drift");
        }
        Ok(actual)
    }
}

fn member_query(filter: &MemberFilter) -> Document {
    let mut query = Document::new();
    if let Some(guild_id) = &filter.guild_id {
        query.insert("guild_id", guild_id.to_string());
    }
    if let Some(is_default) = filter.is_default_member {
        query.insert("is_default_guild_member", is_default);
    }
    if let Some(address) = &filter.injective_address {
        query.insert("injective_address", address.as_str());
    }
    query
}

#[async_trait]
impl MemberStore for MongoStorage {
    #[tracing::instrument(
        name = "storage.add_member",
        skip_all,
        fields(guild_id = %guild_id, address = %address, is_default_member = is_default_member)
    )]
    async fn add_member(
        &self,
        guild_id: &str,
        address: &Address,
        is_default_member: bool,
    ) -> Result<()> {
        let guild_id = GuildId::parse(guild_id)?;

        (|| async {
            let mut session = self.begin().await?;
            let result = self
                .insert_member(&mut session, &guild_id, address, is_default_member)
                .await;
            finish(&mut session, result).await
        })
        .retry(transaction_backoff())
        .when(is_retryable)
        .notify(log_retry("add_member"))
        .await
    }

    #[tracing::instrument(
        name = "storage.remove_member",
        skip_all,
        fields(guild_id = %guild_id, address = %address)
    )]
    async fn remove_member(&self, guild_id: &str, address: &Address) -> Result<()> {
        let guild_id = GuildId::parse(guild_id)?;

        (|| async {
            let mut session = self.begin().await?;
            let result = self.delete_member(&mut session, &guild_id, address).await;
            finish(&mut session, result).await
        })
        .retry(transaction_backoff())
        .when(is_retryable)
        .notify(log_retry("remove_member"))
        .await
    }

    async fn list_guild_members(&self, filter: &MemberFilter) -> Result<Vec<GuildMember>> {
        let options = FindOptions::builder()
            .sort(doc! { "injective_address": 1 })
            .build();
        let docs: Vec<_> = self
            .members
            .find(member_query(filter))
            .with_options(options)
            .await?
            .try_collect()
            .await?;
        docs.iter().map(member_from_document).collect()
    }

    #[tracing::instrument(name = "storage.reconcile_member_count", skip_all, fields(guild_id = %guild_id))]
    async fn reconcile_member_count(&self, guild_id: &str) -> Result<u32> {
        let guild_id = GuildId::parse(guild_id)?;

        (|| async {
            let mut session = self.begin().await?;
            let result = self.recount_members(&mut session, &guild_id).await;
            finish(&mut session, result).await
        })
        .retry(transaction_backoff())
        .when(is_retryable)
        .notify(log_retry("reconcile_member_count"))
        .await
    }
}
