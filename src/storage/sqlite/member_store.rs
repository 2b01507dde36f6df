//! SQLite MemberStore implementation.
//!
//! Capacity is enforced by a conditional increment
//! (`member_count < capacity`) instead of a read-then-write check, and member
//! uniqueness by the unique index on `injective_address`. Both statements run
//! in one `BEGIN IMMEDIATE` transaction, so a rejected insert also rolls back
//! the increment.

use async_trait::async_trait;
use backon::Retryable;
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection};
use tracing::{debug, warn};

use super::{finish, member_from_row, SqliteStorage};
use crate::model::{Address, GuildId, GuildMember, MemberFilter};
use crate::storage::helpers::{counter_from_i64, now_millis, to_millis};
use crate::storage::schema::{AccountPortfolios, Guilds, Members};
use crate::storage::{MemberStore, RemovalPolicy, Result, StorageError};
use crate::utils::retry::{is_retryable, log_retry, transaction_backoff};

/// Stored counter and capacity of a guild, or `NotFound`.
async fn load_counters(conn: &mut SqliteConnection, guild_id: &GuildId) -> Result<(u32, u32)> {
    let query = Query::select()
        .columns([Guilds::MemberCount, Guilds::Capacity])
        .from(Guilds::Table)
        .and_where(Expr::col(Guilds::Id).eq(guild_id.to_string()))
        .to_string(SqliteQueryBuilder);

    match sqlx::query(&query).fetch_optional(&mut *conn).await? {
        Some(row) => Ok((
            counter_from_i64(row.try_get("member_count")?, "member_count")?,
            counter_from_i64(row.try_get("capacity")?, "capacity")?,
        )),
        None => Err(StorageError::guild_not_found(guild_id)),
    }
}

impl SqliteStorage {
    async fn insert_member(
        conn: &mut SqliteConnection,
        guild_id: &GuildId,
        address: &Address,
        is_default_member: bool,
    ) -> Result<()> {
        if is_default_member {
            load_counters(conn, guild_id).await?;
        } else {
            let query = Query::update()
                .table(Guilds::Table)
                .value(Guilds::MemberCount, Expr::col(Guilds::MemberCount).add(1))
                .and_where(Expr::col(Guilds::Id).eq(guild_id.to_string()))
                .and_where(Expr::col(Guilds::MemberCount).lt(Expr::col(Guilds::Capacity)))
                .to_string(SqliteQueryBuilder);

            if sqlx::query(&query).execute(&mut *conn).await?.rows_affected() == 0 {
                let (_, capacity) = load_counters(conn, guild_id).await?;
                debug!(%guild_id, capacity, "Guild is full");
                return Err(StorageError::MemberExceedsCapacity {
                    guild_id: *guild_id,
                    capacity,
                });
            }
        }

        let query = Query::insert()
            .into_table(Members::Table)
            .columns([
                Members::InjectiveAddress,
                Members::GuildId,
                Members::IsDefaultGuildMember,
                Members::Since,
            ])
            .values_panic([
                address.as_str().into(),
                guild_id.to_string().into(),
                is_default_member.into(),
                to_millis(&now_millis()).into(),
            ])
            .on_conflict(
                OnConflict::column(Members::InjectiveAddress)
                    .do_nothing()
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        if sqlx::query(&query).execute(&mut *conn).await?.rows_affected() == 0 {
            debug!(%address, "Address already belongs to a guild");
            return Err(StorageError::AlreadyMember {
                address: address.clone(),
            });
        }
        Ok(())
    }

    async fn delete_member(
        conn: &mut SqliteConnection,
        guild_id: &GuildId,
        address: &Address,
        policy: RemovalPolicy,
    ) -> Result<()> {
        let id = guild_id.to_string();

        let query = Query::delete()
            .from_table(Members::Table)
            .and_where(Expr::col(Members::InjectiveAddress).eq(address.as_str()))
            .and_where(Expr::col(Members::GuildId).eq(&id))
            .returning_col(Members::IsDefaultGuildMember)
            .to_string(SqliteQueryBuilder);

        let is_default: bool = match sqlx::query(&query).fetch_optional(&mut *conn).await? {
            Some(row) => row.try_get("is_default_guild_member")?,
            None => {
                return Err(StorageError::DeletionCountMismatch {
                    expected: 1,
                    actual: 0,
                })
            }
        };

        if !is_default {
            let query = Query::update()
                .table(Guilds::Table)
                .value(Guilds::MemberCount, Expr::col(Guilds::MemberCount).sub(1))
                .and_where(Expr::col(Guilds::Id).eq(&id))
                .and_where(Expr::col(Guilds::MemberCount).gt(0))
                .to_string(SqliteQueryBuilder);

            if sqlx::query(&query).execute(&mut *conn).await?.rows_affected() == 0 {
                load_counters(conn, guild_id).await?;
                return Err(StorageError::MemberCountDrift {
                    guild_id: *guild_id,
                });
            }
        }

        if policy == RemovalPolicy::Purge {
            let query = Query::delete()
                .from_table(AccountPortfolios::Table)
                .and_where(Expr::col(AccountPortfolios::InjectiveAddress).eq(address.as_str()))
                .and_where(Expr::col(AccountPortfolios::GuildId).eq(&id))
                .to_string(SqliteQueryBuilder);
            let purged = sqlx::query(&query).execute(&mut *conn).await?.rows_affected();
            debug!(%address, purged, "Purged account snapshots");
        }
        Ok(())
    }

    async fn recount_members(conn: &mut SqliteConnection, guild_id: &GuildId) -> Result<u32> {
        let (stored, _) = load_counters(conn, guild_id).await?;

        let query = Query::select()
            .expr(Expr::col(Members::InjectiveAddress).count())
            .from(Members::Table)
            .and_where(Expr::col(Members::GuildId).eq(guild_id.to_string()))
            .and_where(Expr::col(Members::IsDefaultGuildMember).eq(false))
            .to_string(SqliteQueryBuilder);
        let row = sqlx::query(&query).fetch_one(&mut *conn).await?;
        let actual = counter_from_i64(row.try_get(0)?, "member count")?;

        if stored != actual {
            let query = Query::update()
                .table(Guilds::Table)
                .value(Guilds::MemberCount, actual)
                .and_where(Expr::col(Guilds::Id).eq(guild_id.to_string()))
                .to_string(SqliteQueryBuilder);
            sqlx::query(&query).execute(&mut *conn).await?;
            warn!(%guild_id, stored, actual, "Repaired member count drift");
        }
        Ok(actual)
    }
}

/// Member listing, narrowed by whichever filter fields are set.
fn member_query(filter: &MemberFilter) -> String {
    let mut select = Query::select();
    select
        .columns([
            Members::InjectiveAddress,
            Members::GuildId,
            Members::IsDefaultGuildMember,
            Members::Since,
        ])
        .from(Members::Table);

    if let Some(guild_id) = &filter.guild_id {
        select.and_where(Expr::col(Members::GuildId).eq(guild_id.to_string()));
    }
    if let Some(is_default) = filter.is_default_member {
        select.and_where(Expr::col(Members::IsDefaultGuildMember).eq(is_default));
    }
    if let Some(address) = &filter.injective_address {
        select.and_where(Expr::col(Members::InjectiveAddress).eq(address.as_str()));
    }

    select
        .order_by(Members::InjectiveAddress, Order::Asc)
        .to_string(SqliteQueryBuilder)
}

#[async_trait]
impl MemberStore for SqliteStorage {
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
            let mut tx = self.begin_immediate().await?;
            let result = Self::insert_member(&mut tx, &guild_id, address, is_default_member).await;
            finish(tx, result).await
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
        let policy = self.removal_policy;

        (|| async {
            let mut tx = self.begin_immediate().await?;
            let result = Self::delete_member(&mut tx, &guild_id, address, policy).await;
            finish(tx, result).await
        })
        .retry(transaction_backoff())
        .when(is_retryable)
        .notify(log_retry("remove_member"))
        .await
    }

    async fn list_guild_members(&self, filter: &MemberFilter) -> Result<Vec<GuildMember>> {
        let query = member_query(filter);
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(member_from_row).collect()
    }

    #[tracing::instrument(name = "storage.reconcile_member_count", skip_all, fields(guild_id = %guild_id))]
    async fn reconcile_member_count(&self, guild_id: &str) -> Result<u32> {
        let guild_id = GuildId::parse(guild_id)?;

        (|| async {
            let mut tx = self.begin_immediate().await?;
            let result = Self::recount_members(&mut tx, &guild_id).await;
            finish(tx, result).await
        })
        .retry(transaction_backoff())
        .when(is_retryable)
        .notify(log_retry("reconcile_member_count"))
        .await
    }
}
