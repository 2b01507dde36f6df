//! SQLite GuildStore implementation.

use async_trait::async_trait;
use backon::Retryable;
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::SqliteConnection;
use tracing::info;

use super::{finish, guild_from_row, SqliteStorage};
use crate::model::{Guild, GuildId, NewGuild};
use crate::storage::helpers::{now_millis, to_millis};
use crate::storage::schema::{AccountPortfolios, GuildPortfolios, Guilds, Members};
use crate::storage::{GuildStore, Result, StorageError};
use crate::utils::retry::{is_retryable, log_retry, transaction_backoff};

const GUILD_COLUMNS: [Guilds; 7] = [
    Guilds::Id,
    Guilds::Name,
    Guilds::Description,
    Guilds::MasterAddress,
    Guilds::Capacity,
    Guilds::MemberCount,
    Guilds::CreatedAt,
];

impl SqliteStorage {
    /// Delete a guild row and every record keyed by it, within an
    /// already-started transaction.
    async fn delete_guild_cascade(conn: &mut SqliteConnection, guild_id: &GuildId) -> Result<()> {
        let id = guild_id.to_string();

        let query = Query::delete()
            .from_table(Guilds::Table)
            .and_where(Expr::col(Guilds::Id).eq(&id))
            .to_string(SqliteQueryBuilder);
        if sqlx::query(&query).execute(&mut *conn).await?.rows_affected() == 0 {
            return Err(StorageError::guild_not_found(guild_id));
        }

        let members = Query::delete()
            .from_table(Members::Table)
            .and_where(Expr::col(Members::GuildId).eq(&id))
            .to_string(SqliteQueryBuilder);
        let account_portfolios = Query::delete()
            .from_table(AccountPortfolios::Table)
            .and_where(Expr::col(AccountPortfolios::GuildId).eq(&id))
            .to_string(SqliteQueryBuilder);
        let guild_portfolios = Query::delete()
            .from_table(GuildPortfolios::Table)
            .and_where(Expr::col(GuildPortfolios::GuildId).eq(&id))
            .to_string(SqliteQueryBuilder);

        for query in [members, account_portfolios, guild_portfolios] {
            sqlx::query(&query).execute(&mut *conn).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl GuildStore for SqliteStorage {
    async fn add_guild(&self, guild: NewGuild) -> Result<GuildId> {
        let guild = Guild::from_new(GuildId::new(), guild, now_millis());

        let query = Query::insert()
            .into_table(Guilds::Table)
            .columns(GUILD_COLUMNS)
            .values_panic([
                guild.id.to_string().into(),
                guild.name.into(),
                guild.description.into(),
                guild.master_address.as_str().into(),
                guild.capacity.into(),
                guild.member_count.into(),
                to_millis(&guild.created_at).into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        info!(guild_id = %guild.id, capacity = guild.capacity, "Guild created");
        Ok(guild.id)
    }

    async fn get_single_guild(&self, guild_id: &str) -> Result<Guild> {
        let guild_id = GuildId::parse(guild_id)?;

        let query = Query::select()
            .columns(GUILD_COLUMNS)
            .from(Guilds::Table)
            .and_where(Expr::col(Guilds::Id).eq(guild_id.to_string()))
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&query).fetch_optional(&self.pool).await? {
            Some(row) => guild_from_row(&row),
            None => Err(StorageError::guild_not_found(&guild_id)),
        }
    }

    async fn list_all_guilds(&self) -> Result<Vec<Guild>> {
        let query = Query::select()
            .columns(GUILD_COLUMNS)
            .from(Guilds::Table)
            .order_by(Guilds::CreatedAt, Order::Asc)
            .order_by(Guilds::Id, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(guild_from_row).collect()
    }

    #[tracing::instrument(name = "storage.delete_guild", skip_all, fields(guild_id = %guild_id))]
    async fn delete_guild(&self, guild_id: &str) -> Result<()> {
        let guild_id = GuildId::parse(guild_id)?;

        (|| async {
            let mut tx = self.begin_immediate().await?;
            let result = Self::delete_guild_cascade(&mut tx, &guild_id).await;
            finish(tx, result).await
        })
        .retry(transaction_backoff())
        .when(is_retryable)
        .notify(log_retry("delete_guild"))
        .await?;

        info!(%guild_id, "Guild deleted with members and snapshots");
        Ok(())
    }
}
