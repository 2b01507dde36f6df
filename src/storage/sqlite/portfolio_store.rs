//! SQLite PortfolioStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, Order, Query, SelectStatement, SqliteQueryBuilder};
use sqlx::Row;
use tracing::debug;

use super::{holdings_from_row, SqliteStorage};
use crate::model::{
    AccountPortfolio, AccountPortfoliosFilter, Address, GuildId, GuildPortfolio,
    GuildPortfoliosFilter, TimeWindow,
};
use crate::storage::helpers::{from_millis, to_millis};
use crate::storage::schema::{AccountPortfolios, GuildPortfolios};
use crate::storage::{PortfolioStore, Result, StorageError};

/// Apply `[start_time, end_time)`, newest-first ordering and the cap.
fn apply_window<C>(select: &mut SelectStatement, updated_at: C, window: &TimeWindow)
where
    C: sea_query::Iden + Copy + 'static,
{
    if let Some(start) = &window.start_time {
        select.and_where(Expr::col(updated_at).gte(to_millis(start)));
    }
    if let Some(end) = &window.end_time {
        select.and_where(Expr::col(updated_at).lt(to_millis(end)));
    }
    select.order_by(updated_at, Order::Desc);
    if let Some(limit) = window.limit {
        select.limit(u64::from(limit));
    }
}

fn account_select(address: &Address) -> SelectStatement {
    Query::select()
        .columns([
            AccountPortfolios::InjectiveAddress,
            AccountPortfolios::GuildId,
            AccountPortfolios::UpdatedAt,
            AccountPortfolios::Holdings,
        ])
        .from(AccountPortfolios::Table)
        .and_where(Expr::col(AccountPortfolios::InjectiveAddress).eq(address.as_str()))
        .to_owned()
}

fn guild_select(guild_id: &GuildId) -> SelectStatement {
    Query::select()
        .columns([
            GuildPortfolios::GuildId,
            GuildPortfolios::UpdatedAt,
            GuildPortfolios::Holdings,
        ])
        .from(GuildPortfolios::Table)
        .and_where(Expr::col(GuildPortfolios::GuildId).eq(guild_id.to_string()))
        .to_owned()
}

fn account_insert(portfolios: &[AccountPortfolio]) -> Result<String> {
    let mut insert = Query::insert();
    insert.into_table(AccountPortfolios::Table).columns([
        AccountPortfolios::InjectiveAddress,
        AccountPortfolios::GuildId,
        AccountPortfolios::UpdatedAt,
        AccountPortfolios::Holdings,
    ]);
    for portfolio in portfolios {
        insert.values_panic([
            portfolio.injective_address.as_str().into(),
            portfolio.guild_id.to_string().into(),
            to_millis(&portfolio.updated_at).into(),
            serde_json::to_string(&portfolio.holdings)?.into(),
        ]);
    }
    Ok(insert.to_string(SqliteQueryBuilder))
}

fn guild_insert(portfolios: &[GuildPortfolio]) -> Result<String> {
    let mut insert = Query::insert();
    insert.into_table(GuildPortfolios::Table).columns([
        GuildPortfolios::GuildId,
        GuildPortfolios::UpdatedAt,
        GuildPortfolios::Holdings,
    ]);
    for portfolio in portfolios {
        insert.values_panic([
            portfolio.guild_id.to_string().into(),
            to_millis(&portfolio.updated_at).into(),
            serde_json::to_string(&portfolio.holdings)?.into(),
        ]);
    }
    Ok(insert.to_string(SqliteQueryBuilder))
}

fn account_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AccountPortfolio> {
    Ok(AccountPortfolio {
        injective_address: Address::new(row.try_get::<String, _>("injective_address")?)?,
        guild_id: GuildId::parse(row.try_get::<&str, _>("guild_id")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
        holdings: holdings_from_row(row)?,
    })
}

fn guild_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<GuildPortfolio> {
    Ok(GuildPortfolio {
        guild_id: GuildId::parse(row.try_get::<&str, _>("guild_id")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
        holdings: holdings_from_row(row)?,
    })
}

#[async_trait]
impl PortfolioStore for SqliteStorage {
    async fn add_account_portfolios(&self, portfolios: Vec<AccountPortfolio>) -> Result<()> {
        if portfolios.is_empty() {
            return Ok(());
        }

        let query = account_insert(&portfolios)?;
        sqlx::query(&query).execute(&self.pool).await?;
        debug!(count = portfolios.len(), "Stored account snapshots");
        Ok(())
    }

    async fn add_guild_portfolios(&self, portfolios: Vec<GuildPortfolio>) -> Result<()> {
        if portfolios.is_empty() {
            return Ok(());
        }

        let query = guild_insert(&portfolios)?;
        sqlx::query(&query).execute(&self.pool).await?;
        debug!(count = portfolios.len(), "Stored guild snapshots");
        Ok(())
    }

    async fn get_account_portfolio(&self, address: &Address) -> Result<AccountPortfolio> {
        let query = account_select(address)
            .order_by(AccountPortfolios::UpdatedAt, Order::Desc)
            .limit(1)
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&query).fetch_optional(&self.pool).await? {
            Some(row) => account_from_row(&row),
            None => Err(StorageError::NotFound {
                entity: "account portfolio",
                key: address.to_string(),
            }),
        }
    }

    async fn get_guild_portfolio(&self, guild_id: &str) -> Result<GuildPortfolio> {
        let guild_id = GuildId::parse(guild_id)?;
        let query = guild_select(&guild_id)
            .order_by(GuildPortfolios::UpdatedAt, Order::Desc)
            .limit(1)
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&query).fetch_optional(&self.pool).await? {
            Some(row) => guild_from_row(&row),
            None => Err(StorageError::NotFound {
                entity: "guild portfolio",
                key: guild_id.to_string(),
            }),
        }
    }

    async fn list_account_portfolios(
        &self,
        filter: &AccountPortfoliosFilter,
    ) -> Result<Vec<AccountPortfolio>> {
        let query = {
            let mut select = account_select(&filter.injective_address);
            apply_window(&mut select, AccountPortfolios::UpdatedAt, &filter.window());
            select.to_string(SqliteQueryBuilder)
        };

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn list_guild_portfolios(
        &self,
        filter: &GuildPortfoliosFilter,
    ) -> Result<Vec<GuildPortfolio>> {
        let guild_id = GuildId::parse(&filter.guild_id)?;
        let query = {
            let mut select = guild_select(&guild_id);
            apply_window(&mut select, GuildPortfolios::UpdatedAt, &filter.window());
            select.to_string(SqliteQueryBuilder)
        };

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(guild_from_row).collect()
    }
}
