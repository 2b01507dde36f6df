//! MongoDB PortfolioStore implementation.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOneOptions, FindOptions};
use tracing::debug;

use super::{bson_datetime, datetime_field, holdings_field, holdings_to_bson, MongoStorage};
use crate::model::{
    AccountPortfolio, AccountPortfoliosFilter, Address, GuildId, GuildPortfolio,
    GuildPortfoliosFilter, TimeWindow,
};
use crate::storage::{PortfolioStore, Result, StorageError};

/// Add the `[start_time, end_time)` bounds on `updated_at` to a query.
fn with_window(mut query: Document, window: &TimeWindow) -> Document {
    let mut range = Document::new();
    if let Some(start) = &window.start_time {
        range.insert("$gte", bson_datetime(start));
    }
    if let Some(end) = &window.end_time {
        range.insert("$lt", bson_datetime(end));
    }
    if !range.is_empty() {
        query.insert("updated_at", range);
    }
    query
}

fn window_options(window: &TimeWindow) -> FindOptions {
    FindOptions::builder()
        .sort(doc! { "updated_at": -1 })
        .limit(window.limit.map(i64::from))
        .build()
}

fn latest() -> FindOneOptions {
    FindOneOptions::builder()
        .sort(doc! { "updated_at": -1 })
        .build()
}

fn account_from_document(doc: &Document) -> Result<AccountPortfolio> {
    Ok(AccountPortfolio {
        injective_address: Address::new(doc.get_str("injective_address")?)?,
        guild_id: GuildId::parse(doc.get_str("guild_id")?)?,
        updated_at: datetime_field(doc, "updated_at")?,
        holdings: holdings_field(doc)?,
    })
}

fn guild_from_document(doc: &Document) -> Result<GuildPortfolio> {
    Ok(GuildPortfolio {
        guild_id: GuildId::parse(doc.get_str("guild_id")?)?,
        updated_at: datetime_field(doc, "updated_at")?,
        holdings: holdings_field(doc)?,
    })
}

#[async_trait]
impl PortfolioStore for MongoStorage {
    async fn add_account_portfolios(&self, portfolios: Vec<AccountPortfolio>) -> Result<()> {
        if portfolios.is_empty() {
            return Ok(());
        }

        let docs = portfolios
            .iter()
            .map(|p| {
                Ok(doc! {
                    "injective_address": p.injective_address.as_str(),
                    "guild_id": p.guild_id.to_string(),
                    "updated_at": bson_datetime(&p.updated_at),
                    "holdings": holdings_to_bson(&p.holdings)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let inserted = self.account_portfolios.insert_many(docs).await?;
        debug!(count = inserted.inserted_ids.len(), "Stored account snapshots");
        Ok(())
    }

    async fn add_guild_portfolios(&self, portfolios: Vec<GuildPortfolio>) -> Result<()> {
        if portfolios.is_empty() {
            return Ok(());
        }

        let docs = portfolios
            .iter()
            .map(|p| {
                Ok(doc! {
                    "guild_id": p.guild_id.to_string(),
                    "updated_at": bson_datetime(&p.updated_at),
                    "holdings": holdings_to_bson(&p.holdings)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let inserted = self.guild_portfolios.insert_many(docs).await?;
        debug!(count = inserted.inserted_ids.len(), "Stored guild snapshots");
        Ok(())
    }

    async fn get_account_portfolio(&self, address: &Address) -> Result<AccountPortfolio> {
        match self
            .account_portfolios
            .find_one(doc! { "injective_address": address.as_str() })
            .with_options(latest())
            .await?
        {
            Some(doc) => account_from_document(&doc),
            None => Err(StorageError::NotFound {
                entity: "account portfolio",
                key: address.to_string(),
            }),
        }
    }

    async fn get_guild_portfolio(&self, guild_id: &str) -> Result<GuildPortfolio> {
        let guild_id = GuildId::parse(guild_id)?;
        match self
            .guild_portfolios
            .find_one(doc! { "guild_id": guild_id.to_string() })
            .with_options(latest())
            .await?
        {
            Some(doc) => guild_from_document(&doc),
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
        let window = filter.window();
        let query = with_window(
            doc! { "injective_address": filter.injective_address.as_str() },
            &window,
        );

        let docs: Vec<_> = self
            .account_portfolios
            .find(query)
            .with_options(window_options(&window))
            .await?
            .try_collect()
            .await?;
        docs.iter().map(account_from_document).collect()
    }

    async fn list_guild_portfolios(
        &self,
        filter: &GuildPortfoliosFilter,
    ) -> Result<Vec<GuildPortfolio>> {
        let guild_id = GuildId::parse(&filter.guild_id)?;
        let window = filter.window();
        let query = with_window(doc! { "guild_id": guild_id.to_string() }, &window);

        let docs: Vec<_> = self
            .guild_portfolios
            .find(query)
            .with_options(window_options(&window))
            .await?
            .try_collect()
            .await?;
        docs.iter().map(guild_from_document).collect()
    }
}
