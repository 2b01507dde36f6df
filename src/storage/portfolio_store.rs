//! PortfolioStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::model::{
    AccountPortfolio, AccountPortfoliosFilter, Address, GuildPortfolio, GuildPortfoliosFilter,
};

/// Interface for portfolio snapshots.
///
/// Snapshots are append-only. Writes carry no cross-record invariant and
/// run outside transactions. Listings are sorted newest first.
#[async_trait]
pub trait PortfolioStore: Send + Sync {
    /// Store account snapshots in a single write. An empty batch is a no-op.
    async fn add_account_portfolios(&self, portfolios: Vec<AccountPortfolio>) -> Result<()>;

    /// Store guild snapshots in a single write. An empty batch is a no-op.
    async fn add_guild_portfolios(&self, portfolios: Vec<GuildPortfolio>) -> Result<()>;

    /// Latest snapshot for an address, or `StorageError::NotFound`.
    async fn get_account_portfolio(&self, address: &Address) -> Result<AccountPortfolio>;

    /// Latest snapshot for a guild, or `StorageError::NotFound`.
    async fn get_guild_portfolio(&self, guild_id: &str) -> Result<GuildPortfolio>;

    /// Snapshots for an address within `[start_time, end_time)`, newest first.
    async fn list_account_portfolios(
        &self,
        filter: &AccountPortfoliosFilter,
    ) -> Result<Vec<AccountPortfolio>>;

    /// Snapshots for a guild within `[start_time, end_time)`, newest first.
    async fn list_guild_portfolios(
        &self,
        filter: &GuildPortfoliosFilter,
    ) -> Result<Vec<GuildPortfolio>>;
}
