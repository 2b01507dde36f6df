//! Portfolio snapshots and their query filters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Address, GuildId};

/// One asset position inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub denom: String,
    /// Base-unit amount as a decimal string; chain amounts overflow f64.
    pub amount: String,
    pub price_usd: f64,
}

/// Immutable snapshot of one account's holdings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountPortfolio {
    pub injective_address: Address,
    pub guild_id: GuildId,
    pub updated_at: DateTime<Utc>,
    pub holdings: Vec<Holding>,
}

/// Immutable snapshot of a guild's aggregate holdings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildPortfolio {
    pub guild_id: GuildId,
    pub updated_at: DateTime<Utc>,
    pub holdings: Vec<Holding>,
}

/// Half-open `[start_time, end_time)` window with an optional cap.
///
/// Shared by both portfolio filters so backends apply bounds identically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl TimeWindow {
    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        self.start_time.map_or(true, |start| *at >= start)
            && self.end_time.map_or(true, |end| *at < end)
    }
}

/// Account snapshot query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountPortfoliosFilter {
    pub injective_address: Address,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl AccountPortfoliosFilter {
    pub fn for_address(injective_address: Address) -> Self {
        Self {
            injective_address,
            start_time: None,
            end_time: None,
            limit: None,
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start_time: self.start_time,
            end_time: self.end_time,
            limit: self.limit,
        }
    }
}

/// Guild snapshot query. The guild id arrives unparsed from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildPortfoliosFilter {
    pub guild_id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl GuildPortfoliosFilter {
    pub fn for_guild(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            start_time: None,
            end_time: None,
            limit: None,
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start_time: self.start_time,
            end_time: self.end_time,
            limit: self.limit,
        }
    }
}
