//! Records persisted by the guild store.

mod denom;
mod guild;
mod ids;
mod portfolio;

pub use denom::Denom;
pub use guild::{Guild, GuildMember, MemberFilter, NewGuild};
pub use ids::{Address, GuildId, ADDRESS_LEN, ADDRESS_PREFIX};
pub use portfolio::{
    AccountPortfolio, AccountPortfoliosFilter, GuildPortfolio, GuildPortfoliosFilter, Holding,
    TimeWindow,
};
