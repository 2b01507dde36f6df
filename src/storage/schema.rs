//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building,
//! plus the DDL the SQLite backend runs from `ensure_indexes`.

use sea_query::Iden;

/// Guilds table schema.
#[derive(Iden, Clone, Copy)]
pub enum Guilds {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "name"]
    Name,
    #[iden = "description"]
    Description,
    #[iden = "master_address"]
    MasterAddress,
    #[iden = "capacity"]
    Capacity,
    #[iden = "member_count"]
    MemberCount,
    #[iden = "created_at"]
    CreatedAt,
}

/// Members table schema.
#[derive(Iden, Clone, Copy)]
pub enum Members {
    Table,
    #[iden = "injective_address"]
    InjectiveAddress,
    #[iden = "guild_id"]
    GuildId,
    #[iden = "is_default_guild_member"]
    IsDefaultGuildMember,
    #[iden = "since"]
    Since,
}

/// Account portfolios table schema.
#[derive(Iden, Clone, Copy)]
pub enum AccountPortfolios {
    Table,
    #[iden = "injective_address"]
    InjectiveAddress,
    #[iden = "guild_id"]
    GuildId,
    #[iden = "updated_at"]
    UpdatedAt,
    #[iden = "holdings"]
    Holdings,
}

/// Guild portfolios table schema.
#[derive(Iden, Clone, Copy)]
pub enum GuildPortfolios {
    Table,
    #[iden = "guild_id"]
    GuildId,
    #[iden = "updated_at"]
    UpdatedAt,
    #[iden = "holdings"]
    Holdings,
}

/// Denoms table schema.
#[derive(Iden, Clone, Copy)]
pub enum Denoms {
    Table,
    #[iden = "denom"]
    Denom,
    #[iden = "symbol"]
    Symbol,
    #[iden = "decimals"]
    Decimals,
    #[iden = "display_name"]
    DisplayName,
}

/// SQL for creating the tables. Timestamps are epoch milliseconds, holdings
/// are JSON arrays.
///
/// There are no foreign keys: like the document collections, dependent rows
/// are removed by the guild cascade, not by the engine.
pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS guilds (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    master_address TEXT NOT NULL,
    capacity INTEGER NOT NULL,
    member_count INTEGER NOT NULL DEFAULT 0 CHECK (member_count >= 0),
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS members (
    injective_address TEXT NOT NULL,
    guild_id TEXT NOT NULL,
    is_default_guild_member INTEGER NOT NULL DEFAULT 0,
    since INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS account_portfolios (
    injective_address TEXT NOT NULL,
    guild_id TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    holdings TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS guild_portfolios (
    guild_id TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    holdings TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS denoms (
    denom TEXT PRIMARY KEY NOT NULL,
    symbol TEXT NOT NULL,
    decimals INTEGER NOT NULL,
    display_name TEXT NOT NULL
);
"#;

/// SQL for the uniqueness and lookup indexes.
pub const CREATE_INDEXES: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_members_injective_address ON members(injective_address);
CREATE INDEX IF NOT EXISTS idx_members_is_default_guild_member ON members(is_default_guild_member);
CREATE INDEX IF NOT EXISTS idx_members_guild_id ON members(guild_id);

CREATE INDEX IF NOT EXISTS idx_account_portfolios_injective_address ON account_portfolios(injective_address);
CREATE INDEX IF NOT EXISTS idx_account_portfolios_guild_id ON account_portfolios(guild_id);
CREATE INDEX IF NOT EXISTS idx_account_portfolios_updated_at ON account_portfolios(updated_at DESC);

CREATE INDEX IF NOT EXISTS idx_guild_portfolios_guild_id ON guild_portfolios(guild_id);
CREATE INDEX IF NOT EXISTS idx_guild_portfolios_updated_at ON guild_portfolios(updated_at DESC);
"#;
