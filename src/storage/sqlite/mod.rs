//! SQLite implementation of the guild database.
//!
//! One `SqliteStorage` implements every store trait over a shared pool.
//! Membership and cascade writes run inside `BEGIN IMMEDIATE` transactions so
//! the write lock is taken up front, and are retried when the lock is
//! contended.

mod denom_store;
mod guild_store;
mod member_store;
mod portfolio_store;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, info};

use super::helpers::{counter_from_i64, from_millis};
use super::schema::{CREATE_INDEXES, CREATE_TABLES};
use super::{GuildsDatabase, RemovalPolicy, Result};
use crate::model::{Address, Guild, GuildId, GuildMember, Holding};

/// How long a connection waits on a locked database before reporting busy.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// SQLite guild database.
pub struct SqliteStorage {
    pool: SqlitePool,
    removal_policy: RemovalPolicy,
}

impl SqliteStorage {
    /// Wrap an existing pool. The schema is created by `ensure_indexes`.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            removal_policy: RemovalPolicy::default(),
        }
    }

    /// Connect with a `sqlite:` URL.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .busy_timeout(BUSY_TIMEOUT)
            .create_if_missing(true);
        if is_memory(url) {
            // each connection to :memory: is its own database; keep exactly one alive
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?;
            info!("Connected to in-memory SQLite");
            return Ok(Self::new(pool));
        }
        Self::connect_with(options, max_connections).await
    }

    /// Open a database file, creating it and its parent directory if needed.
    ///
    /// `:memory:` opens a private in-memory database on a single connection.
    pub async fn open_path(path: &str, max_connections: u32) -> Result<Self> {
        if is_memory(path) {
            return Self::connect("sqlite::memory:", 1).await;
        }

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(sqlx::Error::Io)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .create_if_missing(true);
        Self::connect_with(options, max_connections).await
    }

    async fn connect_with(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        info!(max_connections, "Connected to SQLite");
        Ok(Self::new(pool))
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }

    /// Underlying pool, for callers that need raw SQL.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a transaction that holds the write lock.
    ///
    /// BEGIN IMMEDIATE avoids the deadlock two DEFERRED transactions hit when
    /// both try to upgrade from a shared to an exclusive lock. The returned
    /// transaction rolls back if dropped before `finish`.
    async fn begin_immediate(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }
}

/// Commit on success, roll back on error.
async fn finish<T>(tx: Transaction<'static, Sqlite>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                debug!(error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}

fn is_memory(path: &str) -> bool {
    path.contains(":memory:") || path.contains("mode=memory")
}

/// True when a statement failed because another connection held the lock.
pub(crate) fn is_lock_contention(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            // extended result codes keep the primary code in the low byte
            .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
            .unwrap_or(false),
        _ => false,
    }
}

fn guild_from_row(row: &SqliteRow) -> Result<Guild> {
    Ok(Guild {
        id: GuildId::parse(row.try_get::<&str, _>("id")?)?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        master_address: Address::new(row.try_get::<String, _>("master_address")?)?,
        capacity: counter_from_i64(row.try_get("capacity")?, "capacity")?,
        member_count: counter_from_i64(row.try_get("member_count")?, "member_count")?,
        created_at: from_millis(row.try_get("created_at")?)?,
    })
}

fn member_from_row(row: &SqliteRow) -> Result<GuildMember> {
    Ok(GuildMember {
        injective_address: Address::new(row.try_get::<String, _>("injective_address")?)?,
        guild_id: GuildId::parse(row.try_get::<&str, _>("guild_id")?)?,
        is_default_guild_member: row.try_get("is_default_guild_member")?,
        since: from_millis(row.try_get("since")?)?,
    })
}

fn holdings_from_row(row: &SqliteRow) -> Result<Vec<Holding>> {
    let holdings: String = row.try_get("holdings")?;
    Ok(serde_json::from_str(&holdings)?)
}

#[async_trait]
impl GuildsDatabase for SqliteStorage {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn ensure_indexes(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_TABLES).execute(&self.pool).await?;
        sqlx::raw_sql(CREATE_INDEXES).execute(&self.pool).await?;
        debug!("SQLite schema ensured");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.pool.close().await;
        info!("Disconnected from SQLite");
        Ok(())
    }
}
