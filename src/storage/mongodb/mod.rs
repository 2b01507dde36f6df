//! MongoDB implementation of the guild database.
//!
//! Multi-document writes run in a transaction on a session opened for that
//! one operation, so concurrent callers never share transaction state.
//! Transactions require a replica set or sharded cluster.

mod denom_store;
mod guild_store;
mod member_store;
mod portfolio_store;

use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{doc, from_bson, to_bson, Bson, DateTime as BsonDateTime, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, ClientSession, Collection, IndexModel};
use tracing::{debug, info};

use super::helpers::{counter_from_i64, from_millis, to_millis};
use super::{GuildsDatabase, RemovalPolicy, Result, StorageError};
use crate::model::{Address, Guild, GuildId, GuildMember, Holding};

/// Collection names.
pub(crate) const GUILDS_COLLECTION: &str = "guilds";
pub(crate) const MEMBERS_COLLECTION: &str = "members";
pub(crate) const ACCOUNT_PORTFOLIOS_COLLECTION: &str = "account_portfolios";
pub(crate) const GUILD_PORTFOLIOS_COLLECTION: &str = "guild_portfolios";
pub(crate) const DENOMS_COLLECTION: &str = "denoms";

/// Upper bound on connection setup, including server selection.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

const DUPLICATE_KEY: i32 = 11000;

/// MongoDB guild database.
pub struct MongoStorage {
    client: Client,
    guilds: Collection<Document>,
    members: Collection<Document>,
    account_portfolios: Collection<Document>,
    guild_portfolios: Collection<Document>,
    denoms: Collection<Document>,
    removal_policy: RemovalPolicy,
}

impl MongoStorage {
    /// Connect to `uri` and bind the collections of `database_name`.
    ///
    /// Fails with `StorageError::ConnectTimeout` when the deployment is not
    /// reachable within `CONNECTION_TIMEOUT`.
    pub async fn connect(uri: &str, database_name: &str) -> Result<Self> {
        let setup = async {
            let mut options = ClientOptions::parse(uri).await?;
            options.connect_timeout = Some(CONNECTION_TIMEOUT);
            options.server_selection_timeout = Some(CONNECTION_TIMEOUT);
            options.app_name = Some("guilds-store".to_string());

            let client = Client::with_options(options)?;
            client
                .database(database_name)
                .run_command(doc! { "ping": 1 })
                .await?;
            // surface session support problems at startup rather than on the first write
            client.start_session().await?;
            Ok::<_, StorageError>(client)
        };

        let client = tokio::time::timeout(CONNECTION_TIMEOUT, setup)
            .await
            .map_err(|_| StorageError::ConnectTimeout(CONNECTION_TIMEOUT))??;

        info!(database = %database_name, "Connected to MongoDB");
        Ok(Self::new(client, database_name))
    }

    /// Bind collections on an existing client.
    pub fn new(client: Client, database_name: &str) -> Self {
        let database = client.database(database_name);
        Self {
            guilds: database.collection(GUILDS_COLLECTION),
            members: database.collection(MEMBERS_COLLECTION),
            account_portfolios: database.collection(ACCOUNT_PORTFOLIOS_COLLECTION),
            guild_portfolios: database.collection(GUILD_PORTFOLIOS_COLLECTION),
            denoms: database.collection(DENOMS_COLLECTION),
            client,
            removal_policy: RemovalPolicy::default(),
        }
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }

    pub fn guilds(&self) -> &Collection<Document> {
        &self.guilds
    }

    pub fn members(&self) -> &Collection<Document> {
        &self.members
    }

    pub fn account_portfolios(&self) -> &Collection<Document> {
        &self.account_portfolios
    }

    pub fn guild_portfolios(&self) -> &Collection<Document> {
        &self.guild_portfolios
    }

    pub fn denoms(&self) -> &Collection<Document> {
        &self.denoms
    }

    /// Open a session for one operation and start its transaction.
    async fn begin(&self) -> Result<ClientSession> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;
        Ok(session)
    }
}

/// Commit on success, abort on error.
async fn finish<T>(session: &mut ClientSession, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            session.commit_transaction().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(abort) = session.abort_transaction().await {
                debug!(error = %abort, "Abort failed");
            }
            Err(e)
        }
    }
}

/// True for a unique index violation.
pub(crate) fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    match *error.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref write_err)) => {
            write_err.code == DUPLICATE_KEY
        }
        ErrorKind::Command(ref command_err) => command_err.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn bson_datetime(at: &chrono::DateTime<chrono::Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(to_millis(at))
}

fn datetime_field(doc: &Document, key: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    from_millis(doc.get_datetime(key)?.timestamp_millis())
}

fn holdings_to_bson(holdings: &[Holding]) -> Result<Bson> {
    Ok(to_bson(holdings)?)
}

fn holdings_field(doc: &Document) -> Result<Vec<Holding>> {
    let holdings = doc.get_array("holdings")?;
    Ok(from_bson(Bson::Array(holdings.clone()))?)
}

fn guild_to_document(guild: &Guild) -> Document {
    doc! {
        "_id": guild.id.to_string(),
        "name": &guild.name,
        "description": &guild.description,
        "master_address": guild.master_address.as_str(),
        "capacity": i64::from(guild.capacity),
        "member_count": i64::from(guild.member_count),
        "created_at": bson_datetime(&guild.created_at),
    }
}

fn guild_from_document(doc: &Document) -> Result<Guild> {
    Ok(Guild {
        id: GuildId::parse(doc.get_str("_id")?)?,
        name: doc.get_str("name")?.to_string(),
        description: doc.get_str("description")?.to_string(),
        master_address: Address::new(doc.get_str("master_address")?)?,
        capacity: counter_from_i64(doc.get_i64("capacity")?, "capacity")?,
        member_count: counter_from_i64(doc.get_i64("member_count")?, "member_count")?,
        created_at: datetime_field(doc, "created_at")?,
    })
}

fn member_from_document(doc: &Document) -> Result<GuildMember> {
    Ok(GuildMember {
        injective_address: Address::new(doc.get_str("injective_address")?)?,
        guild_id: GuildId::parse(doc.get_str("guild_id")?)?,
        is_default_guild_member: doc.get_bool("is_default_guild_member")?,
        since: datetime_field(doc, "since")?,
    })
}

#[async_trait]
impl GuildsDatabase for MongoStorage {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn ensure_indexes(&self) -> Result<()> {
        let unique = IndexOptions::builder().unique(true).build();

        self.members
            .create_indexes([
                IndexModel::builder()
                    .keys(doc! { "injective_address": 1 })
                    .options(unique)
                    .build(),
                IndexModel::builder()
                    .keys(doc! { "is_default_guild_member": 1 })
                    .build(),
                IndexModel::builder().keys(doc! { "guild_id": 1 }).build(),
            ])
            .await?;

        self.account_portfolios
            .create_indexes([
                IndexModel::builder()
                    .keys(doc! { "injective_address": 1 })
                    .build(),
                IndexModel::builder().keys(doc! { "guild_id": 1 }).build(),
                IndexModel::builder().keys(doc! { "updated_at": -1 }).build(),
            ])
            .await?;

        self.guild_portfolios
            .create_indexes([
                IndexModel::builder().keys(doc! { "guild_id": 1 }).build(),
                IndexModel::builder().keys(doc! { "updated_at": -1 }).build(),
            ])
            .await?;

        debug!("MongoDB indexes ensured");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        info!("Disconnected from MongoDB");
        Ok(())
    }
}
