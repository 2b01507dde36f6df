//! MongoDB GuildStore implementation.

use async_trait::async_trait;
use backon::Retryable;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::FindOptions;
use mongodb::ClientSession;
use tracing::{debug, info};

use super::{finish, guild_from_document, guild_to_document, MongoStorage};
use crate::model::{Guild, GuildId, NewGuild};
use crate::storage::helpers::now_millis;
use crate::storage::{GuildStore, Result, StorageError};
use crate::utils::retry::{is_retryable, log_retry, transaction_backoff};

impl MongoStorage {
    /// Delete a guild and every document keyed by it, inside the session's
    /// transaction.
    async fn delete_guild_cascade(
        &self,
        session: &mut ClientSession,
        guild_id: &GuildId,
    ) -> Result<()> {
        let id = guild_id.to_string();

        let deleted = self
            .guilds
            .delete_one(doc! { "_id": &id })
            .session(&mut *session)
            .await?;
        if deleted.deleted_count == 0 {
            return Err(StorageError::guild_not_found(guild_id));
        }

        let members = self
            .members
            .delete_many(doc! { "guild_id": &id })
            .session(&mut *session)
            .await?;
        let account_portfolios = self
            .account_portfolios
            .delete_many(doc! { "guild_id": &id })
            .session(&mut *session)
            .await?;
        let guild_portfolios = self
            .guild_portfolios
            .delete_many(doc! { "guild_id": &id })
            .session(&mut *session)
            .await?;

        debug!(
            members = members.deleted_count,
            account_portfolios = account_portfolios.deleted_count,
            guild_portfolios = guild_portfolios.deleted_count,
            "Cascade delete"
        );
        Ok(())
    }
}

#[async_trait]
impl GuildStore for MongoStorage {
    async fn add_guild(&self, guild: NewGuild) -> Result<GuildId> {
        let guild = Guild::from_new(GuildId::new(), guild, now_millis());
        self.guilds.insert_one(guild_to_document(&guild)).await?;
        info!(guild_id = %guild.id, capacity = guild.capacity, "Guild created");
        Ok(guild.id)
    }

    async fn get_single_guild(&self, guild_id: &str) -> Result<Guild> {
        let guild_id = GuildId::parse(guild_id)?;
        match self
            .guilds
            .find_one(doc! { "_id": guild_id.to_string() })
            .await?
        {
            Some(doc) => guild_from_document(&doc),
            None => Err(StorageError::guild_not_found(&guild_id)),
        }
    }

    async fn list_all_guilds(&self) -> Result<Vec<Guild>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": 1, "_id": 1 })
            .build();
        let docs: Vec<_> = self
            .guilds
            .find(doc! {})
            .with_options(options)
            .await?
            .try_collect()
            .await?;
        docs.iter().map(guild_from_document).collect()
    }

    #[tracing::instrument(name = "storage.delete_guild", skip_all, fields(guild_id = %guild_id))]
    async fn delete_guild(&self, guild_id: &str) -> Result<()> {
        let guild_id = GuildId::parse(guild_id)?;

        (|| async {
            let mut session = self.begin().await?;
            let result = self.delete_guild_cascade(&mut session, &guild_id).await;
            finish(&mut session, result).await
        })
        .retry(transaction_backoff())
        .when(is_retryable)
        .notify(log_retry("delete_guild"))
        .await?;

        info!(%guild_id, "Guild deleted with members and snapshots");
        Ok(())
    }
}
