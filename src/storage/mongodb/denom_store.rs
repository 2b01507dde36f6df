//! MongoDB DenomStore implementation.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOptions, UpdateOptions};

use super::MongoStorage;
use crate::model::Denom;
use crate::storage::{DenomStore, Result, StorageError};

fn denom_from_document(doc: &Document) -> Result<Denom> {
    let decimals = doc.get_i32("decimals")?;
    Ok(Denom {
        denom: doc.get_str("_id")?.to_string(),
        symbol: doc.get_str("symbol")?.to_string(),
        decimals: u8::try_from(decimals)
            .map_err(|_| StorageError::Decode(format!("decimals out of range: {decimals}")))?,
        display_name: doc.get_str("display_name")?.to_string(),
    })
}

#[async_trait]
impl DenomStore for MongoStorage {
    async fn upsert_denoms(&self, denoms: Vec<Denom>) -> Result<()> {
        for denom in denoms {
            let options = UpdateOptions::builder().upsert(true).build();
            self.denoms
                .update_one(
                    doc! { "_id": &denom.denom },
                    doc! {
                        "$set": {
                            "symbol": &denom.symbol,
                            "decimals": i32::from(denom.decimals),
                            "display_name": &denom.display_name,
                        }
                    },
                )
                .with_options(options)
                .await?;
        }
        Ok(())
    }

    async fn get_denom(&self, denom: &str) -> Result<Denom> {
        match self.denoms.find_one(doc! { "_id": denom }).await? {
            Some(doc) => denom_from_document(&doc),
            None => Err(StorageError::NotFound {
                entity: "denom",
                key: denom.to_string(),
            }),
        }
    }

    async fn list_denoms(&self) -> Result<Vec<Denom>> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let docs: Vec<_> = self
            .denoms
            .find(doc! {})
            .with_options(options)
            .await?
            .try_collect()
            .await?;
        docs.iter().map(denom_from_document).collect()
    }
}
