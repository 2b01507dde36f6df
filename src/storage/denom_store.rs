//! DenomStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::model::Denom;

/// Interface for denomination reference data.
#[async_trait]
pub trait DenomStore: Send + Sync {
    /// Insert or replace denoms keyed by `Denom::denom`.
    async fn upsert_denoms(&self, denoms: Vec<Denom>) -> Result<()>;

    async fn get_denom(&self, denom: &str) -> Result<Denom>;

    /// All denoms ordered by `denom`.
    async fn list_denoms(&self) -> Result<Vec<Denom>>;
}
