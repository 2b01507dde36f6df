//! SQLite DenomStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::SqliteStorage;
use crate::model::Denom;
use crate::storage::schema::Denoms;
use crate::storage::{DenomStore, Result, StorageError};

const DENOM_COLUMNS: [Denoms; 4] = [
    Denoms::Denom,
    Denoms::Symbol,
    Denoms::Decimals,
    Denoms::DisplayName,
];

fn denom_from_row(row: &SqliteRow) -> Result<Denom> {
    let decimals: i64 = row.try_get("decimals")?;
    Ok(Denom {
        denom: row.try_get("denom")?,
        symbol: row.try_get("symbol")?,
        decimals: u8::try_from(decimals)
            .map_err(|_| StorageError::Decode(format!("decimals out of range: {decimals}")))?,
        display_name: row.try_get("display_name")?,
    })
}

fn upsert_query(denoms: Vec<Denom>) -> String {
    let mut insert = Query::insert();
    insert.into_table(Denoms::Table).columns(DENOM_COLUMNS);
    for denom in denoms {
        insert.values_panic([
            denom.denom.into(),
            denom.symbol.into(),
            denom.decimals.into(),
            denom.display_name.into(),
        ]);
    }
    insert.on_conflict(
        OnConflict::column(Denoms::Denom)
            .update_columns([Denoms::Symbol, Denoms::Decimals, Denoms::DisplayName])
            .to_owned(),
    );

    insert.to_string(SqliteQueryBuilder)
}

#[async_trait]
impl DenomStore for SqliteStorage {
    async fn upsert_denoms(&self, denoms: Vec<Denom>) -> Result<()> {
        if denoms.is_empty() {
            return Ok(());
        }

        let query = upsert_query(denoms);
        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn get_denom(&self, denom: &str) -> Result<Denom> {
        let query = Query::select()
            .columns(DENOM_COLUMNS)
            .from(Denoms::Table)
            .and_where(Expr::col(Denoms::Denom).eq(denom))
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&query).fetch_optional(&self.pool).await? {
            Some(row) => denom_from_row(&row),
            None => Err(StorageError::NotFound {
                entity: "denom",
                key: denom.to_string(),
            }),
        }
    }

    async fn list_denoms(&self) -> Result<Vec<Denom>> {
        let query = Query::select()
            .columns(DENOM_COLUMNS)
            .from(Denoms::Table)
            .order_by(Denoms::Denom, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(denom_from_row).collect()
    }
}
