//! DenomStore interface tests.

use uuid::Uuid;

use guilds_store::model::Denom;
use guilds_store::storage::{GuildsDatabase, StorageError};

fn make_denom(denom: &str, symbol: &str, decimals: u8) -> Denom {
    Denom {
        denom: denom.to_string(),
        symbol: symbol.to_string(),
        decimals,
        display_name: format!("{} token", symbol),
    }
}

fn unique_denom() -> String {
    format!("factory/test/{}", Uuid::new_v4().simple())
}

pub async fn test_upsert_and_get_denom<S: GuildsDatabase>(store: &S) {
    let name = unique_denom();
    store
        .upsert_denoms(vec![make_denom(&name, "TST", 18)])
        .await
        .expect("upsert should succeed");

    let denom = store.get_denom(&name).await.expect("denom should exist");
    assert_eq!(denom, make_denom(&name, "TST", 18));
}

pub async fn test_upsert_overwrites_metadata<S: GuildsDatabase>(store: &S) {
    let name = unique_denom();
    store
        .upsert_denoms(vec![make_denom(&name, "OLD", 6)])
        .await
        .expect("first upsert");
    store
        .upsert_denoms(vec![make_denom(&name, "NEW", 8)])
        .await
        .expect("second upsert");

    let denom = store.get_denom(&name).await.expect("denom should exist");
    assert_eq!(denom.symbol, "NEW");
    assert_eq!(denom.decimals, 8);

    let listed = store.list_denoms().await.expect("list denoms");
    assert_eq!(
        listed.iter().filter(|d| d.denom == name).count(),
        1,
        "upsert must not duplicate"
    );
}

pub async fn test_get_missing_denom<S: GuildsDatabase>(store: &S) {
    let result = store.get_denom(&unique_denom()).await;
    assert!(matches!(
        result,
        Err(StorageError::NotFound { entity: "denom", .. })
    ));
}

/// Run all DenomStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_denom_store_tests {
    ($store:expr) => {
        use $crate::storage::denom_store_tests::*;

        test_upsert_and_get_denom($store).await;
        println!("  test_upsert_and_get_denom: PASSED");

        test_upsert_overwrites_metadata($store).await;
        println!("  test_upsert_overwrites_metadata: PASSED");

        test_get_missing_denom($store).await;
        println!("  test_get_missing_denom: PASSED");
    };
}
