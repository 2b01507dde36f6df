//! PortfolioStore interface tests.
//!
//! These tests verify snapshot ordering, the half-open time window and the
//! latest-snapshot lookups. Each storage implementation should run these tests.

use guilds_store::model::{
    AccountPortfolio, AccountPortfoliosFilter, Address, GuildId, GuildPortfolio,
    GuildPortfoliosFilter,
};
use guilds_store::storage::{GuildsDatabase, StorageError};

use super::{at, create_guild, holdings, unique_address};

fn account_snapshot(address: &Address, guild_id: GuildId, offset_secs: i64) -> AccountPortfolio {
    AccountPortfolio {
        injective_address: address.clone(),
        guild_id,
        updated_at: at(offset_secs),
        holdings: holdings(offset_secs as f64),
    }
}

fn guild_snapshot(guild_id: GuildId, offset_secs: i64) -> GuildPortfolio {
    GuildPortfolio {
        guild_id,
        updated_at: at(offset_secs),
        holdings: holdings(offset_secs as f64),
    }
}

// =============================================================================
// Account snapshot tests
// =============================================================================

pub async fn test_account_snapshots_newest_first<S: GuildsDatabase>(store: &S) {
    let (guild_id, _) = create_guild(store, 1).await;
    let address = unique_address();

    // inserted out of order on purpose
    store
        .add_account_portfolios(vec![
            account_snapshot(&address, guild_id, 2),
            account_snapshot(&address, guild_id, 1),
            account_snapshot(&address, guild_id, 3),
        ])
        .await
        .expect("add snapshots");

    let snapshots = store
        .list_account_portfolios(&AccountPortfoliosFilter::for_address(address))
        .await
        .expect("list snapshots");

    let times: Vec<_> = snapshots.iter().map(|s| s.updated_at).collect();
    assert_eq!(times, vec![at(3), at(2), at(1)]);
}

pub async fn test_account_window_is_half_open<S: GuildsDatabase>(store: &S) {
    let (guild_id, _) = create_guild(store, 1).await;
    let address = unique_address();

    store
        .add_account_portfolios(vec![
            account_snapshot(&address, guild_id, 1),
            account_snapshot(&address, guild_id, 2),
            account_snapshot(&address, guild_id, 3),
        ])
        .await
        .expect("add snapshots");

    let snapshots = store
        .list_account_portfolios(&AccountPortfoliosFilter {
            start_time: Some(at(1)),
            end_time: Some(at(3)),
            ..AccountPortfoliosFilter::for_address(address)
        })
        .await
        .expect("list snapshots");

    let times: Vec<_> = snapshots.iter().map(|s| s.updated_at).collect();
    assert_eq!(times, vec![at(2), at(1)], "start is inclusive, end exclusive");
}

pub async fn test_account_limit_keeps_newest<S: GuildsDatabase>(store: &S) {
    let (guild_id, _) = create_guild(store, 1).await;
    let address = unique_address();

    store
        .add_account_portfolios((1..=5).map(|t| account_snapshot(&address, guild_id, t)).collect())
        .await
        .expect("add snapshots");

    let snapshots = store
        .list_account_portfolios(&AccountPortfoliosFilter {
            limit: Some(2),
            ..AccountPortfoliosFilter::for_address(address)
        })
        .await
        .expect("list snapshots");

    let times: Vec<_> = snapshots.iter().map(|s| s.updated_at).collect();
    assert_eq!(times, vec![at(5), at(4)]);
}

pub async fn test_latest_account_snapshot<S: GuildsDatabase>(store: &S) {
    let (guild_id, _) = create_guild(store, 1).await;
    let address = unique_address();

    store
        .add_account_portfolios(vec![
            account_snapshot(&address, guild_id, 7),
            account_snapshot(&address, guild_id, 9),
            account_snapshot(&address, guild_id, 8),
        ])
        .await
        .expect("add snapshots");

    let latest = store
        .get_account_portfolio(&address)
        .await
        .expect("latest snapshot");
    assert_eq!(latest.updated_at, at(9));
    assert_eq!(latest.guild_id, guild_id);
    assert_eq!(latest.holdings, holdings(9.0), "holdings survive storage intact");
}

pub async fn test_missing_account_snapshot<S: GuildsDatabase>(store: &S) {
    let address = unique_address();

    let result = store.get_account_portfolio(&address).await;
    assert!(matches!(result, Err(StorageError::NotFound { .. })));

    let listed = store
        .list_account_portfolios(&AccountPortfoliosFilter::for_address(address))
        .await
        .expect("empty listing is not an error");
    assert!(listed.is_empty());
}

// =============================================================================
// Guild snapshot tests
// =============================================================================

pub async fn test_guild_snapshots_newest_first<S: GuildsDatabase>(store: &S) {
    let (guild_id, id) = create_guild(store, 1).await;

    store
        .add_guild_portfolios(vec![
            guild_snapshot(guild_id, 1),
            guild_snapshot(guild_id, 3),
            guild_snapshot(guild_id, 2),
        ])
        .await
        .expect("add snapshots");

    let all = store
        .list_guild_portfolios(&GuildPortfoliosFilter::for_guild(&id))
        .await
        .expect("list snapshots");
    let times: Vec<_> = all.iter().map(|s| s.updated_at).collect();
    assert_eq!(times, vec![at(3), at(2), at(1)]);

    let windowed = store
        .list_guild_portfolios(&GuildPortfoliosFilter {
            start_time: Some(at(1)),
            end_time: Some(at(3)),
            ..GuildPortfoliosFilter::for_guild(&id)
        })
        .await
        .expect("list snapshots");
    let times: Vec<_> = windowed.iter().map(|s| s.updated_at).collect();
    assert_eq!(times, vec![at(2), at(1)]);
}

pub async fn test_latest_guild_snapshot<S: GuildsDatabase>(store: &S) {
    let (guild_id, id) = create_guild(store, 1).await;

    let missing = store.get_guild_portfolio(&id).await;
    assert!(matches!(missing, Err(StorageError::NotFound { .. })));

    store
        .add_guild_portfolios(vec![guild_snapshot(guild_id, 4), guild_snapshot(guild_id, 6)])
        .await
        .expect("add snapshots");

    let latest = store.get_guild_portfolio(&id).await.expect("latest snapshot");
    assert_eq!(latest.updated_at, at(6));
}

pub async fn test_guild_snapshots_invalid_guild_id<S: GuildsDatabase>(store: &S) {
    let result = store
        .list_guild_portfolios(&GuildPortfoliosFilter::for_guild("nope"))
        .await;
    assert!(matches!(result, Err(StorageError::InvalidGuildId { .. })));

    let result = store.get_guild_portfolio("nope").await;
    assert!(matches!(result, Err(StorageError::InvalidGuildId { .. })));
}

pub async fn test_empty_batches_are_noops<S: GuildsDatabase>(store: &S) {
    store
        .add_account_portfolios(Vec::new())
        .await
        .expect("empty account batch");
    store
        .add_guild_portfolios(Vec::new())
        .await
        .expect("empty guild batch");
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all PortfolioStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_portfolio_store_tests {
    ($store:expr) => {
        use $crate::storage::portfolio_store_tests::*;

        test_account_snapshots_newest_first($store).await;
        println!("  test_account_snapshots_newest_first: PASSED");

        test_account_window_is_half_open($store).await;
        println!("  test_account_window_is_half_open: PASSED");

        test_account_limit_keeps_newest($store).await;
        println!("  test_account_limit_keeps_newest: PASSED");

        test_latest_account_snapshot($store).await;
        println!("  test_latest_account_snapshot: PASSED");

        test_missing_account_snapshot($store).await;
        println!("  test_missing_account_snapshot: PASSED");

        test_guild_snapshots_newest_first($store).await;
        println!("  test_guild_snapshots_newest_first: PASSED");

        test_latest_guild_snapshot($store).await;
        println!("  test_latest_guild_snapshot: PASSED");

        test_guild_snapshots_invalid_guild_id($store).await;
        println!("  test_guild_snapshots_invalid_guild_id: PASSED");

        test_empty_batches_are_noops($store).await;
        println!("  test_empty_batches_are_noops: PASSED");
    };
}
