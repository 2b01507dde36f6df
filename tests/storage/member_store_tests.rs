//! MemberStore interface tests.
//!
//! These tests verify the membership invariants: capacity, default-member
//! exemption, single membership per address and the removal precondition.
//! Each storage implementation should run these tests.

use std::sync::Arc;

use tokio::sync::Barrier;

use guilds_store::model::{AccountPortfolio, MemberFilter};
use guilds_store::storage::{GuildsDatabase, StorageError};

use super::{at, create_guild, holdings, unique_address};

async fn member_count<S: GuildsDatabase>(store: &S, guild_id: &str) -> u32 {
    store
        .get_single_guild(guild_id)
        .await
        .expect("guild should exist")
        .member_count
}

// =============================================================================
// MemberStore::add_member tests
// =============================================================================

pub async fn test_add_member_increments_count<S: GuildsDatabase>(store: &S) {
    let (guild_id, id) = create_guild(store, 3).await;
    let address = unique_address();

    store
        .add_member(&id, &address, false)
        .await
        .expect("add_member should succeed");

    assert_eq!(member_count(store, &id).await, 1);
    let members = store
        .list_guild_members(&MemberFilter::in_guild(guild_id))
        .await
        .expect("list members");
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].injective_address, address);
    assert_eq!(members[0].guild_id, guild_id);
    assert!(!members[0].is_default_guild_member);
}

pub async fn test_capacity_is_enforced<S: GuildsDatabase>(store: &S) {
    let (_, id) = create_guild(store, 2).await;

    store.add_member(&id, &unique_address(), false).await.expect("first");
    store.add_member(&id, &unique_address(), false).await.expect("second");

    let result = store.add_member(&id, &unique_address(), false).await;
    match result {
        Err(StorageError::MemberExceedsCapacity { capacity, .. }) => assert_eq!(capacity, 2),
        other => panic!("expected MemberExceedsCapacity, got {:?}", other),
    }
    assert_eq!(member_count(store, &id).await, 2, "rejected add must not count");
}

pub async fn test_zero_capacity_rejects_regular_members<S: GuildsDatabase>(store: &S) {
    let (_, id) = create_guild(store, 0).await;

    let result = store.add_member(&id, &unique_address(), false).await;
    assert!(matches!(
        result,
        Err(StorageError::MemberExceedsCapacity { .. })
    ));

    store
        .add_member(&id, &unique_address(), true)
        .await
        .expect("default members ignore capacity");
    assert_eq!(member_count(store, &id).await, 0);
}

pub async fn test_default_member_is_exempt<S: GuildsDatabase>(store: &S) {
    let (guild_id, id) = create_guild(store, 1).await;

    store.add_member(&id, &unique_address(), false).await.expect("fill");
    store
        .add_member(&id, &unique_address(), true)
        .await
        .expect("default member should be admitted to a full guild");

    assert_eq!(member_count(store, &id).await, 1, "default members are not counted");
    let members = store
        .list_guild_members(&MemberFilter::in_guild(guild_id))
        .await
        .expect("list members");
    assert_eq!(members.len(), 2);
}

pub async fn test_duplicate_address_is_rejected<S: GuildsDatabase>(store: &S) {
    let (_, first) = create_guild(store, 5).await;
    let (_, second) = create_guild(store, 5).await;
    let address = unique_address();

    store.add_member(&first, &address, false).await.expect("first join");

    let again = store.add_member(&first, &address, false).await;
    assert!(
        matches!(again, Err(StorageError::AlreadyMember { .. })),
        "same guild twice should be AlreadyMember, got {:?}",
        again
    );
    let elsewhere = store.add_member(&second, &address, false).await;
    assert!(
        matches!(elsewhere, Err(StorageError::AlreadyMember { .. })),
        "second guild should be AlreadyMember, got {:?}",
        elsewhere
    );

    assert_eq!(member_count(store, &first).await, 1);
    assert_eq!(
        member_count(store, &second).await,
        0,
        "rejected insert must roll back the increment"
    );
}

pub async fn test_duplicate_default_member_is_rejected<S: GuildsDatabase>(store: &S) {
    let (_, id) = create_guild(store, 5).await;
    let address = unique_address();

    store.add_member(&id, &address, true).await.expect("default join");
    let result = store.add_member(&id, &address, false).await;

    assert!(matches!(result, Err(StorageError::AlreadyMember { .. })));
    assert_eq!(member_count(store, &id).await, 0);
}

pub async fn test_add_member_to_missing_guild<S: GuildsDatabase>(store: &S) {
    let missing = uuid::Uuid::new_v4().to_string();

    for is_default in [false, true] {
        let result = store.add_member(&missing, &unique_address(), is_default).await;
        assert!(
            matches!(result, Err(StorageError::NotFound { .. })),
            "missing guild should be NotFound (default={}), got {:?}",
            is_default,
            result
        );
    }
}

pub async fn test_add_member_invalid_guild_id<S: GuildsDatabase>(store: &S) {
    let result = store.add_member("guild-42", &unique_address(), false).await;
    assert!(matches!(result, Err(StorageError::InvalidGuildId { .. })));
}

// =============================================================================
// MemberStore::remove_member tests
// =============================================================================

pub async fn test_remove_member_decrements_count<S: GuildsDatabase>(store: &S) {
    let (guild_id, id) = create_guild(store, 3).await;
    let address = unique_address();

    store.add_member(&id, &address, false).await.expect("add");
    store
        .remove_member(&id, &address)
        .await
        .expect("remove_member should succeed");

    assert_eq!(member_count(store, &id).await, 0);
    let members = store
        .list_guild_members(&MemberFilter::in_guild(guild_id))
        .await
        .expect("list members");
    assert!(members.is_empty());
}

pub async fn test_remove_default_member_keeps_count<S: GuildsDatabase>(store: &S) {
    let (_, id) = create_guild(store, 3).await;
    let regular = unique_address();
    let default_member = unique_address();

    store.add_member(&id, &regular, false).await.expect("add");
    store.add_member(&id, &default_member, true).await.expect("add default");

    store
        .remove_member(&id, &default_member)
        .await
        .expect("remove default member");
    assert_eq!(member_count(store, &id).await, 1);
}

pub async fn test_remove_non_member<S: GuildsDatabase>(store: &S) {
    let (_, id) = create_guild(store, 3).await;
    store.add_member(&id, &unique_address(), false).await.expect("add");

    let result = store.remove_member(&id, &unique_address()).await;
    match result {
        Err(StorageError::DeletionCountMismatch { expected, actual }) => {
            assert_eq!(expected, 1);
            assert_eq!(actual, 0);
        }
        other => panic!("expected DeletionCountMismatch, got {:?}", other),
    }
    assert_eq!(member_count(store, &id).await, 1, "count untouched");
}

pub async fn test_remove_member_of_other_guild<S: GuildsDatabase>(store: &S) {
    let (_, home) = create_guild(store, 3).await;
    let (_, other) = create_guild(store, 3).await;
    let address = unique_address();

    store.add_member(&home, &address, false).await.expect("add");

    let result = store.remove_member(&other, &address).await;
    assert!(matches!(
        result,
        Err(StorageError::DeletionCountMismatch { .. })
    ));
    assert_eq!(member_count(store, &home).await, 1);
}

pub async fn test_removal_frees_a_slot<S: GuildsDatabase>(store: &S) {
    let (_, id) = create_guild(store, 1).await;
    let leaving = unique_address();

    store.add_member(&id, &leaving, false).await.expect("fill");
    store.remove_member(&id, &leaving).await.expect("leave");
    store
        .add_member(&id, &unique_address(), false)
        .await
        .expect("freed slot should be reusable");
    store
        .add_member(&id, &leaving, false)
        .await
        .expect_err("guild is full again");
}

pub async fn test_remove_purges_member_snapshots<S: GuildsDatabase>(store: &S) {
    let (guild_id, id) = create_guild(store, 3).await;
    let leaving = unique_address();
    let staying = unique_address();

    store.add_member(&id, &leaving, false).await.expect("add");
    store.add_member(&id, &staying, false).await.expect("add");
    store
        .add_account_portfolios(vec![
            AccountPortfolio {
                injective_address: leaving.clone(),
                guild_id,
                updated_at: at(10),
                holdings: holdings(30.0),
            },
            AccountPortfolio {
                injective_address: staying.clone(),
                guild_id,
                updated_at: at(10),
                holdings: holdings(30.0),
            },
        ])
        .await
        .expect("add snapshots");

    store.remove_member(&id, &leaving).await.expect("remove");

    assert!(matches!(
        store.get_account_portfolio(&leaving).await,
        Err(StorageError::NotFound { .. })
    ));
    store
        .get_account_portfolio(&staying)
        .await
        .expect("other members keep their snapshots");
}

// =============================================================================
// MemberStore::list_guild_members / reconcile_member_count tests
// =============================================================================

pub async fn test_list_members_filters<S: GuildsDatabase>(store: &S) {
    let (guild_id, id) = create_guild(store, 5).await;
    let regular = unique_address();
    let default_member = unique_address();

    store.add_member(&id, &regular, false).await.expect("add");
    store.add_member(&id, &default_member, true).await.expect("add");

    let defaults = store
        .list_guild_members(&MemberFilter {
            guild_id: Some(guild_id),
            is_default_member: Some(true),
            injective_address: None,
        })
        .await
        .expect("list defaults");
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].injective_address, default_member);

    let by_address = store
        .list_guild_members(&MemberFilter {
            injective_address: Some(regular.clone()),
            ..MemberFilter::default()
        })
        .await
        .expect("list by address");
    assert_eq!(by_address.len(), 1);
    assert_eq!(by_address[0].guild_id, guild_id);

    let nobody = store
        .list_guild_members(&MemberFilter {
            injective_address: Some(unique_address()),
            ..MemberFilter::default()
        })
        .await
        .expect("empty listing is not an error");
    assert!(nobody.is_empty());
}

pub async fn test_reconcile_matches_records<S: GuildsDatabase>(store: &S) {
    let (_, id) = create_guild(store, 5).await;

    store.add_member(&id, &unique_address(), false).await.expect("add");
    store.add_member(&id, &unique_address(), false).await.expect("add");
    store.add_member(&id, &unique_address(), true).await.expect("add");

    let count = store
        .reconcile_member_count(&id)
        .await
        .expect("reconcile should succeed");
    assert_eq!(count, 2, "default members are not counted");
    assert_eq!(member_count(store, &id).await, 2);
}

pub async fn test_reconcile_missing_guild<S: GuildsDatabase>(store: &S) {
    let missing = uuid::Uuid::new_v4().to_string();
    let result = store.reconcile_member_count(&missing).await;
    assert!(matches!(result, Err(StorageError::NotFound { .. })));
}

// =============================================================================
// Concurrency
// =============================================================================

/// Two adds race for the last slot: exactly one wins.
pub async fn test_concurrent_adds_for_last_slot<S: GuildsDatabase + 'static>(store: Arc<S>) {
    let (_, id) = create_guild(store.as_ref(), 2).await;
    store.add_member(&id, &unique_address(), false).await.expect("first slot");

    let barrier = Arc::new(Barrier::new(2));
    let mut handles = Vec::new();
    for _ in 0..2 {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            store.add_member(&id, &unique_address(), false).await
        }));
    }

    let mut admitted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.expect("task should not panic") {
            Ok(()) => admitted += 1,
            Err(StorageError::MemberExceedsCapacity { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(admitted, 1, "exactly one add should win the last slot");
    assert_eq!(rejected, 1);
    assert_eq!(member_count(store.as_ref(), &id).await, 2);
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all MemberStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_member_store_tests {
    ($store:expr) => {
        use $crate::storage::member_store_tests::*;

        // add_member tests
        test_add_member_increments_count($store).await;
        println!("  test_add_member_increments_count: PASSED");

        test_capacity_is_enforced($store).await;
        println!("  test_capacity_is_enforced: PASSED");

        test_zero_capacity_rejects_regular_members($store).await;
        println!("  test_zero_capacity_rejects_regular_members: PASSED");

        test_default_member_is_exempt($store).await;
        println!("  test_default_member_is_exempt: PASSED");

        test_duplicate_address_is_rejected($store).await;
        println!("  test_duplicate_address_is_rejected: PASSED");

        test_duplicate_default_member_is_rejected($store).await;
        println!("  test_duplicate_default_member_is_rejected: PASSED");

        test_add_member_to_missing_guild($store).await;
        println!("  test_add_member_to_missing_guild: PASSED");

        test_add_member_invalid_guild_id($store).await;
        println!("  test_add_member_invalid_guild_id: PASSED");

        // remove_member tests
        test_remove_member_decrements_count($store).await;
        println!("  test_remove_member_decrements_count: PASSED");

        test_remove_default_member_keeps_count($store).await;
        println!("  test_remove_default_member_keeps_count: PASSED");

        test_remove_non_member($store).await;
        println!("  test_remove_non_member: PASSED");

        test_remove_member_of_other_guild($store).await;
        println!("  test_remove_member_of_other_guild: PASSED");

        test_removal_frees_a_slot($store).await;
        println!("  test_removal_frees_a_slot: PASSED");

        test_remove_purges_member_snapshots($store).await;
        println!("  test_remove_purges_member_snapshots: PASSED");

        // listing and repair tests
        test_list_members_filters($store).await;
        println!("  test_list_members_filters: PASSED");

        test_reconcile_matches_records($store).await;
        println!("  test_reconcile_matches_records: PASSED");

        test_reconcile_missing_guild($store).await;
        println!("  test_reconcile_missing_guild: PASSED");
    };
}
