// Unit-of-work and store behavior through the public API

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use gatehouse::auth::register_identity_tables;
use gatehouse::core::models::Role;
use gatehouse::store::{EntityStore, SaveGuard};
use gatehouse::{MemoryDb, StoreError, UnitOfWork, User};

fn fresh() -> (Arc<MemoryDb>, UnitOfWork) {
    let db = MemoryDb::new();
    register_identity_tables(&db);
    let uow = UnitOfWork::new(&db);
    (db, uow)
}

fn user(tag: &str) -> User {
    User::create(
        tag,
        tag,
        format!("{tag}@example.com"),
        "hash",
        None,
        Role::Standard,
        0,
    )
}

#[tokio::test]
async fn test_insert_update_read_round_trip() {
    let (_db, uow) = fresh();
    let ct = CancellationToken::new();
    let users = uow.store::<User>();

    let created = user("ada");
    let id = created.id;

    uow.begin_transaction(&ct).await.unwrap();
    users.add(created, &ct).await.unwrap();
    uow.save_changes(&ct).await.unwrap();
    uow.commit_transaction(&ct).await.unwrap();

    let mut fetched = users.find_by_id(id, &ct).await.unwrap().unwrap();
    fetched.name = "Ada Lovelace".to_string();

    uow.begin_transaction(&ct).await.unwrap();
    users.update(fetched, &ct).await.unwrap();
    uow.save_changes(&ct).await.unwrap();
    uow.commit_transaction(&ct).await.unwrap();

    let fetched = users.find_by_id(id, &ct).await.unwrap().unwrap();
    assert_eq!(fetched.name, "Ada Lovelace");
}

#[tokio::test]
async fn test_rollback_discards_saved_changes() {
    let (_db, uow) = fresh();
    let ct = CancellationToken::new();
    let users = uow.store::<User>();

    uow.begin_transaction(&ct).await.unwrap();
    users.add(user("ada"), &ct).await.unwrap();
    uow.save_changes(&ct).await.unwrap();
    // Saved but not committed: rollback still wins
    uow.rollback_transaction(&ct).await.unwrap();

    assert_eq!(users.count(|_| true, &ct).await.unwrap(), 0);
    assert!(!uow.is_transaction_active());
}

#[tokio::test]
async fn test_staged_work_discarded_without_save() {
    let (_db, uow) = fresh();
    let ct = CancellationToken::new();
    let users = uow.store::<User>();

    uow.begin_transaction(&ct).await.unwrap();
    users.add(user("ada"), &ct).await.unwrap();
    uow.rollback_transaction(&ct).await.unwrap();

    // The staged insert never reached the tables and the queue is empty:
    // a later save applies nothing.
    uow.begin_transaction(&ct).await.unwrap();
    assert_eq!(uow.save_changes(&ct).await.unwrap(), 0);
    uow.commit_transaction(&ct).await.unwrap();
    assert_eq!(users.count(|_| true, &ct).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unique_violation_aborts_whole_flush() {
    let (_db, uow) = fresh();
    let ct = CancellationToken::new();
    let users = uow.store::<User>();

    uow.begin_transaction(&ct).await.unwrap();
    users.add(user("ada"), &ct).await.unwrap();
    uow.save_changes(&ct).await.unwrap();
    uow.commit_transaction(&ct).await.unwrap();

    uow.begin_transaction(&ct).await.unwrap();
    users.add(user("bob"), &ct).await.unwrap();
    let mut dup = user("eve");
    dup.email = "ada@example.com".to_string();
    dup.email_lower = "ada@example.com".to_string();
    users.add(dup, &ct).await.unwrap();

    let err = uow.save_changes(&ct).await.unwrap_err();
    assert_eq!(err, StoreError::UniqueViolation { field: "email" });
    uow.rollback_transaction(&ct).await.unwrap();

    // Neither bob nor the duplicate landed
    assert_eq!(users.count(|_| true, &ct).await.unwrap(), 1);
}

#[tokio::test]
async fn test_inactive_accounts_release_identifiers() {
    let (_db, uow) = fresh();
    let ct = CancellationToken::new();
    let users = uow.store::<User>();

    let mut departed = user("ada");
    departed.is_active = false;

    uow.begin_transaction(&ct).await.unwrap();
    users.add(departed, &ct).await.unwrap();
    users.add(user("ada2"), &ct).await.unwrap();
    uow.save_changes(&ct).await.unwrap();
    uow.commit_transaction(&ct).await.unwrap();

    // Same email as the inactive account is allowed
    let mut successor = user("bob");
    successor.email = "ada@example.com".to_string();
    successor.email_lower = "ada@example.com".to_string();

    uow.begin_transaction(&ct).await.unwrap();
    users.add(successor, &ct).await.unwrap();
    assert!(uow.save_changes(&ct).await.is_ok());
    uow.commit_transaction(&ct).await.unwrap();
}

#[tokio::test]
async fn test_get_single_vs_get_on_ambiguous_filter() {
    let (_db, uow) = fresh();
    let ct = CancellationToken::new();
    let users = uow.store::<User>();

    uow.begin_transaction(&ct).await.unwrap();
    users.add(user("ada"), &ct).await.unwrap();
    users.add(user("bob"), &ct).await.unwrap();
    uow.save_changes(&ct).await.unwrap();
    uow.commit_transaction(&ct).await.unwrap();

    let err = users
        .get_single(|u: &User| u.is_active, false, &ct)
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::MultipleMatches);

    let all = users.get(|u: &User| u.is_active, false, &ct).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_projection_and_paging() {
    let (_db, uow) = fresh();
    let ct = CancellationToken::new();
    let users = uow.store::<User>();

    uow.begin_transaction(&ct).await.unwrap();
    for tag in ["a", "b", "c", "d"] {
        users.add(user(tag), &ct).await.unwrap();
    }
    uow.save_changes(&ct).await.unwrap();
    uow.commit_transaction(&ct).await.unwrap();

    // Paging is a stable window over the id-ordered projection
    let ordered: Vec<String> = users
        .get_page(|_| true, |u| u.username.clone(), 0, usize::MAX, false, &ct)
        .await
        .unwrap();
    let page: Vec<String> = users
        .get_page(|_| true, |u| u.username.clone(), 1, 2, false, &ct)
        .await
        .unwrap();
    assert_eq!(page, ordered[1..3].to_vec());

    let emails: Vec<String> = users
        .get_projected(|u| u.username == "a", |u| u.email.clone(), false, &ct)
        .await
        .unwrap();
    assert_eq!(emails, vec!["a@example.com".to_string()]);
}

#[tokio::test]
async fn test_cancellation_checked_before_work() {
    let (_db, uow) = fresh();
    let ct = CancellationToken::new();
    ct.cancel();

    assert_eq!(
        uow.begin_transaction(&ct).await.unwrap_err(),
        StoreError::Cancelled
    );

    let users = uow.store::<User>();
    assert_eq!(
        users.get_all(false, &ct).await.unwrap_err(),
        StoreError::Cancelled
    );
    assert_eq!(
        users.add(user("x"), &ct).await.unwrap_err(),
        StoreError::Cancelled
    );
}

#[tokio::test]
async fn test_legacy_save_guard_is_available() {
    let db = MemoryDb::new();
    register_identity_tables(&db);
    let uow = UnitOfWork::with_guard(&db, SaveGuard::LegacyRejectInTransaction);
    let ct = CancellationToken::new();
    let users = uow.store::<User>();

    users.add(user("ada"), &ct).await.unwrap();
    assert_eq!(uow.save_changes(&ct).await.unwrap(), 1);

    uow.begin_transaction(&ct).await.unwrap();
    assert_eq!(
        uow.save_changes(&ct).await.unwrap_err(),
        StoreError::SaveInsideTransaction
    );
    uow.rollback_transaction(&ct).await.unwrap();
}

#[tokio::test]
async fn test_commit_survives_other_sessions_rollback() {
    let db = MemoryDb::new();
    register_identity_tables(&db);
    let ct = CancellationToken::new();

    let first = UnitOfWork::new(&db);
    first.begin_transaction(&ct).await.unwrap();

    // A second unit of work wanting its own transaction parks on the gate
    // until the first one resolves.
    let db2 = Arc::clone(&db);
    let second = tokio::spawn(async move {
        let ct = CancellationToken::new();
        let uow = UnitOfWork::new(&db2);
        uow.begin_transaction(&ct).await.unwrap();
        uow.store::<User>().add(user("bee"), &ct).await.unwrap();
        uow.save_changes(&ct).await.unwrap();
        uow.commit_transaction(&ct).await.unwrap();
    });

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    first.rollback_transaction(&ct).await.unwrap();
    second.await.unwrap();

    // The second session's committed user is still there
    let uow = UnitOfWork::new(&db);
    assert_eq!(uow.store::<User>().count(|_| true, &ct).await.unwrap(), 1);
}

#[tokio::test]
async fn test_begin_cancellable_while_waiting_for_transaction() {
    let db = MemoryDb::new();
    register_identity_tables(&db);
    let ct = CancellationToken::new();

    let holder = UnitOfWork::new(&db);
    holder.begin_transaction(&ct).await.unwrap();

    let db2 = Arc::clone(&db);
    let waiter_ct = CancellationToken::new();
    let waiter_ct2 = waiter_ct.clone();
    let waiter = tokio::spawn(async move {
        let uow = UnitOfWork::new(&db2);
        uow.begin_transaction(&waiter_ct2).await
    });

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    waiter_ct.cancel();
    assert_eq!(waiter.await.unwrap().unwrap_err(), StoreError::Cancelled);

    holder.rollback_transaction(&ct).await.unwrap();
}

#[tokio::test]
async fn test_close_then_use_fails() {
    let (_db, uow) = fresh();
    let ct = CancellationToken::new();
    let users = uow.store::<User>();

    uow.close().await.unwrap();
    assert_eq!(
        uow.begin_transaction(&ct).await.unwrap_err(),
        StoreError::SessionClosed
    );
    assert_eq!(
        users.add(user("x"), &ct).await.unwrap_err(),
        StoreError::SessionClosed
    );
}
