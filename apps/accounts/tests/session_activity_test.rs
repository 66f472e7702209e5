//! Session activity lifecycle against the in-memory store.

mod common;

use std::sync::Arc;

use accounts::directory::UserDirectory;
use accounts::store::MemoryStore;
use accounts::tokens::generate_session_token;
use accounts::{RecordState, SessionActivity, SessionActivityManager, SessionError};
use assert_matches::assert_matches;
use chrono::{Duration, Utc};

// =========================================================================
// Create / list / count
// =========================================================================

#[tokio::test]
async fn create_session_assigns_id_and_timestamp_on_commit() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);

    let pending = SessionActivity::new(&user.id, "teststring");
    assert_eq!(pending.id(), None);
    assert_eq!(pending.created(), None);

    let record = h.sessions.create_session_with(pending).await.unwrap();
    assert!(record.id().is_some_and(|id| id > 0));
    assert!(record.created().is_some());
    assert_eq!(record.state(), RecordState::Persisted);

    let active = h.sessions.list_active_sessions(&user.id).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0], record);
}

#[tokio::test]
async fn second_session_is_listed_and_counted() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);

    h.sessions.create_session(&user.id, "teststring").await.unwrap();
    let second = h.sessions.create_session(&user.id, "testring_2").await.unwrap();

    assert_eq!(h.sessions.count_active_sessions(&user.id).await.unwrap(), 2);

    let tokens: Vec<String> = h
        .sessions
        .list_active_sessions(&user.id)
        .await
        .unwrap()
        .iter()
        .map(|s| s.sid_s().to_string())
        .collect();
    assert!(tokens.contains(&"teststring".to_string()));
    assert!(tokens.contains(&"testring_2".to_string()));

    let found = h.sessions.find_by_token("testring_2").await.unwrap();
    assert_eq!(found, Some(second));
}

#[tokio::test]
async fn count_agrees_with_list_at_rest() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);
    let other = common::create_test_user(&h.directory);

    for _ in 0..3 {
        h.sessions
            .create_session(&user.id, &generate_session_token())
            .await
            .unwrap();
    }
    h.sessions
        .create_session(&other.id, &generate_session_token())
        .await
        .unwrap();

    let listed = h.sessions.list_active_sessions(&user.id).await.unwrap();
    let counted = h.sessions.count_active_sessions(&user.id).await.unwrap();
    assert_eq!(counted, listed.len());
    assert_eq!(counted, 3);
    assert!(listed.iter().all(|s| s.user_id() == user.id));
}

#[tokio::test]
async fn user_relationship_is_a_fresh_query() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);
    let user = h.directory.get_user(&user.id).await.unwrap().unwrap();

    assert!(user.active_sessions(&h.sessions).await.unwrap().is_empty());
    let record = h.sessions.create_session(&user.id, "teststring").await.unwrap();
    assert_eq!(user.active_sessions(&h.sessions).await.unwrap(), vec![record]);
}

#[tokio::test]
async fn client_metadata_is_persisted() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);

    let record = h
        .sessions
        .create_session_with(
            SessionActivity::new(&user.id, "sid")
                .with_ip("192.0.2.10")
                .with_user_agent("Mozilla/5.0"),
        )
        .await
        .unwrap();

    let listed = h.sessions.list_active_sessions(&user.id).await.unwrap();
    assert_eq!(listed[0].ip(), Some("192.0.2.10"));
    assert_eq!(listed[0].user_agent(), Some("Mozilla/5.0"));
    assert_eq!(listed[0], record);
}

#[tokio::test]
async fn creating_an_already_persisted_record_is_invalid() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);
    let record = h.sessions.create_session(&user.id, "sid").await.unwrap();

    let result = h.sessions.create_session_with(record).await;
    assert_matches!(result, Err(SessionError::InvalidState(_)));
    assert_eq!(h.sessions.count_active_sessions(&user.id).await.unwrap(), 1);
}

// =========================================================================
// Revoke
// =========================================================================

#[tokio::test]
async fn listed_view_stays_stale_until_listed_again() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);
    h.sessions.create_session(&user.id, "teststring").await.unwrap();
    h.sessions.create_session(&user.id, "testring_2").await.unwrap();

    let mut view = h.sessions.list_active_sessions(&user.id).await.unwrap();
    assert_eq!(view.len(), 2);
    let revoked_token = view[0].sid_s().to_string();

    h.sessions.revoke_session(&mut view[0]).await.unwrap();

    // The earlier snapshot still holds both members.
    assert_eq!(view.len(), 2);
    assert_eq!(view[0].state(), RecordState::Deleted);

    let fresh = h.sessions.list_active_sessions(&user.id).await.unwrap();
    assert_eq!(fresh.len(), 1);
    assert_ne!(fresh[0].sid_s(), revoked_token);
}

#[tokio::test]
async fn revoke_decrements_count_by_one() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);
    let mut first = h.sessions.create_session(&user.id, "a").await.unwrap();
    h.sessions.create_session(&user.id, "b").await.unwrap();
    h.sessions.create_session(&user.id, "c").await.unwrap();

    let before = h.sessions.count_active_sessions(&user.id).await.unwrap();
    h.sessions.revoke_session(&mut first).await.unwrap();
    let after = h.sessions.count_active_sessions(&user.id).await.unwrap();

    assert_eq!(before - after, 1);
    let listed = h.sessions.list_active_sessions(&user.id).await.unwrap();
    assert!(listed.iter().all(|s| s.id() != first.id()));
}

#[tokio::test]
async fn revoking_an_unpersisted_record_is_invalid() {
    let h = common::memory_harness();
    let mut record = SessionActivity::new("usr_nobody", "sid");
    let result = h.sessions.revoke_session(&mut record).await;
    assert_matches!(result, Err(SessionError::InvalidState(_)));
}

#[tokio::test]
async fn revoking_the_same_handle_twice_is_invalid() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);
    let mut record = h.sessions.create_session(&user.id, "sid").await.unwrap();

    h.sessions.revoke_session(&mut record).await.unwrap();
    let result = h.sessions.revoke_session(&mut record).await;
    assert_matches!(result, Err(SessionError::InvalidState(_)));
}

#[tokio::test]
async fn revoking_a_row_removed_elsewhere_is_not_found() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);
    let mut record = h.sessions.create_session(&user.id, "sid").await.unwrap();
    let mut copy = record.clone();

    h.sessions.revoke_session(&mut record).await.unwrap();
    let result = h.sessions.revoke_session(&mut copy).await;
    assert_matches!(result, Err(SessionError::NotFound));
    assert_eq!(copy.state(), RecordState::Persisted);
}

#[tokio::test]
async fn concurrent_revokes_let_exactly_one_succeed() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);
    let record = h.sessions.create_session(&user.id, "sid").await.unwrap();

    let mut a = h.sessions.begin().await.unwrap();
    let mut b = h.sessions.begin().await.unwrap();
    a.revoke(record.clone()).await.unwrap();
    b.revoke(record).await.unwrap();

    let results = [a.commit().await, b.commit().await];
    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(SessionError::NotFound))));
    assert_eq!(h.sessions.count_active_sessions(&user.id).await.unwrap(), 0);
}

#[tokio::test]
async fn revoke_by_token_removes_the_session() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);
    let token = generate_session_token();
    h.sessions.create_session(&user.id, &token).await.unwrap();

    h.sessions.revoke_by_token(&token).await.unwrap();
    assert_eq!(h.sessions.find_by_token(&token).await.unwrap(), None);
    assert_matches!(
        h.sessions.revoke_by_token(&token).await,
        Err(SessionError::NotFound)
    );
}

#[tokio::test]
async fn revoke_all_only_touches_that_user() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);
    let other = common::create_test_user(&h.directory);
    h.sessions.create_session(&user.id, "a").await.unwrap();
    h.sessions.create_session(&user.id, "b").await.unwrap();
    h.sessions.create_session(&other.id, "c").await.unwrap();

    assert_eq!(h.sessions.revoke_all_for_user(&user.id).await.unwrap(), 2);
    assert_eq!(h.sessions.count_active_sessions(&user.id).await.unwrap(), 0);
    assert_eq!(h.sessions.count_active_sessions(&other.id).await.unwrap(), 1);
    assert_eq!(h.sessions.revoke_all_for_user(&user.id).await.unwrap(), 0);
}

#[tokio::test]
async fn sweep_removes_only_expired_sessions() {
    let h = common::memory_harness();
    let sessions = h.sessions.clone().with_lifetime(Duration::hours(1));
    let user = common::create_test_user(&h.directory);
    let record = sessions.create_session(&user.id, "old").await.unwrap();

    // Nothing has outlived the lifetime yet.
    assert_eq!(sessions.sweep_expired(Utc::now()).await.unwrap(), 0);

    let later = Utc::now() + Duration::hours(1) + Duration::seconds(1);
    let fresh = sessions.create_session(&user.id, "new").await.unwrap();
    assert!(record.is_expired(sessions.lifetime(), later));

    // Only rows created strictly before `later - lifetime` go.
    let removed = sessions
        .sweep_expired(fresh.created().unwrap() + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    let left = sessions.list_active_sessions(&user.id).await.unwrap();
    assert_eq!(left, vec![fresh]);
}

#[tokio::test]
async fn sweep_with_unrepresentable_cutoff_removes_nothing() {
    let h = common::memory_harness();
    let sessions = h
        .sessions
        .clone()
        .with_lifetime(Duration::seconds(1_000_000_000_000_000));
    let user = common::create_test_user(&h.directory);
    sessions.create_session(&user.id, "kept").await.unwrap();

    assert_eq!(sessions.sweep_expired(Utc::now()).await.unwrap(), 0);
    assert_eq!(sessions.count_active_sessions(&user.id).await.unwrap(), 1);
}

// =========================================================================
// Explicit transactions
// =========================================================================

#[tokio::test]
async fn unit_of_work_reads_its_own_writes() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);
    let existing = h.sessions.create_session(&user.id, "teststring").await.unwrap();

    let mut tx = h.sessions.begin().await.unwrap();
    tx.add(SessionActivity::new(&user.id, "testring_2"))
        .await
        .unwrap();
    assert_eq!(tx.count_active_sessions(&user.id).await.unwrap(), 2);
    assert_eq!(h.sessions.count_active_sessions(&user.id).await.unwrap(), 1);

    tx.revoke(existing).await.unwrap();
    let inside = tx.list_active_sessions(&user.id).await.unwrap();
    assert_eq!(inside.len(), 1);
    assert_eq!(inside[0].sid_s(), "testring_2");
    // Outside readers still see the committed state.
    assert_eq!(h.sessions.count_active_sessions(&user.id).await.unwrap(), 1);

    let committed = tx.commit().await.unwrap();
    assert_eq!(committed.added.len(), 1);
    assert!(committed.added[0].id().is_some());
    assert_eq!(committed.added[0].state(), RecordState::Persisted);
    assert_eq!(committed.revoked.len(), 1);
    assert_eq!(committed.revoked[0].state(), RecordState::Deleted);

    let after = h.sessions.list_active_sessions(&user.id).await.unwrap();
    assert_eq!(after, committed.added);
}

#[tokio::test]
async fn handle_revoked_through_unit_of_work_cannot_be_revoked_again() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);
    let record = h.sessions.create_session(&user.id, "sid").await.unwrap();

    let mut tx = h.sessions.begin().await.unwrap();
    tx.revoke(record).await.unwrap();
    let mut committed = tx.commit().await.unwrap();

    let mut handle = committed.revoked.pop().unwrap();
    assert_eq!(handle.state(), RecordState::Deleted);
    assert_matches!(
        h.sessions.revoke_session(&mut handle).await,
        Err(SessionError::InvalidState(_))
    );
    assert_eq!(h.sessions.count_active_sessions(&user.id).await.unwrap(), 0);
}

#[tokio::test]
async fn rollback_leaves_no_trace() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);
    let existing = h.sessions.create_session(&user.id, "keep").await.unwrap();

    let mut tx = h.sessions.begin().await.unwrap();
    tx.add(SessionActivity::new(&user.id, "gone")).await.unwrap();
    tx.revoke(existing.clone()).await.unwrap();
    tx.rollback().await.unwrap();

    let listed = h.sessions.list_active_sessions(&user.id).await.unwrap();
    assert_eq!(listed, vec![existing]);
}

#[tokio::test]
async fn dropped_unit_of_work_is_discarded() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);
    {
        let mut tx = h.sessions.begin().await.unwrap();
        tx.add(SessionActivity::new(&user.id, "sid")).await.unwrap();
    }
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn failed_operation_poisons_the_unit_of_work() {
    let h = common::memory_harness();
    let user = common::create_test_user(&h.directory);
    let mut record = h.sessions.create_session(&user.id, "sid").await.unwrap();
    let stale = record.clone();
    h.sessions.revoke_session(&mut record).await.unwrap();

    let mut tx = h.sessions.begin().await.unwrap();
    tx.add(SessionActivity::new(&user.id, "other")).await.unwrap();
    assert_matches!(tx.revoke(stale).await, Err(SessionError::NotFound));
    assert_matches!(tx.commit().await, Err(SessionError::InvalidState(_)));

    assert!(h.store.is_empty());
}

// =========================================================================
// Store failures
// =========================================================================

#[tokio::test]
async fn commit_failure_surfaces_as_persistence_error() {
    let h = common::harness_over(MemoryStore::with_unique_tokens());
    let user = common::create_test_user(&h.directory);
    h.sessions.create_session(&user.id, "dup").await.unwrap();

    let result = h.sessions.create_session(&user.id, "dup").await;
    let err = result.unwrap_err();
    assert_matches!(err, SessionError::Persistence(_));
    assert_eq!(err.to_string(), "session store error");
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn managers_share_state_only_through_the_store() {
    let store = MemoryStore::new();
    let a = SessionActivityManager::new(Arc::new(store.clone()));
    let b = SessionActivityManager::new(Arc::new(store));

    let record = a.create_session("usr_shared", "sid").await.unwrap();
    assert_eq!(
        b.list_active_sessions("usr_shared").await.unwrap(),
        vec![record]
    );
}
