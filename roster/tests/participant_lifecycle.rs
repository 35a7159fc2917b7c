//! Join and verification behaviour, including concurrent callers.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests can panic

use chrono::Duration;
use roster::RosterApp;
use roster_core::query::{ParticipantFilter, QueryOptions};
use roster_core::types::{EventId, Participant, ParticipantView, User, UserId, VerificationStatus};
use roster_core::{Resource, RosterError};
use roster_testing::fixtures::{self, EventBuilder};
use roster_testing::{FixedClock, InMemoryStore, mocks::epoch, stepping_clock, test_clock};
use std::sync::Arc;

fn setup(users: &[&str]) -> (InMemoryStore, RosterApp, EventId, Vec<User>) {
    let store = InMemoryStore::new();
    let users: Vec<User> = users.iter().map(|name| store.insert_user(fixtures::user(name))).collect();
    let event = store.insert_event(EventBuilder::new().build());
    let app = RosterApp::in_memory(&store, Arc::new(stepping_clock()), 10);
    (store, app, event.id, users)
}

#[tokio::test]
async fn joining_appends_an_unverified_entry() {
    let store = InMemoryStore::new();
    let alice = store.insert_user(fixtures::user("Alice"));
    let bob = store.insert_user(fixtures::user("Bob"));
    let carol = store.insert_user(fixtures::user("Carol"));
    let event = store.insert_event(
        EventBuilder::new()
            .participant(alice.id)
            .verified_participant(bob.id)
            .build(),
    );
    let app = RosterApp::in_memory(&store, Arc::new(test_clock()), 10);

    let joined = app.lifecycle.join_event(event.id, carol.id).await.expect("join");

    assert_eq!(joined.user, carol);
    assert_eq!(joined.is_verified, VerificationStatus::Unverified);
    assert!(joined.file.is_none());
    assert_eq!(joined.created_at, epoch());

    let stored = store.event(event.id).unwrap();
    assert_eq!(stored.participants.len(), 3);
    assert_eq!(stored.participants[2].user_id, carol.id);
    assert_eq!(stored.participants[2].id, joined.id);
    assert_eq!(stored.version.value(), event.version.value() + 1);

    let page = app
        .queries
        .query_participants(event.id, ParticipantFilter::default(), QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(page.total_results, 3);
    assert_eq!(page.results[2].user_id, carol.id);
}

#[tokio::test]
async fn joining_twice_returns_the_existing_entry() {
    let (store, app, event_id, users) = setup(&["Alice"]);
    let alice = &users[0];

    let first = app.lifecycle.join_event(event_id, alice.id).await.unwrap();
    let version = store.event(event_id).unwrap().version;
    let second = app.lifecycle.join_event(event_id, alice.id).await.unwrap();

    assert_eq!(first, second);
    let stored = store.event(event_id).unwrap();
    assert_eq!(stored.participants.len(), 1);
    assert_eq!(stored.version, version);
}

#[tokio::test]
async fn joined_view_matches_what_storage_reads_back() {
    let store = InMemoryStore::new();
    let alice = store.insert_user(fixtures::user("Alice"));
    let event = store.insert_event(EventBuilder::new().build());
    let at = epoch() + Duration::nanoseconds(123_456_789);
    let app = RosterApp::in_memory(&store, Arc::new(FixedClock::new(at)), 10);

    let joined = app.lifecycle.join_event(event.id, alice.id).await.unwrap();

    let stored = &store.event(event.id).unwrap().participants[0];
    let persisted: Participant = serde_json::from_value(serde_json::to_value(stored).unwrap()).unwrap();
    assert_eq!(ParticipantView::new(persisted, alice.clone()), joined);
    assert_eq!(joined.created_at, epoch() + Duration::milliseconds(123));

    let again = app.lifecycle.join_event(event.id, alice.id).await.unwrap();
    assert_eq!(again, joined);

    let verified = app
        .lifecycle
        .verify_participant(event.id, alice.id, VerificationStatus::Verified)
        .await
        .unwrap();
    let stored = &store.event(event.id).unwrap().participants[0];
    let persisted: Participant = serde_json::from_value(serde_json::to_value(stored).unwrap()).unwrap();
    assert_eq!(ParticipantView::new(persisted, alice), verified);
}

#[tokio::test]
async fn join_requires_user_then_event() {
    let (_store, app, event_id, users) = setup(&["Alice"]);
    let ghost = UserId::new();
    let missing_event = EventId::new();

    let result = app.lifecycle.join_event(event_id, ghost).await;
    assert!(matches!(result, Err(RosterError::NotFound { resource: Resource::User, .. })));

    // Both missing: the user is reported
    let result = app.lifecycle.join_event(missing_event, ghost).await;
    assert!(matches!(result, Err(RosterError::NotFound { resource: Resource::User, .. })));

    let result = app.lifecycle.join_event(missing_event, users[0].id).await;
    assert!(matches!(
        result,
        Err(RosterError::NotFound { resource: Resource::Event, ref id }) if *id == missing_event.to_string()
    ));
}

#[tokio::test]
async fn verifying_touches_only_the_target_participant() {
    let store = InMemoryStore::new();
    let alice = store.insert_user(fixtures::user("Alice"));
    let bob = store.insert_user(fixtures::user("Bob"));
    let event = store.insert_event(
        EventBuilder::new()
            .participant(alice.id)
            .verified_participant(bob.id)
            .build(),
    );
    let before = store.event(event.id).unwrap();
    let later = epoch() + Duration::hours(1);
    let app = RosterApp::in_memory(&store, Arc::new(FixedClock::new(later)), 10);

    let verified = app
        .lifecycle
        .verify_participant(event.id, alice.id, VerificationStatus::Verified)
        .await
        .expect("verify");

    assert_eq!(verified.is_verified, VerificationStatus::Verified);
    assert_eq!(verified.user, alice);
    assert_eq!(verified.updated_at, later);
    assert_eq!(verified.created_at, before.participants[0].created_at);

    let after = store.event(event.id).unwrap();
    assert_eq!(after.participants[0].is_verified, VerificationStatus::Verified);
    assert_eq!(after.participants[1], before.participants[1]);
}

#[tokio::test]
async fn verification_can_be_revoked_and_is_idempotent() {
    let (store, app, event_id, users) = setup(&["Alice"]);
    let alice = &users[0];
    app.lifecycle.join_event(event_id, alice.id).await.unwrap();

    let first = app
        .lifecycle
        .verify_participant_value(event_id, alice.id, 1)
        .await
        .unwrap();
    let version = store.event(event_id).unwrap().version;
    let second = app
        .lifecycle
        .verify_participant_value(event_id, alice.id, 1)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(store.event(event_id).unwrap().version, version);

    let revoked = app
        .lifecycle
        .verify_participant(event_id, alice.id, VerificationStatus::Unverified)
        .await
        .unwrap();
    assert_eq!(revoked.is_verified, VerificationStatus::Unverified);
    assert_eq!(store.event(event_id).unwrap().version, version.next());
}

#[tokio::test]
async fn verification_value_outside_zero_and_one_is_rejected() {
    let (store, app, event_id, users) = setup(&["Alice"]);
    app.lifecycle.join_event(event_id, users[0].id).await.unwrap();
    let version = store.event(event_id).unwrap().version;

    for raw in [2, -1] {
        let result = app.lifecycle.verify_participant_value(event_id, users[0].id, raw).await;
        assert!(matches!(result, Err(RosterError::InvalidArgument(_))), "raw = {raw}");
    }
    assert_eq!(store.event(event_id).unwrap().version, version);
}

#[tokio::test]
async fn verifying_requires_user_event_and_entry() {
    let (_store, app, event_id, users) = setup(&["Alice", "Bob"]);
    app.lifecycle.join_event(event_id, users[0].id).await.unwrap();

    let result = app
        .lifecycle
        .verify_participant(event_id, UserId::new(), VerificationStatus::Verified)
        .await;
    assert!(matches!(result, Err(RosterError::NotFound { resource: Resource::User, .. })));

    let result = app
        .lifecycle
        .verify_participant(EventId::new(), users[0].id, VerificationStatus::Verified)
        .await;
    assert!(matches!(result, Err(RosterError::NotFound { resource: Resource::Event, .. })));

    // Bob exists but never joined
    let result = app
        .lifecycle
        .verify_participant(event_id, users[1].id, VerificationStatus::Verified)
        .await;
    assert!(matches!(result, Err(RosterError::NotFound { resource: Resource::Participant, .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_of_one_user_leave_one_entry() {
    let (store, app, event_id, users) = setup(&["Alice"]);
    let user_id = users[0].id;

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let lifecycle = app.lifecycle.clone();
            tokio::spawn(async move { lifecycle.join_event(event_id, user_id).await })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().expect("join").id);
    }

    let stored = store.event(event_id).unwrap();
    assert_eq!(stored.participants.len(), 1);
    assert!(ids.iter().all(|id| *id == stored.participants[0].id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_of_different_users_all_land() {
    let names: Vec<String> = (0..20).map(|i| format!("Member {i}")).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let (store, app, event_id, users) = setup(&names);

    let handles: Vec<_> = users
        .iter()
        .map(|user| {
            let lifecycle = app.lifecycle.clone();
            let user_id = user.id;
            tokio::spawn(async move { lifecycle.join_event(event_id, user_id).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().expect("join");
    }

    let stored = store.event(event_id).unwrap();
    assert_eq!(stored.participants.len(), users.len());
    for user in &users {
        assert_eq!(stored.participants.iter().filter(|p| p.user_id == user.id).count(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_verifications_of_different_participants_all_land() {
    let names: Vec<String> = (0..12).map(|i| format!("Member {i}")).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let (store, app, event_id, users) = setup(&names);
    for user in &users {
        app.lifecycle.join_event(event_id, user.id).await.unwrap();
    }

    let handles: Vec<_> = users
        .iter()
        .map(|user| {
            let lifecycle = app.lifecycle.clone();
            let user_id = user.id;
            tokio::spawn(async move {
                lifecycle
                    .verify_participant(event_id, user_id, VerificationStatus::Verified)
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().expect("verify");
    }

    let stored = store.event(event_id).unwrap();
    assert!(stored.participants.iter().all(|p| p.is_verified()));
}
