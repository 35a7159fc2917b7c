//! Participant query behaviour against the in-memory store.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use proptest::prelude::*;
use roster::services::ParticipantQueryEngine;
use roster_core::pagination::Page;
use roster_core::query::{ParticipantFilter, QueryOptions};
use roster_core::types::{EventId, ParticipantView, User, UserId, VerificationStatus};
use roster_core::{Resource, RosterError};
use roster_testing::InMemoryStore;
use roster_testing::fixtures::{self, EventBuilder};
use std::sync::Arc;

struct Roster {
    store: InMemoryStore,
    engine: ParticipantQueryEngine,
    event_id: EventId,
    alice: User,
    bob: User,
}

/// Event with Alice (unverified) and Bob (verified), joined in that order.
fn alice_and_bob() -> Roster {
    let store = InMemoryStore::new();
    let alice = store.insert_user(fixtures::user("Alice"));
    let bob = store.insert_user(fixtures::user("Bob"));
    let event = store.insert_event(
        EventBuilder::new()
            .participant(alice.id)
            .verified_participant(bob.id)
            .build(),
    );

    Roster {
        engine: ParticipantQueryEngine::new(Arc::new(store.clone())),
        store,
        event_id: event.id,
        alice,
        bob,
    }
}

fn options(sort_by: Option<&str>, limit: Option<i64>, page: Option<i64>) -> QueryOptions {
    QueryOptions {
        sort_by: sort_by.map(str::to_string),
        limit,
        page,
    }
}

fn names(page: &Page<ParticipantView>) -> Vec<&str> {
    page.results.iter().map(|view| view.user.name.as_str()).collect()
}

#[tokio::test]
async fn search_matches_name_but_totals_use_raw_count() {
    let roster = alice_and_bob();

    let page = roster
        .engine
        .query_participants(roster.event_id, ParticipantFilter::search("ali"), options(None, Some(10), Some(1)))
        .await
        .expect("query");

    assert_eq!(page.results.len(), 1);
    assert_eq!(page.results[0].user, roster.alice);
    assert_eq!(page.results[0].is_verified, VerificationStatus::Unverified);
    assert_eq!(page.total_results, 2);
    assert_eq!(page.total_pages, 1);
    assert_eq!((page.page, page.limit), (1, 10));
}

#[tokio::test]
async fn search_is_case_insensitive_over_contact_fields_and_join_time() {
    let roster = alice_and_bob();
    let query = |term: &'static str| {
        let engine = roster.engine.clone();
        let event_id = roster.event_id;
        async move {
            engine
                .query_participants(event_id, ParticipantFilter::search(term), QueryOptions::default())
                .await
                .expect("query")
        }
    };

    assert_eq!(names(&query("BOB@example").await), vec!["Bob"]);
    assert_eq!(names(&query("+62").await).len(), 2);
    // Bob joined one minute after Alice
    assert_eq!(names(&query("T00:01:00.000Z").await), vec!["Bob"]);
    assert!(query("nobody").await.results.is_empty());
}

#[tokio::test]
async fn empty_search_matches_everyone_in_join_order() {
    let roster = alice_and_bob();

    let page = roster
        .engine
        .query_participants(roster.event_id, ParticipantFilter::search(""), QueryOptions::default())
        .await
        .expect("query");

    assert_eq!(names(&page), vec!["Alice", "Bob"]);
    assert_eq!(page.results[1].user_id, roster.bob.id);
}

#[tokio::test]
async fn sort_direction_defaults_to_descending() {
    let roster = alice_and_bob();

    for sort_by in ["created_at:desc", "created_at", "created_at:sideways", "participants.created_at:DESC"] {
        let page = roster
            .engine
            .query_participants(roster.event_id, ParticipantFilter::default(), options(Some(sort_by), None, None))
            .await
            .expect("query");
        assert_eq!(names(&page), vec!["Bob", "Alice"], "sort_by = {sort_by}");
    }

    let page = roster
        .engine
        .query_participants(roster.event_id, ParticipantFilter::default(), options(Some("created_at:asc"), None, None))
        .await
        .expect("query");
    assert_eq!(names(&page), vec!["Alice", "Bob"]);
}

#[tokio::test]
async fn search_keeps_sort_order_and_pages_the_survivors() {
    let store = InMemoryStore::new();
    let mut builder = EventBuilder::new();
    // Joined one minute apart in this order; Bob does not match "ali"
    for name in ["Alina", "Bob", "Alistair", "Malika"] {
        let user = store.insert_user(fixtures::user(name));
        builder = builder.participant(user.id);
    }
    let event = store.insert_event(builder.build());
    let engine = ParticipantQueryEngine::new(Arc::new(store));
    let query = |limit: i64, page: i64| {
        engine.query_participants(
            event.id,
            ParticipantFilter::search("ali"),
            options(Some("created_at:desc"), Some(limit), Some(page)),
        )
    };

    let all = query(10, 1).await.unwrap();
    assert_eq!(names(&all), vec!["Malika", "Alistair", "Alina"]);

    let second = query(1, 2).await.unwrap();
    assert_eq!(names(&second), vec!["Alistair"]);
    assert_eq!((second.total_results, second.total_pages), (4, 4));

    let second = query(2, 2).await.unwrap();
    assert_eq!(names(&second), vec!["Alina"]);

    assert!(query(1, 4).await.unwrap().results.is_empty());
}

#[tokio::test]
async fn sort_on_missing_field_keeps_join_order() {
    let roster = alice_and_bob();

    let page = roster
        .engine
        .query_participants(roster.event_id, ParticipantFilter::default(), options(Some("file.size:asc"), None, None))
        .await
        .expect("query");

    assert_eq!(names(&page), vec!["Alice", "Bob"]);
}

#[tokio::test]
async fn empty_sort_field_is_invalid() {
    let roster = alice_and_bob();

    let result = roster
        .engine
        .query_participants(roster.event_id, ParticipantFilter::default(), options(Some(":asc"), None, None))
        .await;

    assert!(matches!(result, Err(RosterError::InvalidArgument(_))));
}

#[tokio::test]
async fn orphaned_participants_are_dropped_but_counted() {
    let roster = alice_and_bob();
    roster.store.delete_user(roster.alice.id);

    let page = roster
        .engine
        .query_participants(roster.event_id, ParticipantFilter::default(), QueryOptions::default())
        .await
        .expect("query");

    assert_eq!(names(&page), vec!["Bob"]);
    assert_eq!(page.total_results, 2);
}

#[tokio::test]
async fn pagination_clamps_inputs_and_empty_pages_are_not_errors() {
    let store = InMemoryStore::new();
    let mut builder = EventBuilder::new();
    for i in 0..25 {
        let user = store.insert_user(fixtures::user(&format!("User {i:02}")));
        builder = builder.participant(user.id);
    }
    let event = store.insert_event(builder.build());
    let engine = ParticipantQueryEngine::new(Arc::new(store));

    let page = engine
        .query_participants(event.id, ParticipantFilter::default(), options(None, Some(-1), Some(0)))
        .await
        .expect("query");
    assert_eq!((page.page, page.limit, page.total_pages, page.results.len()), (1, 10, 3, 10));

    let page = engine
        .query_participants(event.id, ParticipantFilter::default(), options(None, Some(10), Some(3)))
        .await
        .expect("query");
    assert_eq!(page.results.len(), 5);
    assert_eq!(page.results[0].user.name, "User 20");

    let page = engine
        .query_participants(event.id, ParticipantFilter::default(), options(None, Some(10), Some(9)))
        .await
        .expect("query");
    assert!(page.results.is_empty());
    assert_eq!(page.total_results, 25);
}

#[tokio::test]
async fn configured_default_limit_applies() {
    let roster = alice_and_bob();
    let engine = ParticipantQueryEngine::new(Arc::new(roster.store.clone())).with_default_limit(1);

    let page = engine
        .query_participants(roster.event_id, ParticipantFilter::default(), QueryOptions::default())
        .await
        .expect("query");

    assert_eq!(page.limit, 1);
    assert_eq!(page.total_pages, 2);
    assert_eq!(names(&page), vec!["Alice"]);
}

#[tokio::test]
async fn unknown_event_is_not_found() {
    let roster = alice_and_bob();
    let missing = EventId::new();

    let result = roster
        .engine
        .query_participants(missing, ParticipantFilter::default(), QueryOptions::default())
        .await;

    assert!(matches!(
        result,
        Err(RosterError::NotFound { resource: Resource::Event, ref id }) if *id == missing.to_string()
    ));
}

#[tokio::test]
async fn event_without_participants_yields_empty_page() {
    let store = InMemoryStore::new();
    let event = store.insert_event(EventBuilder::new().build());
    let engine = ParticipantQueryEngine::new(Arc::new(store));

    let page = engine
        .query_participants(event.id, ParticipantFilter::default(), QueryOptions::default())
        .await
        .expect("query");

    assert!(page.results.is_empty());
    assert_eq!((page.total_results, page.total_pages), (0, 0));
}

proptest! {
    #[test]
    fn total_pages_ignores_filtering(
        orphaned in proptest::collection::vec(any::<bool>(), 0..40),
        limit in 1i64..15,
        term in "[a-z]{0,3}",
    ) {
        let store = InMemoryStore::new();
        let mut builder = EventBuilder::new();
        for (i, orphan) in orphaned.iter().enumerate() {
            let user = fixtures::user(&format!("member{i}"));
            if !orphan {
                let _: User = store.insert_user(user.clone());
            }
            builder = builder.participant(if *orphan { UserId::new() } else { user.id });
        }
        let event = store.insert_event(builder.build());
        let engine = ParticipantQueryEngine::new(Arc::new(store));

        let page = futures::executor::block_on(engine.query_participants(
            event.id,
            ParticipantFilter::search(term),
            options(None, Some(limit), Some(1)),
        ))
        .unwrap();

        let raw = orphaned.len() as u64;
        let limit = u64::try_from(limit).unwrap();
        prop_assert_eq!(page.total_results, raw);
        prop_assert_eq!(page.total_pages, raw.div_ceil(limit));
        prop_assert!(page.results.len() as u64 <= limit);
        prop_assert!(page.results.len() <= orphaned.iter().filter(|o| !**o).count());
    }
}
