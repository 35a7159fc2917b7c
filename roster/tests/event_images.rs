//! Version-checked image edits.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use chrono::{DateTime, Utc};
use roster::services::{EventImages, ImageEdit};
use roster_core::pipeline::{ParticipantPipeline, PipelineOutput};
use roster_core::store::{AppendOutcome, StoreFuture, VerificationOutcome};
use roster_core::types::{Event, EventId, FileId, Participant, UserId, VerificationStatus, Version};
use roster_core::{AggregateStore, Resource, RosterError};
use roster_testing::fixtures::{self, EventBuilder};
use roster_testing::mocks::epoch;
use roster_testing::{InMemoryStore, test_clock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Store that lets one join slip in right after the first event read.
struct RacingStore {
    inner: InMemoryStore,
    intruder: UserId,
    raced: AtomicBool,
}

impl AggregateStore for RacingStore {
    fn find_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Event>> {
        Box::pin(async move {
            let event = self.inner.find_event(event_id).await?;
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.inner
                    .append_participant(event_id, Participant::new(self.intruder, epoch()))
                    .await?;
            }
            Ok(event)
        })
    }

    fn save_event(&self, event: Event, expected_version: Option<Version>) -> StoreFuture<'_, Version> {
        self.inner.save_event(event, expected_version)
    }

    fn append_participant(&self, event_id: EventId, participant: Participant) -> StoreFuture<'_, AppendOutcome> {
        self.inner.append_participant(event_id, participant)
    }

    fn set_verification(
        &self,
        event_id: EventId,
        user_id: UserId,
        status: VerificationStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, VerificationOutcome> {
        self.inner.set_verification(event_id, user_id, status, at)
    }

    fn run_participant_pipeline(&self, pipeline: ParticipantPipeline) -> StoreFuture<'_, Option<PipelineOutput>> {
        self.inner.run_participant_pipeline(pipeline)
    }
}

fn event_with_images(names: &[&str]) -> Event {
    names
        .iter()
        .fold(EventBuilder::new(), |builder, name| builder.image(fixtures::image(name)))
        .build()
}

#[tokio::test]
async fn edit_prepends_new_images_and_returns_removed_ones() {
    let store = InMemoryStore::new();
    let event = store.insert_event(event_with_images(&["a.png", "b.png", "c.png"]));
    let images = EventImages::new(Arc::new(store.clone()), Arc::new(test_clock()));
    let new = fixtures::image("new.png");

    let outcome = images
        .edit_event_images(
            event.id,
            ImageEdit {
                remove: vec![event.images[1].id, FileId::new()],
                add: vec![new.clone()],
            },
        )
        .await
        .expect("edit");

    assert_eq!(outcome.removed, vec![event.images[1].clone()]);
    assert_eq!(
        outcome.event.images,
        vec![new, event.images[0].clone(), event.images[2].clone()]
    );
    assert_eq!(outcome.event.version, event.version.next());
    assert_eq!(store.event(event.id).unwrap(), outcome.event);
}

#[tokio::test]
async fn edit_keeps_participants_intact() {
    let store = InMemoryStore::new();
    let alice = store.insert_user(fixtures::user("Alice"));
    let event = store.insert_event(
        EventBuilder::new()
            .image(fixtures::image("poster.png"))
            .verified_participant(alice.id)
            .build(),
    );
    let images = EventImages::new(Arc::new(store.clone()), Arc::new(test_clock()));

    images
        .edit_event_images(
            event.id,
            ImageEdit {
                remove: vec![event.images[0].id],
                add: Vec::new(),
            },
        )
        .await
        .unwrap();

    let stored = store.event(event.id).unwrap();
    assert!(stored.images.is_empty());
    assert_eq!(stored.participants, event.participants);
}

#[tokio::test]
async fn edit_of_missing_event_is_not_found() {
    let images = EventImages::new(Arc::new(InMemoryStore::new()), Arc::new(test_clock()));

    let result = images.edit_event_images(EventId::new(), ImageEdit::default()).await;

    assert!(matches!(result, Err(RosterError::NotFound { resource: Resource::Event, .. })));
}

#[tokio::test]
async fn edit_racing_a_join_is_a_conflict_and_keeps_the_join() {
    let inner = InMemoryStore::new();
    let intruder = inner.insert_user(fixtures::user("Mallory"));
    let event = inner.insert_event(event_with_images(&["a.png"]));
    let store = RacingStore {
        inner: inner.clone(),
        intruder: intruder.id,
        raced: AtomicBool::new(false),
    };
    let images = EventImages::new(Arc::new(store), Arc::new(test_clock()));
    let edit = ImageEdit {
        remove: vec![event.images[0].id],
        add: vec![fixtures::image("b.png")],
    };

    let error = images
        .edit_event_images(event.id, edit.clone())
        .await
        .expect_err("edit should lose the race");
    assert!(error.is_retryable());
    assert!(matches!(error, RosterError::ConcurrencyConflict { event_id, .. } if event_id == event.id));

    let stored = inner.event(event.id).unwrap();
    assert_eq!(stored.images, event.images);
    assert_eq!(stored.participants.len(), 1);

    // A retry reads the new version and succeeds without losing the join
    let outcome = images.edit_event_images(event.id, edit).await.expect("retry");
    assert_eq!(outcome.event.participants.len(), 1);
    assert_eq!(outcome.event.images[0].original_name, "b.png");
}
