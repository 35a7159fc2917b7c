//! In-memory aggregate store and user directory.

use chrono::{DateTime, Utc};
use roster_core::pipeline::{ParticipantPipeline, PipelineOutput};
use roster_core::store::{
    AggregateStore, AppendOutcome, StoreError, StoreFuture, UserDirectory, VerificationOutcome,
};
use roster_core::types::{Event, EventId, Participant, User, UserId, VerificationStatus, Version, timestamp};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// In-memory store for fast, deterministic tests.
///
/// Implements both [`AggregateStore`] and [`UserDirectory`]. Every mutation
/// holds the write lock across its check and its write, which gives the same
/// per-event atomicity as the `PostgreSQL` store.
///
/// Clones share state.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    events: Arc<RwLock<HashMap<EventId, Event>>>,
    users: Arc<RwLock<HashMap<UserId, User>>>,
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Database("in-memory store lock poisoned".to_string())
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Seeding and inspection helpers recover a poisoned lock.

    /// Add or replace a user record, returning it.
    #[must_use = "the returned user carries the id to reference"]
    pub fn insert_user(&self, user: User) -> User {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.id, user.clone());
        user
    }

    /// Remove a user record, leaving any participants that reference it orphaned.
    pub fn delete_user(&self, user_id: UserId) {
        self.users.write().unwrap_or_else(PoisonError::into_inner).remove(&user_id);
    }

    /// Store an event as-is, bypassing version checks. Returns the stored copy.
    #[must_use = "the returned event carries the id to reference"]
    pub fn insert_event(&self, mut event: Event) -> Event {
        if event.version == Version::default() {
            event.version = Version::new(1);
        }
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event.id, event.clone());
        event
    }

    /// Snapshot of a stored event.
    #[must_use]
    pub fn event(&self, event_id: EventId) -> Option<Event> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event_id)
            .cloned()
    }

    /// Number of stored events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn save(&self, mut event: Event, expected_version: Option<Version>) -> Result<Version, StoreError> {
        let mut events = self.events.write().map_err(poisoned)?;

        let version = match (expected_version, events.get(&event.id)) {
            (None, Some(_)) => return Err(StoreError::DuplicateEvent(event.id)),
            (None, None) => Version::new(1),
            (Some(_), None) => return Err(StoreError::EventNotFound(event.id)),
            (Some(expected), Some(stored)) if stored.version != expected => {
                return Err(StoreError::ConcurrencyConflict {
                    event_id: event.id,
                    expected,
                    actual: stored.version,
                });
            },
            (Some(expected), Some(_)) => expected.next(),
        };

        event.version = version;
        events.insert(event.id, event);
        Ok(version)
    }

    fn append(&self, event_id: EventId, participant: Participant) -> Result<AppendOutcome, StoreError> {
        let mut events = self.events.write().map_err(poisoned)?;
        let Some(event) = events.get_mut(&event_id) else {
            return Ok(AppendOutcome::EventMissing);
        };

        if let Some(existing) = event.participant(&participant.user_id) {
            return Ok(AppendOutcome::AlreadyJoined(existing.clone()));
        }

        event.updated_at = participant.created_at;
        event.version = event.version.next();
        event.participants.push(participant.clone());
        Ok(AppendOutcome::Appended(participant))
    }

    fn verify(
        &self,
        event_id: EventId,
        user_id: UserId,
        status: VerificationStatus,
        at: DateTime<Utc>,
    ) -> Result<VerificationOutcome, StoreError> {
        let mut events = self.events.write().map_err(poisoned)?;
        let Some(event) = events.get_mut(&event_id) else {
            return Ok(VerificationOutcome::EventMissing);
        };

        let Some(index) = event.participants.iter().position(|p| p.user_id == user_id) else {
            return Ok(VerificationOutcome::ParticipantMissing);
        };

        if event.participants[index].is_verified == status {
            return Ok(VerificationOutcome::Unchanged(event.participants[index].clone()));
        }

        let at = timestamp::truncate(at);
        event.updated_at = at;
        event.version = event.version.next();
        let participant = &mut event.participants[index];
        participant.is_verified = status;
        participant.updated_at = at;
        Ok(VerificationOutcome::Updated(participant.clone()))
    }

    fn run(&self, pipeline: &ParticipantPipeline) -> Result<Option<PipelineOutput>, StoreError> {
        let events = self.events.read().map_err(poisoned)?;
        let Some(event) = events.get(&pipeline.event_id()) else {
            return Ok(None);
        };
        let users = self.users.read().map_err(poisoned)?;

        let rows = pipeline.evaluate(&event.participants, |user_id| users.get(user_id).cloned())?;
        tracing::trace!(event_id = %event.id, rows = rows.len(), "Evaluated participant pipeline");

        Ok(Some(PipelineOutput {
            rows,
            participant_count: event.participant_count(),
        }))
    }
}

impl AggregateStore for InMemoryStore {
    fn find_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Event>> {
        Box::pin(async move {
            let events = self.events.read().map_err(poisoned)?;
            Ok(events.get(&event_id).cloned())
        })
    }

    fn save_event(&self, event: Event, expected_version: Option<Version>) -> StoreFuture<'_, Version> {
        Box::pin(async move { self.save(event, expected_version) })
    }

    fn append_participant(&self, event_id: EventId, participant: Participant) -> StoreFuture<'_, AppendOutcome> {
        Box::pin(async move { self.append(event_id, participant) })
    }

    fn set_verification(
        &self,
        event_id: EventId,
        user_id: UserId,
        status: VerificationStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, VerificationOutcome> {
        Box::pin(async move { self.verify(event_id, user_id, status, at) })
    }

    fn run_participant_pipeline(&self, pipeline: ParticipantPipeline) -> StoreFuture<'_, Option<PipelineOutput>> {
        Box::pin(async move { self.run(&pipeline) })
    }
}

impl UserDirectory for InMemoryStore {
    fn find_user(&self, user_id: UserId) -> StoreFuture<'_, Option<User>> {
        Box::pin(async move {
            let users = self.users.read().map_err(poisoned)?;
            Ok(users.get(&user_id).cloned())
        })
    }
}
