//! Collaborator contracts: the aggregate store and the user directory.
//!
//! Both traits return boxed futures instead of using `async fn` so they can be
//! held as `Arc<dyn AggregateStore>` by the services.
//!
//! # Atomicity
//!
//! Every mutating method is a single atomic operation on one event:
//!
//! - [`AggregateStore::append_participant`] checks for an existing entry and
//!   appends in one step, so concurrent joins of the same user produce one entry
//! - [`AggregateStore::set_verification`] updates exactly one embedded entry
//!   without rewriting the rest of the list
//! - [`AggregateStore::save_event`] replaces the whole aggregate only if its
//!   version is still the one the caller read
//!
//! # Implementations
//!
//! - `PostgresAggregateStore` (in `roster-postgres`)
//! - `InMemoryStore` (in `roster-testing`)

use crate::pipeline::{ParticipantPipeline, PipelineOutput};
use crate::types::{Event, EventId, Participant, User, UserId, VerificationStatus, Version};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors reported by stores and directories.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The event's version is not the one the caller expected.
    #[error("Concurrency conflict on event {event_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The event being saved
        event_id: EventId,
        /// The version the caller read
        expected: Version,
        /// The version currently stored
        actual: Version,
    },

    /// An insert named an id that already exists.
    #[error("Event already exists: {0}")]
    DuplicateEvent(EventId),

    /// A version-checked save targeted an event that does not exist.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// Backend failure.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The pipeline's stages are not in a valid order.
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),
}

/// Result of a conditional participant append.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The participant was appended.
    Appended(Participant),
    /// The user already had an entry; nothing was written.
    AlreadyJoined(Participant),
    /// No event with that id.
    EventMissing,
}

/// Result of a targeted verification update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The entry changed.
    Updated(Participant),
    /// The entry already held the requested status; nothing was written.
    Unchanged(Participant),
    /// The event exists but the user has no entry in it.
    ParticipantMissing,
    /// No event with that id.
    EventMissing,
}

/// Persistence for event aggregates.
pub trait AggregateStore: Send + Sync {
    /// Load one event by id.
    ///
    /// # Errors
    ///
    /// Backend or decoding failures.
    fn find_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Event>>;

    /// Save a whole aggregate.
    ///
    /// `expected_version` of `None` inserts a new event; `Some(v)` replaces the
    /// stored event only if it is still at `v`. Returns the stored version.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DuplicateEvent`] when inserting an existing id
    /// - [`StoreError::EventNotFound`] when updating a missing id
    /// - [`StoreError::ConcurrencyConflict`] when the version moved
    fn save_event(&self, event: Event, expected_version: Option<Version>) -> StoreFuture<'_, Version>;

    /// Append `participant` unless the event already has an entry for its user.
    ///
    /// # Errors
    ///
    /// Backend or encoding failures.
    fn append_participant(&self, event_id: EventId, participant: Participant) -> StoreFuture<'_, AppendOutcome>;

    /// Set `is_verified` (and `updated_at`) on the single entry for `user_id`.
    ///
    /// # Errors
    ///
    /// Backend or decoding failures.
    fn set_verification(
        &self,
        event_id: EventId,
        user_id: UserId,
        status: VerificationStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, VerificationOutcome>;

    /// Run a participant pipeline. `None` if the event does not exist.
    ///
    /// The rows and the raw participant count come from the same snapshot.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidPipeline`] for misordered stages
    /// - backend or decoding failures
    fn run_participant_pipeline(&self, pipeline: ParticipantPipeline) -> StoreFuture<'_, Option<PipelineOutput>>;
}

/// Read-only lookup of user records.
pub trait UserDirectory: Send + Sync {
    /// Find a user by id.
    ///
    /// # Errors
    ///
    /// Backend or decoding failures.
    fn find_user(&self, user_id: UserId) -> StoreFuture<'_, Option<User>>;
}
