//! Errors surfaced to callers of the roster services.

use crate::store::StoreError;
use crate::types::{EventId, InvalidVerificationStatus, Version};
use std::fmt;
use thiserror::Error;

/// Kind of record a [`RosterError::NotFound`] refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    /// An event aggregate
    Event,
    /// A user directory record
    User,
    /// A participant entry within an event
    Participant,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => write!(f, "Event"),
            Self::User => write!(f, "User"),
            Self::Participant => write!(f, "Participant"),
        }
    }
}

/// Errors returned by the query engine and the participant lifecycle.
///
/// Callers can always tell "nothing to show" (an empty page) apart from "the
/// referenced record does not exist" ([`RosterError::NotFound`]).
#[derive(Error, Debug)]
pub enum RosterError {
    /// Event, user, or participant absent.
    #[error("{resource} with id {id} not found")]
    NotFound {
        /// What was looked up
        resource: Resource,
        /// The id that was looked up
        id: String,
    },

    /// Malformed input that cannot be clamped to a default.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An optimistic save lost the race; retry the whole operation.
    #[error("Concurrency conflict on event {event_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The event that changed underneath the caller
        event_id: EventId,
        /// The version the caller read
        expected: Version,
        /// The version the store holds
        actual: Version,
    },

    /// The store or directory failed.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl RosterError {
    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(resource: Resource, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Returns true if the caller may retry the same operation unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Returns true for any `NotFound`.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StoreError> for RosterError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::ConcurrencyConflict {
                event_id,
                expected,
                actual,
            } => Self::ConcurrencyConflict {
                event_id,
                expected,
                actual,
            },
            StoreError::EventNotFound(event_id) => Self::not_found(Resource::Event, event_id),
            StoreError::DuplicateEvent(event_id) => {
                Self::InvalidArgument(format!("Event {event_id} already exists"))
            },
            StoreError::InvalidPipeline(reason) => Self::InvalidArgument(reason),
            StoreError::Database(reason) | StoreError::Serialization(reason) => {
                Self::StoreUnavailable(reason)
            },
        }
    }
}

impl From<InvalidVerificationStatus> for RosterError {
    fn from(error: InvalidVerificationStatus) -> Self {
        Self::InvalidArgument(error.to_string())
    }
}
