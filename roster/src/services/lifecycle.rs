//! Participant lifecycle: joining an event and verifying participation.

use crate::metrics::{PARTICIPANTS_JOIN_REPLAYED, PARTICIPANTS_JOINED, PARTICIPANTS_VERIFIED};
use roster_core::environment::Clock;
use roster_core::store::{AppendOutcome, VerificationOutcome};
use roster_core::types::{EventId, Participant, ParticipantView, User, UserId, VerificationStatus};
use roster_core::{AggregateStore, Resource, RosterError, UserDirectory};
use std::sync::Arc;

/// Join and verify.
///
/// ```text
///            join_event               verify(1)
///  (absent) ───────────► unverified ◄──────────► verified
///                                     verify(0)
/// ```
///
/// Both transitions are idempotent. The user is looked up before the event,
/// so a request naming a missing user and a missing event reports the user.
#[derive(Clone)]
pub struct ParticipantLifecycle {
    store: Arc<dyn AggregateStore>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
}

impl ParticipantLifecycle {
    /// Create a lifecycle service.
    #[must_use]
    pub fn new(store: Arc<dyn AggregateStore>, users: Arc<dyn UserDirectory>, clock: Arc<dyn Clock>) -> Self {
        Self { store, users, clock }
    }

    async fn require_user(&self, user_id: UserId) -> Result<User, RosterError> {
        self.users
            .find_user(user_id)
            .await?
            .ok_or_else(|| RosterError::not_found(Resource::User, user_id))
    }

    /// Enroll a user in an event.
    ///
    /// Returns the new entry, or the existing one if the user already joined.
    ///
    /// # Errors
    ///
    /// - [`RosterError::NotFound`] if the user or the event does not exist
    /// - [`RosterError::StoreUnavailable`] if the store fails
    pub async fn join_event(&self, event_id: EventId, user_id: UserId) -> Result<ParticipantView, RosterError> {
        let user = self.require_user(user_id).await?;
        let candidate = Participant::new(user_id, self.clock.now());

        match self.store.append_participant(event_id, candidate).await? {
            AppendOutcome::Appended(participant) => {
                metrics::counter!(PARTICIPANTS_JOINED).increment(1);
                tracing::info!(%event_id, %user_id, participant_id = %participant.id, "User joined event");
                Ok(ParticipantView::new(participant, user))
            },
            AppendOutcome::AlreadyJoined(participant) => {
                metrics::counter!(PARTICIPANTS_JOIN_REPLAYED).increment(1);
                tracing::debug!(%event_id, %user_id, "User already joined event");
                Ok(ParticipantView::new(participant, user))
            },
            AppendOutcome::EventMissing => Err(RosterError::not_found(Resource::Event, event_id)),
        }
    }

    /// Set a participant's verification status.
    ///
    /// Re-applying the current status succeeds without writing.
    ///
    /// # Errors
    ///
    /// - [`RosterError::NotFound`] if the user, the event, or the user's entry
    ///   in the event does not exist
    /// - [`RosterError::StoreUnavailable`] if the store fails
    pub async fn verify_participant(
        &self,
        event_id: EventId,
        user_id: UserId,
        verified: VerificationStatus,
    ) -> Result<ParticipantView, RosterError> {
        let user = self.require_user(user_id).await?;

        match self
            .store
            .set_verification(event_id, user_id, verified, self.clock.now())
            .await?
        {
            VerificationOutcome::Updated(participant) => {
                let status = if participant.is_verified() { "verified" } else { "unverified" };
                metrics::counter!(PARTICIPANTS_VERIFIED, "status" => status).increment(1);
                tracing::info!(%event_id, %user_id, status, "Participant verification changed");
                Ok(ParticipantView::new(participant, user))
            },
            VerificationOutcome::Unchanged(participant) => {
                tracing::debug!(%event_id, %user_id, ?verified, "Participant verification already set");
                Ok(ParticipantView::new(participant, user))
            },
            VerificationOutcome::ParticipantMissing => Err(RosterError::not_found(
                Resource::Participant,
                format!("{user_id} in event {event_id}"),
            )),
            VerificationOutcome::EventMissing => Err(RosterError::not_found(Resource::Event, event_id)),
        }
    }

    /// [`verify_participant`](Self::verify_participant) with the raw `0`/`1`
    /// value as it arrives from a caller.
    ///
    /// # Errors
    ///
    /// [`RosterError::InvalidArgument`] for anything other than 0 or 1, then
    /// as [`verify_participant`](Self::verify_participant).
    pub async fn verify_participant_value(
        &self,
        event_id: EventId,
        user_id: UserId,
        verified: i64,
    ) -> Result<ParticipantView, RosterError> {
        let verified = VerificationStatus::try_from(verified)?;
        self.verify_participant(event_id, user_id, verified).await
    }
}
