//! Builders for events, users and file references.

use crate::mocks::epoch;
use chrono::{DateTime, Duration, Utc};
use roster_core::types::{
    Event, EventDetails, EventId, FileId, FileRef, Participant, User, UserId, VerificationStatus,
};

/// A user whose email and phone derive from `name`.
#[must_use]
pub fn user(name: &str) -> User {
    let handle = name.to_lowercase().replace(' ', ".");
    User {
        id: UserId::new(),
        name: name.to_string(),
        email: format!("{handle}@example.com"),
        phone: format!("+62 812 {:04}", handle.len() * 101),
    }
}

/// An image reference named `name`.
#[must_use]
pub fn image(name: &str) -> FileRef {
    FileRef {
        id: FileId::new(),
        field_name: "images".to_string(),
        original_name: name.to_string(),
        encoding: "7bit".to_string(),
        mime_type: "image/png".to_string(),
        path: format!("uploads/{name}"),
        size: 1024,
    }
}

/// Plausible event details anchored at [`epoch`].
#[must_use]
pub fn details(title: &str) -> EventDetails {
    let start = epoch() + Duration::days(30);
    EventDetails {
        title: title.to_string(),
        description: format!("{title} description"),
        start_at: start,
        end_at: start + Duration::hours(8),
        registration_deadline: start - Duration::days(2),
        location: "Main Hall".to_string(),
        city: "Bandung".to_string(),
        kuota: Some(100),
    }
}

/// Builder for [`Event`] fixtures.
///
/// Participants join one minute apart starting at [`epoch`], in the order they
/// are added.
#[derive(Clone, Debug)]
pub struct EventBuilder {
    id: EventId,
    details: EventDetails,
    images: Vec<FileRef>,
    participants: Vec<(UserId, VerificationStatus)>,
    created_at: DateTime<Utc>,
}

impl EventBuilder {
    /// An event titled "Community Meetup" with no images or participants.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: EventId::new(),
            details: details("Community Meetup"),
            images: Vec::new(),
            participants: Vec::new(),
            created_at: epoch(),
        }
    }

    /// Use a specific id.
    #[must_use]
    pub const fn id(mut self, id: EventId) -> Self {
        self.id = id;
        self
    }

    /// Set the title.
    #[must_use]
    pub fn title(mut self, title: &str) -> Self {
        self.details.title = title.to_string();
        self
    }

    /// Attach an image.
    #[must_use]
    pub fn image(mut self, image: FileRef) -> Self {
        self.images.push(image);
        self
    }

    /// Add an unverified participant.
    #[must_use]
    pub fn participant(self, user_id: UserId) -> Self {
        self.participant_with_status(user_id, VerificationStatus::Unverified)
    }

    /// Add a verified participant.
    #[must_use]
    pub fn verified_participant(self, user_id: UserId) -> Self {
        self.participant_with_status(user_id, VerificationStatus::Verified)
    }

    /// Add a participant with the given status.
    #[must_use]
    pub fn participant_with_status(mut self, user_id: UserId, status: VerificationStatus) -> Self {
        self.participants.push((user_id, status));
        self
    }

    /// Build the event. Its version is left at zero; stores assign one on insert.
    #[must_use]
    pub fn build(self) -> Event {
        let mut event = Event::new(self.details, self.created_at);
        event.id = self.id;
        event.images = self.images;
        event.participants = self
            .participants
            .into_iter()
            .zip(0i64..)
            .map(|((user_id, status), minute)| {
                let mut participant = Participant::new(user_id, self.created_at + Duration::minutes(minute));
                participant.is_verified = status;
                participant
            })
            .collect();
        event
    }
}

impl Default for EventBuilder {
    fn default() -> Self {
        Self::new()
    }
}
