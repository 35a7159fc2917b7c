//! Domain types for event rosters.
//!
//! Value objects (identifiers, file references, verification status), the
//! [`Event`] aggregate with its embedded [`Participant`] list, and the read-only
//! [`User`] record owned by the user directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Error returned when an identifier cannot be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {kind} id: {value}")]
pub struct ParseIdError {
    kind: &'static str,
    value: String,
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self).map_err(|_| ParseIdError {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an event
    EventId,
    "event"
);
uuid_id!(
    /// Unique identifier for a user in the user directory
    UserId,
    "user"
);
uuid_id!(
    /// Unique identifier for a participant within its event
    ParticipantId,
    "participant"
);
uuid_id!(
    /// Unique identifier for a stored file reference
    FileId,
    "file"
);

/// Aggregate version for optimistic concurrency control.
///
/// Every successful write to an event bumps its version by one. A
/// whole-aggregate save states the version it read; the store rejects the save
/// if another writer got there first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Create a version from a raw number.
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Get the raw version number.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The version that follows this one.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Fixed-precision timestamp encoding for persisted participant fields.
///
/// Timestamps are written as RFC 3339 UTC with exactly three fractional digits
/// (`2025-01-01T09:30:00.000Z`). With a fixed width, lexicographic order on the
/// stored strings equals chronological order, and search matches against the
/// same text the store holds.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Drop precision below what [`format`] keeps.
    ///
    /// Values truncated here survive a store round trip unchanged.
    #[must_use]
    pub fn truncate(at: DateTime<Utc>) -> DateTime<Utc> {
        at.trunc_subsecs(3)
    }

    /// Render a timestamp in the persisted string form.
    #[must_use]
    pub fn format(at: &DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Serialize with [`format`].
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(at))
    }

    /// Deserialize any RFC 3339 timestamp.
    ///
    /// # Errors
    ///
    /// Fails when the input is not a valid RFC 3339 string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Error returned for verification values outside `{0, 1}`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid verification status {0}: expected 0 (unverified) or 1 (verified)")]
pub struct InvalidVerificationStatus(pub i64);

/// Verification state of a participant.
///
/// Persisted as the integer `0` or `1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum VerificationStatus {
    /// Joined but not yet checked by an organizer
    #[default]
    Unverified,
    /// Participation confirmed
    Verified,
}

impl VerificationStatus {
    /// Integer form used in storage.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Unverified => 0,
            Self::Verified => 1,
        }
    }
}

impl TryFrom<i64> for VerificationStatus {
    type Error = InvalidVerificationStatus;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unverified),
            1 => Ok(Self::Verified),
            other => Err(InvalidVerificationStatus(other)),
        }
    }
}

impl From<VerificationStatus> for i64 {
    fn from(status: VerificationStatus) -> Self {
        status.as_i64()
    }
}

impl From<bool> for VerificationStatus {
    fn from(verified: bool) -> Self {
        if verified { Self::Verified } else { Self::Unverified }
    }
}

/// Reference to an uploaded file.
///
/// Only the shape is modelled here; the bytes belong to the upload storage.
/// Dropping a reference never deletes the stored file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Reference id, used to address images for removal
    pub id: FileId,
    /// Form field the file was uploaded under
    pub field_name: String,
    /// File name as supplied by the client
    pub original_name: String,
    /// Transfer encoding
    pub encoding: String,
    /// MIME type
    pub mime_type: String,
    /// Storage path
    pub path: String,
    /// Size in bytes
    pub size: u64,
}

// ============================================================================
// Entities
// ============================================================================

/// A user's participation in one event.
///
/// Embedded in [`Event::participants`]; never addressed outside its event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Participant id (unique within the event)
    pub id: ParticipantId,
    /// Weak reference to the user directory
    pub user_id: UserId,
    /// Verification state
    pub is_verified: VerificationStatus,
    /// Optional attached file
    pub file: Option<FileRef>,
    /// When the user joined
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Last change to this entry
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    /// A fresh, unverified participant with no file.
    ///
    /// `now` is truncated to milliseconds, the precision timestamps are stored at.
    #[must_use]
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        let now = timestamp::truncate(now);
        Self {
            id: ParticipantId::new(),
            user_id,
            is_verified: VerificationStatus::Unverified,
            file: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the participant has been verified
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.is_verified == VerificationStatus::Verified
    }
}

/// Descriptive fields of an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    /// Event title
    pub title: String,
    /// Event description
    pub description: String,
    /// Start of the event
    pub start_at: DateTime<Utc>,
    /// End of the event
    pub end_at: DateTime<Utc>,
    /// Last moment users may register
    pub registration_deadline: DateTime<Utc>,
    /// Venue / location
    pub location: String,
    /// City
    pub city: String,
    /// Advertised capacity (informational, not enforced)
    pub kuota: Option<u32>,
}

/// Event aggregate root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event id
    pub id: EventId,
    /// Descriptive fields
    #[serde(flatten)]
    pub details: EventDetails,
    /// Attached images, newest first
    pub images: Vec<FileRef>,
    /// URL slug (generated elsewhere)
    pub slug: Option<String>,
    /// Participants in join order
    pub participants: Vec<Participant>,
    /// Store-managed version
    pub version: Version,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// A new event with no images and no participants.
    #[must_use]
    pub fn new(details: EventDetails, now: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            details,
            images: Vec::new(),
            slug: None,
            participants: Vec::new(),
            version: Version::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Find the participant entry for a user.
    #[must_use]
    pub fn participant(&self, user_id: &UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == *user_id)
    }

    /// Raw length of the embedded participant list.
    #[must_use]
    pub fn participant_count(&self) -> u64 {
        self.participants.len() as u64
    }
}

/// User record owned by the user directory. Read-only here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Email address
    pub email: String,
    /// Phone number
    pub phone: String,
}

/// A participant joined with its user record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantView {
    /// Participant id
    pub id: ParticipantId,
    /// Referenced user id
    pub user_id: UserId,
    /// Verification state
    pub is_verified: VerificationStatus,
    /// Optional attached file
    pub file: Option<FileRef>,
    /// When the user joined
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Last change to the participant entry
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Joined user record
    pub user: User,
}

impl ParticipantView {
    /// Join a participant with its user.
    #[must_use]
    pub fn new(participant: Participant, user: User) -> Self {
        Self {
            id: participant.id,
            user_id: participant.user_id,
            is_verified: participant.is_verified,
            file: participant.file,
            created_at: participant.created_at,
            updated_at: participant.updated_at,
            user,
        }
    }
}
