//! Roster services.
//!
//! Each service holds its collaborators as trait objects, so the same service
//! runs against `PostgreSQL` in production and the in-memory store in tests.
//! Store errors are converted to [`RosterError`](roster_core::RosterError) at
//! this boundary.

mod images;
mod lifecycle;
mod query;

pub use images::{EventImages, ImageEdit, ImageEditOutcome};
pub use lifecycle::ParticipantLifecycle;
pub use query::ParticipantQueryEngine;
