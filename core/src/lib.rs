//! # Roster Core
//!
//! Domain types and collaborator contracts for managing the participants of an
//! event.
//!
//! An [`Event`](types::Event) is an aggregate that embeds an ordered list of
//! [`Participant`](types::Participant) records. Each participant references a
//! [`User`](types::User) by id only; the user record itself lives in a separate
//! directory and is joined in at query time.
//!
//! ## Core Concepts
//!
//! - **Aggregate Store**: persists events and runs participant pipelines
//!   ([`store::AggregateStore`])
//! - **User Directory**: point lookup of users ([`store::UserDirectory`])
//! - **Pipeline**: unwind → sort → lookup → search → skip → limit over one
//!   event's participants ([`pipeline::ParticipantPipeline`])
//! - **Pagination**: page/limit normalization shared by every listing
//!   ([`pagination`])
//!
//! ## Example
//!
//! ```
//! use roster_core::pagination::{normalize, total_pages};
//!
//! let window = normalize(Some(3), Some(10));
//! assert_eq!(window.skip, 20);
//! assert_eq!(total_pages(21, window.limit), 3);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod environment;
pub mod error;
pub mod pagination;
pub mod pipeline;
pub mod query;
pub mod store;
pub mod types;

pub use error::{Resource, RosterError};
pub use store::{AggregateStore, StoreError, UserDirectory};
