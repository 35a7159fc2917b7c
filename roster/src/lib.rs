//! # Roster
//!
//! Participant query and lifecycle services for events.
//!
//! - [`ParticipantQueryEngine`](services::ParticipantQueryEngine): list an
//!   event's participants joined with their user records, with search, sort
//!   and pagination
//! - [`ParticipantLifecycle`](services::ParticipantLifecycle): idempotent join
//!   and verification
//! - [`EventImages`](services::EventImages): version-checked image edits
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use roster::RosterApp;
//! use roster_core::query::{ParticipantFilter, QueryOptions};
//! use roster_testing::{InMemoryStore, fixtures, test_clock};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), roster_core::RosterError> {
//! let store = InMemoryStore::new();
//! let alice = store.insert_user(fixtures::user("Alice"));
//! let event = store.insert_event(fixtures::EventBuilder::new().build());
//! let app = RosterApp::in_memory(&store, Arc::new(test_clock()), 10);
//!
//! app.lifecycle.join_event(event.id, alice.id).await?;
//! let page = app
//!     .queries
//!     .query_participants(event.id, ParticipantFilter::search("ali"), QueryOptions::default())
//!     .await?;
//! assert_eq!(page.results.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod config;
pub mod metrics;
pub mod services;

pub use app::{AppError, RosterApp};
pub use config::{Config, ConfigError};
