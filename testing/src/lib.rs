//! # Roster Testing
//!
//! Testing utilities for the event roster crates.
//!
//! This crate provides:
//! - [`InMemoryStore`]: an [`AggregateStore`](roster_core::AggregateStore) and
//!   [`UserDirectory`](roster_core::UserDirectory) backed by `HashMap`s
//! - Deterministic clocks ([`FixedClock`], [`SteppingClock`])
//! - Fixture builders for events and users
//!
//! ## Example
//!
//! ```
//! use roster_core::AggregateStore;
//! use roster_testing::{InMemoryStore, fixtures};
//!
//! # futures::executor::block_on(async {
//! let store = InMemoryStore::new();
//! let alice = store.insert_user(fixtures::user("Alice"));
//! let event = store.insert_event(fixtures::EventBuilder::new().participant(alice.id).build());
//!
//! let loaded = store.find_event(event.id).await.ok().flatten();
//! assert_eq!(loaded.map(|e| e.participants.len()), Some(1));
//! # });
//! ```

use chrono::{DateTime, Duration, Utc};
use roster_core::environment::Clock;

pub mod fixtures;
mod store;

pub use store::InMemoryStore;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Duration, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use roster_testing::mocks::FixedClock;
    /// use roster_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that moves forward by a fixed step on every read.
    ///
    /// Gives each join a distinct `created_at`, so ordering by time is
    /// observable in tests.
    #[derive(Debug)]
    pub struct SteppingClock {
        start: DateTime<Utc>,
        step: Duration,
        ticks: AtomicI64,
    }

    impl SteppingClock {
        /// Start at `start`, advancing by `step` per call to `now`.
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: Duration) -> Self {
            Self {
                start,
                step,
                ticks: AtomicI64::new(0),
            }
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
            self.start + self.step * i32::try_from(tick).unwrap_or(i32::MAX)
        }
    }

    /// The instant every test clock starts from: 2025-01-01 00:00:00 UTC.
    #[must_use]
    pub fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }

    /// A stepping clock starting at [`epoch`] and advancing one minute per read.
    #[must_use]
    pub fn stepping_clock() -> SteppingClock {
        SteppingClock::new(epoch(), Duration::minutes(1))
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, SteppingClock, stepping_clock, test_clock};
