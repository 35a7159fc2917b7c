//! Application wiring.
//!
//! [`RosterApp`] bundles the three services over one shared store, user
//! directory and clock.

use crate::config::{Config, ConfigError};
use crate::services::{EventImages, ParticipantLifecycle, ParticipantQueryEngine};
use roster_core::environment::{Clock, SystemClock};
use roster_core::{AggregateStore, StoreError, UserDirectory};
use roster_postgres::{PostgresAggregateStore, PostgresUserDirectory};
use roster_testing::InMemoryStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while starting the application
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection failed
    #[error("Database connection error: {0}")]
    Connect(#[from] sqlx::Error),

    /// Store setup (e.g. migrations) failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// The roster services, ready to use.
#[derive(Clone)]
pub struct RosterApp {
    /// Participant listing
    pub queries: ParticipantQueryEngine,
    /// Join and verify
    pub lifecycle: ParticipantLifecycle,
    /// Image editing
    pub images: EventImages,
}

impl RosterApp {
    /// Wire the services over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn AggregateStore>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
        default_page_limit: u64,
    ) -> Self {
        Self {
            queries: ParticipantQueryEngine::new(Arc::clone(&store)).with_default_limit(default_page_limit),
            lifecycle: ParticipantLifecycle::new(Arc::clone(&store), users, Arc::clone(&clock)),
            images: EventImages::new(store, clock),
        }
    }

    /// Services over one in-memory store acting as both store and directory.
    #[must_use]
    pub fn in_memory(store: &InMemoryStore, clock: Arc<dyn Clock>, default_page_limit: u64) -> Self {
        Self::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            clock,
            default_page_limit,
        )
    }

    /// Connect to `PostgreSQL`, run migrations, and wire the services.
    ///
    /// Returns the aggregate store too, for callers that seed or inspect events.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the pool cannot be created or migrations fail.
    pub async fn connect(config: &Config) -> Result<(Self, Arc<PostgresAggregateStore>), AppError> {
        tracing::info!(
            max_connections = config.postgres.max_connections,
            min_connections = config.postgres.min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.postgres.max_connections)
            .min_connections(config.postgres.min_connections)
            .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
            .connect(&config.postgres.url)
            .await?;

        let store = Arc::new(PostgresAggregateStore::from_pool(pool.clone()));
        store.migrate().await?;
        tracing::info!("Migrations applied");

        let users = Arc::new(PostgresUserDirectory::from_pool(pool));
        let app = Self::new(
            Arc::clone(&store) as Arc<dyn AggregateStore>,
            users,
            Arc::new(SystemClock),
            config.roster.default_page_limit,
        );

        Ok((app, store))
    }
}
