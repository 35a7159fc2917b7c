//! `PostgreSQL` aggregate store and user directory for event rosters.
//!
//! Events are rows in the `events` table with `images` and `participants`
//! held as `JSONB` arrays. Users live in the `users` table.
//!
//! - [`PostgresAggregateStore`]: implements
//!   [`AggregateStore`](roster_core::AggregateStore). Every mutation is a
//!   single conditional `UPDATE`, so per-event atomicity comes from the row
//!   lock rather than from application-side locking.
//! - [`PostgresUserDirectory`]: implements
//!   [`UserDirectory`](roster_core::UserDirectory).
//!
//! # Example
//!
//! ```no_run
//! use roster_postgres::{PostgresAggregateStore, PostgresUserDirectory};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresAggregateStore::connect("postgres://localhost/roster").await?;
//! store.migrate().await?;
//! let users = PostgresUserDirectory::from_pool(store.pool().clone());
//! # Ok(())
//! # }
//! ```

pub mod pipeline;

use chrono::{DateTime, Utc};
use pipeline::{CompiledPipeline, Param};
use roster_core::pipeline::{ParticipantPipeline, ParticipantRow, PipelineOutput};
use roster_core::store::{
    AggregateStore, AppendOutcome, StoreError, StoreFuture, UserDirectory, VerificationOutcome,
};
use roster_core::types::{
    Event, EventDetails, EventId, FileRef, Participant, User, UserId, VerificationStatus, Version, timestamp,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

const EVENT_COLUMNS: &str = "id, title, description, start_at, end_at, registration_deadline, location, city, \
                             kuota, slug, images, participants, version, created_at, updated_at";

/// Verification retries when the entry changes between the update and the re-read.
const VERIFY_ATTEMPTS: usize = 3;

fn database(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn decode(e: sqlx::Error) -> StoreError {
    StoreError::Serialization(e.to_string())
}

fn to_db_version(version: Version) -> Result<i64, StoreError> {
    i64::try_from(version.value())
        .map_err(|_| StoreError::Serialization(format!("version {version} exceeds BIGINT")))
}

fn from_db_version(version: i64) -> Result<Version, StoreError> {
    u64::try_from(version)
        .map(Version::new)
        .map_err(|_| StoreError::Serialization(format!("negative version {version}")))
}

fn event_from_row(row: &PgRow) -> Result<Event, StoreError> {
    let kuota: Option<i32> = row.try_get("kuota").map_err(decode)?;
    let kuota = kuota
        .map(u32::try_from)
        .transpose()
        .map_err(|e| StoreError::Serialization(format!("kuota: {e}")))?;
    let Json(images): Json<Vec<FileRef>> = row.try_get("images").map_err(decode)?;
    let Json(participants): Json<Vec<Participant>> = row.try_get("participants").map_err(decode)?;

    Ok(Event {
        id: EventId::from_uuid(row.try_get("id").map_err(decode)?),
        details: EventDetails {
            title: row.try_get("title").map_err(decode)?,
            description: row.try_get("description").map_err(decode)?,
            start_at: row.try_get("start_at").map_err(decode)?,
            end_at: row.try_get("end_at").map_err(decode)?,
            registration_deadline: row.try_get("registration_deadline").map_err(decode)?,
            location: row.try_get("location").map_err(decode)?,
            city: row.try_get("city").map_err(decode)?,
            kuota,
        },
        images,
        slug: row.try_get("slug").map_err(decode)?,
        participants,
        version: from_db_version(row.try_get("version").map_err(decode)?)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

fn kuota_param(event: &Event) -> Result<Option<i32>, StoreError> {
    event
        .details
        .kuota
        .map(i32::try_from)
        .transpose()
        .map_err(|e| StoreError::Serialization(format!("kuota: {e}")))
}

/// `PostgreSQL`-backed [`AggregateStore`].
#[derive(Clone, Debug)]
pub struct PostgresAggregateStore {
    pool: PgPool,
}

impl PostgresAggregateStore {
    /// Create a store from an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a default pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;

        Ok(Self::from_pool(pool))
    }

    /// Run the bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn find(&self, event_id: EventId) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
            .bind(event_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(database)?;

        row.as_ref().map(event_from_row).transpose()
    }

    async fn insert(&self, event: &Event) -> Result<Version, StoreError> {
        let version = Version::new(1);
        let inserted = sqlx::query(
            r"
            INSERT INTO events (
                id, title, description, start_at, end_at, registration_deadline, location, city,
                kuota, slug, images, participants, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(event.id.as_uuid())
        .bind(&event.details.title)
        .bind(&event.details.description)
        .bind(event.details.start_at)
        .bind(event.details.end_at)
        .bind(event.details.registration_deadline)
        .bind(&event.details.location)
        .bind(&event.details.city)
        .bind(kuota_param(event)?)
        .bind(&event.slug)
        .bind(Json(&event.images))
        .bind(Json(&event.participants))
        .bind(to_db_version(version)?)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await
        .map_err(database)?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::DuplicateEvent(event.id));
        }

        tracing::debug!(event_id = %event.id, "Inserted event");
        Ok(version)
    }

    async fn update(&self, event: &Event, expected: Version) -> Result<Version, StoreError> {
        let row = sqlx::query(
            r"
            UPDATE events
            SET title = $3, description = $4, start_at = $5, end_at = $6,
                registration_deadline = $7, location = $8, city = $9, kuota = $10,
                slug = $11, images = $12, participants = $13, updated_at = $14,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING version
            ",
        )
        .bind(event.id.as_uuid())
        .bind(to_db_version(expected)?)
        .bind(&event.details.title)
        .bind(&event.details.description)
        .bind(event.details.start_at)
        .bind(event.details.end_at)
        .bind(event.details.registration_deadline)
        .bind(&event.details.location)
        .bind(&event.details.city)
        .bind(kuota_param(event)?)
        .bind(&event.slug)
        .bind(Json(&event.images))
        .bind(Json(&event.participants))
        .bind(event.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(database)?;

        if let Some(row) = row {
            return from_db_version(row.try_get("version").map_err(decode)?);
        }

        let current: Option<(i64,)> = sqlx::query_as("SELECT version FROM events WHERE id = $1")
            .bind(event.id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(database)?;

        match current {
            None => Err(StoreError::EventNotFound(event.id)),
            Some((actual,)) => Err(StoreError::ConcurrencyConflict {
                event_id: event.id,
                expected,
                actual: from_db_version(actual)?,
            }),
        }
    }

    /// The event's entry for `user_id`. Outer `None` if the event is missing.
    async fn find_participant(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Option<Option<Participant>>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT (
                SELECT p.value FROM jsonb_array_elements(e.participants) AS p(value)
                WHERE p.value->>'user_id' = $2
                LIMIT 1
            ) AS participant
            FROM events e
            WHERE e.id = $1
            ",
        )
        .bind(event_id.as_uuid())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(database)?;

        row.map(|row| {
            let participant: Option<Json<Participant>> = row.try_get("participant").map_err(decode)?;
            Ok(participant.map(|Json(p)| p))
        })
        .transpose()
    }

    async fn append(&self, event_id: EventId, participant: Participant) -> Result<AppendOutcome, StoreError> {
        // Concurrent appends serialize on the row lock; the loser re-checks the
        // containment predicate against the winner's row and matches nothing.
        let appended = sqlx::query(
            r"
            UPDATE events
            SET participants = participants || jsonb_build_array($2::jsonb),
                version = version + 1,
                updated_at = $4
            WHERE id = $1
              AND NOT participants @> jsonb_build_array(jsonb_build_object('user_id', $3::text))
            ",
        )
        .bind(event_id.as_uuid())
        .bind(Json(&participant))
        .bind(participant.user_id.to_string())
        .bind(participant.created_at)
        .execute(&self.pool)
        .await
        .map_err(database)?;

        if appended.rows_affected() > 0 {
            tracing::debug!(%event_id, user_id = %participant.user_id, "Appended participant");
            return Ok(AppendOutcome::Appended(participant));
        }

        match self.find_participant(event_id, participant.user_id).await? {
            None => Ok(AppendOutcome::EventMissing),
            Some(Some(existing)) => Ok(AppendOutcome::AlreadyJoined(existing)),
            Some(None) => Err(StoreError::Database(format!(
                "append to event {event_id} matched an entry for user {} that no longer exists",
                participant.user_id
            ))),
        }
    }

    async fn verify(
        &self,
        event_id: EventId,
        user_id: UserId,
        status: VerificationStatus,
        at: DateTime<Utc>,
    ) -> Result<VerificationOutcome, StoreError> {
        for _ in 0..VERIFY_ATTEMPTS {
            // Rewrites only the element whose user_id matches; there is at most one.
            let row = sqlx::query(
                r"
                UPDATE events e
                SET participants = (
                        SELECT jsonb_agg(
                                   CASE WHEN p.value->>'user_id' = $2
                                        THEN p.value || jsonb_build_object('is_verified', $3::bigint, 'updated_at', $4::text)
                                        ELSE p.value
                                   END
                                   ORDER BY p.ordinality)
                        FROM jsonb_array_elements(e.participants) WITH ORDINALITY AS p(value, ordinality)
                    ),
                    version = e.version + 1,
                    updated_at = $5
                WHERE e.id = $1
                  AND e.participants @> jsonb_build_array(jsonb_build_object('user_id', $2::text))
                  AND NOT e.participants @> jsonb_build_array(
                          jsonb_build_object('user_id', $2::text, 'is_verified', $3::bigint))
                RETURNING (
                    SELECT p.value FROM jsonb_array_elements(e.participants) AS p(value)
                    WHERE p.value->>'user_id' = $2
                    LIMIT 1
                ) AS participant
                ",
            )
            .bind(event_id.as_uuid())
            .bind(user_id.to_string())
            .bind(status.as_i64())
            .bind(timestamp::format(&at))
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(database)?;

            if let Some(row) = row {
                let Json(participant): Json<Participant> = row.try_get("participant").map_err(decode)?;
                tracing::debug!(%event_id, %user_id, ?status, "Updated participant verification");
                return Ok(VerificationOutcome::Updated(participant));
            }

            match self.find_participant(event_id, user_id).await? {
                None => return Ok(VerificationOutcome::EventMissing),
                Some(None) => return Ok(VerificationOutcome::ParticipantMissing),
                Some(Some(existing)) if existing.is_verified == status => {
                    return Ok(VerificationOutcome::Unchanged(existing));
                },
                Some(Some(_)) => {
                    tracing::debug!(%event_id, %user_id, "Verification raced with another writer, retrying");
                },
            }
        }

        Err(StoreError::Database(format!(
            "verification of user {user_id} on event {event_id} kept racing with other writers"
        )))
    }

    async fn run(&self, pipeline: ParticipantPipeline) -> Result<Option<PipelineOutput>, StoreError> {
        let CompiledPipeline { sql, params } = pipeline::compile(&pipeline)?;

        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await.map_err(database)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(database)?;

        let count: Option<(i32,)> = sqlx::query_as("SELECT jsonb_array_length(participants) FROM events WHERE id = $1")
            .bind(pipeline.event_id().as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(database)?;

        let Some((count,)) = count else {
            tx.rollback().await.map_err(database)?;
            return Ok(None);
        };

        let mut query = sqlx::query(&sql);
        for param in params {
            query = match param {
                Param::Uuid(value) => query.bind(value),
                Param::Path(value) => query.bind(value),
                Param::Text(value) => query.bind(value),
                Param::Int(value) => query.bind(value),
            };
        }
        let rows = query.fetch_all(&mut *tx).await.map_err(database)?;
        tx.commit().await.map_err(database)?;

        let rows = rows
            .iter()
            .map(|row| {
                let Json(participant): Json<Participant> = row.try_get("participant").map_err(decode)?;
                let user: Option<Json<User>> = row.try_get("user_doc").map_err(decode)?;
                Ok(ParticipantRow {
                    participant,
                    user: user.map(|Json(user)| user),
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(Some(PipelineOutput {
            rows,
            participant_count: u64::try_from(count).unwrap_or_default(),
        }))
    }
}

impl AggregateStore for PostgresAggregateStore {
    fn find_event(&self, event_id: EventId) -> StoreFuture<'_, Option<Event>> {
        Box::pin(self.find(event_id))
    }

    fn save_event(&self, event: Event, expected_version: Option<Version>) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            match expected_version {
                None => self.insert(&event).await,
                Some(expected) => self.update(&event, expected).await,
            }
        })
    }

    fn append_participant(&self, event_id: EventId, participant: Participant) -> StoreFuture<'_, AppendOutcome> {
        Box::pin(self.append(event_id, participant))
    }

    fn set_verification(
        &self,
        event_id: EventId,
        user_id: UserId,
        status: VerificationStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, VerificationOutcome> {
        Box::pin(self.verify(event_id, user_id, status, at))
    }

    fn run_participant_pipeline(&self, pipeline: ParticipantPipeline) -> StoreFuture<'_, Option<PipelineOutput>> {
        Box::pin(self.run(pipeline))
    }
}

/// `PostgreSQL`-backed [`UserDirectory`] over the `users` table.
#[derive(Clone, Debug)]
pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    /// Create a directory from an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace a user record.
    ///
    /// The directory is read-only to the roster services; this is for seeding.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the write fails.
    pub async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO users (id, name, email, phone)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, email = EXCLUDED.email, phone = EXCLUDED.phone
            ",
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .execute(&self.pool)
        .await
        .map_err(database)?;
        Ok(())
    }

    /// Delete a user record. Participants referencing it become orphans.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the write fails.
    pub async fn delete_user(&self, user_id: UserId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(database)?;
        Ok(())
    }
}

impl UserDirectory for PostgresUserDirectory {
    fn find_user(&self, user_id: UserId) -> StoreFuture<'_, Option<User>> {
        Box::pin(async move {
            let row: Option<(Uuid, String, String, String)> =
                sqlx::query_as("SELECT id, name, email, phone FROM users WHERE id = $1")
                    .bind(user_id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(database)?;

            Ok(row.map(|(id, name, email, phone)| User {
                id: UserId::from_uuid(id),
                name,
                email,
                phone,
            }))
        })
    }
}
