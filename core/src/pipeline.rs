//! Participant pipelines.
//!
//! A [`ParticipantPipeline`] describes a read over one event's embedded
//! participant list as an ordered list of [`Stage`]s. Stores execute it; the
//! in-memory reference semantics live in [`ParticipantPipeline::evaluate`] and
//! SQL-backed stores compile the same stages.
//!
//! Every pipeline implicitly starts by locating the event and projecting its
//! participants. Row stages (sort, lookup, search, skip, limit) are only valid
//! after [`Stage::Unwind`].
//!
//! # Ordering of values
//!
//! Sort keys are read from the participant's persisted JSON document, so any
//! field can be sorted on without knowing its type. Values of different types
//! order as `null < string < number < boolean < array < object`, matching
//! `PostgreSQL`'s `jsonb` ordering. Missing fields sort as `null`. Sorting is
//! stable: ties keep join order.

use crate::query::{FieldPath, SortDirection, SortSpec};
use crate::store::StoreError;
use crate::types::{EventId, Participant, ParticipantView, User, UserId, timestamp};
use serde_json::Value;
use std::cmp::Ordering;

/// One step of a participant pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    /// One row per embedded participant
    Unwind,
    /// Stable sort on participant-local fields
    Sort(Vec<SortSpec>),
    /// Inner join against the user directory; rows without a user are dropped
    LookupUser,
    /// Case-insensitive substring over user name, email, phone and `created_at`
    Search(String),
    /// Drop the first `n` rows
    Skip(u64),
    /// Keep at most `n` rows
    Limit(u64),
}

/// A read over one event's participants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParticipantPipeline {
    event_id: EventId,
    stages: Vec<Stage>,
}

/// A participant row, joined with its user once [`Stage::LookupUser`] has run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParticipantRow {
    /// The embedded participant
    pub participant: Participant,
    /// The joined user, if looked up
    pub user: Option<User>,
}

impl ParticipantRow {
    /// Convert to a view; `None` if the row was never joined.
    #[must_use]
    pub fn into_view(self) -> Option<ParticipantView> {
        let user = self.user?;
        Some(ParticipantView::new(self.participant, user))
    }
}

/// Result of running a pipeline against an existing event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineOutput {
    /// Rows surviving every stage, in pipeline order
    pub rows: Vec<ParticipantRow>,
    /// Raw length of the event's participant list, before any stage
    pub participant_count: u64,
}

impl ParticipantPipeline {
    /// Start a pipeline over the participants of `event_id`.
    #[must_use]
    pub const fn for_event(event_id: EventId) -> Self {
        Self {
            event_id,
            stages: Vec::new(),
        }
    }

    /// Append a stage.
    #[must_use]
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append [`Stage::Unwind`].
    #[must_use]
    pub fn unwind(self) -> Self {
        self.stage(Stage::Unwind)
    }

    /// Append [`Stage::Sort`] unless there are no criteria.
    #[must_use]
    pub fn sort(self, specs: Vec<SortSpec>) -> Self {
        if specs.is_empty() {
            self
        } else {
            self.stage(Stage::Sort(specs))
        }
    }

    /// Append [`Stage::LookupUser`].
    #[must_use]
    pub fn lookup_user(self) -> Self {
        self.stage(Stage::LookupUser)
    }

    /// Append [`Stage::Search`] unless the term matches everything.
    #[must_use]
    pub fn search(self, term: Option<&str>) -> Self {
        match term {
            Some(term) if !term.is_empty() => self.stage(Stage::Search(term.to_string())),
            _ => self,
        }
    }

    /// Append [`Stage::Skip`].
    #[must_use]
    pub fn skip(self, n: u64) -> Self {
        self.stage(Stage::Skip(n))
    }

    /// Append [`Stage::Limit`].
    #[must_use]
    pub fn limit(self, n: u64) -> Self {
        self.stage(Stage::Limit(n))
    }

    /// The event this pipeline reads.
    #[must_use]
    pub const fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Execute the stages against an event's participant list.
    ///
    /// `lookup` resolves user ids for [`Stage::LookupUser`].
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidPipeline`] if a row stage runs before
    ///   [`Stage::Unwind`], or the pipeline never unwinds
    /// - [`StoreError::Serialization`] if a participant cannot be rendered for
    ///   sorting
    pub fn evaluate<F>(&self, participants: &[Participant], mut lookup: F) -> Result<Vec<ParticipantRow>, StoreError>
    where
        F: FnMut(&UserId) -> Option<User>,
    {
        let mut rows: Option<Vec<ParticipantRow>> = None;

        for stage in &self.stages {
            if *stage == Stage::Unwind {
                // A second unwind has nothing left to flatten
                if rows.is_some() {
                    continue;
                }
                rows = Some(
                    participants
                        .iter()
                        .cloned()
                        .map(|participant| ParticipantRow {
                            participant,
                            user: None,
                        })
                        .collect(),
                );
                continue;
            }

            let Some(current) = rows.as_mut() else {
                return Err(StoreError::InvalidPipeline(format!(
                    "{stage:?} requires participants to be unwound first"
                )));
            };

            match stage {
                Stage::Unwind => {},
                Stage::Sort(specs) => sort_rows(current, specs)?,
                Stage::LookupUser => {
                    current.retain_mut(|row| {
                        row.user = lookup(&row.participant.user_id);
                        row.user.is_some()
                    });
                },
                Stage::Search(term) => {
                    let needle = term.to_lowercase();
                    current.retain(|row| matches_search(row, &needle));
                },
                Stage::Skip(n) => {
                    let n = usize::try_from(*n).unwrap_or(usize::MAX).min(current.len());
                    current.drain(..n);
                },
                Stage::Limit(n) => {
                    current.truncate(usize::try_from(*n).unwrap_or(usize::MAX));
                },
            }
        }

        rows.ok_or_else(|| StoreError::InvalidPipeline("pipeline never unwinds participants".to_string()))
    }
}

/// Does a row match an already-lowercased search needle?
///
/// Before the user lookup only `created_at` can match.
fn matches_search(row: &ParticipantRow, needle: &str) -> bool {
    let contains = |haystack: &str| haystack.to_lowercase().contains(needle);

    let user_matches = row
        .user
        .as_ref()
        .is_some_and(|user| contains(&user.name) || contains(&user.email) || contains(&user.phone));

    user_matches || contains(&timestamp::format(&row.participant.created_at))
}

fn sort_rows(rows: &mut Vec<ParticipantRow>, specs: &[SortSpec]) -> Result<(), StoreError> {
    let mut keyed = Vec::with_capacity(rows.len());
    for row in rows.drain(..) {
        let document =
            serde_json::to_value(&row.participant).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let keys: Vec<Value> = specs.iter().map(|spec| field_value(&document, &spec.field)).collect();
        keyed.push((keys, row));
    }

    keyed.sort_by(|(left, _), (right, _)| {
        specs
            .iter()
            .zip(left.iter().zip(right.iter()))
            .map(|(spec, (l, r))| match spec.direction {
                SortDirection::Ascending => compare_values(l, r),
                SortDirection::Descending => compare_values(r, l),
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });

    rows.extend(keyed.into_iter().map(|(_, row)| row));
    Ok(())
}

fn field_value(document: &Value, path: &FieldPath) -> Value {
    path.segments()
        .iter()
        .try_fold(document, |value, segment| value.get(segment))
        .cloned()
        .unwrap_or(Value::Null)
}

const fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values; see the module docs.
#[must_use]
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::String(l), Value::String(r)) => l.cmp(r),
        (Value::Number(l), Value::Number(r)) => {
            let l = l.as_f64().unwrap_or(f64::NAN);
            let r = r.as_f64().unwrap_or(f64::NAN);
            l.total_cmp(&r)
        },
        (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
        (Value::Array(l), Value::Array(r)) => l.len().cmp(&r.len()).then_with(|| {
            l.iter()
                .zip(r.iter())
                .map(|(a, b)| compare_values(a, b))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        }),
        (Value::Object(l), Value::Object(r)) => l
            .len()
            .cmp(&r.len())
            .then_with(|| left.to_string().cmp(&right.to_string())),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}
