//! Compiles a [`ParticipantPipeline`] into one SQL statement.
//!
//! Each stage wraps the previous statement as a subquery. Every level carries
//! the `participant` document, the joined `user_doc` (NULL until the lookup)
//! and an `ordering` column that the final `SELECT` sorts on:
//!
//! ```text
//! SELECT f.participant, f.user_doc FROM (
//!   SELECT s.participant, s.user_doc, s.ordering FROM (      -- limit
//!     SELECT ... WHERE strpos(...) > 0 ...                   -- search
//!       SELECT ... JOIN users u ...                          -- lookup
//!         SELECT ..., row_number() OVER (ORDER BY ...) ...   -- sort
//!           SELECT ... jsonb_array_elements(...) WITH ORDINALITY  -- unwind
//!   ) s ORDER BY s.ordering LIMIT $n
//! ) f ORDER BY f.ordering
//! ```
//!
//! Field paths, search terms and counts are always bound as parameters.

use roster_core::pipeline::{ParticipantPipeline, Stage};
use roster_core::query::{SortDirection, SortSpec};
use roster_core::store::StoreError;
use uuid::Uuid;

/// A bound parameter of a compiled pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Param {
    /// `uuid`
    Uuid(Uuid),
    /// `text[]` field path for `#>`
    Path(Vec<String>),
    /// `text`
    Text(String),
    /// `bigint`
    Int(i64),
}

/// SQL text plus its parameters in `$1..$n` order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledPipeline {
    /// Statement returning `participant jsonb, user_doc jsonb` rows in order
    pub sql: String,
    /// Parameters; `params[i]` binds `$(i + 1)`
    pub params: Vec<Param>,
}

struct Compiler {
    sql: Option<String>,
    params: Vec<Param>,
}

impl Compiler {
    fn bind(&mut self, param: Param) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    fn wrap(&mut self, stage: &Stage) -> Result<(), StoreError> {
        let Some(inner) = self.sql.take() else {
            return Err(StoreError::InvalidPipeline(format!(
                "{stage:?} requires participants to be unwound first"
            )));
        };

        let sql = match stage {
            Stage::Unwind => {
                self.sql = Some(inner);
                return Ok(());
            },
            Stage::Sort(specs) => {
                let keys = self.sort_keys(specs);
                format!(
                    "SELECT s.participant, s.user_doc, \
                     row_number() OVER (ORDER BY {keys}s.ordering) AS ordering \
                     FROM ({inner}) s"
                )
            },
            Stage::LookupUser => format!(
                "SELECT s.participant, \
                 jsonb_build_object('id', u.id, 'name', u.name, 'email', u.email, 'phone', u.phone) AS user_doc, \
                 s.ordering \
                 FROM ({inner}) s \
                 JOIN users u ON u.id = (s.participant->>'user_id')::uuid"
            ),
            Stage::Search(term) => {
                let term = self.bind(Param::Text(term.clone()));
                let matches = [
                    "s.user_doc->>'name'",
                    "s.user_doc->>'email'",
                    "s.user_doc->>'phone'",
                    "s.participant->>'created_at'",
                ]
                .iter()
                .map(|field| format!("strpos(lower(coalesce({field}, '')), lower({term})) > 0"))
                .collect::<Vec<_>>()
                .join(" OR ");
                format!("SELECT s.participant, s.user_doc, s.ordering FROM ({inner}) s WHERE {matches}")
            },
            Stage::Skip(n) => {
                let n = self.bind(Param::Int(i64::try_from(*n).unwrap_or(i64::MAX)));
                format!("SELECT s.participant, s.user_doc, s.ordering FROM ({inner}) s ORDER BY s.ordering OFFSET {n}")
            },
            Stage::Limit(n) => {
                let n = self.bind(Param::Int(i64::try_from(*n).unwrap_or(i64::MAX)));
                format!("SELECT s.participant, s.user_doc, s.ordering FROM ({inner}) s ORDER BY s.ordering LIMIT {n}")
            },
        };

        self.sql = Some(sql);
        Ok(())
    }

    fn sort_keys(&mut self, specs: &[SortSpec]) -> String {
        let mut keys = String::new();
        for spec in specs {
            let path = self.bind(Param::Path(spec.field.segments().to_vec()));
            let direction = match spec.direction {
                SortDirection::Ascending => "ASC",
                SortDirection::Descending => "DESC",
            };
            keys.push_str(&format!("coalesce(s.participant #> {path}, 'null'::jsonb) {direction}, "));
        }
        keys
    }
}

/// Compile a pipeline.
///
/// # Errors
///
/// Returns [`StoreError::InvalidPipeline`] if a row stage precedes
/// [`Stage::Unwind`] or the pipeline never unwinds.
pub fn compile(pipeline: &ParticipantPipeline) -> Result<CompiledPipeline, StoreError> {
    let mut compiler = Compiler {
        sql: None,
        params: Vec::new(),
    };
    let event_id = compiler.bind(Param::Uuid(*pipeline.event_id().as_uuid()));

    for stage in pipeline.stages() {
        if *stage == Stage::Unwind && compiler.sql.is_none() {
            compiler.sql = Some(format!(
                "SELECT p.value AS participant, NULL::jsonb AS user_doc, p.ordinality AS ordering \
                 FROM events e \
                 CROSS JOIN LATERAL jsonb_array_elements(e.participants) WITH ORDINALITY AS p(value, ordinality) \
                 WHERE e.id = {event_id}"
            ));
            continue;
        }
        compiler.wrap(stage)?;
    }

    let Some(inner) = compiler.sql else {
        return Err(StoreError::InvalidPipeline("pipeline never unwinds participants".to_string()));
    };

    Ok(CompiledPipeline {
        sql: format!("SELECT f.participant, f.user_doc FROM ({inner}) f ORDER BY f.ordering"),
        params: compiler.params,
    })
}
