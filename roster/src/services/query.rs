//! Participant listing: join, search, sort and paginate one event's roster.

use crate::metrics::QUERY_RESULT_SIZE;
use roster_core::pagination::{DEFAULT_LIMIT, Page, normalize_with};
use roster_core::pipeline::{ParticipantPipeline, ParticipantRow};
use roster_core::query::{ParticipantFilter, QueryOptions};
use roster_core::types::{EventId, ParticipantView};
use roster_core::{AggregateStore, Resource, RosterError};
use std::sync::Arc;

/// Read side of the roster.
///
/// Builds one pipeline per query:
///
/// ```text
/// match event → unwind → sort → lookup user → search → skip → limit
/// ```
///
/// `total_results` on the returned page is the event's raw participant count,
/// taken before the user join and the search filter. A page can therefore
/// hold fewer rows than `total_results` suggests.
#[derive(Clone)]
pub struct ParticipantQueryEngine {
    store: Arc<dyn AggregateStore>,
    default_limit: u64,
}

impl ParticipantQueryEngine {
    /// Create an engine using the default page size of 10.
    #[must_use]
    pub fn new(store: Arc<dyn AggregateStore>) -> Self {
        Self {
            store,
            default_limit: DEFAULT_LIMIT,
        }
    }

    /// Use a different page size when a query gives none.
    #[must_use]
    pub fn with_default_limit(mut self, default_limit: u64) -> Self {
        self.default_limit = default_limit.max(1);
        self
    }

    /// List one page of an event's participants joined with their users.
    ///
    /// # Errors
    ///
    /// - [`RosterError::NotFound`] if the event does not exist
    /// - [`RosterError::InvalidArgument`] if `sort_by` names an empty field
    /// - [`RosterError::StoreUnavailable`] if the store fails
    pub async fn query_participants(
        &self,
        event_id: EventId,
        filter: ParticipantFilter,
        options: QueryOptions,
    ) -> Result<Page<ParticipantView>, RosterError> {
        let sort = options.sort_specs()?;
        let window = normalize_with(options.page, options.limit, self.default_limit);

        let pipeline = ParticipantPipeline::for_event(event_id)
            .unwind()
            .sort(sort)
            .lookup_user()
            .search(filter.term())
            .skip(window.skip)
            .limit(window.limit);

        let output = self
            .store
            .run_participant_pipeline(pipeline)
            .await?
            .ok_or_else(|| RosterError::not_found(Resource::Event, event_id))?;

        let results: Vec<ParticipantView> = output.rows.into_iter().filter_map(ParticipantRow::into_view).collect();

        #[allow(clippy::cast_precision_loss)] // Page sizes are far below f64 precision
        let returned = results.len() as f64;
        metrics::histogram!(QUERY_RESULT_SIZE).record(returned);

        tracing::debug!(
            %event_id,
            page = window.page,
            limit = window.limit,
            returned = results.len(),
            total = output.participant_count,
            "Participant query served"
        );

        Ok(Page::new(results, window, output.participant_count))
    }
}
