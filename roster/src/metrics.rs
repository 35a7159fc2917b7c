//! Roster metrics.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `roster.participants.joined` - New participant entries
//! - `roster.participants.join_replayed` - Joins that found an existing entry
//! - `roster.participants.verified{status}` - Verification changes by new status
//! - `roster.images.edit_conflicts` - Image edits that lost a version race
//!
//! ## Histograms
//! - `roster.query.result_size` - Rows returned per participant query
//!
//! No exporter is installed here; the host application chooses one.

use metrics::{describe_counter, describe_histogram};

/// New participant entries
pub const PARTICIPANTS_JOINED: &str = "roster.participants.joined";
/// Joins that found an existing entry
pub const PARTICIPANTS_JOIN_REPLAYED: &str = "roster.participants.join_replayed";
/// Verification changes
pub const PARTICIPANTS_VERIFIED: &str = "roster.participants.verified";
/// Image edits that lost a version race
pub const IMAGE_EDIT_CONFLICTS: &str = "roster.images.edit_conflicts";
/// Rows returned per participant query
pub const QUERY_RESULT_SIZE: &str = "roster.query.result_size";

/// Register descriptions for all roster metrics.
///
/// Call once at startup, after installing a recorder.
pub fn register_metrics() {
    describe_counter!(PARTICIPANTS_JOINED, "Number of users newly enrolled in an event");
    describe_counter!(
        PARTICIPANTS_JOIN_REPLAYED,
        "Number of join requests for users already enrolled"
    );
    describe_counter!(
        PARTICIPANTS_VERIFIED,
        "Number of participant verification changes by resulting status"
    );
    describe_counter!(
        IMAGE_EDIT_CONFLICTS,
        "Number of image edits rejected because the event changed concurrently"
    );
    describe_histogram!(QUERY_RESULT_SIZE, "Participants returned per query page");

    tracing::info!("Roster metrics registered");
}
