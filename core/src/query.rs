//! Query inputs: search filter, sort keys, and paging options.

use crate::error::RosterError;
use std::fmt;

/// Prefix addressing unwound participant fields, accepted and stripped.
const PARTICIPANT_PREFIX: &str = "participants";

/// Sort order for one criterion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

impl SortDirection {
    /// `asc` means ascending; anything else, including nothing, is descending.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("asc") {
            Self::Ascending
        } else {
            Self::Descending
        }
    }
}

/// Dotted path to a field of a participant document, e.g. `file.size`.
///
/// The path is opaque to the engine: nothing assumes what type of value it
/// points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Split a dotted name into segments, dropping a leading `participants.`.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError::InvalidArgument`] if the name or any segment is empty.
    pub fn parse(raw: &str) -> Result<Self, RosterError> {
        let raw = raw.trim();
        let raw = raw
            .strip_prefix(PARTICIPANT_PREFIX)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(raw);

        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(RosterError::InvalidArgument(format!(
                "Sort field '{raw}' is not a valid field path"
            )));
        }

        Ok(Self(segments))
    }

    /// Path segments in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// One sort criterion: `field:direction`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortSpec {
    /// Field to sort on
    pub field: FieldPath,
    /// Order
    pub direction: SortDirection,
}

impl SortSpec {
    /// Parse a single `field:direction` criterion.
    ///
    /// ```
    /// use roster_core::query::{SortDirection, SortSpec};
    ///
    /// let spec = SortSpec::parse("created_at:asc").unwrap();
    /// assert_eq!(spec.field.to_string(), "created_at");
    /// assert_eq!(spec.direction, SortDirection::Ascending);
    ///
    /// let spec = SortSpec::parse("created_at:newest").unwrap();
    /// assert_eq!(spec.direction, SortDirection::Descending);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`RosterError::InvalidArgument`] if the field name is empty.
    pub fn parse(raw: &str) -> Result<Self, RosterError> {
        let (field, direction) = raw.split_once(':').unwrap_or((raw, ""));
        Ok(Self {
            field: FieldPath::parse(field)?,
            direction: SortDirection::parse(direction),
        })
    }

    /// Parse a comma-separated list of criteria, skipping blank entries.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError::InvalidArgument`] if any criterion has an empty field name.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, RosterError> {
        raw.split(',')
            .filter(|criterion| !criterion.trim().is_empty())
            .map(Self::parse)
            .collect()
    }
}

/// Search filter for a participant query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParticipantFilter {
    /// Case-insensitive substring; empty or absent matches everything
    pub search: Option<String>,
}

impl ParticipantFilter {
    /// Filter on a search term.
    #[must_use]
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: Some(term.into()),
        }
    }

    /// The search term, or `None` when it would match everything.
    #[must_use]
    pub fn term(&self) -> Option<&str> {
        self.search.as_deref().filter(|term| !term.is_empty())
    }
}

/// Sort and paging options for a participant query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// `field:direction[,field:direction...]`; absent keeps join order
    pub sort_by: Option<String>,
    /// Page size; non-positive or absent means the default
    pub limit: Option<i64>,
    /// 1-based page; non-positive or absent means 1
    pub page: Option<i64>,
}

impl QueryOptions {
    /// Parsed sort criteria.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError::InvalidArgument`] for an empty field name.
    pub fn sort_specs(&self) -> Result<Vec<SortSpec>, RosterError> {
        self.sort_by
            .as_deref()
            .map_or_else(|| Ok(Vec::new()), SortSpec::parse_list)
    }
}
