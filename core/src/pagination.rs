//! Page/limit normalization shared by every paginated listing.
//!
//! Pagination inputs are never rejected. Missing, non-positive, or
//! non-numeric values fall back to page 1 and the default limit.

use serde::Serialize;

/// Page used when none (or an invalid one) is supplied.
pub const DEFAULT_PAGE: u64 = 1;

/// Limit used when none (or an invalid one) is supplied.
pub const DEFAULT_LIMIT: u64 = 10;

/// Effective page window after normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageWindow {
    /// 1-based page number, always `>= 1`
    pub page: u64,
    /// Page size, always `>= 1`
    pub limit: u64,
    /// Rows to skip: `(page - 1) * limit`
    pub skip: u64,
}

/// Normalize raw page/limit values with the default limit of 10.
///
/// # Examples
///
/// ```
/// use roster_core::pagination::normalize;
///
/// let window = normalize(None, Some(-5));
/// assert_eq!((window.page, window.limit, window.skip), (1, 10, 0));
/// ```
#[must_use]
pub fn normalize(page: Option<i64>, limit: Option<i64>) -> PageWindow {
    normalize_with(page, limit, DEFAULT_LIMIT)
}

/// Normalize raw page/limit values with a caller-chosen default limit.
#[must_use]
pub fn normalize_with(page: Option<i64>, limit: Option<i64>, default_limit: u64) -> PageWindow {
    let page = positive(page).unwrap_or(DEFAULT_PAGE);
    let limit = positive(limit).unwrap_or_else(|| default_limit.max(1));

    PageWindow {
        page,
        limit,
        skip: (page - 1).saturating_mul(limit),
    }
}

/// Number of pages needed for `total_count` rows at `limit` rows per page.
///
/// Zero rows means zero pages. A zero limit is treated as one.
#[must_use]
pub const fn total_pages(total_count: u64, limit: u64) -> u64 {
    let limit = if limit == 0 { 1 } else { limit };
    total_count.div_ceil(limit)
}

fn positive(value: Option<i64>) -> Option<u64> {
    value.filter(|v| *v > 0).and_then(|v| u64::try_from(v).ok())
}

/// Raw pagination input as it arrives from a caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Requested page, if any
    pub page: Option<i64>,
    /// Requested limit, if any
    pub limit: Option<i64>,
}

impl PageRequest {
    /// Build a request from untyped strings, dropping anything non-numeric.
    ///
    /// ```
    /// use roster_core::pagination::PageRequest;
    ///
    /// let request = PageRequest::parse(Some("2"), Some("ten"));
    /// assert_eq!(request.page, Some(2));
    /// assert_eq!(request.limit, None);
    /// ```
    #[must_use]
    pub fn parse(page: Option<&str>, limit: Option<&str>) -> Self {
        Self {
            page: page.and_then(|p| p.trim().parse().ok()),
            limit: limit.and_then(|l| l.trim().parse().ok()),
        }
    }

    /// Normalize with the given default limit.
    #[must_use]
    pub fn window(&self, default_limit: u64) -> PageWindow {
        normalize_with(self.page, self.limit, default_limit)
    }
}

/// One page of results plus pagination metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    /// Rows on this page
    pub results: Vec<T>,
    /// Effective page number
    pub page: u64,
    /// Effective limit
    pub limit: u64,
    /// `ceil(total_results / limit)`
    pub total_pages: u64,
    /// Total the page metadata is computed from
    pub total_results: u64,
}

impl<T> Page<T> {
    /// Assemble a page from its rows, the window that produced them, and a total.
    #[must_use]
    pub const fn new(results: Vec<T>, window: PageWindow, total_results: u64) -> Self {
        Self {
            results,
            page: window.page,
            limit: window.limit,
            total_pages: total_pages(total_results, window.limit),
            total_results,
        }
    }

    /// Transform every row, keeping the metadata.
    #[must_use]
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            results: self.results.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
            total_results: self.total_results,
        }
    }
}
