/// Pagination and ordering shared by the list endpoints
///
/// Pages are 1-based. A list query returns a [`Page`] carrying the records
/// plus enough totals for a client to render a pager.

use serde::{Deserialize, Serialize};

/// One page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Rows on this page
    pub records: Vec<T>,

    /// Total matching rows across all pages
    pub total: i64,

    /// Current page (1-based)
    pub current: i64,

    /// Page size
    pub size: i64,

    /// Number of pages
    pub pages: i64,
}

impl<T> Page<T> {
    pub fn new(records: Vec<T>, total: i64, request: PageRequest) -> Self {
        Self {
            records,
            total,
            current: request.page,
            size: request.size,
            pages: page_count(total, request.size),
        }
    }
}

/// Number of pages needed for `total` rows
pub fn page_count(total: i64, size: i64) -> i64 {
    if size <= 0 || total <= 0 {
        0
    } else {
        (total + size - 1) / size
    }
}

/// Page number and size for a list query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
}

impl PageRequest {
    /// Builds a request, clamping missing or non-positive pages to 1
    pub fn new(page: Option<i64>, size: i64) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            size,
        }
    }

    /// Rows to skip; saturates instead of overflowing on huge page numbers
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.size)
    }

    pub fn limit(&self) -> i64 {
        self.size
    }
}

/// Sort order accepted by the list endpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    #[default]
    CreatedAtDesc,
    CreatedAtAsc,
    UpdatedAtDesc,
    UpdatedAtAsc,
}

impl OrderBy {
    /// SQL ORDER BY fragment for this order
    ///
    /// Only these fixed strings ever reach the query text.
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderBy::CreatedAtDesc => "created_at DESC",
            OrderBy::CreatedAtAsc => "created_at ASC",
            OrderBy::UpdatedAtDesc => "updated_at DESC",
            OrderBy::UpdatedAtAsc => "updated_at ASC",
        }
    }
}
