//! Pagination request and response wrapper

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::{book::Book, borrowing::BorrowingDetails, user::UserSummary};

/// Page selection, 1-based
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams, ToSchema)]
pub struct PageRequest {
    /// Page number (default: 1)
    pub page: Option<i64>,
    /// Items per page (default: 20, max: 100)
    pub per_page: Option<i64>,
}

impl PageRequest {
    pub const DEFAULT_PER_PAGE: i64 = 20;
    pub const MAX_PER_PAGE: i64 = 100;

    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    /// Rows to skip; saturates rather than overflowing on absurd page numbers
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.per_page())
    }

    pub fn limit(&self) -> i64 {
        self.per_page()
    }
}

/// Paginated response wrapper
#[derive(Debug, Serialize, ToSchema)]
#[aliases(
    BookPage = Page<Book>,
    BorrowingPage = Page<BorrowingDetails>,
    UserPage = Page<UserSummary>
)]
pub struct Page<T>
where
    T: for<'a> ToSchema<'a>,
{
    /// Items on this page
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    /// Current page number
    pub page: i64,
    /// Items per page
    pub per_page: i64,
}

impl<T> Page<T>
where
    T: for<'a> ToSchema<'a>,
{
    pub fn new(items: Vec<T>, total: i64, request: &PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page(),
            per_page: request.per_page(),
        }
    }
}

/// Slice an in-memory list the way `LIMIT/OFFSET` would
pub fn paginate<T: Clone>(all: &[T], request: &PageRequest) -> Vec<T> {
    all.iter()
        .skip(request.offset() as usize)
        .take(request.limit() as usize)
        .cloned()
        .collect()
}
