//! Borrowing model and related types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::page::Page;

/// Lifecycle state of a borrowing. CLOSED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowingState {
    Open,
    Closed,
}

/// Borrowing record from the ledger
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Borrowing {
    pub id: i64,
    pub book_id: i64,
    pub user_id: i64,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub returned: bool,
}

impl Borrowing {
    pub fn state(&self) -> BorrowingState {
        if self.returned {
            BorrowingState::Closed
        } else {
            BorrowingState::Open
        }
    }

    /// Open and past its due date. Returned borrowings are never overdue.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.returned && self.due_date < today
    }
}

/// Values for a borrowing about to be opened
#[derive(Debug, Clone)]
pub struct NewBorrowing {
    pub book_id: i64,
    pub user_id: i64,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// Borrowing joined with the book and borrower columns shown to clients
#[derive(Debug, Clone, FromRow)]
pub struct BorrowingRecord {
    pub id: i64,
    pub book_id: i64,
    pub user_id: i64,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub returned: bool,
    pub book_title: String,
    pub book_isbn: String,
    pub username: String,
}

impl BorrowingRecord {
    pub fn borrowing(&self) -> Borrowing {
        Borrowing {
            id: self.id,
            book_id: self.book_id,
            user_id: self.user_id,
            borrow_date: self.borrow_date,
            due_date: self.due_date,
            return_date: self.return_date,
            returned: self.returned,
        }
    }

    /// Materialize the client view with `overdue` computed against `today`
    pub fn into_details(self, today: NaiveDate) -> BorrowingDetails {
        let borrowing = self.borrowing();
        let overdue = borrowing.is_overdue(today);
        BorrowingDetails {
            state: borrowing.state(),
            id: self.id,
            book_id: self.book_id,
            book_title: self.book_title,
            book_isbn: self.book_isbn,
            user_id: self.user_id,
            username: self.username,
            borrow_date: self.borrow_date,
            due_date: self.due_date,
            return_date: self.return_date,
            returned: self.returned,
            overdue,
        }
    }
}

/// Borrowing with full details for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowingDetails {
    pub id: i64,
    pub book_id: i64,
    pub book_title: String,
    pub book_isbn: String,
    pub user_id: i64,
    pub username: String,
    pub borrow_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub returned: bool,
    pub state: BorrowingState,
    pub overdue: bool,
}

/// Borrow request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct BorrowRequest {
    /// Book to borrow
    #[validate(range(min = 1, message = "book_id must be positive"))]
    pub book_id: i64,
    /// Date the book is due back
    pub due_date: NaiveDate,
    /// Borrower, for staff borrowing on behalf of a patron
    #[validate(range(min = 1, message = "user_id must be positive"))]
    pub user_id: Option<i64>,
}

/// A user's borrowings plus counts over their complete history
#[derive(Debug, Serialize, ToSchema)]
pub struct BorrowingHistory {
    pub user_id: i64,
    #[schema(value_type = super::page::BorrowingPage)]
    pub borrowings: Page<BorrowingDetails>,
    /// All borrowings of the user
    pub total_count: i64,
    /// Borrowings not yet returned
    pub current_count: i64,
    /// Borrowings not yet returned and past their due date
    pub overdue_count: i64,
}
