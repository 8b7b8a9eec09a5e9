//! Repository layer
//!
//! Services talk to storage through the traits below. Two adapters exist:
//! PostgreSQL (`books`, `users`, `borrowings`) and a process-local store
//! (`memory`) used by tests and by `database.url = "memory"`.
//!
//! Every borrow and return runs inside a [`LibraryTransaction`] obtained from
//! [`UnitOfWork::begin`]. A transaction dropped without [`LibraryTransaction::commit`]
//! leaves no trace.

pub mod books;
pub mod borrowings;
pub mod memory;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookQuery},
        borrowing::{Borrowing, BorrowingRecord, NewBorrowing},
        page::PageRequest,
        user::{NewUser, User, UserChanges, UserQuery},
    },
};

/// Column values for inserting or fully rewriting a catalog entry
#[derive(Debug, Clone)]
pub struct BookDraft {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publication_date: Option<NaiveDate>,
    pub genre: Option<String>,
}

impl From<&Book> for BookDraft {
    fn from(book: &Book) -> Self {
        BookDraft {
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            publication_date: book.publication_date,
            genre: book.genre.clone(),
        }
    }
}

/// Catalog storage
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Book>>;

    /// Lookup by normalized ISBN
    async fn find_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>>;

    /// Filtered page plus the total number of matches, ordered by title then id
    async fn search(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)>;

    async fn isbn_exists(&self, isbn: &str, exclude_id: Option<i64>) -> AppResult<bool>;

    /// New books start available
    async fn create(&self, draft: &BookDraft) -> AppResult<Book>;

    /// Rewrite descriptive columns; availability is left alone
    async fn update(&self, id: i64, draft: &BookDraft) -> AppResult<Option<Book>>;

    /// Returns false when no such book exists
    async fn delete(&self, id: i64) -> AppResult<bool>;
}

/// Account storage
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<User>>;

    /// Case-insensitive
    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn username_exists(&self, username: &str, exclude_id: Option<i64>) -> AppResult<bool>;

    async fn email_exists(&self, email: &str, exclude_id: Option<i64>) -> AppResult<bool>;

    /// Filtered page plus total, ordered by username
    async fn search(&self, query: &UserQuery) -> AppResult<(Vec<User>, i64)>;

    async fn create(&self, user: &NewUser) -> AppResult<User>;

    async fn update(&self, id: i64, changes: &UserChanges) -> AppResult<Option<User>>;
}

/// Read side of the borrowing ledger.
///
/// Listings are ordered newest first (borrow date, then id). Counts always
/// cover the complete history regardless of the page requested.
#[async_trait]
pub trait BorrowingLedger: Send + Sync {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Borrowing>>;

    async fn find_details(&self, id: i64) -> AppResult<Option<BorrowingRecord>>;

    async fn find_by_user(
        &self,
        user_id: i64,
        page: &PageRequest,
    ) -> AppResult<(Vec<BorrowingRecord>, i64)>;

    async fn find_by_returned(
        &self,
        returned: bool,
        page: &PageRequest,
    ) -> AppResult<(Vec<BorrowingRecord>, i64)>;

    /// Open borrowings whose due date is strictly before `today`
    async fn find_overdue(
        &self,
        today: NaiveDate,
        page: &PageRequest,
    ) -> AppResult<(Vec<BorrowingRecord>, i64)>;

    async fn count_by_user(&self, user_id: i64) -> AppResult<i64>;

    async fn count_open_by_user(&self, user_id: i64) -> AppResult<i64>;

    async fn count_overdue_by_user(&self, user_id: i64, today: NaiveDate) -> AppResult<i64>;

    /// Borrowings of any state referencing the book
    async fn count_by_book(&self, book_id: i64) -> AppResult<i64>;

    async fn exists_open_for_book(&self, book_id: i64) -> AppResult<bool>;
}

/// Source of transactions spanning the book and borrowing stores
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn LibraryTransaction>>;
}

/// Writes made by one borrow or return.
///
/// `lock_*` methods hold the row until the transaction ends so that
/// concurrent borrows of the same book serialize.
#[async_trait]
pub trait LibraryTransaction: Send {
    async fn lock_book(&mut self, book_id: i64) -> AppResult<Option<Book>>;

    async fn exists_open_for_book(&mut self, book_id: i64) -> AppResult<bool>;

    async fn lock_borrowing(&mut self, id: i64) -> AppResult<Option<Borrowing>>;

    async fn insert_borrowing(&mut self, borrowing: &NewBorrowing) -> AppResult<Borrowing>;

    /// Close an open borrowing; `None` when it was not open
    async fn mark_returned(&mut self, id: i64, return_date: NaiveDate)
        -> AppResult<Option<Borrowing>>;

    async fn set_book_available(&mut self, book_id: i64, available: bool) -> AppResult<()>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Main repository struct holding the store handles
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BookStore>,
    pub users: Arc<dyn UserStore>,
    pub borrowings: Arc<dyn BorrowingLedger>,
    pub transactions: Arc<dyn UnitOfWork>,
    pool: Option<Pool<Postgres>>,
}

impl Repository {
    /// Repository backed by PostgreSQL
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::BooksRepository::new(pool.clone())),
            users: Arc::new(users::UsersRepository::new(pool.clone())),
            borrowings: Arc::new(borrowings::BorrowingsRepository::new(pool.clone())),
            transactions: Arc::new(borrowings::PgUnitOfWork::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Repository backed by process memory; all handles share one state
    pub fn in_memory() -> Self {
        let store = memory::MemoryStore::default();
        Self {
            books: Arc::new(store.clone()),
            users: Arc::new(store.clone()),
            borrowings: Arc::new(store.clone()),
            transactions: Arc::new(store),
            pool: None,
        }
    }

    /// Round-trip to the database, if there is one
    pub async fn ping(&self) -> AppResult<()> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}

/// `ILIKE` pattern matching `value` as a literal substring. Pair with `ESCAPE '\'`.
pub(crate) fn contains_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
