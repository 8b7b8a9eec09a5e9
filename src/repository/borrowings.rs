//! Borrowings repository for database operations

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Pool, Postgres, Transaction};

use super::{BorrowingLedger, LibraryTransaction, UnitOfWork};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::Book,
        borrowing::{Borrowing, BorrowingRecord, NewBorrowing},
        page::PageRequest,
    },
};

const BORROWING_COLUMNS: &str = "id, book_id, user_id, borrow_date, due_date, return_date, returned";

const RECORD_SELECT: &str = r#"
    SELECT br.id, br.book_id, br.user_id, br.borrow_date, br.due_date, br.return_date, br.returned,
           b.title AS book_title, b.isbn AS book_isbn, u.username
    FROM borrowings br
    JOIN books b ON br.book_id = b.id
    JOIN users u ON br.user_id = u.id
"#;

const RECORD_ORDER: &str = "ORDER BY br.borrow_date DESC, br.id DESC";

#[derive(Clone)]
pub struct BorrowingsRepository {
    pool: Pool<Postgres>,
}

impl BorrowingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BorrowingLedger for BorrowingsRepository {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Borrowing>> {
        let borrowing = sqlx::query_as::<_, Borrowing>(&format!(
            "SELECT {} FROM borrowings WHERE id = $1",
            BORROWING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(borrowing)
    }

    async fn find_details(&self, id: i64) -> AppResult<Option<BorrowingRecord>> {
        let record = sqlx::query_as::<_, BorrowingRecord>(&format!("{} WHERE br.id = $1", RECORD_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn find_by_user(
        &self,
        user_id: i64,
        page: &PageRequest,
    ) -> AppResult<(Vec<BorrowingRecord>, i64)> {
        let total = self.count_by_user(user_id).await?;
        let records = sqlx::query_as::<_, BorrowingRecord>(&format!(
            "{} WHERE br.user_id = $1 {} LIMIT $2 OFFSET $3",
            RECORD_SELECT, RECORD_ORDER
        ))
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok((records, total))
    }

    async fn find_by_returned(
        &self,
        returned: bool,
        page: &PageRequest,
    ) -> AppResult<(Vec<BorrowingRecord>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM borrowings WHERE returned = $1")
            .bind(returned)
            .fetch_one(&self.pool)
            .await?;
        let records = sqlx::query_as::<_, BorrowingRecord>(&format!(
            "{} WHERE br.returned = $1 {} LIMIT $2 OFFSET $3",
            RECORD_SELECT, RECORD_ORDER
        ))
        .bind(returned)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok((records, total))
    }

    async fn find_overdue(
        &self,
        today: NaiveDate,
        page: &PageRequest,
    ) -> AppResult<(Vec<BorrowingRecord>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrowings WHERE NOT returned AND due_date < $1",
        )
        .bind(today)
        .fetch_one(&self.pool)
        .await?;
        let records = sqlx::query_as::<_, BorrowingRecord>(&format!(
            "{} WHERE NOT br.returned AND br.due_date < $1 ORDER BY br.due_date, br.id LIMIT $2 OFFSET $3",
            RECORD_SELECT
        ))
        .bind(today)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok((records, total))
    }

    async fn count_by_user(&self, user_id: i64) -> AppResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM borrowings WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_open_by_user(&self, user_id: i64) -> AppResult<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrowings WHERE user_id = $1 AND NOT returned",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_overdue_by_user(&self, user_id: i64, today: NaiveDate) -> AppResult<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrowings WHERE user_id = $1 AND NOT returned AND due_date < $2",
        )
        .bind(user_id)
        .bind(today)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_by_book(&self, book_id: i64) -> AppResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM borrowings WHERE book_id = $1")
            .bind(book_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn exists_open_for_book(&self, book_id: i64) -> AppResult<bool> {
        let exists = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM borrowings WHERE book_id = $1 AND NOT returned)",
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

/// Opens PostgreSQL transactions for borrow and return
#[derive(Clone)]
pub struct PgUnitOfWork {
    pool: Pool<Postgres>,
}

impl PgUnitOfWork {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn begin(&self) -> AppResult<Box<dyn LibraryTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLibraryTransaction { tx }))
    }
}

/// Rolled back by sqlx when dropped uncommitted
pub struct PgLibraryTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LibraryTransaction for PgLibraryTransaction {
    async fn lock_book(&mut self, book_id: i64) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, author, isbn, publication_date, genre, available, created_at, updated_at
            FROM books WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(book_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(book)
    }

    async fn exists_open_for_book(&mut self, book_id: i64) -> AppResult<bool> {
        let exists = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM borrowings WHERE book_id = $1 AND NOT returned)",
        )
        .bind(book_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn lock_borrowing(&mut self, id: i64) -> AppResult<Option<Borrowing>> {
        let borrowing = sqlx::query_as::<_, Borrowing>(&format!(
            "SELECT {} FROM borrowings WHERE id = $1 FOR UPDATE",
            BORROWING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(borrowing)
    }

    async fn insert_borrowing(&mut self, borrowing: &NewBorrowing) -> AppResult<Borrowing> {
        sqlx::query_as::<_, Borrowing>(&format!(
            r#"
            INSERT INTO borrowings (book_id, user_id, borrow_date, due_date, returned)
            VALUES ($1, $2, $3, $4, FALSE)
            RETURNING {}
            "#,
            BORROWING_COLUMNS
        ))
        .bind(borrowing.book_id)
        .bind(borrowing.user_id)
        .bind(borrowing.borrow_date)
        .bind(borrowing.due_date)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            // borrowings_one_open_per_book
            if e.as_database_error().is_some_and(|db| db.is_unique_violation()) {
                AppError::Conflict(format!("Book {} is already borrowed", borrowing.book_id))
            } else {
                AppError::from(e)
            }
        })
    }

    async fn mark_returned(
        &mut self,
        id: i64,
        return_date: NaiveDate,
    ) -> AppResult<Option<Borrowing>> {
        let borrowing = sqlx::query_as::<_, Borrowing>(&format!(
            r#"
            UPDATE borrowings SET returned = TRUE, return_date = $2
            WHERE id = $1 AND NOT returned
            RETURNING {}
            "#,
            BORROWING_COLUMNS
        ))
        .bind(id)
        .bind(return_date)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(borrowing)
    }

    async fn set_book_available(&mut self, book_id: i64, available: bool) -> AppResult<()> {
        sqlx::query("UPDATE books SET available = $2, updated_at = NOW() WHERE id = $1")
            .bind(book_id)
            .bind(available)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }
}
