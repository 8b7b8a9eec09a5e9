//! Books repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::{contains_pattern, BookDraft, BookStore};
use crate::{
    error::{AppError, AppResult},
    models::{book::{Book, BookQuery}, page::PageRequest},
};

const BOOK_COLUMNS: &str =
    "id, title, author, isbn, publication_date, genre, available, created_at, updated_at";

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Map a unique-constraint violation on the ISBN to a client error
fn isbn_conflict(err: sqlx::Error, isbn: &str) -> AppError {
    if err.as_database_error().is_some_and(|db| db.is_unique_violation()) {
        AppError::InvalidArgument(format!("A book with ISBN {} already exists", isbn))
    } else {
        err.into()
    }
}

#[async_trait]
impl BookStore for BooksRepository {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    async fn find_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE isbn = $1", BOOK_COLUMNS))
            .bind(isbn)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    async fn search(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let page = PageRequest { page: query.page, per_page: query.per_page };

        let mut conditions = Vec::new();
        let mut params: Vec<String> = Vec::new();

        for (column, value) in [
            ("title", &query.title),
            ("author", &query.author),
            ("genre", &query.genre),
        ] {
            if let Some(value) = value {
                params.push(contains_pattern(value));
                conditions.push(format!("{} ILIKE ${} ESCAPE '\\'", column, params.len()));
            }
        }

        // Booleans are inlined; only free text goes through bind parameters
        if let Some(available) = query.available {
            conditions.push(format!("available = {}", available));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_query = format!("SELECT COUNT(*) FROM books {}", where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        for param in &params {
            count_builder = count_builder.bind(param);
        }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_query = format!(
            r#"
            SELECT {}
            FROM books
            {}
            ORDER BY title, id
            LIMIT {} OFFSET {}
            "#,
            BOOK_COLUMNS,
            where_clause,
            page.limit(),
            page.offset()
        );
        let mut select_builder = sqlx::query_as::<_, Book>(&select_query);
        for param in &params {
            select_builder = select_builder.bind(param);
        }
        let books = select_builder.fetch_all(&self.pool).await?;

        Ok((books, total))
    }

    async fn isbn_exists(&self, isbn: &str, exclude_id: Option<i64>) -> AppResult<bool> {
        let exists: bool = if let Some(id) = exclude_id {
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1 AND id != $2)")
                .bind(isbn)
                .bind(id)
                .fetch_one(&self.pool)
                .await?
        } else {
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1)")
                .bind(isbn)
                .fetch_one(&self.pool)
                .await?
        };
        Ok(exists)
    }

    async fn create(&self, draft: &BookDraft) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (title, author, isbn, publication_date, genre, available, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, TRUE, NOW(), NOW())
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(&draft.title)
        .bind(&draft.author)
        .bind(&draft.isbn)
        .bind(draft.publication_date)
        .bind(&draft.genre)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| isbn_conflict(e, &draft.isbn))
    }

    async fn update(&self, id: i64, draft: &BookDraft) -> AppResult<Option<Book>> {
        sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books
            SET title = $2, author = $3, isbn = $4, publication_date = $5, genre = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(id)
        .bind(&draft.title)
        .bind(&draft.author)
        .bind(&draft.isbn)
        .bind(draft.publication_date)
        .bind(&draft.genre)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| isbn_conflict(e, &draft.isbn))
    }

    async fn delete(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if e.as_database_error().is_some_and(|db| db.is_foreign_key_violation()) {
                    AppError::Conflict(format!("Book {} has borrowing history", id))
                } else {
                    AppError::from(e)
                }
            })?;
        Ok(result.rows_affected() > 0)
    }
}
