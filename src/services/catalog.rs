//! Catalog management service

use validator::Validate;

use super::session::SessionResolver;
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{normalize_isbn, Book, BookQuery, CreateBook, UpdateBook},
        page::{Page, PageRequest},
        user::Principal,
    },
    policy::{authorize, Action},
    repository::{BookDraft, Repository},
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    session: SessionResolver,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self {
            session: SessionResolver::new(repository.clone()),
            repository,
        }
    }

    /// Search books with filters
    pub async fn search(&self, principal: &Principal, query: &BookQuery) -> AppResult<Page<Book>> {
        self.browse(principal).await?;
        let (books, total) = self.repository.books.search(query).await?;
        let page = PageRequest {
            page: query.page,
            per_page: query.per_page,
        };
        Ok(Page::new(books, total, &page))
    }

    pub async fn get(&self, principal: &Principal, id: i64) -> AppResult<Book> {
        self.browse(principal).await?;
        self.require(id).await
    }

    /// Lookup by ISBN in any accepted spelling
    pub async fn get_by_isbn(&self, principal: &Principal, isbn: &str) -> AppResult<Book> {
        self.browse(principal).await?;
        let isbn = normalize_isbn(isbn);
        self.repository
            .books
            .find_by_isbn(&isbn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with ISBN {} not found", isbn)))
    }

    pub async fn create(&self, principal: &Principal, request: CreateBook) -> AppResult<Book> {
        request.validate()?;
        self.manage(principal).await?;

        let draft = BookDraft {
            title: request.title.trim().to_string(),
            author: request.author.trim().to_string(),
            isbn: normalize_isbn(&request.isbn),
            publication_date: request.publication_date,
            genre: request.genre,
        };
        self.ensure_isbn_free(&draft.isbn, None).await?;

        let book = self.repository.books.create(&draft).await?;
        tracing::info!(book_id = book.id, isbn = %book.isbn, "Book added to catalog");
        Ok(book)
    }

    /// Update the provided fields; keeping the record's own ISBN is allowed
    pub async fn update(&self, principal: &Principal, id: i64, request: UpdateBook) -> AppResult<Book> {
        request.validate()?;
        self.manage(principal).await?;

        let existing = self.require(id).await?;
        let mut draft = BookDraft::from(&existing);
        if let Some(title) = request.title {
            draft.title = title.trim().to_string();
        }
        if let Some(author) = request.author {
            draft.author = author.trim().to_string();
        }
        if let Some(isbn) = request.isbn {
            draft.isbn = normalize_isbn(&isbn);
        }
        if request.publication_date.is_some() {
            draft.publication_date = request.publication_date;
        }
        if request.genre.is_some() {
            draft.genre = request.genre;
        }

        self.ensure_isbn_free(&draft.isbn, Some(id)).await?;

        self.repository
            .books
            .update(id, &draft)
            .await?
            .ok_or_else(|| book_not_found(id))
    }

    /// Remove a book that has never been borrowed
    pub async fn delete(&self, principal: &Principal, id: i64) -> AppResult<()> {
        self.manage(principal).await?;
        self.require(id).await?;

        let history = self.repository.borrowings.count_by_book(id).await?;
        if history > 0 {
            return Err(AppError::Conflict(format!(
                "Book {} has {} borrowing(s) on record and cannot be deleted",
                id, history
            )));
        }

        if !self.repository.books.delete(id).await? {
            return Err(book_not_found(id));
        }
        tracing::info!(book_id = id, "Book removed from catalog");
        Ok(())
    }

    async fn browse(&self, principal: &Principal) -> AppResult<()> {
        let actor = self.session.resolve(principal).await?;
        authorize(Some(&actor), &Action::BrowseCatalog)
    }

    async fn manage(&self, principal: &Principal) -> AppResult<()> {
        let actor = self.session.resolve(principal).await?;
        authorize(Some(&actor), &Action::ManageCatalog)
    }

    async fn require(&self, id: i64) -> AppResult<Book> {
        self.repository
            .books
            .find_by_id(id)
            .await?
            .ok_or_else(|| book_not_found(id))
    }

    async fn ensure_isbn_free(&self, isbn: &str, exclude_id: Option<i64>) -> AppResult<()> {
        if self.repository.books.isbn_exists(isbn, exclude_id).await? {
            return Err(AppError::InvalidArgument(format!(
                "A book with ISBN {} already exists",
                isbn
            )));
        }
        Ok(())
    }
}

fn book_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Book with id {} not found", id))
}
