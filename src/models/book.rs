//! Book (catalog entry) model and related types

use std::hash::{Hash, Hasher};

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// ISBN-10 or ISBN-13, hyphens and spaces allowed between digits
pub static ISBN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d[\- ]?){9}[\dXx]$|^(?:\d[\- ]?){12}\d$").expect("valid ISBN regex")
});

/// Strip separators so that equal ISBNs compare equal
pub fn normalize_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Catalog entry. Two books are the same entry when their ISBNs match.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publication_date: Option<NaiveDate>,
    pub genre: Option<String>,
    /// Cached availability, kept in step with the borrowing ledger
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PartialEq for Book {
    fn eq(&self, other: &Self) -> bool {
        self.isbn == other.isbn
    }
}

impl Eq for Book {}

impl Hash for Book {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.isbn.hash(state);
    }
}

/// Catalog search parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Case-insensitive substring of the title
    pub title: Option<String>,
    /// Case-insensitive substring of the author
    pub author: Option<String>,
    /// Case-insensitive substring of the genre
    pub genre: Option<String>,
    /// Exact availability filter
    pub available: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl BookQuery {
    /// True when `book` satisfies every filter in this query
    pub fn matches(&self, book: &Book) -> bool {
        fn contains(haystack: Option<&str>, needle: &Option<String>) -> bool {
            match needle {
                None => true,
                Some(n) => haystack
                    .map(|h| h.to_lowercase().contains(&n.to_lowercase()))
                    .unwrap_or(false),
            }
        }

        contains(Some(&book.title), &self.title)
            && contains(Some(&book.author), &self.author)
            && contains(book.genre.as_deref(), &self.genre)
            && self.available.map_or(true, |a| book.available == a)
    }
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 255, message = "Author must be 1-255 characters"))]
    pub author: String,
    #[validate(regex(path = *ISBN_PATTERN, message = "Invalid ISBN"))]
    pub isbn: String,
    pub publication_date: Option<NaiveDate>,
    #[validate(length(max = 100, message = "Genre must be at most 100 characters"))]
    pub genre: Option<String>,
}

/// Update book request (only provided fields change)
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Author must be 1-255 characters"))]
    pub author: Option<String>,
    #[validate(regex(path = *ISBN_PATTERN, message = "Invalid ISBN"))]
    pub isbn: Option<String>,
    pub publication_date: Option<NaiveDate>,
    #[validate(length(max = 100, message = "Genre must be at most 100 characters"))]
    pub genre: Option<String>,
}
