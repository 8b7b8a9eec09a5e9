//! Data models for Bibliotheca

pub mod book;
pub mod borrowing;
pub mod page;
pub mod role;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookQuery};
pub use borrowing::{Borrowing, BorrowingDetails, BorrowingHistory, BorrowingRecord};
pub use page::{Page, PageRequest};
pub use role::Role;
pub use user::{Principal, User, UserSummary};
