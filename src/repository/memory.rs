//! Process-local store
//!
//! One mutex guards all tables. A transaction holds the lock for its whole
//! lifetime and works on a copy of the state, which replaces the shared state
//! on commit, so writers are fully serialized and an abandoned transaction
//! changes nothing.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{BookDraft, BookStore, BorrowingLedger, LibraryTransaction, UnitOfWork, UserStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery},
        borrowing::{Borrowing, BorrowingRecord, NewBorrowing},
        page::{paginate, PageRequest},
        user::{NewUser, User, UserChanges, UserQuery},
    },
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    books: BTreeMap<i64, Book>,
    users: BTreeMap<i64, User>,
    borrowings: BTreeMap<i64, Borrowing>,
    last_book_id: i64,
    last_user_id: i64,
    last_borrowing_id: i64,
}

impl MemoryState {
    fn record(&self, borrowing: &Borrowing) -> Option<BorrowingRecord> {
        let book = self.books.get(&borrowing.book_id)?;
        let user = self.users.get(&borrowing.user_id)?;
        Some(BorrowingRecord {
            id: borrowing.id,
            book_id: borrowing.book_id,
            user_id: borrowing.user_id,
            borrow_date: borrowing.borrow_date,
            due_date: borrowing.due_date,
            return_date: borrowing.return_date,
            returned: borrowing.returned,
            book_title: book.title.clone(),
            book_isbn: book.isbn.clone(),
            username: user.username.clone(),
        })
    }

    /// Newest first, then paginated
    fn records_where<F>(&self, page: &PageRequest, filter: F) -> (Vec<BorrowingRecord>, i64)
    where
        F: Fn(&Borrowing) -> bool,
    {
        let mut matching: Vec<&Borrowing> = self.borrowings.values().filter(|b| filter(b)).collect();
        matching.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date).then(b.id.cmp(&a.id)));
        let records: Vec<BorrowingRecord> = matching.into_iter().filter_map(|b| self.record(b)).collect();
        let total = records.len() as i64;
        (paginate(&records, page), total)
    }

    fn has_open_borrowing(&self, book_id: i64) -> bool {
        self.borrowings
            .values()
            .any(|b| b.book_id == book_id && !b.returned)
    }

    fn isbn_taken(&self, isbn: &str, exclude_id: Option<i64>) -> bool {
        self.books
            .values()
            .any(|b| b.isbn == isbn && Some(b.id) != exclude_id)
    }

    fn user_taken<F>(&self, exclude_id: Option<i64>, field: F, value: &str) -> bool
    where
        F: Fn(&User) -> &str,
    {
        let value = value.to_lowercase();
        self.users
            .values()
            .any(|u| field(u).to_lowercase() == value && Some(u.id) != exclude_id)
    }
}

/// Cloning yields another handle onto the same state
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Book>> {
        Ok(self.state.lock().await.books.get(&id).cloned())
    }

    async fn find_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        let state = self.state.lock().await;
        Ok(state.books.values().find(|b| b.isbn == isbn).cloned())
    }

    async fn search(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let state = self.state.lock().await;
        let mut matching: Vec<Book> = state.books.values().filter(|b| query.matches(b)).cloned().collect();
        matching.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        let page = PageRequest { page: query.page, per_page: query.per_page };
        Ok((paginate(&matching, &page), matching.len() as i64))
    }

    async fn isbn_exists(&self, isbn: &str, exclude_id: Option<i64>) -> AppResult<bool> {
        Ok(self.state.lock().await.isbn_taken(isbn, exclude_id))
    }

    async fn create(&self, draft: &BookDraft) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        if state.isbn_taken(&draft.isbn, None) {
            return Err(AppError::InvalidArgument(format!(
                "A book with ISBN {} already exists",
                draft.isbn
            )));
        }

        state.last_book_id += 1;
        let now = Utc::now();
        let book = Book {
            id: state.last_book_id,
            title: draft.title.clone(),
            author: draft.author.clone(),
            isbn: draft.isbn.clone(),
            publication_date: draft.publication_date,
            genre: draft.genre.clone(),
            available: true,
            created_at: now,
            updated_at: now,
        };
        state.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn update(&self, id: i64, draft: &BookDraft) -> AppResult<Option<Book>> {
        let mut state = self.state.lock().await;
        if state.isbn_taken(&draft.isbn, Some(id)) {
            return Err(AppError::InvalidArgument(format!(
                "A book with ISBN {} already exists",
                draft.isbn
            )));
        }

        Ok(state.books.get_mut(&id).map(|book| {
            book.title = draft.title.clone();
            book.author = draft.author.clone();
            book.isbn = draft.isbn.clone();
            book.publication_date = draft.publication_date;
            book.genre = draft.genre.clone();
            book.updated_at = Utc::now();
            book.clone()
        }))
    }

    async fn delete(&self, id: i64) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        if state.borrowings.values().any(|b| b.book_id == id) {
            return Err(AppError::Conflict(format!("Book {} has borrowing history", id)));
        }
        Ok(state.books.remove(&id).is_some())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn username_exists(&self, username: &str, exclude_id: Option<i64>) -> AppResult<bool> {
        let state = self.state.lock().await;
        Ok(state.user_taken(exclude_id, |u| u.username.as_str(), username))
    }

    async fn email_exists(&self, email: &str, exclude_id: Option<i64>) -> AppResult<bool> {
        let state = self.state.lock().await;
        Ok(state.user_taken(exclude_id, |u| u.email.as_str(), email))
    }

    async fn search(&self, query: &UserQuery) -> AppResult<(Vec<User>, i64)> {
        let state = self.state.lock().await;
        let mut matching: Vec<User> = state.users.values().filter(|u| query.matches(u)).cloned().collect();
        matching.sort_by(|a, b| a.username.cmp(&b.username).then(a.id.cmp(&b.id)));
        let page = PageRequest { page: query.page, per_page: query.per_page };
        Ok((paginate(&matching, &page), matching.len() as i64))
    }

    async fn create(&self, user: &NewUser) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if state.user_taken(None, |u| u.username.as_str(), &user.username)
            || state.user_taken(None, |u| u.email.as_str(), &user.email)
        {
            return Err(AppError::InvalidArgument(
                "Username or email already in use".to_string(),
            ));
        }

        state.last_user_id += 1;
        let now = Utc::now();
        let created = User {
            id: state.last_user_id,
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            address: user.address.clone(),
            phone: user.phone.clone(),
            date_of_birth: user.date_of_birth,
            roles: user.roles.clone(),
            active: user.active,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, changes: &UserChanges) -> AppResult<Option<User>> {
        let mut state = self.state.lock().await;
        let username_clash = changes
            .username
            .as_deref()
            .map_or(false, |name| state.user_taken(Some(id), |u| u.username.as_str(), name));
        let email_clash = changes
            .email
            .as_deref()
            .map_or(false, |email| state.user_taken(Some(id), |u| u.email.as_str(), email));
        if username_clash || email_clash {
            return Err(AppError::InvalidArgument(
                "Username or email already in use".to_string(),
            ));
        }

        Ok(state.users.get_mut(&id).map(|user| {
            changes.apply(user);
            user.updated_at = Utc::now();
            user.clone()
        }))
    }
}

#[async_trait]
impl BorrowingLedger for MemoryStore {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Borrowing>> {
        Ok(self.state.lock().await.borrowings.get(&id).cloned())
    }

    async fn find_details(&self, id: i64) -> AppResult<Option<BorrowingRecord>> {
        let state = self.state.lock().await;
        Ok(state.borrowings.get(&id).and_then(|b| state.record(b)))
    }

    async fn find_by_user(
        &self,
        user_id: i64,
        page: &PageRequest,
    ) -> AppResult<(Vec<BorrowingRecord>, i64)> {
        let state = self.state.lock().await;
        Ok(state.records_where(page, |b| b.user_id == user_id))
    }

    async fn find_by_returned(
        &self,
        returned: bool,
        page: &PageRequest,
    ) -> AppResult<(Vec<BorrowingRecord>, i64)> {
        let state = self.state.lock().await;
        Ok(state.records_where(page, |b| b.returned == returned))
    }

    async fn find_overdue(
        &self,
        today: NaiveDate,
        page: &PageRequest,
    ) -> AppResult<(Vec<BorrowingRecord>, i64)> {
        let state = self.state.lock().await;
        let mut overdue: Vec<BorrowingRecord> = state
            .borrowings
            .values()
            .filter(|b| b.is_overdue(today))
            .filter_map(|b| state.record(b))
            .collect();
        overdue.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));
        Ok((paginate(&overdue, page), overdue.len() as i64))
    }

    async fn count_by_user(&self, user_id: i64) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state.borrowings.values().filter(|b| b.user_id == user_id).count() as i64)
    }

    async fn count_open_by_user(&self, user_id: i64) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .borrowings
            .values()
            .filter(|b| b.user_id == user_id && !b.returned)
            .count() as i64)
    }

    async fn count_overdue_by_user(&self, user_id: i64, today: NaiveDate) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .borrowings
            .values()
            .filter(|b| b.user_id == user_id && b.is_overdue(today))
            .count() as i64)
    }

    async fn count_by_book(&self, book_id: i64) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state.borrowings.values().filter(|b| b.book_id == book_id).count() as i64)
    }

    async fn exists_open_for_book(&self, book_id: i64) -> AppResult<bool> {
        Ok(self.state.lock().await.has_open_borrowing(book_id))
    }
}

#[async_trait]
impl UnitOfWork for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn LibraryTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

/// Exclusive hold on the store plus the uncommitted copy
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl LibraryTransaction for MemoryTransaction {
    async fn lock_book(&mut self, book_id: i64) -> AppResult<Option<Book>> {
        Ok(self.working.books.get(&book_id).cloned())
    }

    async fn exists_open_for_book(&mut self, book_id: i64) -> AppResult<bool> {
        Ok(self.working.has_open_borrowing(book_id))
    }

    async fn lock_borrowing(&mut self, id: i64) -> AppResult<Option<Borrowing>> {
        Ok(self.working.borrowings.get(&id).cloned())
    }

    async fn insert_borrowing(&mut self, borrowing: &NewBorrowing) -> AppResult<Borrowing> {
        if self.working.has_open_borrowing(borrowing.book_id) {
            return Err(AppError::Conflict(format!(
                "Book {} is already borrowed",
                borrowing.book_id
            )));
        }

        self.working.last_borrowing_id += 1;
        let created = Borrowing {
            id: self.working.last_borrowing_id,
            book_id: borrowing.book_id,
            user_id: borrowing.user_id,
            borrow_date: borrowing.borrow_date,
            due_date: borrowing.due_date,
            return_date: None,
            returned: false,
        };
        self.working.borrowings.insert(created.id, created.clone());
        Ok(created)
    }

    async fn mark_returned(
        &mut self,
        id: i64,
        return_date: NaiveDate,
    ) -> AppResult<Option<Borrowing>> {
        Ok(self
            .working
            .borrowings
            .get_mut(&id)
            .filter(|b| !b.returned)
            .map(|b| {
                b.returned = true;
                b.return_date = Some(return_date);
                b.clone()
            }))
    }

    async fn set_book_available(&mut self, book_id: i64, available: bool) -> AppResult<()> {
        if let Some(book) = self.working.books.get_mut(&book_id) {
            book.available = available;
            book.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use crate::models::role::Role;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    async fn seed(store: &MemoryStore) -> (Book, User) {
        let book = BookStore::create(
            store,
            &BookDraft {
                title: "Beloved".to_string(),
                author: "Toni Morrison".to_string(),
                isbn: "9781400033416".to_string(),
                publication_date: None,
                genre: None,
            },
        )
        .await
        .unwrap();
        let user = UserStore::create(
            store,
            &NewUser {
                username: "sethe".to_string(),
                email: "sethe@example.org".to_string(),
                password_hash: String::new(),
                first_name: None,
                last_name: None,
                address: None,
                phone: None,
                date_of_birth: None,
                roles: BTreeSet::from([Role::Patron]),
                active: true,
            },
        )
        .await
        .unwrap();
        (book, user)
    }

    fn new_borrowing(book: &Book, user: &User) -> NewBorrowing {
        NewBorrowing {
            book_id: book.id,
            user_id: user.id,
            borrow_date: date(1),
            due_date: date(15),
        }
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_leaves_no_trace() {
        let store = MemoryStore::default();
        let (book, user) = seed(&store).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_borrowing(&new_borrowing(&book, &user)).await.unwrap();
        tx.set_book_available(book.id, false).await.unwrap();
        drop(tx);

        assert!(!BorrowingLedger::exists_open_for_book(&store, book.id).await.unwrap());
        assert!(BookStore::find_by_id(&store, book.id).await.unwrap().unwrap().available);
    }

    #[tokio::test]
    async fn test_committed_transaction_is_visible() {
        let store = MemoryStore::default();
        let (book, user) = seed(&store).await;

        let mut tx = store.begin().await.unwrap();
        let borrowing = tx.insert_borrowing(&new_borrowing(&book, &user)).await.unwrap();
        tx.set_book_available(book.id, false).await.unwrap();
        tx.commit().await.unwrap();

        let record = store.find_details(borrowing.id).await.unwrap().unwrap();
        assert_eq!(record.username, "sethe");
        assert_eq!(record.book_title, "Beloved");
        assert!(!BookStore::find_by_id(&store, book.id).await.unwrap().unwrap().available);
    }

    #[tokio::test]
    async fn test_second_open_borrowing_is_rejected() {
        let store = MemoryStore::default();
        let (book, user) = seed(&store).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_borrowing(&new_borrowing(&book, &user)).await.unwrap();
        let err = tx.insert_borrowing(&new_borrowing(&book, &user)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_mark_returned_only_closes_open_borrowings() {
        let store = MemoryStore::default();
        let (book, user) = seed(&store).await;

        let mut tx = store.begin().await.unwrap();
        let borrowing = tx.insert_borrowing(&new_borrowing(&book, &user)).await.unwrap();
        let closed = tx.mark_returned(borrowing.id, date(10)).await.unwrap().unwrap();
        assert_eq!(closed.return_date, Some(date(10)));
        assert!(tx.mark_returned(borrowing.id, date(11)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_with_history_conflicts() {
        let store = MemoryStore::default();
        let (book, user) = seed(&store).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_borrowing(&new_borrowing(&book, &user)).await.unwrap();
        tx.commit().await.unwrap();

        let err = BookStore::delete(&store, book.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_user_uniqueness_is_case_insensitive() {
        let store = MemoryStore::default();
        seed(&store).await;
        assert!(store.username_exists("SETHE", None).await.unwrap());
        assert!(store.email_exists("Sethe@Example.org", None).await.unwrap());
    }
}
