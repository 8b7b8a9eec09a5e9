//! Borrowing engine
//!
//! A borrowing is OPEN from the moment it is created until it is returned,
//! after which it is CLOSED for good. A book has at most one OPEN borrowing,
//! and its `available` flag mirrors whether such a borrowing exists. Both are
//! changed together inside one unit of work.

use std::sync::Arc;

use validator::Validate;

use super::{
    notifications::{publish_best_effort, AvailabilityNotifier, BookAvailabilityEvent},
    session::SessionResolver,
};
use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        book::Book,
        borrowing::{BorrowRequest, BorrowingDetails, BorrowingHistory, BorrowingRecord, NewBorrowing},
        page::{Page, PageRequest},
        user::{Principal, User},
    },
    policy::{authorize, Action, Actor},
    repository::Repository,
};

#[derive(Clone)]
pub struct BorrowingService {
    repository: Repository,
    session: SessionResolver,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn AvailabilityNotifier>,
}

impl BorrowingService {
    pub fn new(
        repository: Repository,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn AvailabilityNotifier>,
    ) -> Self {
        Self {
            session: SessionResolver::new(repository.clone()),
            repository,
            clock,
            notifier,
        }
    }

    /// Open a borrowing of `request.book_id`.
    ///
    /// Without `user_id` the caller borrows for themselves (patrons only);
    /// with it, staff lend to that patron.
    pub async fn borrow(
        &self,
        principal: &Principal,
        request: BorrowRequest,
    ) -> AppResult<BorrowingDetails> {
        request.validate()?;

        let caller = self.session.current_user(principal).await?;
        let actor = Actor::from(&caller);

        let borrower = match request.user_id {
            Some(user_id) => {
                authorize(Some(&actor), &Action::BorrowOnBehalf)?;
                let target = self.require_user(user_id).await?;
                authorize(
                    Some(&actor),
                    &Action::LendTo {
                        borrower_roles: &target.roles,
                    },
                )?;
                target
            }
            None => {
                authorize(Some(&actor), &Action::BorrowForSelf)?;
                caller
            }
        };

        let today = self.clock.today();
        if request.due_date < today {
            return Err(AppError::validation(
                "due_date",
                "Due date cannot be before today",
            ));
        }

        // Rechecked under the book lock below
        if self.repository.borrowings.exists_open_for_book(request.book_id).await? {
            return Err(AppError::Conflict(format!(
                "Book {} is not available",
                request.book_id
            )));
        }

        let mut tx = self.repository.transactions.begin().await?;

        let book = tx
            .lock_book(request.book_id)
            .await?
            .ok_or_else(|| book_not_found(request.book_id))?;

        if tx.exists_open_for_book(book.id).await? {
            return Err(AppError::Conflict(format!(
                "Book '{}' is not available",
                book.title
            )));
        }

        let borrowing = tx
            .insert_borrowing(&NewBorrowing {
                book_id: book.id,
                user_id: borrower.id,
                borrow_date: today,
                due_date: request.due_date,
            })
            .await?;
        tx.set_book_available(book.id, false).await?;
        tx.commit().await?;

        tracing::info!(
            borrowing_id = borrowing.id,
            book_id = book.id,
            user_id = borrower.id,
            due_date = %borrowing.due_date,
            "Book borrowed"
        );
        self.announce(&book, false, borrowing.id);

        let record = BorrowingRecord {
            id: borrowing.id,
            book_id: book.id,
            user_id: borrower.id,
            borrow_date: borrowing.borrow_date,
            due_date: borrowing.due_date,
            return_date: borrowing.return_date,
            returned: borrowing.returned,
            book_title: book.title,
            book_isbn: book.isbn,
            username: borrower.username,
        };
        Ok(record.into_details(today))
    }

    /// Close an open borrowing and make its book available again
    pub async fn return_borrowing(
        &self,
        principal: &Principal,
        borrowing_id: i64,
    ) -> AppResult<BorrowingDetails> {
        let actor = self.session.resolve(principal).await?;

        let existing = self
            .repository
            .borrowings
            .find_by_id(borrowing_id)
            .await?
            .ok_or_else(|| borrowing_not_found(borrowing_id))?;
        authorize(
            Some(&actor),
            &Action::ReturnBorrowing {
                owner_id: existing.user_id,
            },
        )?;

        let today = self.clock.today();
        let mut tx = self.repository.transactions.begin().await?;

        let borrowing = tx
            .lock_borrowing(borrowing_id)
            .await?
            .ok_or_else(|| borrowing_not_found(borrowing_id))?;
        if borrowing.returned {
            return Err(already_returned(borrowing_id));
        }

        let closed = tx
            .mark_returned(borrowing_id, today)
            .await?
            .ok_or_else(|| already_returned(borrowing_id))?;
        let book = tx
            .lock_book(closed.book_id)
            .await?
            .ok_or_else(|| book_not_found(closed.book_id))?;
        tx.set_book_available(book.id, true).await?;
        tx.commit().await?;

        tracing::info!(
            borrowing_id,
            book_id = book.id,
            user_id = closed.user_id,
            "Book returned"
        );
        self.announce(&book, true, borrowing_id);

        self.details(borrowing_id).await
    }

    /// Single borrowing, visible to its borrower and to staff
    pub async fn get(&self, principal: &Principal, borrowing_id: i64) -> AppResult<BorrowingDetails> {
        let actor = self.session.resolve(principal).await?;
        let record = self
            .repository
            .borrowings
            .find_details(borrowing_id)
            .await?
            .ok_or_else(|| borrowing_not_found(borrowing_id))?;
        authorize(
            Some(&actor),
            &Action::ViewBorrowing {
                owner_id: record.user_id,
            },
        )?;
        Ok(record.into_details(self.clock.today()))
    }

    pub async fn my_history(
        &self,
        principal: &Principal,
        page: &PageRequest,
    ) -> AppResult<BorrowingHistory> {
        let actor = self.session.resolve(principal).await?;
        authorize(Some(&actor), &Action::ViewOwnHistory)?;
        self.history_of(actor.id, page).await
    }

    pub async fn user_history(
        &self,
        principal: &Principal,
        user_id: i64,
        page: &PageRequest,
    ) -> AppResult<BorrowingHistory> {
        let actor = self.session.resolve(principal).await?;
        authorize(Some(&actor), &Action::ViewUserHistory { user_id })?;
        self.require_user(user_id).await?;
        self.history_of(user_id, page).await
    }

    /// Open borrowings, newest first
    pub async fn active(&self, principal: &Principal, page: &PageRequest) -> AppResult<Page<BorrowingDetails>> {
        let actor = self.session.resolve(principal).await?;
        authorize(Some(&actor), &Action::ListActiveBorrowings)?;
        let listing = self.repository.borrowings.find_by_returned(false, page).await?;
        Ok(self.page_of(listing, page))
    }

    /// Open borrowings past their due date, earliest due first
    pub async fn overdue(&self, principal: &Principal, page: &PageRequest) -> AppResult<Page<BorrowingDetails>> {
        let actor = self.session.resolve(principal).await?;
        authorize(Some(&actor), &Action::ListOverdueBorrowings)?;
        let listing = self
            .repository
            .borrowings
            .find_overdue(self.clock.today(), page)
            .await?;
        Ok(self.page_of(listing, page))
    }

    /// Closed borrowings, newest first
    pub async fn returned(&self, principal: &Principal, page: &PageRequest) -> AppResult<Page<BorrowingDetails>> {
        let actor = self.session.resolve(principal).await?;
        authorize(Some(&actor), &Action::ListReturnedBorrowings)?;
        let listing = self.repository.borrowings.find_by_returned(true, page).await?;
        Ok(self.page_of(listing, page))
    }

    async fn history_of(&self, user_id: i64, page: &PageRequest) -> AppResult<BorrowingHistory> {
        let today = self.clock.today();
        let ledger = &self.repository.borrowings;

        let listing = ledger.find_by_user(user_id, page).await?;
        let total_count = ledger.count_by_user(user_id).await?;
        let current_count = ledger.count_open_by_user(user_id).await?;
        let overdue_count = ledger.count_overdue_by_user(user_id, today).await?;

        Ok(BorrowingHistory {
            user_id,
            borrowings: self.page_of(listing, page),
            total_count,
            current_count,
            overdue_count,
        })
    }

    fn page_of(&self, (records, total): (Vec<BorrowingRecord>, i64), page: &PageRequest) -> Page<BorrowingDetails> {
        let today = self.clock.today();
        let items = records.into_iter().map(|r| r.into_details(today)).collect();
        Page::new(items, total, page)
    }

    async fn details(&self, borrowing_id: i64) -> AppResult<BorrowingDetails> {
        self.repository
            .borrowings
            .find_details(borrowing_id)
            .await?
            .map(|r| r.into_details(self.clock.today()))
            .ok_or_else(|| borrowing_not_found(borrowing_id))
    }

    async fn require_user(&self, user_id: i64) -> AppResult<User> {
        self.repository
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))
    }

    fn announce(&self, book: &Book, available: bool, borrowing_id: i64) {
        publish_best_effort(
            self.notifier.as_ref(),
            BookAvailabilityEvent {
                book_id: book.id,
                isbn: book.isbn.clone(),
                available,
                borrowing_id,
                occurred_at: self.clock.now(),
            },
        );
    }
}

fn book_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Book with id {} not found", id))
}

fn borrowing_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Borrowing with id {} not found", id))
}

fn already_returned(id: i64) -> AppError {
    AppError::Conflict(format!("Borrowing {} has already been returned", id))
}
