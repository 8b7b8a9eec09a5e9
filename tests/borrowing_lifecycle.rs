//! Borrowing engine behaviour over the in-memory store

mod common;

use bibliotheca_server::{
    models::{
        borrowing::BorrowRequest,
        page::PageRequest,
        role::Role,
        user::{CreateUser, UpdateUser},
    },
    AppError,
};
use chrono::Duration;
use common::{isbn, principal, start_date, Library};
use proptest::prelude::*;
use tokio_test::{assert_err, assert_ok};

fn request(book_id: i64, days: i64) -> BorrowRequest {
    BorrowRequest {
        book_id,
        due_date: start_date() + Duration::days(days),
        user_id: None,
    }
}

fn on_behalf(book_id: i64, user_id: i64) -> BorrowRequest {
    BorrowRequest {
        user_id: Some(user_id),
        ..request(book_id, 14)
    }
}

#[tokio::test]
async fn borrow_then_return_round_trip() {
    let library = Library::new();
    let patron = library.user("octavia", &[Role::Patron]).await;
    let book = library.book("Parable of the Sower", "9781538732182").await;
    let mut events = library.state.services.notifications.subscribe();

    let borrowed = assert_ok!(library.engine().borrow(&principal(&patron), request(book.id, 14)).await);
    assert_eq!(borrowed.book_id, book.id);
    assert_eq!(borrowed.user_id, patron.id);
    assert_eq!(borrowed.borrow_date, start_date());
    assert!(!borrowed.returned && !borrowed.overdue);
    assert!(borrowed.return_date.is_none());
    assert!(!library.repository.books.find_by_id(book.id).await.unwrap().unwrap().available);

    let event = events.recv().await.unwrap();
    assert_eq!((event.book_id, event.available, event.borrowing_id), (book.id, false, borrowed.id));

    library.clock.advance(Duration::days(3));
    let returned = assert_ok!(library.engine().return_borrowing(&principal(&patron), borrowed.id).await);
    assert!(returned.returned);
    assert_eq!(returned.return_date, Some(start_date() + Duration::days(3)));
    assert!(!returned.overdue);
    assert!(library.repository.books.find_by_id(book.id).await.unwrap().unwrap().available);

    let event = events.recv().await.unwrap();
    assert!(event.available);
    assert_eq!(event.isbn, "9781538732182");
}

#[tokio::test]
async fn second_borrow_of_same_book_conflicts() {
    let library = Library::new();
    let first = library.user("lauren", &[Role::Patron]).await;
    let second = library.user("bankole", &[Role::Patron]).await;
    let book = library.book("Parable of the Talents", "9781538732199").await;

    let held = library.engine().borrow(&principal(&first), request(book.id, 7)).await.unwrap();
    let err = assert_err!(library.engine().borrow(&principal(&second), request(book.id, 7)).await);
    assert!(matches!(err, AppError::Conflict(_)));

    let history = library
        .engine()
        .my_history(&principal(&second), &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(history.total_count, 0);

    let still_open = library.engine().get(&principal(&first), held.id).await.unwrap();
    assert!(!still_open.returned);
}

#[tokio::test]
async fn double_return_conflicts_and_keeps_availability() {
    let library = Library::new();
    let patron = library.user("anyanwu", &[Role::Patron]).await;
    let book = library.book("Wild Seed", "9780446676977").await;

    let borrowing = library.engine().borrow(&principal(&patron), request(book.id, 7)).await.unwrap();
    library.engine().return_borrowing(&principal(&patron), borrowing.id).await.unwrap();

    let err = library
        .engine()
        .return_borrowing(&principal(&patron), borrowing.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert!(library.repository.books.find_by_id(book.id).await.unwrap().unwrap().available);

    // The book can be borrowed again after the failed return
    assert_ok!(library.engine().borrow(&principal(&patron), request(book.id, 7)).await);
}

#[tokio::test]
async fn overdue_follows_the_clock() {
    let library = Library::new();
    let patron = library.user("doro", &[Role::Patron]).await;
    let librarian = library.user("shelver", &[Role::Librarian]).await;
    let book = library.book("Mind of My Mind", "9780446696142").await;
    let page = PageRequest::default();

    let borrowing = library.engine().borrow(&principal(&patron), request(book.id, 5)).await.unwrap();

    // Due today is not overdue
    library.clock.set_date(start_date() + Duration::days(5));
    let overdue = library.engine().overdue(&principal(&librarian), &page).await.unwrap();
    assert_eq!(overdue.total, 0);

    library.clock.set_date(start_date() + Duration::days(6));
    let overdue = library.engine().overdue(&principal(&librarian), &page).await.unwrap();
    assert_eq!(overdue.total, 1);
    assert!(overdue.items[0].overdue);

    let history = library.engine().my_history(&principal(&patron), &page).await.unwrap();
    assert_eq!((history.total_count, history.current_count, history.overdue_count), (1, 1, 1));
    assert!(history.borrowings.items[0].overdue);

    let returned = library.engine().return_borrowing(&principal(&patron), borrowing.id).await.unwrap();
    assert!(!returned.overdue);

    let overdue = library.engine().overdue(&principal(&librarian), &page).await.unwrap();
    assert_eq!(overdue.total, 0);
    let history = library.engine().my_history(&principal(&patron), &page).await.unwrap();
    assert_eq!((history.total_count, history.current_count, history.overdue_count), (1, 0, 0));
}

#[tokio::test]
async fn staff_lend_only_to_patrons() {
    let library = Library::new();
    let patron = library.user("tino", &[Role::Patron]).await;
    let librarian = library.user("desk", &[Role::Librarian]).await;
    let admin = library.user("head", &[Role::Admin]).await;
    let book = library.book("Kindred", "9780807083697").await;

    let err = library.engine().borrow(&principal(&librarian), request(book.id, 7)).await.unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    let err = library.engine().borrow(&principal(&admin), on_behalf(book.id, librarian.id)).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)));

    let err = library.engine().borrow(&principal(&patron), on_behalf(book.id, patron.id)).await.unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    let err = library.engine().borrow(&principal(&librarian), on_behalf(book.id, 9_999)).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let lent = library.engine().borrow(&principal(&librarian), on_behalf(book.id, patron.id)).await.unwrap();
    assert_eq!(lent.user_id, patron.id);
    assert_eq!(lent.username, "tino");
}

#[tokio::test]
async fn only_owner_or_staff_can_return_or_view() {
    let library = Library::new();
    let owner = library.user("rufus", &[Role::Patron]).await;
    let stranger = library.user("alice", &[Role::Patron]).await;
    let librarian = library.user("frontdesk", &[Role::Librarian]).await;
    let book = library.book("Fledgling", "9780446696166").await;

    let borrowing = library.engine().borrow(&principal(&owner), request(book.id, 7)).await.unwrap();

    let err = library.engine().get(&principal(&stranger), borrowing.id).await.unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));
    let err = library.engine().return_borrowing(&principal(&stranger), borrowing.id).await.unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    let err = library.engine().get(&principal(&owner), 4_242).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let closed = library.engine().return_borrowing(&principal(&librarian), borrowing.id).await.unwrap();
    assert!(closed.returned);
    assert_eq!(closed.user_id, owner.id);
}

#[tokio::test]
async fn past_due_date_is_rejected() {
    let library = Library::new();
    let patron = library.user("imago", &[Role::Patron]).await;
    let book = library.book("Imago", "9780446603638").await;

    let err = library.engine().borrow(&principal(&patron), request(book.id, -1)).await.unwrap_err();
    match err {
        AppError::Validation { fields, .. } => assert!(fields.contains_key("due_date")),
        other => panic!("expected a validation error, got {:?}", other),
    }
    assert!(library.repository.books.find_by_id(book.id).await.unwrap().unwrap().available);
}

#[tokio::test]
async fn staff_reports_and_history() {
    let library = Library::new();
    let patron = library.user("lilith", &[Role::Patron]).await;
    let librarian = library.user("akin", &[Role::Librarian]).await;
    let page = PageRequest::default();

    let dawn = library.book("Dawn", "9780446603775").await;
    let rites = library.book("Adulthood Rites", "9780446603782").await;

    let first = library.engine().borrow(&principal(&patron), request(dawn.id, 7)).await.unwrap();
    library.engine().borrow(&principal(&patron), request(rites.id, 7)).await.unwrap();
    library.engine().return_borrowing(&principal(&patron), first.id).await.unwrap();

    let active = library.engine().active(&principal(&librarian), &page).await.unwrap();
    assert_eq!(active.total, 1);
    assert_eq!(active.items[0].book_id, rites.id);

    let returned = library.engine().returned(&principal(&librarian), &page).await.unwrap();
    assert_eq!(returned.total, 1);
    assert_eq!(returned.items[0].id, first.id);

    for err in [
        library.engine().active(&principal(&patron), &page).await.unwrap_err(),
        library.engine().overdue(&principal(&patron), &page).await.unwrap_err(),
        library.engine().returned(&principal(&patron), &page).await.unwrap_err(),
    ] {
        assert!(matches!(err, AppError::Authorization(_)));
    }

    let history = library
        .engine()
        .user_history(&principal(&librarian), patron.id, &page)
        .await
        .unwrap();
    assert_eq!((history.total_count, history.current_count), (2, 1));

    let err = library
        .engine()
        .user_history(&principal(&patron), librarian.id, &page)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    let err = library
        .engine()
        .user_history(&principal(&librarian), 777, &page)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn token_from_before_a_rename_does_not_follow_the_username() {
    let library = Library::new();
    let original = library.user("alice", &[Role::Patron]).await;
    let admin = library.user("registrar", &[Role::Admin]).await;
    let book = library.book("The Word for World Is Forest", "9780765324641").await;
    let services = &library.state.services;

    let renamed = services
        .users
        .update_user(
            &principal(&admin),
            original.id,
            UpdateUser {
                username: Some("alice_old".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.username, "alice_old");

    let newcomer = services
        .auth
        .register(CreateUser {
            username: "alice".to_string(),
            email: "newcomer@example.org".to_string(),
            password: "long enough password".to_string(),
            first_name: None,
            last_name: None,
            address: None,
            phone: None,
            date_of_birth: None,
            roles: None,
        })
        .await
        .unwrap();
    assert_ne!(newcomer.id, original.id);

    // Principal as carried by a token issued before the rename
    let stale = principal(&original);
    let err = library.engine().borrow(&stale, request(book.id, 7)).await.unwrap_err();
    assert!(matches!(err, AppError::Authentication(_)));
    let err = library.engine().my_history(&stale, &PageRequest::default()).await.unwrap_err();
    assert!(matches!(err, AppError::Authentication(_)));
    assert!(services.users.get_me(&stale).await.is_err());

    let newcomer_history = library
        .engine()
        .my_history(&principal(&newcomer), &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(newcomer_history.total_count, 0);
    assert!(library.repository.books.find_by_id(book.id).await.unwrap().unwrap().available);

    // A token for the current username keeps working for the original account
    let lent = library.engine().borrow(&principal(&renamed), request(book.id, 7)).await.unwrap();
    assert_eq!(lent.user_id, original.id);
}

#[tokio::test]
async fn huge_page_numbers_yield_empty_pages() {
    let library = Library::new();
    let patron = library.user("scroller", &[Role::Patron]).await;
    let librarian = library.user("lister", &[Role::Librarian]).await;
    let book = library.book("Rocannon's World", "9780441734245").await;
    library.engine().borrow(&principal(&patron), request(book.id, 7)).await.unwrap();

    let far = PageRequest::new(i64::MAX, 100);
    let history = library.engine().my_history(&principal(&patron), &far).await.unwrap();
    assert_eq!((history.total_count, history.current_count), (1, 1));
    assert!(history.borrowings.items.is_empty());

    let active = library.engine().active(&principal(&librarian), &far).await.unwrap();
    assert_eq!(active.total, 1);
    assert!(active.items.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_borrows_admit_exactly_one() {
    let library = Library::new();
    let book = library.book("Lilith's Brood", "9780446676106").await;

    let mut patrons = Vec::new();
    for n in 0..8 {
        patrons.push(library.user(&format!("patron{}", n), &[Role::Patron]).await);
    }

    let handles: Vec<_> = patrons
        .iter()
        .map(|patron| {
            let engine = library.engine().clone();
            let principal = principal(patron);
            let request = request(book.id, 10);
            tokio::spawn(async move { engine.borrow(&principal, request).await })
        })
        .collect();

    let mut succeeded = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AppError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(conflicts, patrons.len() - 1);
    assert!(library.repository.borrowings.exists_open_for_book(book.id).await.unwrap());
    assert!(!library.repository.books.find_by_id(book.id).await.unwrap().unwrap().available);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn history_counts_ignore_the_page_window(
        borrowed in 0usize..10,
        returned_ratio in 0usize..=100,
        page in 1i64..5,
        per_page in 1i64..5,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let returned = borrowed * returned_ratio / 100;

        let history = runtime.block_on(async {
            let library = Library::new();
            let patron = library.user("reader", &[Role::Patron]).await;
            let who = principal(&patron);

            for n in 0..borrowed {
                let book = library.book(&format!("Volume {}", n), &isbn(n)).await;
                let borrowing = library.engine().borrow(&who, request(book.id, 1)).await.unwrap();
                if n < returned {
                    library.engine().return_borrowing(&who, borrowing.id).await.unwrap();
                }
            }

            // Everything still open is now past due
            library.clock.set_date(start_date() + Duration::days(2));
            library
                .engine()
                .my_history(&who, &PageRequest::new(page, per_page))
                .await
                .unwrap()
        });

        let offset = ((page - 1) * per_page) as usize;
        let expected_items = borrowed.saturating_sub(offset).min(per_page as usize);

        prop_assert_eq!(history.total_count, borrowed as i64);
        prop_assert_eq!(history.current_count, (borrowed - returned) as i64);
        prop_assert_eq!(history.overdue_count, (borrowed - returned) as i64);
        prop_assert_eq!(history.borrowings.total, borrowed as i64);
        prop_assert_eq!(history.borrowings.items.len(), expected_items);
        prop_assert!(history.borrowings.items.iter().all(|b| b.overdue == !b.returned));
    }
}
