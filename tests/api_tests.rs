//! HTTP API tests against the in-memory router

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use bibliotheca_server::{api, models::role::Role};
use common::{Library, PASSWORD};
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    library: Library,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        let library = Library::new();
        let router = api::router(library.state.clone());
        Self { library, router }
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(format!("/api/v1{}", uri));
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }
}

#[tokio::test]
async fn test_health_and_readiness() {
    let app = TestApp::new();

    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.get("/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_register_creates_patron() {
    let app = TestApp::new();
    let payload = json!({
        "username": "newreader",
        "email": "newreader@example.org",
        "password": "long enough password"
    });

    let (status, body) = app.post("/auth/register", None, payload.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["username"], "newreader");
    assert_eq!(body["roles"], json!(["PATRON"]));
    assert!(body.get("password_hash").is_none());

    let (status, body) = app.post("/auth/register", None, payload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidArgument");
}

#[tokio::test]
async fn test_register_with_admin_role_is_denied() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/auth/register",
            None,
            json!({
                "username": "sneaky",
                "email": "sneaky@example.org",
                "password": "long enough password",
                "roles": ["ADMIN"]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "RoleCreationDenied");
    assert_eq!(body["code"], 4);
}

#[tokio::test]
async fn test_login() {
    let app = TestApp::new();
    app.library.user_with_password("member", &[Role::Patron]).await;

    let (status, body) = app
        .post("/auth/login", None, json!({ "username": "member", "password": PASSWORD }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["username"], "member");

    let (status, body) = app
        .post("/auth/login", None, json!({ "username": "member", "password": "wrong" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid username or password");
}

#[tokio::test]
async fn test_requests_without_valid_token_are_rejected() {
    let app = TestApp::new();

    let (status, body) = app.get("/users/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthenticated");

    let (status, _) = app.get("/users/me", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/books", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_catalog_writes_require_staff() {
    let app = TestApp::new();
    let librarian = app.library.user("cataloguer", &[Role::Librarian]).await;
    let patron = app.library.user("browser", &[Role::Patron]).await;
    let staff_token = app.library.token(&librarian);
    let patron_token = app.library.token(&patron);

    let book = json!({
        "title": "The Dispossessed",
        "author": "Ursula K. Le Guin",
        "isbn": "978-0-06-051275-3",
        "genre": "Science Fiction"
    });

    let (status, _) = app.post("/books", Some(&patron_token), book.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = app.post("/books", Some(&staff_token), book).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["isbn"], "9780060512753");
    assert_eq!(created["available"], true);

    let (status, found) = app.get("/books/isbn/9780060512753", Some(&patron_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["id"], created["id"]);

    let (status, body) = app
        .post(
            "/books",
            Some(&staff_token),
            json!({ "title": "Broken", "author": "Nobody", "isbn": "12345" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["isbn"].is_string());

    let (status, _) = app.get("/books/9999", Some(&patron_token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_borrow_and_return_over_http() {
    let app = TestApp::new();
    let patron = app.library.user("borrower", &[Role::Patron]).await;
    let other = app.library.user("latecomer", &[Role::Patron]).await;
    let book = app.library.book("The Left Hand of Darkness", "9780441478125").await;
    let token = app.library.token(&patron);
    let other_token = app.library.token(&other);

    let request = json!({ "book_id": book.id, "due_date": "2026-03-20" });

    let (status, borrowing) = app.post("/borrowings/borrow", Some(&token), request.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(borrowing["returned"], false);
    assert_eq!(borrowing["state"], "open");
    assert_eq!(borrowing["overdue"], false);
    assert!(borrowing["return_date"].is_null());
    assert_eq!(borrowing["due_date"], "2026-03-20");

    let (status, body) = app.post("/borrowings/borrow", Some(&other_token), request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "InvalidState");

    let (_, listed) = app.get(&format!("/books/{}", book.id), Some(&token)).await;
    assert_eq!(listed["available"], false);

    let id = borrowing["id"].as_i64().unwrap();
    let (status, returned) = app
        .send(Method::POST, &format!("/borrowings/{}/return", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["returned"], true);
    assert_eq!(returned["state"], "closed");
    assert_eq!(returned["return_date"], "2026-03-02");

    let (status, _) = app
        .send(Method::POST, &format!("/borrowings/{}/return", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, history) = app.get("/borrowings/history", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["total_count"], 1);
    assert_eq!(history["current_count"], 0);
    assert_eq!(history["borrowings"]["items"][0]["id"], id);
}

#[tokio::test]
async fn test_borrow_with_past_due_date_reports_field() {
    let app = TestApp::new();
    let patron = app.library.user("hasty", &[Role::Patron]).await;
    let book = app.library.book("Lathe of Heaven", "9781416556961").await;
    let token = app.library.token(&patron);

    let (status, body) = app
        .post(
            "/borrowings/borrow",
            Some(&token),
            json!({ "book_id": book.id, "due_date": "2026-03-01" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ValidationFailed");
    assert!(body["fields"]["due_date"].is_string());
}

#[tokio::test]
async fn test_staff_listings_are_forbidden_to_patrons() {
    let app = TestApp::new();
    let patron = app.library.user("curious", &[Role::Patron]).await;
    let librarian = app.library.user("reports", &[Role::Librarian]).await;

    let (status, _) = app.get("/borrowings/active", Some(&app.library.token(&patron))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .get("/borrowings/overdue?page=1&per_page=5", Some(&app.library.token(&librarian)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
    assert_eq!(body["per_page"], 5);
}

#[tokio::test]
async fn test_delete_book_with_history_conflicts() {
    let app = TestApp::new();
    let patron = app.library.user("reader", &[Role::Patron]).await;
    let admin = app.library.user("root", &[Role::Admin]).await;
    let kept = app.library.book("Always Coming Home", "9780520227354").await;
    let spare = app.library.book("Searoad", "9780060169442").await;
    let admin_token = app.library.token(&admin);

    let (status, _) = app
        .post(
            "/borrowings/borrow",
            Some(&app.library.token(&patron)),
            json!({ "book_id": kept.id, "due_date": "2026-03-10" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .send(Method::DELETE, &format!("/books/{}", kept.id), Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .send(Method::DELETE, &format!("/books/{}", spare.id), Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/api-docs/openapi.json")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let doc: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(doc["info"]["title"], "Bibliotheca API");
}
