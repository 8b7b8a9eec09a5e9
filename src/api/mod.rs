//! API handlers for Bibliotheca REST endpoints

pub mod auth;
pub mod books;
pub mod borrowings;
pub mod health;
pub mod openapi;
pub mod users;

use std::time::Duration;

use axum::{
    async_trait,
    error_handling::HandleErrorLayer,
    extract::FromRequestParts,
    http::request::Parts,
    routing::{get, post, put},
    BoxError, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    error::AppError,
    models::user::{Principal, UserClaims},
    AppState,
};

/// Extractor for the principal named by a valid bearer token
pub struct AuthenticatedUser(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|rejection| {
                    let message = if rejection.is_missing() {
                        "Missing authorization header"
                    } else {
                        "Invalid authorization header format"
                    };
                    AppError::Authentication(message.to_string())
                })?;

        let claims = UserClaims::from_token(bearer.token(), &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims.principal()))
    }
}

/// Map middleware failures onto the error taxonomy
async fn handle_middleware_error(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::Unavailable("Request timed out".to_string())
    } else {
        AppError::Internal(format!("Unhandled middleware error: {}", err))
    }
}

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        // Users
        .route("/users/me", get(users::get_me).put(users::update_me))
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/:id", get(users::get_user).put(users::update_user))
        .route("/users/:id/roles", put(users::update_roles))
        // Catalog
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/availability/stream", get(books::availability_stream))
        .route("/books/isbn/:isbn", get(books::get_book_by_isbn))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        // Borrowings
        .route("/borrowings/borrow", post(borrowings::borrow_book))
        .route("/borrowings/history", get(borrowings::my_history))
        .route("/borrowings/active", get(borrowings::list_active))
        .route("/borrowings/overdue", get(borrowings::list_overdue))
        .route("/borrowings/returned", get(borrowings::list_returned))
        .route("/borrowings/users/:id/history", get(borrowings::user_history))
        .route("/borrowings/:id", get(borrowings::get_borrowing))
        .route("/borrowings/:id/return", post(borrowings::return_book))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
}
