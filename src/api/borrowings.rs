//! Borrowing endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        borrowing::{BorrowRequest, BorrowingDetails, BorrowingHistory},
        page::{BorrowingPage, Page, PageRequest},
    },
    AppState,
};

use super::AuthenticatedUser;

/// Borrow a book, for oneself (patrons) or for a patron (staff, with `user_id`)
#[utoipa::path(
    post,
    path = "/borrowings/borrow",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    request_body = BorrowRequest,
    responses(
        (status = 201, description = "Borrowing opened", body = BorrowingDetails),
        (status = 400, description = "Invalid due date or borrower", body = crate::error::ErrorResponse),
        (status = 403, description = "Not allowed to borrow this way", body = crate::error::ErrorResponse),
        (status = 404, description = "Book or user not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Book is not available", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrow_book(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(request): Json<BorrowRequest>,
) -> AppResult<(StatusCode, Json<BorrowingDetails>)> {
    let borrowing = state.services.borrowings.borrow(&principal, request).await?;
    Ok((StatusCode::CREATED, Json(borrowing)))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/borrowings/{id}/return",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Borrowing ID")
    ),
    responses(
        (status = 200, description = "Borrowing closed", body = BorrowingDetails),
        (status = 403, description = "Neither the borrower nor staff", body = crate::error::ErrorResponse),
        (status = 404, description = "Borrowing not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Already returned", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<BorrowingDetails>> {
    let borrowing = state.services.borrowings.return_borrowing(&principal, id).await?;
    Ok(Json(borrowing))
}

/// Get one borrowing
#[utoipa::path(
    get,
    path = "/borrowings/{id}",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Borrowing ID")
    ),
    responses(
        (status = 200, description = "Borrowing details", body = BorrowingDetails),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn get_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<BorrowingDetails>> {
    let borrowing = state.services.borrowings.get(&principal, id).await?;
    Ok(Json(borrowing))
}

/// Own borrowing history with counts
#[utoipa::path(
    get,
    path = "/borrowings/history",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(PageRequest),
    responses(
        (status = 200, description = "Borrowing history", body = BorrowingHistory),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn my_history(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Query(page): Query<PageRequest>,
) -> AppResult<Json<BorrowingHistory>> {
    let history = state.services.borrowings.my_history(&principal, &page).await?;
    Ok(Json(history))
}

/// Borrowing history of any user (staff, or the user themselves)
#[utoipa::path(
    get,
    path = "/borrowings/users/{id}/history",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "User ID"),
        PageRequest
    ),
    responses(
        (status = 200, description = "Borrowing history", body = BorrowingHistory),
        (status = 403, description = "Staff only"),
        (status = 404, description = "User not found")
    )
)]
pub async fn user_history(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
    Query(page): Query<PageRequest>,
) -> AppResult<Json<BorrowingHistory>> {
    let history = state.services.borrowings.user_history(&principal, id, &page).await?;
    Ok(Json(history))
}

/// Open borrowings (staff)
#[utoipa::path(
    get,
    path = "/borrowings/active",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(PageRequest),
    responses(
        (status = 200, description = "Open borrowings", body = BorrowingPage),
        (status = 403, description = "Staff only")
    )
)]
pub async fn list_active(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Query(page): Query<PageRequest>,
) -> AppResult<Json<Page<BorrowingDetails>>> {
    Ok(Json(state.services.borrowings.active(&principal, &page).await?))
}

/// Open borrowings past their due date (staff)
#[utoipa::path(
    get,
    path = "/borrowings/overdue",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(PageRequest),
    responses(
        (status = 200, description = "Overdue borrowings", body = BorrowingPage),
        (status = 403, description = "Staff only")
    )
)]
pub async fn list_overdue(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Query(page): Query<PageRequest>,
) -> AppResult<Json<Page<BorrowingDetails>>> {
    Ok(Json(state.services.borrowings.overdue(&principal, &page).await?))
}

/// Returned borrowings (staff)
#[utoipa::path(
    get,
    path = "/borrowings/returned",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(PageRequest),
    responses(
        (status = 200, description = "Returned borrowings", body = BorrowingPage),
        (status = 403, description = "Staff only")
    )
)]
pub async fn list_returned(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Query(page): Query<PageRequest>,
) -> AppResult<Json<Page<BorrowingDetails>>> {
    Ok(Json(state.services.borrowings.returned(&principal, &page).await?))
}
