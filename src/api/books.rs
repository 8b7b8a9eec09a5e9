//! Catalog endpoints

use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookQuery, CreateBook, UpdateBook},
        page::{BookPage, Page},
    },
    policy::{authorize, Action},
    AppState,
};

use super::AuthenticatedUser;

/// Search the catalog
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    params(BookQuery),
    responses(
        (status = 200, description = "Matching books", body = BookPage),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<Page<Book>>> {
    let page = state.services.catalog.search(&principal, &query).await?;
    Ok(Json(page))
}

/// Get a book by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.get(&principal, id).await?;
    Ok(Json(book))
}

/// Get a book by ISBN (hyphens and spaces are ignored)
#[utoipa::path(
    get,
    path = "/books/isbn/{isbn}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("isbn" = String, Path, description = "ISBN-10 or ISBN-13")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book_by_isbn(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(isbn): Path<String>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.get_by_isbn(&principal, &isbn).await?;
    Ok(Json(book))
}

/// Add a book to the catalog (staff)
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid input or duplicate ISBN", body = crate::error::ErrorResponse),
        (status = 403, description = "Staff only")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(request): Json<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let book = state.services.catalog.create(&principal, request).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Update a book (staff)
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Invalid input or duplicate ISBN", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found")
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateBook>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.update(&principal, id, request).await?;
    Ok(Json(book))
}

/// Delete a book that was never borrowed (staff)
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book has borrowing history", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.services.catalog.delete(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Server-sent events, one `availability` event per borrow or return
#[utoipa::path(
    get,
    path = "/books/availability/stream",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Event stream of BookAvailabilityEvent", content_type = "text/event-stream"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn availability_stream(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let actor = state.services.session.resolve(&principal).await?;
    authorize(Some(&actor), &Action::BrowseCatalog)?;

    let receiver = state.services.notifications.subscribe();
    tracing::debug!(user_id = actor.id, "Availability stream opened");

    // Lagged receivers skip the events they missed
    let stream = BroadcastStream::new(receiver).filter_map(|message| {
        let event = message.ok()?;
        Event::default()
            .event("availability")
            .id(event.borrowing_id.to_string())
            .json_data(&event)
            .ok()
            .map(Ok)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
