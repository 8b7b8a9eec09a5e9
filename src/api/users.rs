//! User management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        page::{Page, UserPage},
        user::{CreateUser, UpdateProfile, UpdateRoles, UpdateUser, User, UserQuery, UserSummary},
    },
    AppState,
};

use super::AuthenticatedUser;

/// Current user's profile
#[utoipa::path(
    get,
    path = "/users/me",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Own profile", body = User),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_me(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<User>> {
    let user = state.services.users.get_me(&principal).await?;
    Ok(Json(user))
}

/// Update own profile
#[utoipa::path(
    put,
    path = "/users/me",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = UpdateProfile,
    responses(
        (status = 200, description = "Profile updated", body = User),
        (status = 400, description = "Invalid input or wrong current password", body = crate::error::ErrorResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn update_me(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(request): Json<UpdateProfile>,
) -> AppResult<Json<User>> {
    let user = state.services.users.update_me(&principal, request).await?;
    Ok(Json(user))
}

/// List users with search and pagination
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    params(UserQuery),
    responses(
        (status = 200, description = "List of users", body = UserPage),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Staff only")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Page<UserSummary>>> {
    let page = state.services.users.list_users(&principal, &query).await?;
    Ok(Json(page))
}

/// Create a user (staff; roles beyond PATRON need ADMIN)
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid input or username/email taken", body = crate::error::ErrorResponse),
        (status = 403, description = "Not allowed to create this role", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(request): Json<CreateUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.services.users.create_user(&principal, request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Get user details by ID
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User details", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<User>> {
    let user = state.services.users.get_user(&principal, id).await?;
    Ok(Json(user))
}

/// Update a user (staff)
#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "User ID")
    ),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateUser>,
) -> AppResult<Json<User>> {
    let user = state.services.users.update_user(&principal, id, request).await?;
    Ok(Json(user))
}

/// Replace a user's roles
#[utoipa::path(
    put,
    path = "/users/{id}/roles",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "User ID")
    ),
    request_body = UpdateRoles,
    responses(
        (status = 200, description = "Roles updated", body = User),
        (status = 400, description = "Empty role set", body = crate::error::ErrorResponse),
        (status = 403, description = "Not allowed to grant this role", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_roles(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateRoles>,
) -> AppResult<Json<User>> {
    let user = state
        .services
        .users
        .update_roles(&principal, id, request.roles)
        .await?;
    Ok(Json(user))
}
