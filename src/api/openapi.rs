//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, borrowings, health, users};

/// Registers the `bearer_auth` scheme referenced by protected paths
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bibliotheca API",
        version = "1.0.0",
        description = "Library catalog and borrowing REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::register,
        // Users
        users::get_me,
        users::update_me,
        users::list_users,
        users::create_user,
        users::get_user,
        users::update_user,
        users::update_roles,
        // Books
        books::list_books,
        books::get_book,
        books::get_book_by_isbn,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::availability_stream,
        // Borrowings
        borrowings::borrow_book,
        borrowings::return_book,
        borrowings::get_borrowing,
        borrowings::my_history,
        borrowings::user_history,
        borrowings::list_active,
        borrowings::list_overdue,
        borrowings::list_returned,
    ),
    components(
        schemas(
            // Auth
            crate::models::user::LoginRequest,
            crate::models::user::LoginResponse,
            // Users
            crate::models::role::Role,
            crate::models::user::User,
            crate::models::user::UserSummary,
            crate::models::user::UserQuery,
            crate::models::user::CreateUser,
            crate::models::user::UpdateUser,
            crate::models::user::UpdateProfile,
            crate::models::user::UpdateRoles,
            crate::models::page::UserPage,
            // Books
            crate::models::book::Book,
            crate::models::book::BookQuery,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::page::BookPage,
            crate::services::notifications::BookAvailabilityEvent,
            // Borrowings
            crate::models::borrowing::BorrowRequest,
            crate::models::borrowing::BorrowingDetails,
            crate::models::borrowing::BorrowingHistory,
            crate::models::borrowing::BorrowingState,
            crate::models::page::BorrowingPage,
            crate::models::page::PageRequest,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "users", description = "User management"),
        (name = "books", description = "Catalog management"),
        (name = "borrowings", description = "Borrowing and returns")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
