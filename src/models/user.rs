//! User model and related types

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::role::{parse_roles, Role};

/// Internal row structure for database queries (roles as text array)
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    first_name: Option<String>,
    last_name: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    date_of_birth: Option<NaiveDate>,
    roles: Vec<String>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            address: row.address,
            phone: row.phone,
            date_of_birth: row.date_of_birth,
            roles: parse_roles(&row.roles),
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Full user model
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Hashed password (argon2)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    #[schema(value_type = Vec<Role>)]
    pub roles: BTreeSet<Role>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_staff(&self) -> bool {
        self.roles.iter().any(Role::is_staff)
    }
}

/// Short user representation for lists
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[schema(value_type = Vec<Role>)]
    pub roles: BTreeSet<Role>,
    pub active: bool,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        UserSummary {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            roles: user.roles,
            active: user.active,
        }
    }
}

/// User query parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct UserQuery {
    /// Case-insensitive match on username, email, first or last name
    pub name: Option<String>,
    /// Only users holding this role
    pub role: Option<Role>,
    pub active: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl UserQuery {
    pub fn matches(&self, user: &User) -> bool {
        let name_matches = match &self.name {
            None => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                [
                    Some(user.username.as_str()),
                    Some(user.email.as_str()),
                    user.first_name.as_deref(),
                    user.last_name.as_deref(),
                ]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&needle))
            }
        };

        name_matches
            && self.role.map_or(true, |r| user.has_role(r))
            && self.active.map_or(true, |a| user.active == a)
    }
}

/// Create user request (registration and staff-driven creation)
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    /// Requested roles (defaults to PATRON)
    #[schema(value_type = Option<Vec<Role>>)]
    pub roles: Option<BTreeSet<Role>>,
}

/// Update user request (staff)
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUser {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub active: Option<bool>,
}

/// Update own profile request (for authenticated users)
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProfile {
    /// Email address (must be unique)
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    /// Current password (required to change password)
    pub current_password: Option<String>,
    /// New password
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: Option<String>,
}

/// Replace a user's role set (admin for anything beyond PATRON)
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateRoles {
    #[schema(value_type = Vec<Role>)]
    pub roles: BTreeSet<Role>,
}

/// Fully resolved user ready to be inserted
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub roles: BTreeSet<Role>,
    pub active: bool,
}

/// Column changes applied by an update; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub roles: Option<BTreeSet<Role>>,
    pub active: Option<bool>,
}

impl UserChanges {
    /// Apply the changes to an in-memory record
    pub fn apply(&self, user: &mut User) {
        macro_rules! set_field {
            ($field:ident) => {
                if let Some(ref value) = self.$field {
                    user.$field = value.clone();
                }
            };
        }
        macro_rules! set_optional {
            ($field:ident) => {
                if let Some(ref value) = self.$field {
                    user.$field = Some(value.clone());
                }
            };
        }

        set_field!(username);
        set_field!(email);
        set_field!(password_hash);
        set_optional!(first_name);
        set_optional!(last_name);
        set_optional!(address);
        set_optional!(phone);
        set_optional!(date_of_birth);
        set_field!(roles);
        set_field!(active);
    }
}

/// Login request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    /// Username, or the account's email address
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Login response carrying the bearer token
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    /// Lifetime of the token in seconds
    pub expires_in: i64,
    pub user: User,
}

/// Identity carried by a verified bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
}

/// JWT Claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i64,
    /// Roles at issue time; the store stays authoritative
    pub roles: Vec<Role>,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.user_id,
            username: self.sub.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        let now = Utc::now();
        User {
            id: 7,
            username: "mira".to_string(),
            email: "mira@example.org".to_string(),
            password_hash: "hash".to_string(),
            first_name: Some("Mira".to_string()),
            last_name: Some("Okafor".to_string()),
            address: None,
            phone: None,
            date_of_birth: None,
            roles: BTreeSet::from([Role::Patron]),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_password_hash_is_never_serialized() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["roles"], serde_json::json!(["PATRON"]));
    }

    #[test]
    fn test_token_round_trip() {
        let now = Utc::now().timestamp();
        let claims = UserClaims {
            sub: "mira".to_string(),
            user_id: 7,
            roles: vec![Role::Patron],
            exp: now + 3600,
            iat: now,
        };
        let token = claims.create_token("secret").unwrap();
        let parsed = UserClaims::from_token(&token, "secret").unwrap();
        assert_eq!(parsed.principal(), Principal { user_id: 7, username: "mira".to_string() });
        assert!(UserClaims::from_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_changes_apply_only_provided_fields() {
        let mut user = sample_user();
        let changes = UserChanges {
            email: Some("new@example.org".to_string()),
            phone: Some("555-0100".to_string()),
            roles: Some(BTreeSet::from([Role::Librarian])),
            ..Default::default()
        };
        changes.apply(&mut user);
        assert_eq!(user.email, "new@example.org");
        assert_eq!(user.phone.as_deref(), Some("555-0100"));
        assert_eq!(user.first_name.as_deref(), Some("Mira"));
        assert!(user.is_staff());
    }

    #[test]
    fn test_query_matches_name_and_role() {
        let user = sample_user();
        let query = UserQuery {
            name: Some("okaf".to_string()),
            role: Some(Role::Patron),
            ..Default::default()
        };
        assert!(query.matches(&user));

        let query = UserQuery {
            role: Some(Role::Admin),
            ..Default::default()
        };
        assert!(!query.matches(&user));
    }
}
