//! Authentication service: login, self-registration and password hashing

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use validator::Validate;

use super::users::UsersService;
use crate::{
    clock::Clock,
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        role::role_names,
        user::{CreateUser, LoginRequest, LoginResponse, User, UserClaims},
    },
    repository::Repository,
};

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Check `password` against a stored Argon2 hash
pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    users: UsersService,
    config: AuthConfig,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(
        repository: Repository,
        users: UsersService,
        config: AuthConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            users,
            config,
            clock,
        }
    }

    /// Authenticate by username (or email) and password and issue a JWT
    pub async fn login(&self, request: LoginRequest) -> AppResult<LoginResponse> {
        request.validate()?;

        let invalid = || AppError::Authentication("Invalid username or password".to_string());

        let users = &self.repository.users;
        let user = match users.find_by_username(&request.username).await? {
            Some(user) => Some(user),
            None => users.find_by_email(&request.username).await?,
        }
        .ok_or_else(invalid)?;

        if !verify_password(&user.password_hash, &request.password)? {
            tracing::info!(username = %request.username, "Rejected login");
            return Err(invalid());
        }

        if !user.active {
            return Err(AppError::Authentication("Account is inactive".to_string()));
        }

        let token = self.issue_token(&user)?;
        tracing::info!(user_id = user.id, "User logged in");

        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.jwt_expiration_hours as i64 * 3600,
            user,
        })
    }

    /// Anonymous self-registration; only PATRON accounts can be created this way
    pub async fn register(&self, request: CreateUser) -> AppResult<User> {
        self.users.create_account(None, request).await
    }

    fn issue_token(&self, user: &User) -> AppResult<String> {
        let now = self.clock.now().timestamp();
        let claims = UserClaims {
            sub: user.username.clone(),
            user_id: user.id,
            roles: user.roles.iter().copied().collect(),
            exp: now + self.config.jwt_expiration_hours as i64 * 3600,
            iat: now,
        };

        tracing::debug!(roles = ?role_names(&user.roles), "Issuing token");
        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }
}
