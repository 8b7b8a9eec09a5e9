//! Resolution of a token's principal into the acting user

use crate::{
    error::{AppError, AppResult},
    models::user::{Principal, User},
    policy::Actor,
    repository::Repository,
};

#[derive(Clone)]
pub struct SessionResolver {
    repository: Repository,
}

impl SessionResolver {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Current record of the principal's account. Inactive accounts are refused,
    /// as are tokens issued before the account was renamed.
    pub async fn current_user(&self, principal: &Principal) -> AppResult<User> {
        let user = self
            .repository
            .users
            .find_by_id(principal.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", principal.user_id)))?;

        if user.username != principal.username {
            tracing::info!(
                user_id = user.id,
                token_username = %principal.username,
                "Rejected token issued under a previous username"
            );
            return Err(AppError::Authentication(
                "Token no longer matches the account; log in again".to_string(),
            ));
        }

        if !user.active {
            return Err(AppError::Authentication("Account is inactive".to_string()));
        }

        Ok(user)
    }

    /// Actor with the role set as currently stored, not as issued in the token
    pub async fn resolve(&self, principal: &Principal) -> AppResult<Actor> {
        let user = self.current_user(principal).await?;
        Ok(Actor::from(&user))
    }
}
