//! User administration and self-service profile management

use std::collections::BTreeSet;

use validator::Validate;

use super::{
    auth::{hash_password, verify_password},
    session::SessionResolver,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        page::{Page, PageRequest},
        role::{default_roles, Role},
        user::{
            CreateUser, NewUser, Principal, UpdateProfile, UpdateUser, User, UserChanges, UserQuery,
            UserSummary,
        },
    },
    policy::{authorize, Action, Actor},
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    session: SessionResolver,
}

impl UsersService {
    pub fn new(repository: Repository) -> Self {
        Self {
            session: SessionResolver::new(repository.clone()),
            repository,
        }
    }

    /// The caller's own account
    pub async fn get_me(&self, principal: &Principal) -> AppResult<User> {
        let user = self.session.current_user(principal).await?;
        authorize(Some(&Actor::from(&user)), &Action::ViewOwnProfile)?;
        Ok(user)
    }

    /// Update the caller's own profile. Changing the password needs the current one.
    pub async fn update_me(&self, principal: &Principal, request: UpdateProfile) -> AppResult<User> {
        request.validate()?;

        let user = self.session.current_user(principal).await?;
        authorize(Some(&Actor::from(&user)), &Action::UpdateOwnProfile)?;

        if let Some(ref email) = request.email {
            self.ensure_email_free(email, Some(user.id)).await?;
        }

        let password_hash = match request.new_password {
            Some(ref new_password) => {
                let current = request.current_password.as_deref().ok_or_else(|| {
                    AppError::validation(
                        "current_password",
                        "Current password is required to change password",
                    )
                })?;
                if !verify_password(&user.password_hash, current)? {
                    return Err(AppError::validation(
                        "current_password",
                        "Current password is incorrect",
                    ));
                }
                Some(hash_password(new_password)?)
            }
            None => None,
        };

        let changes = UserChanges {
            email: request.email,
            password_hash,
            first_name: request.first_name,
            last_name: request.last_name,
            address: request.address,
            phone: request.phone,
            date_of_birth: request.date_of_birth,
            ..Default::default()
        };

        self.apply(user.id, &changes).await
    }

    /// Search users (staff)
    pub async fn list_users(&self, principal: &Principal, query: &UserQuery) -> AppResult<Page<UserSummary>> {
        let actor = self.session.resolve(principal).await?;
        authorize(Some(&actor), &Action::AdministerUsers)?;

        let (users, total) = self.repository.users.search(query).await?;
        let page = PageRequest {
            page: query.page,
            per_page: query.per_page,
        };
        Ok(Page::new(
            users.into_iter().map(UserSummary::from).collect(),
            total,
            &page,
        ))
    }

    /// Any account for staff; one's own account for everybody else
    pub async fn get_user(&self, principal: &Principal, id: i64) -> AppResult<User> {
        let actor = self.session.resolve(principal).await?;
        let action = if actor.id == id {
            Action::ViewOwnProfile
        } else {
            Action::AdministerUsers
        };
        authorize(Some(&actor), &action)?;

        self.require(id).await
    }

    /// Update another account (staff)
    pub async fn update_user(&self, principal: &Principal, id: i64, request: UpdateUser) -> AppResult<User> {
        request.validate()?;

        let actor = self.session.resolve(principal).await?;
        authorize(Some(&actor), &Action::AdministerUsers)?;
        self.require(id).await?;

        if let Some(ref username) = request.username {
            self.ensure_username_free(username, Some(id)).await?;
        }
        if let Some(ref email) = request.email {
            self.ensure_email_free(email, Some(id)).await?;
        }

        let password_hash = request
            .password
            .as_deref()
            .map(hash_password)
            .transpose()?;

        let changes = UserChanges {
            username: request.username,
            email: request.email,
            password_hash,
            first_name: request.first_name,
            last_name: request.last_name,
            address: request.address,
            phone: request.phone,
            date_of_birth: request.date_of_birth,
            active: request.active,
            ..Default::default()
        };

        let user = self.apply(id, &changes).await?;
        tracing::info!(user_id = id, updated_by = actor.id, "User updated");
        Ok(user)
    }

    /// Staff-driven account creation
    pub async fn create_user(&self, principal: &Principal, request: CreateUser) -> AppResult<User> {
        let actor = self.session.resolve(principal).await?;
        authorize(Some(&actor), &Action::AdministerUsers)?;
        self.create_account(Some(&actor), request).await
    }

    /// Create an account on behalf of `actor`, or anonymously when `None`.
    ///
    /// Requested roles default to PATRON; anything beyond PATRON needs an ADMIN actor.
    pub async fn create_account(&self, actor: Option<&Actor>, request: CreateUser) -> AppResult<User> {
        request.validate()?;

        let roles = request.roles.clone().unwrap_or_else(default_roles);
        ensure_roles_present(&roles)?;
        authorize(actor, &Action::CreateUser { requested_roles: &roles })?;

        self.ensure_username_free(&request.username, None).await?;
        self.ensure_email_free(&request.email, None).await?;

        let new_user = NewUser {
            username: request.username,
            email: request.email,
            password_hash: hash_password(&request.password)?,
            first_name: request.first_name,
            last_name: request.last_name,
            address: request.address,
            phone: request.phone,
            date_of_birth: request.date_of_birth,
            roles,
            active: true,
        };

        let user = self.repository.users.create(&new_user).await?;
        tracing::info!(
            user_id = user.id,
            username = %user.username,
            created_by = ?actor.map(|a| a.id),
            "User created"
        );
        Ok(user)
    }

    /// Replace the role set of an account
    pub async fn update_roles(&self, principal: &Principal, id: i64, roles: BTreeSet<Role>) -> AppResult<User> {
        ensure_roles_present(&roles)?;

        let actor = self.session.resolve(principal).await?;
        authorize(Some(&actor), &Action::AssignRoles { roles: &roles })?;
        self.require(id).await?;

        let changes = UserChanges {
            roles: Some(roles),
            ..Default::default()
        };
        let user = self.apply(id, &changes).await?;
        tracing::info!(user_id = id, roles = ?user.roles, updated_by = actor.id, "Roles updated");
        Ok(user)
    }

    async fn require(&self, id: i64) -> AppResult<User> {
        self.repository
            .users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    async fn apply(&self, id: i64, changes: &UserChanges) -> AppResult<User> {
        self.repository
            .users
            .update(id, changes)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    async fn ensure_username_free(&self, username: &str, exclude_id: Option<i64>) -> AppResult<()> {
        if self.repository.users.username_exists(username, exclude_id).await? {
            return Err(AppError::InvalidArgument(format!(
                "Username '{}' is already taken",
                username
            )));
        }
        Ok(())
    }

    async fn ensure_email_free(&self, email: &str, exclude_id: Option<i64>) -> AppResult<()> {
        if self.repository.users.email_exists(email, exclude_id).await? {
            return Err(AppError::InvalidArgument(format!(
                "Email '{}' is already in use",
                email
            )));
        }
        Ok(())
    }
}

fn ensure_roles_present(roles: &BTreeSet<Role>) -> AppResult<()> {
    if roles.is_empty() {
        return Err(AppError::InvalidArgument(
            "A user must hold at least one role".to_string(),
        ));
    }
    Ok(())
}
