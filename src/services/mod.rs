//! Business logic services

pub mod auth;
pub mod borrowings;
pub mod catalog;
pub mod notifications;
pub mod session;
pub mod users;

use std::sync::Arc;

use crate::{clock::Clock, config::AuthConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub users: users::UsersService,
    pub catalog: catalog::CatalogService,
    pub borrowings: borrowings::BorrowingService,
    pub session: session::SessionResolver,
    /// Source of the availability stream
    pub notifications: notifications::BroadcastNotifier,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(
        repository: Repository,
        auth_config: AuthConfig,
        clock: Arc<dyn Clock>,
        notifications: notifications::BroadcastNotifier,
    ) -> Self {
        let users = users::UsersService::new(repository.clone());
        Self {
            auth: auth::AuthService::new(repository.clone(), users.clone(), auth_config, clock.clone()),
            users,
            catalog: catalog::CatalogService::new(repository.clone()),
            borrowings: borrowings::BorrowingService::new(
                repository.clone(),
                clock,
                Arc::new(notifications.clone()),
            ),
            session: session::SessionResolver::new(repository.clone()),
            notifications,
            repository,
        }
    }

    /// Storage reachability, for readiness probes
    pub async fn ping(&self) -> crate::AppResult<()> {
        self.repository.ping().await
    }
}
