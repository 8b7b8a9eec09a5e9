//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::{collections::BTreeSet, sync::Arc};

use bibliotheca_server::{
    clock::FixedClock,
    config::AppConfig,
    models::{
        book::Book,
        role::Role,
        user::{NewUser, Principal, User, UserClaims},
    },
    repository::{BookDraft, Repository},
    services::{auth::hash_password, borrowings::BorrowingService},
    AppState,
};
use chrono::NaiveDate;

pub const PASSWORD: &str = "correct horse battery";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// First day of every test run
pub fn start_date() -> NaiveDate {
    date(2026, 3, 2)
}

/// In-memory library with a settable clock
pub struct Library {
    pub repository: Repository,
    pub clock: FixedClock,
    pub state: AppState,
}

impl Library {
    pub fn new() -> Self {
        let repository = Repository::in_memory();
        let clock = FixedClock::on(start_date());
        let state = AppState::new(AppConfig::default(), repository.clone(), Arc::new(clock.clone()));
        Self {
            repository,
            clock,
            state,
        }
    }

    pub fn engine(&self) -> &BorrowingService {
        &self.state.services.borrowings
    }

    pub async fn user(&self, username: &str, roles: &[Role]) -> User {
        self.create_user(username, roles, String::new()).await
    }

    /// Account able to log in with [`PASSWORD`]
    pub async fn user_with_password(&self, username: &str, roles: &[Role]) -> User {
        self.create_user(username, roles, hash_password(PASSWORD).unwrap())
            .await
    }

    async fn create_user(&self, username: &str, roles: &[Role], password_hash: String) -> User {
        self.repository
            .users
            .create(&NewUser {
                username: username.to_string(),
                email: format!("{}@example.org", username),
                password_hash,
                first_name: None,
                last_name: None,
                address: None,
                phone: None,
                date_of_birth: None,
                roles: roles.iter().copied().collect::<BTreeSet<_>>(),
                active: true,
            })
            .await
            .unwrap()
    }

    pub async fn book(&self, title: &str, isbn: &str) -> Book {
        self.repository
            .books
            .create(&BookDraft {
                title: title.to_string(),
                author: "Octavia E. Butler".to_string(),
                isbn: isbn.to_string(),
                publication_date: None,
                genre: Some("Science Fiction".to_string()),
            })
            .await
            .unwrap()
    }

    /// Bearer token for `user`, signed with the configured secret
    pub fn token(&self, user: &User) -> String {
        let now = chrono::Utc::now().timestamp();
        UserClaims {
            sub: user.username.clone(),
            user_id: user.id,
            roles: user.roles.iter().copied().collect(),
            exp: now + 3600,
            iat: now,
        }
        .create_token(&self.state.config.auth.jwt_secret)
        .unwrap()
    }
}

pub fn principal(user: &User) -> Principal {
    Principal {
        user_id: user.id,
        username: user.username.clone(),
    }
}

/// Distinct valid ISBN-13 strings for bulk fixtures
pub fn isbn(n: usize) -> String {
    format!("978{:010}", n)
}
