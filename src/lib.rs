//! Bibliotheca Library Server
//!
//! REST JSON API for a library catalog: books, patrons and staff accounts,
//! and the borrowing ledger that ties them together.

use std::sync::Arc;

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod policy;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

impl AppState {
    /// Wire services over `repository` with the given clock
    pub fn new(
        config: AppConfig,
        repository: repository::Repository,
        clock: Arc<dyn clock::Clock>,
    ) -> Self {
        let services = services::Services::new(
            repository,
            config.auth.clone(),
            clock,
            services::notifications::BroadcastNotifier::default(),
        );
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
        }
    }
}
