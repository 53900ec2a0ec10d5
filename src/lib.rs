pub mod api;
pub mod config;
pub mod db;
pub mod utils;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            db,
            rate_limiter,
        }
    }
}
