pub mod api;
pub mod auth;
pub mod booking;
pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod startup;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::auth::TokenService;
use crate::cache::MemoryCache;
use crate::db::{PackageWithModules, ServiceModule};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub tokens: TokenService,
    pub rate_limiter: Arc<RateLimiter>,
    pub packages_cache: Arc<MemoryCache<Vec<PackageWithModules>>>,
    pub modules_cache: Arc<MemoryCache<Vec<ServiceModule>>>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let tokens = TokenService::new(&config.auth);
        Self {
            config,
            db,
            tokens,
            rate_limiter,
            packages_cache: Arc::new(MemoryCache::new()),
            modules_cache: Arc::new(MemoryCache::new()),
        }
    }

    /// Start the periodic sweeps for the rate limiter and catalog caches
    pub fn spawn_background_tasks(&self) {
        api::rate_limit::spawn_cleanup_task(
            self.rate_limiter.clone(),
            self.config.rate_limit.cleanup_interval,
        );
        cache::spawn_cleanup_task(self.packages_cache.clone(), self.config.cache.cleanup_interval);
        cache::spawn_cleanup_task(self.modules_cache.clone(), self.config.cache.cleanup_interval);
    }
}
