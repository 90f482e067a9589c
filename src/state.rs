//! Shared application state.

use crate::executor::Executor;
use crate::log_store::{LogFailurePolicy, LogStore};
use crate::rate_limit::RateLimiter;
use std::sync::Arc;

/// Everything a request handler needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<Executor>,
    pub limiter: RateLimiter,
    pub logs: LogStore,
    pub log_failure: LogFailurePolicy,
}

impl AppState {
    pub fn new(executor: Executor, limiter: RateLimiter, logs: LogStore) -> Self {
        Self {
            executor: Arc::new(executor),
            limiter,
            logs,
            log_failure: LogFailurePolicy::default(),
        }
    }

    pub fn with_log_failure(mut self, policy: LogFailurePolicy) -> Self {
        self.log_failure = policy;
        self
    }
}
