//! Per-client request ceilings, one counter per (method class, client IP).

use axum::http::Method;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Shared counter backend for the rate limiter.
///
/// `increment` must be atomic with respect to concurrent callers on the same
/// key: two requests racing at the ceiling never both observe the same count.
pub trait CounterStore: Send + Sync {
    /// Bump the counter for `key` and return its value within the current
    /// window. A window that has elapsed starts over at 1.
    fn increment(&self, key: &str, window: Duration) -> u64;

    /// Drop counters whose window has elapsed.
    fn purge_expired(&self);
}

#[derive(Debug)]
struct Window {
    started: Instant,
    len: Duration,
    count: u64,
}

/// Fixed-window counters in a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live counters.
    pub fn len(&self) -> usize {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CounterStore for MemoryCounterStore {
    fn increment(&self, key: &str, window: Duration) -> u64 {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            len: window,
            count: 0,
        });
        if now.duration_since(entry.started) >= entry.len {
            entry.started = now;
            entry.len = window;
            entry.count = 0;
        }
        entry.count += 1;
        entry.count
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.retain(|_, w| now.duration_since(w.started) < w.len);
    }
}

/// Ceilings per method class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub post: u64,
    pub get: u64,
    pub window: Duration,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            post: 20,
            get: 100,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimits {
    pub fn ceiling(&self, class: LimitClass) -> u64 {
        match class {
            LimitClass::Post => self.post,
            LimitClass::Get => self.get,
        }
    }
}

/// Methods that share one counter. HEAD is counted as GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitClass {
    Post,
    Get,
}

impl LimitClass {
    /// `None` for methods that are not limited.
    pub fn of(method: &Method) -> Option<Self> {
        if method == Method::POST {
            Some(LimitClass::Post)
        } else if method == Method::GET || method == Method::HEAD {
            Some(LimitClass::Get)
        } else {
            None
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            LimitClass::Post => "POST",
            LimitClass::Get => "GET",
        }
    }
}

/// Rate limiter keyed by client IP and method class.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    limits: RateLimits,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, limits: RateLimits) -> Self {
        Self { store, limits }
    }

    /// In-memory limiter with the default ceilings.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCounterStore::new()), RateLimits::default())
    }

    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    /// Count this request and report whether it is within the ceiling.
    pub fn allow(&self, key: &str, method: &Method) -> bool {
        let Some(class) = LimitClass::of(method) else {
            return true;
        };
        let counter_key = format!("{}:{}", class.as_str(), key);
        self.store.increment(&counter_key, self.limits.window) <= self.limits.ceiling(class)
    }

    pub fn purge_expired(&self) {
        self.store.purge_expired();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::thread;

    fn limiter(post: u64, get: u64, window: Duration) -> RateLimiter {
        RateLimiter::new(
            Arc::new(MemoryCounterStore::new()),
            RateLimits { post, get, window },
        )
    }

    #[test]
    fn twentieth_post_allowed_twenty_first_rejected() {
        let limiter = RateLimiter::in_memory();
        for i in 1..=20 {
            assert!(limiter.allow("1.2.3.4", &Method::POST), "request {i}");
        }
        assert!(!limiter.allow("1.2.3.4", &Method::POST));
    }

    #[test]
    fn get_has_its_own_ceiling() {
        let limiter = RateLimiter::in_memory();
        for _ in 0..20 {
            assert!(limiter.allow("1.2.3.4", &Method::POST));
        }
        assert!(!limiter.allow("1.2.3.4", &Method::POST));
        for _ in 0..100 {
            assert!(limiter.allow("1.2.3.4", &Method::GET));
        }
        assert!(!limiter.allow("1.2.3.4", &Method::GET));
    }

    #[test]
    fn head_counts_against_get() {
        let limiter = limiter(1, 2, Duration::from_secs(60));
        assert!(limiter.allow("a", &Method::GET));
        assert!(limiter.allow("a", &Method::HEAD));
        assert!(!limiter.allow("a", &Method::GET));
    }

    #[test]
    fn head_and_get_share_one_counter() {
        let limiter = limiter(0, 3, Duration::from_secs(60));
        let mut allowed = 0;
        for i in 0..10 {
            let method = if i % 2 == 0 { Method::GET } else { Method::HEAD };
            if limiter.allow("a", &method) {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 3);
        assert_eq!(LimitClass::of(&Method::HEAD), Some(LimitClass::Get));
        assert_eq!(LimitClass::of(&Method::DELETE), None);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = limiter(2, 2, Duration::from_secs(60));
        assert!(limiter.allow("a", &Method::POST));
        assert!(limiter.allow("a", &Method::POST));
        assert!(!limiter.allow("a", &Method::POST));
        assert!(limiter.allow("b", &Method::POST));
    }

    #[test]
    fn unlimited_methods_pass() {
        let limiter = limiter(0, 0, Duration::from_secs(60));
        for _ in 0..10 {
            assert!(limiter.allow("a", &Method::PUT));
        }
    }

    #[test]
    fn counting_resets_after_window() {
        let limiter = limiter(2, 2, Duration::from_millis(50));
        assert!(limiter.allow("a", &Method::POST));
        assert!(limiter.allow("a", &Method::POST));
        assert!(!limiter.allow("a", &Method::POST));

        thread::sleep(Duration::from_millis(80));

        assert!(limiter.allow("a", &Method::POST));
    }

    #[test]
    fn purge_drops_only_expired_counters() {
        let store = Arc::new(MemoryCounterStore::new());
        store.increment("short", Duration::from_millis(20));
        store.increment("long", Duration::from_secs(60));
        assert_eq!(store.len(), 2);

        thread::sleep(Duration::from_millis(40));
        store.purge_expired();

        assert_eq!(store.len(), 1);
        assert_eq!(store.increment("long", Duration::from_secs(60)), 2);
    }

    #[test]
    fn concurrent_requests_never_exceed_ceiling() {
        let limiter = RateLimiter::in_memory();
        let allowed = AtomicU64::new(0);

        thread::scope(|s| {
            for _ in 0..64 {
                s.spawn(|| {
                    if limiter.allow("9.9.9.9", &Method::POST) {
                        allowed.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(allowed.load(Ordering::SeqCst), 20);
    }
}
