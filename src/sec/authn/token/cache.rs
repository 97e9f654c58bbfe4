use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::notification::RemovalCause;
use moka::sync::Cache;
use moka::Expiry;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub email: String,
    pub audience: String,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub token: Arc<str>,
    pub jti: Arc<str>,
    /// time from insertion until the entry is dropped
    pub evict_after: Duration,
}

struct TokenExpiry;

impl Expiry<CacheKey, CachedToken> for TokenExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CachedToken,
        _created_at: Instant
    ) -> Option<Duration> {
        Some(value.evict_after)
    }
}

#[derive(Debug, Clone)]
pub struct TokenCache(Cache<CacheKey, CachedToken>);

impl TokenCache {
    pub fn new(capacity: u64) -> Self {
        let cache = Cache::builder()
            .name("token_cache")
            .max_capacity(capacity)
            .expire_after(TokenExpiry)
            .eviction_listener(|key: Arc<CacheKey>, value: CachedToken, cause: RemovalCause| {
                tracing::debug!(
                    username = %key.username,
                    audience = %key.audience,
                    jti = %value.jti,
                    "token cache entry removed: {cause:?}"
                );
            })
            .build();

        TokenCache(cache)
    }

    /// returns the live entry for `key` or runs `init` to create one.
    /// concurrent callers for the same key wait on a single `init`, callers
    /// for other keys are not blocked
    pub fn get_or_try_insert<F, E>(&self, key: CacheKey, init: F) -> Result<CachedToken, Arc<E>>
    where
        F: FnOnce() -> Result<CachedToken, E>,
        E: Send + Sync + 'static,
    {
        self.0.try_get_with(key, init)
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedToken> {
        self.0.get(key)
    }

    /// removing an absent key is a no-op
    pub fn remove(&self, key: &CacheKey) {
        self.0.invalidate(key);
    }

    /// drops every entry issued for the given user, regardless of audience
    pub fn remove_user(&self, email: &str, username: &str) -> usize {
        let keys: Vec<Arc<CacheKey>> = self.0.iter()
            .filter(|(key, _)| key.email == email && key.username == username)
            .map(|(key, _)| key)
            .collect();

        for key in &keys {
            self.0.invalidate(key.as_ref());
        }

        keys.len()
    }

    /// flushes pending expirations and evictions
    pub fn run_pending_tasks(&self) {
        self.0.run_pending_tasks();
    }

    pub fn entry_count(&self) -> u64 {
        self.0.entry_count()
    }
}
