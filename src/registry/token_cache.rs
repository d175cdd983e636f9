//! Bearer token cache shared across auth calls
//!
//! Tokens are keyed by `authority|scope|credential fingerprint` and expire
//! after their TTL. An expired entry is evicted by the read that finds it.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Longest lifetime a cached token is trusted for, whatever the issuer says
pub const MAX_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: Instant,
}

impl CachedToken {
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe TTL map of tokens
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: RwLock<HashMap<String, CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the cache key for a token
    pub fn key(authority: &str, scope: &str, fingerprint: Option<&str>) -> String {
        format!("{}|{}|{}", authority, scope, fingerprint.unwrap_or("anonymous"))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Instant::now())
    }

    /// Store a token; TTLs below one second are raised to one second
    pub fn put(&self, key: &str, token: &str, ttl_seconds: u64) {
        self.put_at(key, token, ttl_seconds, Instant::now());
    }

    pub(crate) fn get_at(&self, key: &str, now: Instant) -> Option<String> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                None => return None,
                Some(cached) if !cached.is_expired_at(now) => return Some(cached.token.clone()),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Another writer may have refreshed the entry between the two locks
        match entries.get(key) {
            Some(cached) if !cached.is_expired_at(now) => Some(cached.token.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub(crate) fn put_at(&self, key: &str, token: &str, ttl_seconds: u64, now: Instant) {
        let ttl = Duration::from_secs(ttl_seconds.clamp(1, MAX_TOKEN_TTL_SECS));
        let cached = CachedToken {
            token: token.to_string(),
            expires_at: now.checked_add(ttl).unwrap_or(now),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), cached);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
