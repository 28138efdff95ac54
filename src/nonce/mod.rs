//! # Nonce Verifier
//! Replay protection for `response_nonce` values.

use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use lru_time_cache::LruCache;
use tracing::debug;

use crate::helpers::{format_nonce_timestamp, generate_alphanumeric, now, parse_nonce_timestamp};
use crate::message::MAX_NONCE_LENGTH;

/// Default allowed age of a nonce in seconds
pub const DEFAULT_MAX_NONCE_AGE: i64 = 60;

/// Outcome of [NonceVerifier::seen]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceResult {
    /// First use within the age window
    Ok,
    /// Already used for this provider
    Seen,
    /// Outside the allowed age window: older than the maximum age or dated in the future
    TooOld,
    /// Timestamp prefix missing or unparsable
    InvalidTimestamp,
}

/// # NonceVerifier
/// Records `(provider url, nonce)` pairs and reports replays.
pub trait NonceVerifier: Send + Sync {
    /// Checks `nonce` issued by `op_url` and records it when accepted
    fn seen(&self, op_url: &str, nonce: &str) -> NonceResult;
}

/// # InMemoryNonceVerifier
/// Nonce cache whose retention equals the allowed nonce age.
///
/// The check and the insert happen under one lock.
pub struct InMemoryNonceVerifier {
    max_age: i64,
    cache: Mutex<LruCache<(String, String), i64>>,
    now: fn() -> i64,
}

impl InMemoryNonceVerifier {
    /// Verifier accepting nonces up to `max_age` seconds old
    pub fn new(max_age: i64) -> Self {
        Self::with_clock(max_age, now)
    }

    /// Verifier that reads the time from `now`
    pub fn with_clock(max_age: i64, now: fn() -> i64) -> Self {
        let max_age = max_age.max(0);

        // timestamps have second granularity, a nonce stays acceptable until the end of its
        // last second
        let retention = Duration::from_secs(max_age as u64 + 1);

        Self {
            max_age,
            cache: Mutex::new(LruCache::with_expiry_duration(retention)),
            now,
        }
    }

    /// Allowed nonce age in seconds
    pub fn max_age(&self) -> i64 {
        self.max_age
    }
}

impl Default for InMemoryNonceVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NONCE_AGE)
    }
}

impl NonceVerifier for InMemoryNonceVerifier {
    fn seen(&self, op_url: &str, nonce: &str) -> NonceResult {
        if nonce.len() > MAX_NONCE_LENGTH {
            return NonceResult::InvalidTimestamp;
        }

        let Some(timestamp) = parse_nonce_timestamp(nonce) else {
            debug!(nonce, "nonce without a valid timestamp");
            return NonceResult::InvalidTimestamp;
        };

        let age = (self.now)() - timestamp;

        if age > self.max_age {
            debug!(nonce, op_url, "nonce is too old");
            return NonceResult::TooOld;
        }

        if age < 0 {
            debug!(nonce, op_url, "nonce is dated in the future");
            return NonceResult::TooOld;
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        match cache.insert((op_url.to_string(), nonce.to_string()), timestamp) {
            Some(_) => {
                debug!(nonce, op_url, "nonce replayed");
                NonceResult::Seen
            }
            None => NonceResult::Ok,
        }
    }
}

impl Debug for InMemoryNonceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryNonceVerifier")
            .field("max_age", &self.max_age)
            .field("cache", &"LruCache<(String, String), i64>")
            .finish()
    }
}

/// Creates a `response_nonce` for `timestamp`: the UTC time followed by a random suffix
pub fn generate_nonce(timestamp: i64) -> String {
    format!(
        "{}{}",
        format_nonce_timestamp(timestamp),
        generate_alphanumeric(8)
    )
}
