//! Rate limiting for sync-relay.
//!
//! Sync requests are limited per owner id and globally. Owners are keyed by
//! their 32-byte id, the only identity the relay has: many owners may share
//! an address and one owner may sync from many.
//!
//! Both use the governor crate's rate limiters; the keyed one is backed by
//! DashMap.

use crate::config::LimitsConfig;
use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use sync_types::OwnerId;

/// Type alias for a keyed rate limiter using DashMap.
type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Type alias for a direct (non-keyed) rate limiter.
type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiters for the relay server.
#[derive(Clone)]
pub struct RateLimits {
    /// Limits sync requests per owner.
    ///
    /// Configured via `limits.syncs_per_minute`.
    owner_limiter: Arc<KeyedLimiter<[u8; 32]>>,

    /// Global rate limiter across all owners.
    ///
    /// Prevents aggregate overload even if individual owners are within limits.
    global_limiter: Arc<DirectLimiter>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("owner_limiter", &"KeyedLimiter<[u8;32]>")
            .field("global_limiter", &"DirectLimiter")
            .finish()
    }
}

impl RateLimits {
    /// Create rate limiters from configuration.
    ///
    /// Zero values are clamped to one; [`Config::validate`](crate::config::Config::validate)
    /// rejects them before this point.
    pub fn new(config: &LimitsConfig) -> Self {
        let per_minute = NonZeroU32::new(config.syncs_per_minute).unwrap_or(NonZeroU32::MIN);
        let global_rps = NonZeroU32::new(config.global_per_second).unwrap_or(NonZeroU32::MIN);

        Self {
            owner_limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
            global_limiter: Arc::new(RateLimiter::direct(Quota::per_second(global_rps))),
        }
    }

    /// Check if a sync request from `owner` is allowed.
    ///
    /// The global limit is checked first so a flood from many owners cannot
    /// exhaust each owner's quota as a side effect.
    pub fn check_sync(&self, owner: &OwnerId) -> Result<(), RateLimitError> {
        self.global_limiter.check().map_err(|not_until| {
            RateLimitError::GlobalLimitExceeded {
                retry_after: not_until.wait_time_from(self.global_limiter.clock().now()),
            }
        })?;

        self.owner_limiter
            .check_key(owner.as_bytes())
            .map_err(|not_until| RateLimitError::OwnerLimitExceeded {
                retry_after: not_until.wait_time_from(self.owner_limiter.clock().now()),
            })
    }

    /// Get the number of tracked owner keys (for metrics).
    pub fn owner_keys_count(&self) -> usize {
        self.owner_limiter.len()
    }

    /// Evict stale entries from the keyed rate limiter DashMap.
    ///
    /// `retain_recent()` removes entries whose rate limit cells have fully
    /// recharged (i.e., idle owners). Call periodically from cleanup task.
    pub fn shrink(&self) {
        self.owner_limiter.retain_recent();
    }
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// Too many syncs from this owner.
    OwnerLimitExceeded {
        /// Earliest time a retry can succeed.
        retry_after: Duration,
    },
    /// Global request rate exceeded across all owners.
    GlobalLimitExceeded {
        /// Earliest time a retry can succeed.
        retry_after: Duration,
    },
}

impl RateLimitError {
    /// How long the caller should wait.
    pub fn retry_after(&self) -> Duration {
        match self {
            Self::OwnerLimitExceeded { retry_after } | Self::GlobalLimitExceeded { retry_after } => {
                *retry_after
            }
        }
    }
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OwnerLimitExceeded { .. } => {
                write!(f, "owner rate limit exceeded")
            }
            Self::GlobalLimitExceeded { .. } => {
                write!(f, "global rate limit exceeded")
            }
        }
    }
}

impl std::error::Error for RateLimitError {}
