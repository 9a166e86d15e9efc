//! Sync retry state machine for notesync.
//!
//! This module provides a pure, side-effect-free state machine for one sync
//! invocation: health check, request, and bounded retries. The state machine
//! takes events as input and produces a new state plus a list of actions to
//! execute.
//!
//! The actual I/O (health probe, sync request, sleeping) is performed by
//! sync-client, not by this module. This enables instant unit testing
//! without network mocks.

use std::time::Duration;

/// Retry and backoff parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// First transient-failure delay; doubles per attempt.
    pub base_delay: Duration,
    /// Cap on the transient-failure delay.
    pub max_delay: Duration,
    /// First rate-limit delay; doubles per attempt.
    pub rate_limit_delay: Duration,
    /// Cap on the rate-limit delay (a larger `Retry-After` still wins).
    pub max_rate_limit_delay: Duration,
    /// Upper bound of the random jitter added to every delay.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            rate_limit_delay: Duration::from_secs(10),
            max_rate_limit_delay: Duration::from_secs(120),
            max_jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// No delays at all. For tests and one-shot tools.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            rate_limit_delay: Duration::ZERO,
            max_rate_limit_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Delay after a transient failure on `attempt` (1-based), without jitter.
    ///
    /// Formula: min(max_delay, base_delay * 2^(attempt-1))
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        exponential(self.base_delay, attempt).min(self.max_delay)
    }

    /// Delay after a rate-limit response on `attempt`, without jitter.
    ///
    /// Formula: max(retry_after, min(max_rate_limit_delay, rate_limit_delay * 2^(attempt-1)))
    pub fn base_rate_limit_backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = exponential(self.rate_limit_delay, attempt).min(self.max_rate_limit_delay);
        retry_after.map_or(computed, |server| server.max(computed))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff(attempt) + self.jitter()
    }

    fn rate_limit_backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        self.base_rate_limit_backoff(attempt, retry_after) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(random_jitter_ms(max_ms))
    }
}

fn exponential(base: Duration, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << shift)
}

/// Random value in `0..=max_ms`. Falls back to zero if the OS RNG fails.
fn random_jitter_ms(max_ms: u64) -> u64 {
    let mut bytes = [0u8; 8];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => u64::from_le_bytes(bytes) % (max_ms + 1),
        Err(_) => 0,
    }
}

/// Sync state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// No sync running.
    Idle,
    /// Probing the server's health endpoint.
    CheckingHealth {
        /// Current attempt (1-based).
        attempt: u32,
    },
    /// Sync request in flight.
    Syncing {
        /// Current attempt (1-based).
        attempt: u32,
    },
    /// Waiting out a backoff before the next attempt.
    Waiting {
        /// Attempt that just failed.
        attempt: u32,
    },
}

impl SyncState {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function apart from jitter. The caller (sync-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: Event, policy: &RetryPolicy) -> (Self, Vec<Action>) {
        match (self, event) {
            (Self::Idle, Event::SyncRequested) => {
                (Self::CheckingHealth { attempt: 1 }, vec![Action::CheckHealth])
            }

            // From CheckingHealth
            (Self::CheckingHealth { attempt }, Event::HealthOk) => {
                (Self::Syncing { attempt }, vec![Action::SendSync])
            }
            (Self::CheckingHealth { attempt }, Event::HealthFailed { error })
            | (Self::Syncing { attempt }, Event::TransportFailed { error }) => {
                retry_or_give_up(attempt, error, policy.backoff(attempt), policy)
            }

            // From Syncing
            (Self::Syncing { attempt }, Event::SyncSucceeded) => (
                Self::Idle,
                vec![Action::EmitEvent(SyncEvent::Completed { attempts: attempt })],
            ),

            // Rate limiting can hit either request
            (
                Self::CheckingHealth { attempt } | Self::Syncing { attempt },
                Event::RateLimited { retry_after },
            ) => retry_or_give_up(
                attempt,
                "rate limited".into(),
                policy.rate_limit_backoff(attempt, retry_after),
                policy,
            ),

            // Version rejection is never retried
            (
                Self::CheckingHealth { .. } | Self::Syncing { .. },
                Event::VersionRejected { message },
            ) => (
                Self::Idle,
                vec![Action::EmitEvent(SyncEvent::UpgradeRequired { message })],
            ),

            // From Waiting
            (Self::Waiting { attempt }, Event::RetryTimer) => (
                Self::CheckingHealth {
                    attempt: attempt.saturating_add(1),
                },
                vec![Action::CheckHealth],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if a sync is in progress.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

fn retry_or_give_up(
    attempt: u32,
    error: String,
    delay: Duration,
    policy: &RetryPolicy,
) -> (SyncState, Vec<Action>) {
    if attempt >= policy.max_attempts {
        return (
            SyncState::Idle,
            vec![Action::EmitEvent(SyncEvent::GaveUp {
                attempts: attempt,
                error,
            })],
        );
    }
    (
        SyncState::Waiting { attempt },
        vec![
            Action::EmitEvent(SyncEvent::AttemptFailed {
                attempt,
                error,
                retry_in: delay,
            }),
            Action::StartRetryTimer { delay },
        ],
    )
}

/// Events that can occur during one sync invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Caller asked for a sync.
    SyncRequested,
    /// Health endpoint reported healthy service and store.
    HealthOk,
    /// Health endpoint unreachable or unhealthy.
    HealthFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Sync response received and processed.
    SyncSucceeded,
    /// Sync request failed in transit or with a server error.
    TransportFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Server answered 429.
    RateLimited {
        /// Server-provided `Retry-After`, if any.
        retry_after: Option<Duration>,
    },
    /// Server refused the client version.
    VersionRejected {
        /// Server message.
        message: String,
    },
    /// Backoff timer fired.
    RetryTimer,
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects. The sync-client interprets
/// these and performs the actual I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Call the health endpoint.
    CheckHealth,
    /// Build, send and apply one sync round.
    SendSync,
    /// Sleep before retrying.
    StartRetryTimer {
        /// Delay before the next attempt.
        delay: Duration,
    },
    /// Emit an event to the application.
    EmitEvent(SyncEvent),
}

/// Events emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Sync finished.
    Completed {
        /// Attempts used.
        attempts: u32,
    },
    /// An attempt failed and will be retried.
    AttemptFailed {
        /// Which attempt failed.
        attempt: u32,
        /// Error message describing the failure.
        error: String,
        /// Delay before the next attempt.
        retry_in: Duration,
    },
    /// Attempts exhausted.
    GaveUp {
        /// Attempts used.
        attempts: u32,
        /// Last error.
        error: String,
    },
    /// Server requires a newer client.
    UpgradeRequired {
        /// Server message.
        message: String,
    },
}
