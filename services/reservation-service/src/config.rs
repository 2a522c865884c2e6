use std::env;
use std::time::Duration;

use common_events::RetryPolicy;

/// Tunables of the reservation core. Every constant has the documented
/// default and can be overridden through the environment.
#[derive(Debug, Clone, Copy)]
pub struct ReservationConfig {
    /// Seat-hold TTL: both the Redis lock PX and the reservation `expiresAt`
    /// horizon derive from this.
    pub seat_lock_ttl_ms: u64,
    pub idempotency_ttl_ms: u64,
    pub reaper_period: Duration,
    /// Kept slightly shorter than the reaper period so a crashed leader
    /// stalls the cluster for at most one tick.
    pub reaper_leader_ttl_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            seat_lock_ttl_ms: 30_000,
            idempotency_ttl_ms: 60_000,
            reaper_period: Duration::from_secs(5),
            reaper_leader_ttl_ms: 4_500,
            retry: RetryPolicy::default(),
        }
    }
}

impl ReservationConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            seat_lock_ttl_ms: u64_from_env("SEAT_LOCK_TTL_MS").unwrap_or(defaults.seat_lock_ttl_ms),
            idempotency_ttl_ms: u64_from_env("IDEMPOTENCY_TTL_MS")
                .unwrap_or(defaults.idempotency_ttl_ms),
            reaper_period: u64_from_env("REAPER_PERIOD_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reaper_period),
            reaper_leader_ttl_ms: u64_from_env("REAPER_LEADER_TTL_MS")
                .unwrap_or(defaults.reaper_leader_ttl_ms),
            retry: RetryPolicy {
                base_delay_ms: u64_from_env("EVENT_RETRY_BASE_DELAY_MS")
                    .unwrap_or(defaults.retry.base_delay_ms),
                max_delay_ms: u64_from_env("EVENT_RETRY_MAX_DELAY_MS")
                    .unwrap_or(defaults.retry.max_delay_ms),
                max_retries: u64_from_env("EVENT_RETRY_MAX_RETRIES")
                    .map(|v| v as u32)
                    .unwrap_or(defaults.retry.max_retries),
            },
        }
    }

    pub fn seat_hold_duration(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.seat_lock_ttl_ms as i64)
    }
}

fn u64_from_env(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.trim().parse().ok())
}
