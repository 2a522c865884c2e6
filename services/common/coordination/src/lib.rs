//! Thin wrappers over the Redis coordination store: advisory seat locks and
//! the two-phase idempotency cache. The store makes no durability claim;
//! the relational database stays the source of truth on contention.

pub mod idempotency;
pub mod locks;

pub use idempotency::{normalize_client_key, Claim, IdempotencyStore, PROCESSING_MARKER};
pub use locks::LockService;

/// Seat-lock key for a reservation in progress. Value is the owning userId.
pub fn seat_lock_key(seat_id: &str) -> String {
    format!("lock:seat:{seat_id}")
}

/// Idempotency cache key for a (user, client key) pair.
pub fn reservation_idem_key(user_id: &str, client_key: &str) -> String {
    format!("idem:reservation:{user_id}:{client_key}")
}

/// Leader-election key for the expiration reaper.
pub const REAPER_LEADER_KEY: &str = "lock:cron:reservations-cleanup";
