//! Event bus plumbing for the cinema platform: exchange/queue topology,
//! a persistent-message publisher, and the header-driven retry/DLQ
//! machinery consumers hang their error handling on.

pub mod publisher;
pub mod retry;
pub mod topology;

pub use publisher::EventPublisher;
pub use retry::{run_consumer, RetryPolicy};
pub use topology::declare_topology;

/// Topic exchange carrying all domain events.
pub const EVENTS_EXCHANGE: &str = "cinema_events";
/// Retry exchange; its queue has no consumer and dead-letters back to
/// [`EVENTS_EXCHANGE`] once the per-message TTL elapses.
pub const RETRY_EXCHANGE: &str = "cinema_retry";
/// Terminal exchange for messages that exhausted their retry budget.
pub const DLQ_EXCHANGE: &str = "cinema_dlq";

pub const RESERVATION_CREATED: &str = "reservation.created";
pub const PAYMENT_CONFIRMED: &str = "payment.confirmed";
pub const RESERVATION_EXPIRED: &str = "reservation.expired";
pub const SEAT_RELEASED: &str = "seat.released";

pub const RESERVATION_CREATED_QUEUE: &str = "reservation_created_queue";
pub const EMAIL_NOTIFICATION_QUEUE: &str = "email_notification_queue";
pub const ANALYTICS_QUEUE: &str = "analytics_queue";
pub const SEAT_RELEASED_QUEUE: &str = "seat_released_queue";
pub const RETRY_QUEUE: &str = "cinema_retry_queue";
pub const DLQ_QUEUE: &str = "cinema_dlq_queue";
