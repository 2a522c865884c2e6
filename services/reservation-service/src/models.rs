use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seat status as persisted. LOCKED exists in the schema enum but is never
/// written by anything: it is a computed view for DB-AVAILABLE seats whose
/// coordination-store lock key is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "seat_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SeatStatus {
    Available,
    Locked,
    Sold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reservation_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }
}

/// Valid transitions:
/// PENDING -> CONFIRMED (payment, before expiry)
/// PENDING -> CANCELLED (reaper, or a confirmation attempt after TTL)
/// CONFIRMED and CANCELLED are terminal.
pub fn reservation_transition_allowed(from: ReservationStatus, to: ReservationStatus) -> bool {
    matches!(
        (from, to),
        (ReservationStatus::Pending, ReservationStatus::Confirmed)
            | (ReservationStatus::Pending, ReservationStatus::Cancelled)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Pix,
    Cash,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Session {
    pub id: String,
    pub movie_id: String,
    pub room: String,
    pub price: BigDecimal,
    pub starts_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Seat {
    pub id: String,
    pub session_id: String,
    pub row: String,
    pub number: i32,
    pub status: SeatStatus,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Reservation {
    pub id: String,
    pub user_id: String,
    pub seat_id: String,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Reservation joined with its seat and session, as the confirm path loads it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReservationContext {
    pub id: String,
    pub user_id: String,
    pub seat_id: String,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub seat_status: SeatStatus,
    pub session_id: String,
    pub price: BigDecimal,
}

/// Slim projection the reaper works with.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExpiredReservation {
    pub id: String,
    pub seat_id: String,
    pub user_id: String,
}
