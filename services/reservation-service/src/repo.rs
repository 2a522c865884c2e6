use anyhow::Result;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{
    ExpiredReservation, PaymentMethod, Reservation, ReservationContext, Seat, Session,
};

pub async fn session_by_id(db: &PgPool, id: &str) -> Result<Option<Session>> {
    let rec = sqlx::query_as::<_, Session>(
        r#"SELECT id, "movieId" AS movie_id, room, price, "startsAt" AS starts_at,
                  "createdAt" AS created_at, "updatedAt" AS updated_at
           FROM sessions WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(rec)
}

pub async fn seats_for_session(db: &PgPool, session_id: &str) -> Result<Vec<Seat>> {
    let rows = sqlx::query_as::<_, Seat>(
        r#"SELECT id, "sessionId" AS session_id, "row", number, status
           FROM seats WHERE "sessionId" = $1
           ORDER BY "row", number"#,
    )
    .bind(session_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn seats_by_ids(db: &PgPool, ids: &[String]) -> Result<Vec<Seat>> {
    let rows = sqlx::query_as::<_, Seat>(
        r#"SELECT id, "sessionId" AS session_id, "row", number, status
           FROM seats WHERE id = ANY($1)"#,
    )
    .bind(ids)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Creates one PENDING reservation per seat as a single atomic unit.
/// Either every row exists afterwards or none does.
pub async fn create_reservations(
    db: &PgPool,
    seat_ids: &[String],
    user_id: &str,
    expires_at: DateTime<Utc>,
) -> Result<Vec<Reservation>> {
    let mut tx = db.begin().await?;
    let mut created = Vec::with_capacity(seat_ids.len());
    for seat_id in seat_ids {
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"INSERT INTO reservations (id, "userId", "seatId", status, "expiresAt", "createdAt", "updatedAt")
               VALUES ($1, $2, $3, 'PENDING', $4, now(), now())
               RETURNING id, "userId" AS user_id, "seatId" AS seat_id, status,
                         "expiresAt" AS expires_at, "createdAt" AS created_at"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(seat_id)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;
        created.push(reservation);
    }
    tx.commit().await?;
    Ok(created)
}

pub async fn find_reservation_with_seat_and_session(
    db: &PgPool,
    id: &str,
) -> Result<Option<ReservationContext>> {
    let rec = sqlx::query_as::<_, ReservationContext>(
        r#"SELECT r.id, r."userId" AS user_id, r."seatId" AS seat_id, r.status,
                  r."expiresAt" AS expires_at, s.status AS seat_status,
                  s."sessionId" AS session_id, se.price
           FROM reservations r
           JOIN seats s ON s.id = r."seatId"
           JOIN sessions se ON se.id = s."sessionId"
           WHERE r.id = $1"#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(rec)
}

/// PENDING -> CONFIRMED, only while unexpired. The affected-row count is the
/// proof the transition happened here and not in a concurrent worker.
pub async fn conditional_confirm(
    tx: &mut Transaction<'_, Postgres>,
    id: &str,
    now: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        r#"UPDATE reservations SET status = 'CONFIRMED', "updatedAt" = now()
           WHERE id = $1 AND status = 'PENDING' AND "expiresAt" >= $2"#,
    )
    .bind(id)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

/// AVAILABLE -> SOLD. A seat never leaves SOLD.
pub async fn conditional_sell_seat(tx: &mut Transaction<'_, Postgres>, seat_id: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"UPDATE seats SET status = 'SOLD' WHERE id = $1 AND status = 'AVAILABLE'"#,
    )
    .bind(seat_id)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

/// Upsert keyed on the unique "reservationId" so a confirm retried after a
/// transient failure cannot record a second sale.
pub async fn create_sale(
    tx: &mut Transaction<'_, Postgres>,
    reservation_id: &str,
    amount: &BigDecimal,
    payment_method: PaymentMethod,
) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO sales (id, "reservationId", amount, "paymentMethod", "createdAt")
           VALUES ($1, $2, $3, $4, now())
           ON CONFLICT ("reservationId") DO NOTHING"#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(reservation_id)
    .bind(amount)
    .bind(payment_method)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// PENDING -> CANCELLED for a confirmation attempt that arrived after the
/// TTL. Conditional on PENDING so a concurrent confirm wins cleanly.
pub async fn cancel_if_pending(db: &PgPool, id: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"UPDATE reservations SET status = 'CANCELLED', "updatedAt" = now()
           WHERE id = $1 AND status = 'PENDING'"#,
    )
    .bind(id)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

pub async fn list_expired_pending(db: &PgPool, now: DateTime<Utc>) -> Result<Vec<ExpiredReservation>> {
    let rows = sqlx::query_as::<_, ExpiredReservation>(
        r#"SELECT id, "seatId" AS seat_id, "userId" AS user_id
           FROM reservations
           WHERE status = 'PENDING' AND "expiresAt" < $1"#,
    )
    .bind(now)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Cancels the given reservations in one statement, still re-checking
/// PENDING and expiry inside the WHERE clause. Returns the rows that
/// actually transitioned here; a racing leader gets the complement.
pub async fn cancel_expired(
    db: &PgPool,
    ids: &[String],
    now: DateTime<Utc>,
) -> Result<Vec<ExpiredReservation>> {
    let rows = sqlx::query_as::<_, ExpiredReservation>(
        r#"UPDATE reservations SET status = 'CANCELLED', "updatedAt" = now()
           WHERE id = ANY($1) AND status = 'PENDING' AND "expiresAt" < $2
           RETURNING id, "seatId" AS seat_id, "userId" AS user_id"#,
    )
    .bind(ids)
    .bind(now)
    .fetch_all(db)
    .await?;
    Ok(rows)
}
