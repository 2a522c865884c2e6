use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use common_coordination::seat_lock_key;
use common_events::PAYMENT_CONFIRMED;
use common_http_errors::ApiError;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::{publish_event, AppState};
use crate::models::{PaymentMethod, ReservationStatus};
use crate::repo;

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmPaymentRequest {
    #[serde(rename = "paymentMethod")]
    pub payment_method: Option<PaymentMethod>,
}

/// Confirms payment for a PENDING reservation: reservation PENDING->CONFIRMED,
/// seat AVAILABLE->SOLD, Sale recorded at the session price, all in one DB
/// transaction. The count=1 checks on the status-filtered updates are the
/// linearization point against concurrent reaping and double-pay attempts;
/// no external lock is held across the transaction.
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(reservation_id): Path<String>,
    payload: Option<Json<ConfirmPaymentRequest>>,
) -> Result<Json<Value>, ApiError> {
    let payment_method = payload
        .and_then(|Json(body)| body.payment_method)
        .unwrap_or(PaymentMethod::CreditCard);

    let ctx = repo::find_reservation_with_seat_and_session(&state.db, &reservation_id)
        .await
        .map_err(|err| ApiError::internal(err, None))?
        .ok_or_else(|| {
            ApiError::not_found(
                "reservation_not_found",
                format!("reservation {reservation_id} does not exist"),
            )
        })?;

    match ctx.status {
        ReservationStatus::Confirmed => {
            return Err(ApiError::conflict("already_paid", "reservation already paid"))
        }
        ReservationStatus::Cancelled => {
            return Err(ApiError::bad_request(
                "reservation_cancelled",
                "reservation cancelled or expired",
            ))
        }
        ReservationStatus::Pending => {}
    }

    let now = Utc::now();
    if now > ctx.expires_at {
        repo::cancel_if_pending(&state.db, &ctx.id)
            .await
            .map_err(|err| ApiError::internal(err, None))?;
        return Err(ApiError::bad_request(
            "reservation_expired",
            "reservation expired before payment",
        ));
    }

    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|err| ApiError::internal(err, None))?;

    let confirmed = repo::conditional_confirm(&mut tx, &ctx.id, now)
        .await
        .map_err(|err| ApiError::internal(err, None))?;
    if confirmed == 0 {
        // Another worker moved the reservation between our load and the
        // update; reload and classify its terminal state.
        drop(tx);
        let current = repo::find_reservation_with_seat_and_session(&state.db, &ctx.id)
            .await
            .map_err(|err| ApiError::internal(err, None))?;
        return Err(classify_stale_confirm(current.map(|c| c.status)));
    }

    let sold = repo::conditional_sell_seat(&mut tx, &ctx.seat_id)
        .await
        .map_err(|err| ApiError::internal(err, None))?;
    if sold == 0 {
        return Err(ApiError::conflict(
            "seat_already_sold",
            format!("seat {} is already sold", ctx.seat_id),
        ));
    }

    repo::create_sale(&mut tx, &ctx.id, &ctx.price, payment_method)
        .await
        .map_err(|err| ApiError::internal(err, None))?;

    tx.commit()
        .await
        .map_err(|err| ApiError::internal(err, None))?;

    let event = json!({
        "reservationId": ctx.id,
        "userId": ctx.user_id,
        "seatId": ctx.seat_id,
        "amount": ctx.price.to_string(),
        "timestamp": now,
    });
    publish_event(&state, PAYMENT_CONFIRMED, &event).await;

    // The DB already says SOLD; a failed release only leaves a key that
    // expires at TTL.
    if let Err(err) = state
        .locks
        .release(&seat_lock_key(&ctx.seat_id), &ctx.user_id)
        .await
    {
        tracing::warn!(error = %err, seat_id = %ctx.seat_id, "Failed to release seat lock after confirmation");
    }

    Ok(Json(json!({
        "message": "Payment confirmed",
        "reservationId": ctx.id,
        "seatId": ctx.seat_id,
        "status": ReservationStatus::Confirmed,
        "amount": ctx.price.to_string(),
    })))
}

/// A zero-row conditional confirm means some other worker already moved the
/// reservation; the reloaded status decides what the caller is told.
fn classify_stale_confirm(status: Option<ReservationStatus>) -> ApiError {
    match status {
        Some(ReservationStatus::Confirmed) => {
            ApiError::conflict("already_paid", "reservation already paid")
        }
        Some(ReservationStatus::Cancelled) => {
            ApiError::bad_request("reservation_cancelled", "reservation cancelled or expired")
        }
        _ => ApiError::conflict("confirm_conflict", "reservation state changed concurrently"),
    }
}
