use std::collections::HashSet;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use common_coordination::{normalize_client_key, reservation_idem_key, seat_lock_key, Claim};
use common_events::RESERVATION_CREATED;
use common_http_errors::ApiError;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::{publish_event, AppState};
use crate::models::{Seat, SeatStatus};
use crate::repo;

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "seatIds")]
    pub seat_ids: Vec<String>,
}

/// Creates one PENDING reservation per requested seat.
///
/// The coordination store and the database are composed only here: the DB
/// pre-check rejects seats that are gone for good, the sorted lock pass
/// rejects seats some other user currently holds, and both must agree for
/// the reservation rows to be written.
pub async fn create_reservation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user_id = payload.user_id.trim().to_string();
    if user_id.is_empty() {
        return Err(ApiError::bad_request("missing_user_id", "userId must not be empty"));
    }
    if payload.seat_ids.is_empty() {
        return Err(ApiError::bad_request("empty_seat_list", "seatIds must include at least one seat"));
    }
    if has_duplicates(&payload.seat_ids) {
        return Err(ApiError::bad_request("duplicate_seat_ids", "seatIds must be unique"));
    }

    let client_key =
        normalize_client_key(headers.get("Idempotency-Key").and_then(|v| v.to_str().ok()));
    let cache_key = client_key.map(|key| reservation_idem_key(&user_id, &key));

    if let Some(cache_key) = &cache_key {
        let claim = state
            .idempotency
            .claim(cache_key, state.config.idempotency_ttl_ms)
            .await
            .map_err(|err| ApiError::internal(err, None))?;
        match claim {
            Claim::Hit(cached) => {
                state.metrics.idempotent_replays.inc();
                return Ok((StatusCode::CREATED, Json(cached)));
            }
            Claim::Pending => {
                let cached = state
                    .idempotency
                    .await_result(cache_key)
                    .await
                    .map_err(|err| ApiError::internal(err, None))?;
                return match cached {
                    Some(cached) => {
                        state.metrics.idempotent_replays.inc();
                        Ok((StatusCode::CREATED, Json(cached)))
                    }
                    None => Err(ApiError::conflict(
                        "idempotent_request_in_progress",
                        "request is still being processed, retry shortly",
                    )),
                };
            }
            Claim::FirstWriter => {}
        }
    }

    match reserve_seats(&state, &user_id, &payload.seat_ids).await {
        Ok(response) => {
            if let Some(cache_key) = &cache_key {
                if let Err(err) = state
                    .idempotency
                    .store(cache_key, &response, state.config.idempotency_ttl_ms)
                    .await
                {
                    tracing::warn!(error = %err, "Failed to store idempotent response");
                }
            }
            Ok((StatusCode::CREATED, Json(response)))
        }
        Err(err) => {
            // Delete the processing marker so the client's retry can attempt
            // the work afresh instead of polling a dead claim.
            if let Some(cache_key) = &cache_key {
                if let Err(clear_err) = state.idempotency.clear(cache_key).await {
                    tracing::warn!(error = %clear_err, "Failed to clear idempotency marker");
                }
            }
            Err(err)
        }
    }
}

async fn reserve_seats(
    state: &AppState,
    user_id: &str,
    seat_ids: &[String],
) -> Result<Value, ApiError> {
    let ordered = sorted_ids(seat_ids);

    // Pre-check against the source of truth before touching any locks.
    let seats = repo::seats_by_ids(&state.db, &ordered)
        .await
        .map_err(|err| ApiError::internal(err, None))?;
    if seats.len() != ordered.len() {
        let found: HashSet<&str> = seats.iter().map(|s| s.id.as_str()).collect();
        let missing: Vec<&str> = ordered
            .iter()
            .map(String::as_str)
            .filter(|id| !found.contains(id))
            .collect();
        return Err(ApiError::not_found(
            "seat_not_found",
            format!("unknown seats: {}", missing.join(", ")),
        ));
    }
    let taken: Vec<&Seat> = seats
        .iter()
        .filter(|s| s.status != SeatStatus::Available)
        .collect();
    if !taken.is_empty() {
        state.metrics.seat_conflicts.inc();
        let listing = taken
            .iter()
            .map(|s| format!("{}{}", s.row, s.number))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ApiError::conflict(
            "seat_unavailable",
            format!("seats not available: {listing}"),
        ));
    }

    // Every caller acquires in the same lexicographic order, so overlapping
    // requests cannot hold-and-wait in opposite directions.
    let mut acquired: Vec<String> = Vec::with_capacity(ordered.len());
    for seat_id in &ordered {
        let key = seat_lock_key(seat_id);
        match state
            .locks
            .acquire(&key, user_id, state.config.seat_lock_ttl_ms)
            .await
        {
            Ok(true) => acquired.push(key),
            Ok(false) => {
                release_acquired(state, &acquired).await;
                state.metrics.seat_conflicts.inc();
                return Err(ApiError::conflict(
                    "seat_locked",
                    format!("seat {seat_id} is held by another user"),
                ));
            }
            Err(err) => {
                release_acquired(state, &acquired).await;
                return Err(ApiError::internal(err, None));
            }
        }
    }

    let expires_at = Utc::now() + state.config.seat_hold_duration();
    let reservations = match repo::create_reservations(&state.db, &ordered, user_id, expires_at).await
    {
        Ok(rows) => rows,
        Err(err) => {
            release_acquired(state, &acquired).await;
            return Err(ApiError::internal(err, None));
        }
    };

    for reservation in &reservations {
        let event = json!({
            "id": reservation.id,
            "userId": reservation.user_id,
            "seatId": reservation.seat_id,
            "status": reservation.status,
            "expiresAt": reservation.expires_at,
        });
        publish_event(state, RESERVATION_CREATED, &event).await;
    }
    state
        .metrics
        .reservations_created
        .inc_by(reservations.len() as u64);

    let reservation_ids: Vec<&str> = reservations.iter().map(|r| r.id.as_str()).collect();
    Ok(json!({
        "message": "Seats reserved; complete payment before the hold expires",
        "reservationIds": reservation_ids,
        "expiresAt": expires_at,
        "expiresInSeconds": (state.config.seat_lock_ttl_ms / 1000),
    }))
}

async fn release_acquired(state: &AppState, keys: &[String]) {
    if keys.is_empty() {
        return;
    }
    if let Err(err) = state.locks.release_all(keys).await {
        tracing::warn!(error = %err, "Failed to release seat locks during rollback");
    }
}

/// Global lock order: the sort key is the seat id itself, never the order
/// the caller listed the seats in.
pub fn sorted_ids(ids: &[String]) -> Vec<String> {
    let mut ordered = ids.to_vec();
    ordered.sort();
    ordered
}

pub fn has_duplicates(ids: &[String]) -> bool {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().any(|id| !seen.insert(id.as_str()))
}
