use axum::extract::{Path, State};
use axum::Json;
use common_coordination::seat_lock_key;
use common_http_errors::ApiError;
use serde::Serialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::models::{Seat, SeatStatus};
use crate::repo;

#[derive(Debug, Serialize)]
pub struct SeatView {
    pub id: String,
    pub row: String,
    pub number: i32,
    pub status: SeatStatus,
}

/// Seats of a session with the computed hold view: a seat that is AVAILABLE
/// in the database but whose lock key is present is shown LOCKED. LOCKED is
/// never read from or written to the database.
pub async fn list_session_seats(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = repo::session_by_id(&state.db, &session_id)
        .await
        .map_err(|err| ApiError::internal(err, None))?
        .ok_or_else(|| {
            ApiError::not_found("session_not_found", format!("session {session_id} does not exist"))
        })?;

    let seats = repo::seats_for_session(&state.db, &session.id)
        .await
        .map_err(|err| ApiError::internal(err, None))?;
    let keys: Vec<String> = seats.iter().map(|s| seat_lock_key(&s.id)).collect();
    let held = state
        .locks
        .get_many(&keys)
        .await
        .map_err(|err| ApiError::internal(err, None))?;
    let seats = apply_lock_view(seats, &held);

    Ok(Json(json!({
        "sessionId": session.id,
        "movieId": session.movie_id,
        "room": session.room,
        "price": session.price.to_string(),
        "startsAt": session.starts_at,
        "seats": seats,
    })))
}

/// Zips DB seats with the batched lock read; `held[i]` belongs to `seats[i]`.
pub fn apply_lock_view(seats: Vec<Seat>, held: &[Option<String>]) -> Vec<SeatView> {
    seats
        .into_iter()
        .enumerate()
        .map(|(i, seat)| {
            let status = match seat.status {
                SeatStatus::Available if held.get(i).map(Option::is_some).unwrap_or(false) => {
                    SeatStatus::Locked
                }
                other => other,
            };
            SeatView {
                id: seat.id,
                row: seat.row,
                number: seat.number,
                status,
            }
        })
        .collect()
}
