use chrono::Utc;
use common_coordination::{seat_lock_key, REAPER_LEADER_KEY};
use common_events::{RESERVATION_EXPIRED, SEAT_RELEASED};
use serde_json::json;
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

use crate::app::{publish_event, AppState};
use crate::repo;

/// Runs the expiration sweep on a fixed tick. Every replica spawns this; the
/// leader lock bounds in-flight sweeps to approximately one, while the
/// conditional UPDATE in `cancel_expired` is the actual serializer.
pub fn spawn_reaper(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = interval(state.config.reaper_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sweep_once(&state).await {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "Cancelled expired reservations"),
                Err(err) => tracing::warn!(error = %err, "Reaper sweep failed"),
            }
        }
    });
}

/// One leader-elected sweep. Returns the number of reservations cancelled
/// here (0 when not leader, nothing expired, or another leader won the race).
pub async fn sweep_once(state: &AppState) -> anyhow::Result<u64> {
    let token = Uuid::new_v4().to_string();
    let is_leader = state
        .locks
        .acquire(REAPER_LEADER_KEY, &token, state.config.reaper_leader_ttl_ms)
        .await?;
    if !is_leader {
        return Ok(0);
    }

    let outcome = reap_expired(state).await;

    // Compare-and-delete: a stale leader must not clobber a successor's claim.
    if let Err(err) = state.locks.release(REAPER_LEADER_KEY, &token).await {
        tracing::warn!(error = %err, "Failed to release reaper leader lock");
    }
    outcome
}

async fn reap_expired(state: &AppState) -> anyhow::Result<u64> {
    let timer = state.metrics.reaper_sweep_duration_seconds.start_timer();
    let now = Utc::now();

    let candidates = repo::list_expired_pending(&state.db, now).await?;
    if candidates.is_empty() {
        timer.observe_duration();
        return Ok(0);
    }

    let ids: Vec<String> = candidates.iter().map(|r| r.id.clone()).collect();
    let cancelled = repo::cancel_expired(&state.db, &ids, now).await?;
    if cancelled.is_empty() {
        timer.observe_duration();
        return Ok(0);
    }

    let seat_keys: Vec<String> = cancelled.iter().map(|r| seat_lock_key(&r.seat_id)).collect();
    if let Err(err) = state.locks.release_all(&seat_keys).await {
        tracing::warn!(error = %err, "Failed to delete seat locks for expired reservations");
    }

    // The cancelling UPDATE has already committed; publish failures are
    // absorbed here and the events are lost (consumers key on ids and
    // tolerate gaps).
    let timestamp = Utc::now();
    for reservation in &cancelled {
        publish_event(
            state,
            RESERVATION_EXPIRED,
            &json!({
                "reservationId": reservation.id,
                "seatId": reservation.seat_id,
                "userId": reservation.user_id,
                "reason": "TIMEOUT",
                "timestamp": timestamp,
            }),
        )
        .await;
        publish_event(
            state,
            SEAT_RELEASED,
            &json!({
                "seatId": reservation.seat_id,
                "reservationId": reservation.id,
                "userId": reservation.user_id,
                "reason": "RESERVATION_EXPIRED",
                "timestamp": timestamp,
            }),
        )
        .await;
    }

    state
        .metrics
        .reservations_expired
        .inc_by(cancelled.len() as u64);
    timer.observe_duration();
    Ok(cancelled.len() as u64)
}
