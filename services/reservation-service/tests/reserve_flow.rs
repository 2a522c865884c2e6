mod support;

use axum::http::StatusCode;
use common_coordination::seat_lock_key;
use reservation_service::build_router;
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use support::*;

#[tokio::test]
#[ignore]
async fn double_booking_race_has_exactly_one_winner() {
    let state = test_state().await;
    let session = seed_session(&state.db, "25.00").await;
    let seat = seed_seat(&state.db, &session, "A", 1).await;
    let app = build_router(state.clone());

    let req_a = post_json("/reservations", json!({"userId": "user-a", "seatIds": [seat]}));
    let req_b = post_json("/reservations", json!({"userId": "user-b", "seatIds": [seat]}));
    let (resp_a, resp_b) = tokio::join!(app.clone().oneshot(req_a), app.clone().oneshot(req_b));
    let (resp_a, resp_b) = (resp_a.unwrap(), resp_b.unwrap());

    let statuses = [resp_a.status(), resp_b.status()];
    assert!(statuses.contains(&StatusCode::CREATED), "no winner: {statuses:?}");
    assert!(statuses.contains(&StatusCode::CONFLICT), "no loser: {statuses:?}");

    let pending: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM reservations WHERE "seatId" = $1 AND status = 'PENDING'"#,
    )
    .bind(&seat)
    .fetch_one(&state.db)
    .await
    .unwrap();
    assert_eq!(pending, 1, "exactly one pending reservation must exist");

    let winner = if statuses[0] == StatusCode::CREATED { "user-a" } else { "user-b" };
    let holder = state.locks.get(&seat_lock_key(&seat)).await.unwrap();
    assert_eq!(holder.as_deref(), Some(winner), "seat lock must belong to the winner");

    let winning_body = if statuses[0] == StatusCode::CREATED {
        body_json(resp_a).await
    } else {
        body_json(resp_b).await
    };
    assert_eq!(winning_body["reservationIds"].as_array().unwrap().len(), 1);
    assert_eq!(winning_body["expiresInSeconds"], 30);
}

#[tokio::test]
#[ignore]
async fn overlapping_multi_seat_requests_cannot_deadlock() {
    let state = test_state().await;
    let session = seed_session(&state.db, "25.00").await;
    let s1 = seed_seat(&state.db, &session, "B", 1).await;
    let s2 = seed_seat(&state.db, &session, "B", 2).await;
    let app = build_router(state.clone());

    // Opposite listing orders; both acquire in sorted order underneath.
    let req_a = post_json("/reservations", json!({"userId": "user-a", "seatIds": [s2, s1]}));
    let req_b = post_json("/reservations", json!({"userId": "user-b", "seatIds": [s1, s2]}));
    let started = std::time::Instant::now();
    let (resp_a, resp_b) = tokio::join!(app.clone().oneshot(req_a), app.clone().oneshot(req_b));
    assert!(started.elapsed() < std::time::Duration::from_secs(1), "requests must not wait on each other");
    let (resp_a, resp_b) = (resp_a.unwrap(), resp_b.unwrap());

    let statuses = [resp_a.status(), resp_b.status()];
    assert!(statuses.contains(&StatusCode::CREATED));
    assert!(statuses.contains(&StatusCode::CONFLICT));

    let winning_body = if statuses[0] == StatusCode::CREATED {
        body_json(resp_a).await
    } else {
        body_json(resp_b).await
    };
    assert_eq!(winning_body["reservationIds"].as_array().unwrap().len(), 2);
}

#[tokio::test]
#[ignore]
async fn idempotent_retry_replays_the_first_response() {
    let state = test_state().await;
    let session = seed_session(&state.db, "25.00").await;
    let seat = seed_seat(&state.db, &session, "C", 1).await;
    let app = build_router(state.clone());

    let key = format!("demo-{}", Uuid::new_v4());
    let body = json!({"userId": "u1", "seatIds": [seat]});

    let first = app
        .clone()
        .oneshot(post_json_with_key("/reservations", body.clone(), &key))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_bytes = body_bytes(first).await;

    let second = app
        .clone()
        .oneshot(post_json_with_key("/reservations", body, &key))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CREATED);
    let second_bytes = body_bytes(second).await;

    assert_eq!(first_bytes, second_bytes, "replay must be byte-identical");

    let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM reservations WHERE "seatId" = $1"#)
        .bind(&seat)
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert_eq!(count, 1, "only one reservation may be created");
}

#[tokio::test]
#[ignore]
async fn unknown_seat_is_not_found() {
    let state = test_state().await;
    let app = build_router(state);
    let resp = app
        .oneshot(post_json(
            "/reservations",
            json!({"userId": "u1", "seatIds": [Uuid::new_v4().to_string()]}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "seat_not_found");
}

#[tokio::test]
#[ignore]
async fn empty_and_duplicate_seat_lists_are_rejected() {
    let state = test_state().await;
    let session = seed_session(&state.db, "25.00").await;
    let seat = seed_seat(&state.db, &session, "D", 1).await;
    let app = build_router(state);

    let resp = app
        .clone()
        .oneshot(post_json("/reservations", json!({"userId": "u1", "seatIds": []})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "empty_seat_list");

    let resp = app
        .oneshot(post_json(
            "/reservations",
            json!({"userId": "u1", "seatIds": [seat, seat]}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "duplicate_seat_ids");
}

#[tokio::test]
#[ignore]
async fn seat_view_reflects_coordination_store_locks() {
    let state = test_state().await;
    let session = seed_session(&state.db, "25.00").await;
    let held = seed_seat(&state.db, &session, "E", 1).await;
    let free = seed_seat(&state.db, &session, "E", 2).await;
    let app = build_router(state.clone());

    let resp = app
        .clone()
        .oneshot(post_json("/reservations", json!({"userId": "u1", "seatIds": [held]})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app.oneshot(get(&format!("/sessions/{session}/seats"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let seats = body["seats"].as_array().unwrap();
    let status_of = |id: &str| {
        seats
            .iter()
            .find(|s| s["id"] == id)
            .map(|s| s["status"].as_str().unwrap().to_string())
            .unwrap()
    };
    assert_eq!(status_of(&held), "LOCKED");
    assert_eq!(status_of(&free), "AVAILABLE");
}
