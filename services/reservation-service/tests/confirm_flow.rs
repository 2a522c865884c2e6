mod support;

use axum::http::StatusCode;
use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use common_coordination::seat_lock_key;
use reservation_service::build_router;
use serde_json::json;
use std::str::FromStr;
use tower::ServiceExt;
use uuid::Uuid;

use support::*;

#[tokio::test]
#[ignore]
async fn confirmation_sells_the_seat_exactly_once() {
    let state = test_state().await;
    let session = seed_session(&state.db, "25.00").await;
    let seat = seed_seat(&state.db, &session, "A", 1).await;
    let app = build_router(state.clone());

    let resp = app
        .clone()
        .oneshot(post_json("/reservations", json!({"userId": "u1", "seatIds": [seat]})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_json(resp).await;
    let reservation_id = body["reservationIds"][0].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(post_json(
            &format!("/reservations/{reservation_id}/confirm"),
            json!({"paymentMethod": "PIX"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "CONFIRMED");
    assert_eq!(body["amount"], "25.00");

    assert_eq!(reservation_status(&state.db, &reservation_id).await, "CONFIRMED");
    assert_eq!(seat_status(&state.db, &seat).await, "SOLD");

    let amount: BigDecimal = sqlx::query_scalar(
        r#"SELECT amount FROM sales WHERE "reservationId" = $1"#,
    )
    .bind(&reservation_id)
    .fetch_one(&state.db)
    .await
    .unwrap();
    assert_eq!(amount, BigDecimal::from_str("25.00").unwrap());

    let holder = state.locks.get(&seat_lock_key(&seat)).await.unwrap();
    assert_eq!(holder, None, "seat lock must be released after confirmation");

    // Double pay: the second confirm must conflict and add nothing.
    let resp = app
        .oneshot(post_json(&format!("/reservations/{reservation_id}/confirm"), json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "already_paid");

    let sales: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM sales WHERE "reservationId" = $1"#,
    )
    .bind(&reservation_id)
    .fetch_one(&state.db)
    .await
    .unwrap();
    assert_eq!(sales, 1);
}

#[tokio::test]
#[ignore]
async fn confirm_after_expiry_cancels_and_rejects() {
    let state = test_state().await;
    let session = seed_session(&state.db, "30.00").await;
    let seat = seed_seat(&state.db, &session, "B", 1).await;
    let reservation =
        seed_reservation(&state.db, "u1", &seat, "PENDING", Utc::now() - Duration::minutes(1)).await;
    let app = build_router(state.clone());

    let resp = app
        .oneshot(post_json(&format!("/reservations/{reservation}/confirm"), json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "reservation_expired");

    assert_eq!(reservation_status(&state.db, &reservation).await, "CANCELLED");
    assert_eq!(seat_status(&state.db, &seat).await, "AVAILABLE");

    let sales: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM sales WHERE "reservationId" = $1"#,
    )
    .bind(&reservation)
    .fetch_one(&state.db)
    .await
    .unwrap();
    assert_eq!(sales, 0, "an expired reservation must not produce a sale");
}

#[tokio::test]
#[ignore]
async fn confirm_of_cancelled_reservation_is_bad_request() {
    let state = test_state().await;
    let session = seed_session(&state.db, "30.00").await;
    let seat = seed_seat(&state.db, &session, "B", 2).await;
    let reservation =
        seed_reservation(&state.db, "u1", &seat, "CANCELLED", Utc::now() + Duration::minutes(5)).await;
    let app = build_router(state);

    let resp = app
        .oneshot(post_json(&format!("/reservations/{reservation}/confirm"), json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "reservation_cancelled");
}

#[tokio::test]
#[ignore]
async fn confirm_of_unknown_reservation_is_not_found() {
    let state = test_state().await;
    let app = build_router(state);

    let resp = app
        .oneshot(post_json(
            &format!("/reservations/{}/confirm", Uuid::new_v4()),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "reservation_not_found");
}
