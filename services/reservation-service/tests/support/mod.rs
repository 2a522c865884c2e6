#![allow(dead_code)]

use std::env;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::Request;
use axum::response::Response;
use chrono::{DateTime, Duration, Utc};
use common_coordination::{IdempotencyStore, LockService};
use common_observability::ReservationMetrics;
use redis::aio::ConnectionManager;
use reservation_service::{AppState, ReservationConfig};
use serde_json::Value;
use sqlx::{Executor, PgPool};
use uuid::Uuid;

// Minimal schema compatible with the production migrations; applied so the
// ignored suites can run against any scratch database.
const SCHEMA_SQL: &str = r#"
DO $$ BEGIN
    CREATE TYPE seat_status AS ENUM ('AVAILABLE','LOCKED','SOLD');
EXCEPTION WHEN duplicate_object THEN NULL; END $$;
DO $$ BEGIN
    CREATE TYPE reservation_status AS ENUM ('PENDING','CONFIRMED','CANCELLED');
EXCEPTION WHEN duplicate_object THEN NULL; END $$;
DO $$ BEGIN
    CREATE TYPE payment_method AS ENUM ('CREDIT_CARD','DEBIT_CARD','PIX','CASH');
EXCEPTION WHEN duplicate_object THEN NULL; END $$;

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    "movieId" TEXT NOT NULL,
    room TEXT NOT NULL,
    price NUMERIC(10,2) NOT NULL,
    "startsAt" TIMESTAMPTZ NOT NULL,
    "createdAt" TIMESTAMPTZ NOT NULL DEFAULT now(),
    "updatedAt" TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS seats (
    id TEXT PRIMARY KEY,
    "sessionId" TEXT NOT NULL REFERENCES sessions(id),
    "row" TEXT NOT NULL,
    number INT NOT NULL,
    status seat_status NOT NULL DEFAULT 'AVAILABLE',
    UNIQUE ("sessionId", "row", number)
);
CREATE TABLE IF NOT EXISTS reservations (
    id TEXT PRIMARY KEY,
    "userId" TEXT NOT NULL,
    "seatId" TEXT NOT NULL REFERENCES seats(id),
    status reservation_status NOT NULL DEFAULT 'PENDING',
    "expiresAt" TIMESTAMPTZ NOT NULL,
    "createdAt" TIMESTAMPTZ NOT NULL DEFAULT now(),
    "updatedAt" TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS sales (
    id TEXT PRIMARY KEY,
    "reservationId" TEXT NOT NULL UNIQUE REFERENCES reservations(id),
    amount NUMERIC(10,2) NOT NULL,
    "paymentMethod" payment_method NOT NULL DEFAULT 'CREDIT_CARD',
    "createdAt" TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

pub async fn test_state() -> AppState {
    let dsn = env::var("DATABASE_URL").expect("DATABASE_URL must be set for this ignored test");
    let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

    let db = PgPool::connect(&dsn).await.expect("connect postgres");
    db.execute(SCHEMA_SQL).await.expect("apply schema");

    let client = redis::Client::open(redis_url.as_str()).expect("redis client");
    let manager = ConnectionManager::new(client).await.expect("redis connection manager");

    AppState {
        db,
        locks: LockService::new(manager.clone()),
        idempotency: IdempotencyStore::new(manager),
        publisher: None,
        config: ReservationConfig::default(),
        metrics: Arc::new(ReservationMetrics::new()),
    }
}

pub async fn seed_session(db: &PgPool, price: &str) -> String {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO sessions (id, "movieId", room, price, "startsAt")
           VALUES ($1, $2, 'room-1', $3::numeric, $4)"#,
    )
    .bind(&id)
    .bind(format!("movie-{id}"))
    .bind(price)
    .bind(Utc::now() + Duration::days(1))
    .execute(db)
    .await
    .expect("seed session");
    id
}

pub async fn seed_seat(db: &PgPool, session_id: &str, row: &str, number: i32) -> String {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO seats (id, "sessionId", "row", number) VALUES ($1, $2, $3, $4)"#,
    )
    .bind(&id)
    .bind(session_id)
    .bind(row)
    .bind(number)
    .execute(db)
    .await
    .expect("seed seat");
    id
}

pub async fn seed_reservation(
    db: &PgPool,
    user_id: &str,
    seat_id: &str,
    status: &str,
    expires_at: DateTime<Utc>,
) -> String {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO reservations (id, "userId", "seatId", status, "expiresAt")
           VALUES ($1, $2, $3, $4::reservation_status, $5)"#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(seat_id)
    .bind(status)
    .bind(expires_at)
    .execute(db)
    .await
    .expect("seed reservation");
    id
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post_json_with_key(uri: &str, body: Value, idempotency_key: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header("content-type", "application/json")
        .header("Idempotency-Key", idempotency_key)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("GET")
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(resp: Response) -> Value {
    let bytes = to_bytes(resp.into_body(), 1024 * 64).await.expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn body_bytes(resp: Response) -> Vec<u8> {
    to_bytes(resp.into_body(), 1024 * 64)
        .await
        .expect("read body")
        .to_vec()
}

pub async fn reservation_status(db: &PgPool, id: &str) -> String {
    sqlx::query_scalar::<_, String>("SELECT status::text FROM reservations WHERE id = $1")
        .bind(id)
        .fetch_one(db)
        .await
        .expect("reservation status")
}

pub async fn seat_status(db: &PgPool, id: &str) -> String {
    sqlx::query_scalar::<_, String>("SELECT status::text FROM seats WHERE id = $1")
        .bind(id)
        .fetch_one(db)
        .await
        .expect("seat status")
}
