use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use common_coordination::{IdempotencyStore, LockService};
use common_events::EventPublisher;
use common_observability::ReservationMetrics;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tracing::{info, warn};

use reservation_service::app::{build_router, AppState};
use reservation_service::config::ReservationConfig;
use reservation_service::reaper::spawn_reaper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()))
        .init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let db = PgPool::connect(&database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let redis_host = env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
    let redis_port = env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
    let redis_url = format!("redis://{redis_host}:{redis_port}");
    let redis_client = redis::Client::open(redis_url.as_str())?;
    let redis_manager = ConnectionManager::new(redis_client).await?;
    let locks = LockService::new(redis_manager.clone());
    let idempotency = IdempotencyStore::new(redis_manager);

    let publisher = match env::var("RABBITMQ_URI") {
        Ok(uri) => {
            let publisher = EventPublisher::connect(&uri).await?;
            info!("Event publisher initialised");
            Some(publisher)
        }
        Err(_) => {
            warn!("RABBITMQ_URI not set; events will not be published");
            None
        }
    };

    let config = ReservationConfig::from_env();
    let state = AppState {
        db,
        locks,
        idempotency,
        publisher,
        config,
        metrics: Arc::new(ReservationMetrics::new()),
    };

    spawn_reaper(state.clone());

    let app = build_router(state);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let ip: std::net::IpAddr = host.parse()?;
    let addr = SocketAddr::from((ip, port));
    println!("starting reservation-service on {addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
