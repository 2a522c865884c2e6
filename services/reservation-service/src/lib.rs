pub mod app;
pub mod config;
pub mod models;
pub mod payment_handlers;
pub mod reaper;
pub mod repo;
pub mod reservation_handlers;
pub mod session_handlers;

pub use app::{build_router, AppState};
pub use config::ReservationConfig;
