use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};

#[derive(Clone)]
pub struct ReservationMetrics {
    pub registry: Registry,
    pub reservations_created: IntCounter,
    pub reservations_expired: IntCounter,
    pub seat_conflicts: IntCounter,
    pub idempotent_replays: IntCounter,
    pub event_publish_failures: IntCounter,
    pub reaper_sweep_duration_seconds: Histogram,
    pub http_errors_total: IntCounterVec,
}

impl ReservationMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let reservations_created = IntCounter::new(
            "reservations_created_total",
            "Reservations created in PENDING state",
        ).unwrap();
        let reservations_expired = IntCounter::new(
            "reservations_expired_total",
            "Expired reservations cancelled by the reaper",
        ).unwrap();
        let seat_conflicts = IntCounter::new(
            "seat_conflicts_total",
            "Reserve attempts rejected because a seat was locked or unavailable",
        ).unwrap();
        let idempotent_replays = IntCounter::new(
            "idempotent_replays_total",
            "Reserve requests answered from the idempotency cache",
        ).unwrap();
        let event_publish_failures = IntCounter::new(
            "event_publish_failures_total",
            "Event bus publish failures",
        ).unwrap();
        let reaper_sweep_duration_seconds = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "reaper_sweep_duration_seconds",
                "Duration of an expiration reaper sweep"
            ).buckets(vec![0.01,0.05,0.1,0.25,0.5,1.0,2.0,5.0])
        ).unwrap();
        let http_errors_total = IntCounterVec::new(
            prometheus::Opts::new(
                "http_errors_total",
                "Count of HTTP error responses emitted (status >= 400)"
            ),
            &["service", "code", "status"]
        ).unwrap();
        let _ = registry.register(Box::new(reservations_created.clone()));
        let _ = registry.register(Box::new(reservations_expired.clone()));
        let _ = registry.register(Box::new(seat_conflicts.clone()));
        let _ = registry.register(Box::new(idempotent_replays.clone()));
        let _ = registry.register(Box::new(event_publish_failures.clone()));
        let _ = registry.register(Box::new(reaper_sweep_duration_seconds.clone()));
        let _ = registry.register(Box::new(http_errors_total.clone()));
        ReservationMetrics { registry, reservations_created, reservations_expired, seat_conflicts, idempotent_replays, event_publish_failures, reaper_sweep_duration_seconds, http_errors_total }
    }
}

impl Default for ReservationMetrics {
    fn default() -> Self { Self::new() }
}
