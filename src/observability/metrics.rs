use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub bookings_total: IntCounterVec,
    pub quotes_submitted_total: IntCounter,
    pub quotes_expired_total: IntCounter,
    pub settlement_latency_seconds: HistogramVec,
    pub active_trips: IntGauge,
    pub events_published_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let bookings_total = IntCounterVec::new(
            Opts::new("bookings_total", "Booking transitions by resulting status"),
            &["status"],
        )
        .expect("valid bookings_total metric");

        let quotes_submitted_total =
            IntCounter::new("quotes_submitted_total", "Total operator quotes submitted")
                .expect("valid quotes_submitted_total metric");

        let quotes_expired_total =
            IntCounter::new("quotes_expired_total", "Quotes declined by the expiry sweep")
                .expect("valid quotes_expired_total metric");

        let settlement_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "settlement_latency_seconds",
                "Latency of quote acceptance settlement in seconds",
            ),
            &["outcome"],
        )
        .expect("valid settlement_latency_seconds metric");

        let active_trips = IntGauge::new("active_trips", "Trips currently being tracked")
            .expect("valid active_trips metric");

        let events_published_total = IntCounterVec::new(
            Opts::new("events_published_total", "Realtime events published by kind"),
            &["event"],
        )
        .expect("valid events_published_total metric");

        registry
            .register(Box::new(bookings_total.clone()))
            .expect("register bookings_total");
        registry
            .register(Box::new(quotes_submitted_total.clone()))
            .expect("register quotes_submitted_total");
        registry
            .register(Box::new(quotes_expired_total.clone()))
            .expect("register quotes_expired_total");
        registry
            .register(Box::new(settlement_latency_seconds.clone()))
            .expect("register settlement_latency_seconds");
        registry
            .register(Box::new(active_trips.clone()))
            .expect("register active_trips");
        registry
            .register(Box::new(events_published_total.clone()))
            .expect("register events_published_total");

        Self {
            registry,
            bookings_total,
            quotes_submitted_total,
            quotes_expired_total,
            settlement_latency_seconds,
            active_trips,
            events_published_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
