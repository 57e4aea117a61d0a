use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::events::RealtimeEvent;
use crate::geo::{HaversineEstimator, RouteEstimator};
use crate::models::booking::BookingRequest;
use crate::models::pricing::{PricingRule, VehicleCategory};
use crate::models::quote::OperatorQuote;
use crate::models::trip::ActiveTrip;
use crate::observability::metrics::Metrics;
use crate::payments::{LoggingGateway, PaymentGateway};

pub struct AppState {
    pub bookings: DashMap<Uuid, BookingRequest>,
    pub quotes: DashMap<Uuid, OperatorQuote>,
    pub trips: DashMap<Uuid, ActiveTrip>,
    pub pricing: DashMap<(Uuid, VehicleCategory), PricingRule>,
    /// Serializes quote acceptance per booking request. Unrelated requests
    /// settle concurrently.
    pub settlement_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    /// At most one tick task per trip, keyed by trip id.
    pub tick_tasks: DashMap<Uuid, JoinHandle<()>>,
    pub events_tx: broadcast::Sender<RealtimeEvent>,
    pub payments: Arc<dyn PaymentGateway>,
    pub routes: Arc<dyn RouteEstimator>,
    pub metrics: Metrics,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        Self {
            bookings: DashMap::new(),
            quotes: DashMap::new(),
            trips: DashMap::new(),
            pricing: DashMap::new(),
            settlement_locks: DashMap::new(),
            tick_tasks: DashMap::new(),
            events_tx,
            payments: Arc::new(LoggingGateway),
            routes: Arc::new(HaversineEstimator::default()),
            metrics: Metrics::new(),
            config,
        }
    }

    pub fn publish(&self, event: RealtimeEvent) {
        self.metrics
            .events_published_total
            .with_label_values(&[event.event])
            .inc();
        let _ = self.events_tx.send(event);
    }

    /// Rate card for a tenant/category pair, seeding the standard card on
    /// first read so estimates never miss.
    pub fn pricing_rule(&self, tenant_id: Uuid, category: VehicleCategory) -> PricingRule {
        self.pricing
            .entry((tenant_id, category))
            .or_insert_with(|| PricingRule::standard(tenant_id, category))
            .clone()
    }

    pub fn settlement_lock(&self, request_id: Uuid) -> Arc<Mutex<()>> {
        self.settlement_locks
            .entry(request_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
