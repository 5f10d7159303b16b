use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub bookings_total: IntCounterVec,
    pub offers_sent_total: IntCounter,
    pub claims_total: IntCounterVec,
    pub connected_clients: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let bookings_total = IntCounterVec::new(
            Opts::new("bookings_total", "Booking creations by outcome"),
            &["outcome"],
        )
        .expect("valid bookings_total metric");

        let offers_sent_total = IntCounter::new(
            "offers_sent_total",
            "Booking offers broadcast to candidate drivers",
        )
        .expect("valid offers_sent_total metric");

        let claims_total = IntCounterVec::new(
            Opts::new("claims_total", "Offer claim attempts by outcome"),
            &["outcome"],
        )
        .expect("valid claims_total metric");

        let connected_clients = IntGaugeVec::new(
            Opts::new("connected_clients", "Live push connections by role"),
            &["role"],
        )
        .expect("valid connected_clients metric");

        registry
            .register(Box::new(bookings_total.clone()))
            .expect("register bookings_total");
        registry
            .register(Box::new(offers_sent_total.clone()))
            .expect("register offers_sent_total");
        registry
            .register(Box::new(claims_total.clone()))
            .expect("register claims_total");
        registry
            .register(Box::new(connected_clients.clone()))
            .expect("register connected_clients");

        Self {
            registry,
            bookings_total,
            offers_sent_total,
            claims_total,
            connected_clients,
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
