use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub orders_published_total: IntCounterVec,
    pub order_transitions_total: IntCounterVec,
    pub dispatch_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub location_updates_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let orders_published_total = IntCounterVec::new(
            Opts::new("orders_published_total", "Order messages published by channel"),
            &["channel"],
        )
        .expect("valid orders_published_total metric");

        let order_transitions_total = IntCounterVec::new(
            Opts::new(
                "order_transitions_total",
                "Orders entering each lifecycle status",
            ),
            &["status"],
        )
        .expect("valid order_transitions_total metric");

        let dispatch_total = IntCounterVec::new(
            Opts::new("dispatch_total", "Dispatch attempts by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dispatch_latency_seconds",
                "Time from receiving an order message to notifying drivers",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let location_updates_total = IntCounterVec::new(
            Opts::new("location_updates_total", "Driver location reports by outcome"),
            &["outcome"],
        )
        .expect("valid location_updates_total metric");

        registry
            .register(Box::new(orders_published_total.clone()))
            .expect("register orders_published_total");
        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(dispatch_total.clone()))
            .expect("register dispatch_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(location_updates_total.clone()))
            .expect("register location_updates_total");

        Self {
            registry,
            orders_published_total,
            order_transitions_total,
            dispatch_total,
            dispatch_latency_seconds,
            location_updates_total,
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
