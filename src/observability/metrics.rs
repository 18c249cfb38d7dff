use prometheus::{Encoder, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_total: IntCounterVec,
    pub reassignments_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub connected_sockets: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_total = IntCounterVec::new(
            Opts::new("dispatch_total", "Dispatch attempts by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_total metric");

        let reassignments_total = IntCounterVec::new(
            Opts::new("reassignments_total", "Successful reassignments by trigger"),
            &["trigger"],
        )
        .expect("valid reassignments_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of candidate selection and assignment in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let connected_sockets = IntGaugeVec::new(
            Opts::new("connected_sockets", "Currently registered sockets by role"),
            &["role"],
        )
        .expect("valid connected_sockets metric");

        registry
            .register(Box::new(dispatch_total.clone()))
            .expect("register dispatch_total");
        registry
            .register(Box::new(reassignments_total.clone()))
            .expect("register reassignments_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(connected_sockets.clone()))
            .expect("register connected_sockets");

        Self {
            registry,
            dispatch_total,
            reassignments_total,
            dispatch_latency_seconds,
            connected_sockets,
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
