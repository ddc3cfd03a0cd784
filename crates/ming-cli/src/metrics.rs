//! Prometheus metrics for the gateway process

use crate::state::{AppState, IamState};
use prometheus::{Encoder, IntCounter, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

/// Request, lock and subsystem metrics behind one registry
pub struct Metrics {
    registry: Registry,
    requests: IntCounter,
    client_errors: IntCounter,
    server_errors: IntCounter,
    ns_locks: IntCounter,
    layer_installed: IntGauge,
    iam_state: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests = IntCounter::new("ming_http_requests_total", "Total HTTP requests served")?;
        registry.register(Box::new(requests.clone()))?;

        let client_errors = IntCounter::new(
            "ming_http_requests_4xx_errors_total",
            "Requests answered with a 4xx status",
        )?;
        registry.register(Box::new(client_errors.clone()))?;

        let server_errors = IntCounter::new(
            "ming_http_requests_5xx_errors_total",
            "Requests answered with a 5xx status",
        )?;
        registry.register(Box::new(server_errors.clone()))?;

        let ns_locks = IntCounter::new(
            "ming_ns_lock_acquisitions_total",
            "Namespace locks acquired by API handlers",
        )?;
        registry.register(Box::new(ns_locks.clone()))?;

        let layer_installed = IntGauge::new(
            "ming_object_layer_installed",
            "1 once the backend object layer is installed",
        )?;
        registry.register(Box::new(layer_installed.clone()))?;

        let iam_state = IntGaugeVec::new(Opts::new("ming_iam_state", "Identity subsystem state"), &["state"])?;
        registry.register(Box::new(iam_state.clone()))?;

        Ok(Self {
            registry,
            requests,
            client_errors,
            server_errors,
            ns_locks,
            layer_installed,
            iam_state,
        })
    }

    /// Count a finished request by status code
    pub fn record_request(&self, status: u16) {
        self.requests.inc();
        match status {
            400..=499 => self.client_errors.inc(),
            500..=599 => self.server_errors.inc(),
            _ => {}
        }
    }

    pub fn record_ns_lock(&self) {
        self.ns_locks.inc();
    }

    pub fn requests(&self) -> u64 {
        self.requests.get()
    }
}

/// Render every metric for the `/ming/v2/metrics` endpoint
pub fn render(state: &AppState) -> prometheus::Result<String> {
    let metrics = &state.metrics;
    metrics
        .layer_installed
        .set(i64::from(state.globals.object_layer().is_some()));
    let current = state.globals.iam_state();
    for iam in [IamState::Disabled, IamState::Initializing, IamState::Ready, IamState::Failed] {
        metrics
            .iam_state
            .with_label_values(&[iam.as_str()])
            .set(i64::from(iam == current));
    }

    let mut families = metrics.registry.gather();
    if let Some(cache) = state.globals.cache_layer() {
        families.extend(cache.collect_metrics());
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
