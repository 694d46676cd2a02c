use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder once per process. Later calls are no-ops.
pub fn init_metrics() {
    METRICS_HANDLE.get_or_init(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    });
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .and_then(Option::as_ref)
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

pub fn record_booking_created() {
    counter!("bookings_created_total").increment(1);
}

pub fn record_booking_confirmed() {
    counter!("bookings_confirmed_total").increment(1);
}

/// `outcome` is `accepted`, `rejected` or `misconfigured`.
pub fn record_stk_push(outcome: &'static str) {
    counter!("mpesa_stk_push_total", "outcome" => outcome).increment(1);
}

pub fn record_callback(outcome: &'static str) {
    counter!("mpesa_callbacks_total", "outcome" => outcome).increment(1);
}
