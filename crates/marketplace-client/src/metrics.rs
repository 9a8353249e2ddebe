//! Client-side metrics
//!
//! - `api_client_requests_total` (counter): labels `method`, `status`, `attempt`
//! - `api_client_request_duration_seconds` (histogram): label `status`
//! - `api_client_transport_errors_total` (counter): label `error_type`
//! - `api_client_token_refresh_total` (counter): label `outcome`
//! - `api_client_refresh_waiters_total` (counter)
//! - `api_client_replays_total` (counter)
//!
//! Recording is a no-op until the embedding application installs a recorder.

use crate::dispatch::Attempt;

/// Record a request that got a response.
pub fn record_request(method: &str, status: u16, attempt: Attempt, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "api_client_requests_total",
        "method" => method.to_string(),
        "status" => status_str.clone(),
        "attempt" => attempt.as_str()
    )
    .increment(1);
    metrics::histogram!("api_client_request_duration_seconds", "status" => status_str)
        .record(duration_secs);
}

/// Record a request that never got a response.
pub fn record_transport_error(error_type: &str) {
    metrics::counter!("api_client_transport_errors_total", "error_type" => error_type.to_string())
        .increment(1);
}

/// Record a settled refresh, `outcome` is `success`, `failure` or `superseded`.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("api_client_token_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a request that joined an in-flight refresh instead of starting one.
pub fn record_queued_waiter() {
    metrics::counter!("api_client_refresh_waiters_total").increment(1);
}

pub fn record_replay() {
    metrics::counter!("api_client_replays_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request("GET", 200, Attempt::Initial, 0.01);
        record_transport_error("timeout");
        record_refresh("success");
        record_queued_waiter();
        record_replay();
    }

    #[test]
    fn request_counter_carries_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("GET", 401, Attempt::Initial, 0.02);
        record_request("GET", 200, Attempt::Replay, 0.03);

        let output = handle.render();
        assert!(output.contains("api_client_requests_total"));
        assert!(output.contains("status=\"401\""));
        assert!(output.contains("attempt=\"initial\""));
        assert!(output.contains("attempt=\"replay\""));
        assert!(output.contains("method=\"GET\""));
    }

    #[test]
    fn refresh_counters_render() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_refresh("failure");
        record_queued_waiter();
        record_queued_waiter();
        record_replay();

        let output = handle.render();
        assert!(output.contains("api_client_token_refresh_total{outcome=\"failure\"} 1"));
        assert!(output.contains("api_client_refresh_waiters_total 2"));
        assert!(output.contains("api_client_replays_total 1"));
    }
}
