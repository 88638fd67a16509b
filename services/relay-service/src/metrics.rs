//! Prometheus metrics exposition
//!
//! Service-level metrics:
//!
//! - `relay_requests_total` (counter): label `outcome`
//! - `relay_request_duration_seconds` (histogram): label `outcome`
//!
//! The core adds `token_refreshes_total{result}` through the same recorder.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "relay_request_duration_seconds";

/// Bucket boundaries from 5ms to 60s, covering the upstream timeout range.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Explicit buckets make `relay_request_duration_seconds` render as a
/// histogram (`_bucket` lines for `histogram_quantile()`) instead of the
/// default summary.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record one finished relay call. `outcome` is `success` or an error label.
pub fn record_relay(outcome: &'static str, duration_secs: f64) {
    metrics::counter!("relay_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!(DURATION_METRIC, "outcome" => outcome).record(duration_secs);
}

#[cfg(test)]
pub(crate) fn isolated_recorder() -> (
    metrics_exporter_prometheus::PrometheusRecorder,
    PrometheusHandle,
) {
    // build_recorder() sidesteps the process-wide recorder singleton
    let recorder = builder().unwrap().build_recorder();
    let handle = recorder.handle();
    (recorder, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_relay_does_not_panic_without_recorder() {
        record_relay("success", 0.05);
    }

    #[test]
    fn record_relay_increments_counter_and_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_relay("success", 0.042);
        record_relay("rate_limited", 1.5);

        let output = handle.render();
        assert!(output.contains("relay_requests_total"));
        assert!(output.contains("outcome=\"success\""));
        assert!(output.contains("outcome=\"rate_limited\""));
        assert!(
            output.contains("relay_request_duration_seconds_bucket"),
            "histogram must render _bucket lines for histogram_quantile() queries"
        );
    }

    #[test]
    fn histogram_buckets_cover_timeout_range() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_relay("success", 0.003);

        let output = handle.render();
        assert!(output.contains("le=\"0.005\""), "5ms bucket must exist");
        assert!(output.contains("le=\"60\""), "60s bucket must exist");
        assert!(output.contains("le=\"+Inf\""));
    }
}
