use anyhow::Result;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn describe() {
    describe_gauge!(
        "dashboard_web_build_info",
        "Build info for the wager dashboard (value is always 1)."
    );
    describe_counter!(
        "dashboard_stats_fetch_total",
        "Upstream stats requests by endpoint and outcome."
    );
    describe_histogram!(
        "dashboard_stats_fetch_latency_ms",
        "Upstream stats request latency in milliseconds."
    );
    describe_counter!(
        "dashboard_bucket_decode_failures_total",
        "Buckets whose raw payload failed to decode, by decode path."
    );
    describe_counter!(
        "dashboard_entries_skipped_total",
        "User entries dropped during aggregation, by reason."
    );
    describe_counter!(
        "dashboard_snapshot_stale_served_total",
        "Requests answered from the previous snapshot after a failed fetch."
    );
    describe_counter!(
        common::observability::ERROR_EVENTS_METRIC,
        "ERROR-level tracing events."
    );
}

/// Install the global Prometheus recorder once and return a handle for
/// rendering `/metrics`. Upkeep runs on each `/metrics` request.
pub fn init_global() -> Result<PrometheusHandle> {
    if let Some(handle) = PROM_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();

    let git_sha = std::env::var("GIT_SHA").unwrap_or_else(|_| "unknown".to_string());
    metrics::gauge!(
        "dashboard_web_build_info",
        "version" => env!("CARGO_PKG_VERSION"),
        "git_sha" => git_sha,
    )
    .set(1.0);

    Ok(PROM_HANDLE.get_or_init(|| handle).clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_described_metrics_render() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe();
            metrics::counter!("dashboard_snapshot_stale_served_total").increment(2);
        });

        let rendered = handle.render();
        assert!(rendered.contains("dashboard_snapshot_stale_served_total 2"), "{rendered}");
        assert!(rendered.contains("# HELP dashboard_snapshot_stale_served_total"));
    }
}
