use metrics_exporter_prometheus::PrometheusBuilder;

#[test]
fn error_events_are_counted() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        let (dispatch, _otel_guard) = common::observability::build_dispatch("test-dashboard", "info");

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::warn!("not counted");
            tracing::error!(endpoint = "stats", "upstream down");
        });
    });

    let rendered = handle.render();
    assert!(
        rendered.contains("dashboard_tracing_error_events 1"),
        "expected one error event in rendered metrics, got:\n{rendered}"
    );
}

#[test]
fn decode_failures_are_counted_by_path() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    let records = vec![common::types::RawBucketRecord {
        date: "2024-03-01".to_string(),
        identifier: Some("roobet".to_string()),
        raw: Some("{broken".to_string()),
    }];
    let report = metrics::with_local_recorder(&recorder, || common::aggregation::aggregate(&records));
    assert_eq!(report.issues.len(), 2);

    let rendered = handle.render();
    assert!(rendered.contains(r#"dashboard_bucket_decode_failures_total{path="chart"} 1"#), "{rendered}");
    assert!(rendered.contains(r#"dashboard_bucket_decode_failures_total{path="users"} 1"#), "{rendered}");
}
