mod common;

use common::{FakeBackend, two_schema_state};
use config::RetrofitOptions;
use metrics_util::CompositeKey;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use retrofit::Retrofit;
use space_core::TableFilter;

type SnapshotVec = Vec<(
    CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

/// Runs `f` on a current-thread runtime under a scoped recorder.
fn with_test_recorder<F, Fut, R>(f: F) -> (R, SnapshotVec)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = R>,
{
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let result = metrics::with_local_recorder(&recorder, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f())
    });
    let snapshot = snapshotter.snapshot().into_vec();

    (result, snapshot)
}

fn has_metric_name(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot.iter().any(|(k, _, _, _)| k.key().name() == name)
}

#[test]
fn test_apply_records_duration() {
    let (report, snapshot) = with_test_recorder(|| async {
        let mut engine =
            Retrofit::new(FakeBackend::new(two_schema_state()), RetrofitOptions::postgres())
                .unwrap();
        engine.apply(&TableFilter::everything()).await
    });

    assert!(report.is_ok());
    let recorded = snapshot
        .iter()
        .find(|(k, _, _, _)| k.key().name() == "ownspace_apply_duration_ms");
    match recorded {
        Some((_, _, _, DebugValue::Histogram(values))) => assert_eq!(values.len(), 1),
        other => panic!(
            "Should record apply duration histogram. Found: {:?}",
            other.map(|(k, _, _, _)| k.key().name())
        ),
    }
}

#[test]
fn test_failed_apply_records_no_duration() {
    let (report, snapshot) = with_test_recorder(|| async {
        let mut backend = FakeBackend::new(two_schema_state());
        backend.fail_on = Some("add_tenant_column");
        let mut engine = Retrofit::new(backend, RetrofitOptions::postgres()).unwrap();
        engine.apply(&TableFilter::everything()).await
    });

    assert!(report.is_err());
    assert!(
        !has_metric_name(&snapshot, "ownspace_apply_duration_ms"),
        "Failed runs must not record a duration. Found metrics: {:?}",
        snapshot
            .iter()
            .map(|(k, _, _, _)| k.key().name())
            .collect::<Vec<_>>()
    );
}
