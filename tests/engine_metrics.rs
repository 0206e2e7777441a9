mod support;

use std::collections::HashSet;

use metrics_util::debugging::DebuggingRecorder;
use rss_translator::cache::{
    METRIC_FEED_HIT, METRIC_FEED_MISS, METRIC_FEED_STALE, METRIC_GENERATE_MS,
    METRIC_REFRESH_FAILURE, METRIC_REFRESH_SKIPPED, METRIC_REFRESH_SUCCESS, RefreshOutcome,
};

use support::{FakeFactory, FakeSource, harness, rss};

#[tokio::test]
async fn engine_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let source = FakeSource::new(rss(&["one"]));
    let h = harness(
        &[("hn", "https://example/hn.xml")],
        FakeFactory::default().with_source("hn", source.clone()),
    )
    .await;

    // miss + generate latency, then a fresh hit
    h.registry.resolve("hn").await.expect("miss");
    h.registry.resolve("hn").await.expect("hit");

    // two stale reads before the first refresh runs: one refresh, one skip
    h.clock.advance_secs(7201);
    let first = h.registry.resolve("hn").await.expect("stale");
    let second = h.registry.resolve("hn").await.expect("stale again");
    assert!(second.background_refresh.is_none());
    assert_eq!(
        first.background_refresh.expect("refresh").join().await,
        RefreshOutcome::Refreshed
    );

    // a failing refresh
    h.clock.advance_secs(7201);
    source.fail_with("connection reset");
    let stale = h.registry.resolve("hn").await.expect("stale");
    assert!(matches!(
        stale.background_refresh.expect("refresh").join().await,
        RefreshOutcome::Failed(_)
    ));

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        METRIC_FEED_HIT,
        METRIC_FEED_MISS,
        METRIC_FEED_STALE,
        METRIC_REFRESH_SUCCESS,
        METRIC_REFRESH_FAILURE,
        METRIC_REFRESH_SKIPPED,
        METRIC_GENERATE_MS,
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
