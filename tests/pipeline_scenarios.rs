//! End-to-end pipeline scenarios with scripted collectors and sinks.
//!
//! All tests run on a paused Tokio clock, so elapsed times are exact.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedSink, SequenceCollector, event_id};
use streamfeed::buffer::{DeadLetter, DeadLetterLog};
use streamfeed::pipeline::{EXIT_CLEAN, EXIT_DEGRADED, Pipeline, PipelineSettings, Supervisor};
use streamfeed::publisher::{PublishError, Publisher};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test Helpers
// =============================================================================

fn publisher(sink: &Arc<ScriptedSink>) -> Publisher {
    Publisher::new(sink.clone(), "test-stream")
}

fn settings(interval_ms: u64) -> PipelineSettings {
    PipelineSettings::default()
        .with_interval(Duration::from_millis(interval_ms))
        .with_drain_timeout(Duration::from_secs(1))
}

// =============================================================================
// Delivery
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_until_delivered() {
    let sink = Arc::new(ScriptedSink::failing_first(
        2,
        PublishError::Unavailable("warming up".into()),
    ));
    let shutdown = CancellationToken::new();
    let handle = Pipeline::new(
        SequenceCollector::new("e2e"),
        publisher(&sink),
        settings(100)
            .with_buffer_capacity(5)
            .with_retry(3, Duration::from_millis(10), Duration::from_millis(100)),
    )
    .start(shutdown.clone());

    // Cycles at 0, 100, ..., 1000ms; each record needs 30ms of backoff.
    tokio::time::sleep(Duration::from_millis(1050)).await;
    assert_eq!(handle.queue_depth(), 0);

    shutdown.cancel();
    let report = handle.join().await.unwrap();

    assert_eq!(report.stats.collected, 11);
    assert_eq!(report.stats.delivered, 11);
    assert_eq!(report.stats.retries, 22);
    assert_eq!(report.stats.dead_lettered, 0);
    assert_eq!(report.stats.dropped_overflow, 0);
    assert!(report.is_clean());

    let accepted = sink.accepted();
    let expected: Vec<String> = (1..=11).map(event_id).collect();
    assert_eq!(accepted, expected);
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_one_preserves_collection_order() {
    let sink = Arc::new(ScriptedSink::failing_every(3));
    let shutdown = CancellationToken::new();
    let handle = Pipeline::new(
        SequenceCollector::new("ordered"),
        publisher(&sink),
        settings(10)
            .with_fan_out(1)
            .with_retry(10, Duration::from_millis(25), Duration::from_millis(25)),
    )
    .start(shutdown.clone());

    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown.cancel();
    let report = handle.join().await.unwrap();

    let accepted = sink.accepted();
    assert!(accepted.len() > 10);
    assert_eq!(report.stats.delivered, accepted.len() as u64);
    let expected: Vec<String> = (1..=accepted.len() as u64).map(event_id).collect();
    assert_eq!(accepted, expected);
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_allows_concurrent_attempts() {
    let sink = Arc::new(ScriptedSink::accepting().with_latency(Duration::from_millis(500)));
    let shutdown = CancellationToken::new();
    let handle = Pipeline::new(
        SequenceCollector::new("parallel"),
        publisher(&sink),
        settings(10).with_fan_out(4),
    )
    .start(shutdown.clone());

    // Four records collected at 0..30ms; all in flight together.
    tokio::time::sleep(Duration::from_millis(35)).await;
    shutdown.cancel();
    let report = handle.join().await.unwrap();

    assert_eq!(report.stats.collected, 4);
    assert_eq!(report.stats.delivered, 4);
    assert!(report.is_clean());
    assert_eq!(sink.total_calls(), 4);
}

// =============================================================================
// Retry Budget
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_always_unavailable_waits_capped_backoff_then_dead_letters() {
    let sink = Arc::new(ScriptedSink::always_failing(PublishError::Unavailable(
        "down".into(),
    )));
    let settings = settings(3_600_000).with_retry(
        4,
        Duration::from_millis(100),
        Duration::from_millis(250),
    );
    let expected_delay = settings.retry_policy().total_retry_delay();
    assert_eq!(expected_delay, Duration::from_millis(100 + 200 + 250));

    let shutdown = CancellationToken::new();
    let handle = Pipeline::new(SequenceCollector::new("doomed"), publisher(&sink), settings)
        .start(shutdown.clone());

    tokio::time::sleep(Duration::from_secs(5)).await;

    let calls = sink.call_times(&event_id(1));
    assert_eq!(calls.len(), 4);
    let elapsed = calls[3] - calls[0];
    let tolerance = Duration::from_millis(5);
    assert!(
        elapsed >= expected_delay && elapsed <= expected_delay + tolerance,
        "elapsed {:?}, expected {:?}",
        elapsed,
        expected_delay
    );
    assert_eq!(handle.dead_letter_count(), 1);

    // Never retried after dead-lettering.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(sink.call_times(&event_id(1)).len(), 4);

    shutdown.cancel();
    let report = handle.join().await.unwrap();
    assert_eq!(report.stats.retries, 3);
    assert_eq!(report.stats.dead_lettered, 1);
    assert_eq!(report.stats.delivered, 0);
    assert!(report.is_clean());
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_failure_goes_to_dead_letter_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dead.jsonl");
    let sink = Arc::new(ScriptedSink::always_failing(PublishError::Unauthorized(
        "bad token".into(),
    )));

    let shutdown = CancellationToken::new();
    let handle = Pipeline::new(
        SequenceCollector::new("denied"),
        publisher(&sink),
        settings(100),
    )
    .with_dead_letter_log(DeadLetterLog::new("denied").with_file(&path).unwrap())
    .start(shutdown.clone());

    tokio::time::sleep(Duration::from_millis(250)).await;
    shutdown.cancel();
    let report = handle.join().await.unwrap();

    assert_eq!(report.stats.collected, 3);
    assert_eq!(report.stats.dead_lettered, 3);
    assert_eq!(report.stats.retries, 0);
    assert_eq!(sink.total_calls(), 3);

    let content = std::fs::read_to_string(&path).unwrap();
    let letters: Vec<DeadLetter> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(letters.len(), 3);
    assert_eq!(letters[0].record.event_id, event_id(1));
    assert_eq!(letters[0].attempts, 1);
    assert!(letters[0].reason.contains("unauthorized"));
    assert_eq!(letters[0].pipeline, "denied");
}

#[tokio::test(start_paused = true)]
async fn test_throttled_is_retried() {
    let sink = Arc::new(ScriptedSink::failing_first(
        1,
        PublishError::Throttled("slow down".into()),
    ));
    let shutdown = CancellationToken::new();
    let handle = Pipeline::new(
        SequenceCollector::new("throttled"),
        publisher(&sink),
        settings(3_600_000).with_retry(2, Duration::from_millis(50), Duration::from_secs(1)),
    )
    .start(shutdown.clone());

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();
    let report = handle.join().await.unwrap();

    assert_eq!(report.stats.delivered, 1);
    assert_eq!(report.stats.retries, 1);
    assert_eq!(report.stats.dead_lettered, 0);
}

// =============================================================================
// Overflow and Shutdown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_overflow_drops_oldest_unsent_record() {
    let sink = Arc::new(ScriptedSink::accepting().with_latency(Duration::from_secs(3)));
    let shutdown = CancellationToken::new();
    let handle = Pipeline::new(
        SequenceCollector::new("overflow"),
        publisher(&sink),
        settings(100).with_buffer_capacity(3),
    )
    .start(shutdown.clone());

    // e0001 is in flight; e0002..e0004 arrive while it is, so one must go.
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(handle.queue_depth(), 3);
    assert_eq!(handle.stats().dropped_overflow, 1);

    // Let the in-flight attempt finish and the rest drain.
    tokio::time::sleep(Duration::from_millis(2_700)).await;
    shutdown.cancel();
    let report = handle.join().await.unwrap();

    assert_eq!(report.stats.collected, 31);
    assert_eq!(sink.accepted()[0], event_id(1));
    assert!(!sink.accepted().contains(&event_id(2)));
    assert!(report.stats.dropped_overflow >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_drain_timeout_drops_buffered_records() {
    let sink = Arc::new(ScriptedSink::accepting().with_latency(Duration::from_secs(2)));
    let mut supervisor = Supervisor::new();
    supervisor.spawn(Pipeline::new(
        SequenceCollector::new("slow-sink"),
        publisher(&sink),
        settings(100).with_drain_timeout(Duration::from_secs(1)),
    ));

    // Three records buffered, the first one in flight.
    let report = supervisor
        .run_until(tokio::time::sleep(Duration::from_millis(250)))
        .await;

    let pipeline = &report.stopped[0];
    assert!(pipeline.drain_timed_out);
    assert_eq!(pipeline.stats.collected, 3);
    assert_eq!(pipeline.stats.delivered, 0);
    assert_eq!(pipeline.stats.dropped_at_shutdown, 3);
    assert_eq!(report.exit_code(), EXIT_DEGRADED);
}

#[tokio::test(start_paused = true)]
async fn test_clean_drain_delivers_everything() {
    let sink = Arc::new(ScriptedSink::accepting().with_latency(Duration::from_millis(200)));
    let mut supervisor = Supervisor::new();
    supervisor.spawn(Pipeline::new(
        SequenceCollector::new("drains"),
        publisher(&sink),
        settings(100).with_drain_timeout(Duration::from_secs(5)),
    ));

    let report = supervisor
        .run_until(tokio::time::sleep(Duration::from_millis(450)))
        .await;

    let pipeline = &report.stopped[0];
    assert!(!pipeline.drain_timed_out);
    assert_eq!(pipeline.stats.collected, 5);
    assert_eq!(pipeline.stats.delivered, 5);
    assert_eq!(report.exit_code(), EXIT_CLEAN);
}
