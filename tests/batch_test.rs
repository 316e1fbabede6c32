//! Integration tests for the batch runner against a real queue.

mod common;

use common::TestHarness;
use pixelforge_common::TargetFormat;
use pixelforge_db::models::JobStatus;
use pixelforge_db::queries::queue;

fn webp_only(config: &mut pixelforge::config::Config) {
    config.conversion.formats = vec![TargetFormat::Webp];
}

#[test]
fn batch_honors_priority_and_leaves_the_rest_pending() {
    let h = TestHarness::with_config(webp_only);
    h.write_png("low-a.png", 8, 8);
    h.write_png("low-b.png", 8, 8);
    h.write_png("urgent.png", 8, 8);

    let conn = h.db.get().unwrap();
    let low_a = queue::enqueue(&conn, "low-a.png", None, 0).unwrap().id();
    let low_b = queue::enqueue(&conn, "low-b.png", None, 0).unwrap().id();
    let urgent = queue::enqueue(&conn, "urgent.png", None, 10).unwrap().id();
    drop(conn);

    let report = h.ctx.runner.run_batch(2).unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.errors, 0);

    let conn = h.db.get().unwrap();
    assert_eq!(
        queue::get_item(&conn, urgent).unwrap().status,
        JobStatus::Completed
    );
    // The older low-priority item ran; the other is still waiting.
    assert_eq!(
        queue::get_item(&conn, low_a).unwrap().status,
        JobStatus::Completed
    );
    assert_eq!(
        queue::get_item(&conn, low_b).unwrap().status,
        JobStatus::Pending
    );

    let counts = queue::status_counts(&conn).unwrap();
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.processing, 0);
    assert_eq!(counts.completed, 2);
    assert_eq!(counts.failed, 0);
    assert_eq!(counts.total, 3);

    // The variants actually landed on disk.
    assert!(h.root.path().join("urgent.png.webp").exists());
}

#[test]
fn transient_failures_retry_until_the_cap() {
    // AVIF on the native backend always fails with a retryable encode
    // error, so each batch run burns one attempt.
    let h = TestHarness::with_config(|config| {
        config.conversion.formats = vec![TargetFormat::Avif];
        config.queue.retry_cap = 3;
    });
    h.write_png("doomed.png", 8, 8);

    let conn = h.db.get().unwrap();
    let id = queue::enqueue(&conn, "doomed.png", None, 0).unwrap().id();
    drop(conn);

    for expected_attempts in 1..=2 {
        let report = h.ctx.runner.run_batch(5).unwrap();
        assert_eq!(report.errors, 1);
        let conn = h.db.get().unwrap();
        let item = queue::get_item(&conn, id).unwrap();
        assert_eq!(item.status, JobStatus::Pending);
        assert_eq!(item.attempts, expected_attempts);
    }

    let report = h.ctx.runner.run_batch(5).unwrap();
    assert_eq!(report.errors, 1);

    let conn = h.db.get().unwrap();
    let item = queue::get_item(&conn, id).unwrap();
    assert_eq!(item.status, JobStatus::Failed);
    assert_eq!(item.attempts, 3);
    drop(conn);

    // Terminal: nothing left to claim.
    let report = h.ctx.runner.run_batch(5).unwrap();
    assert_eq!(report.processed + report.errors, 0);
}

#[test]
fn exhausted_time_budget_defers_claimed_items() {
    let h = TestHarness::with_config(|config| {
        webp_only(config);
        config.queue.time_budget_secs = 0;
    });
    h.write_png("a.png", 8, 8);
    h.write_png("b.png", 8, 8);

    let conn = h.db.get().unwrap();
    queue::enqueue(&conn, "a.png", None, 0).unwrap();
    queue::enqueue(&conn, "b.png", None, 0).unwrap();
    drop(conn);

    let report = h.ctx.runner.run_batch(5).unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.deferred, 2);

    // Deferred items went back to Pending without burning an attempt.
    let conn = h.db.get().unwrap();
    let counts = queue::status_counts(&conn).unwrap();
    assert_eq!(counts.pending, 2);
    assert_eq!(counts.processing, 0);
    for item in queue::list_items(&conn, Some(JobStatus::Pending), 10).unwrap() {
        assert_eq!(item.attempts, 0);
    }
}

#[test]
fn progress_snapshot_tracks_the_run() {
    let h = TestHarness::with_config(webp_only);
    h.write_png("one.png", 8, 8);

    let conn = h.db.get().unwrap();
    queue::enqueue(&conn, "one.png", None, 0).unwrap();
    drop(conn);

    h.ctx.runner.run_batch(5).unwrap();

    let snapshot = h.ctx.progress.get();
    assert_eq!(
        snapshot.status,
        pixelforge::batch::ProcessingStatus::Completed
    );
    assert_eq!(snapshot.current, 1);
    assert_eq!(snapshot.total, 1);
    assert!((snapshot.percentage - 100.0).abs() < f64::EPSILON);
}

#[test]
fn per_item_overrides_apply() {
    let h = TestHarness::with_config(|config| {
        config.conversion.formats = vec![TargetFormat::Avif, TargetFormat::Webp];
    });
    h.write_png("tuned.png", 8, 8);

    // Overrides narrow this item to WebP only, so the native backend
    // succeeds cleanly despite AVIF being configured.
    let conn = h.db.get().unwrap();
    let id = queue::enqueue(&conn, "tuned.png", Some(r#"{"formats":["webp"]}"#), 0)
        .unwrap()
        .id();
    drop(conn);

    let report = h.ctx.runner.run_batch(5).unwrap();
    assert_eq!(report.processed, 1);

    let conn = h.db.get().unwrap();
    assert_eq!(
        queue::get_item(&conn, id).unwrap().status,
        JobStatus::Completed
    );
    assert!(h.root.path().join("tuned.png.webp").exists());
    assert!(!h.root.path().join("tuned.png.avif").exists());
}
