//! Integration tests for the CSV ingestion pipeline
//!
//! These tests drive the full producer, channel and worker pool against an
//! in-memory writer, so no database is needed. They verify:
//! - Batch boundaries and per-worker ordering
//! - Batch isolation when a row is malformed
//! - Row accounting across decode skips and rollbacks
//! - The buffered-rows bound under concurrency
//! - Fatal connection loss and truncated input

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use wardbase_server::ingest::{IngestError, MalformedRowPolicy, PipelineConfig, PipelineCoordinator};

mod common;

use common::{ward_csv, FailingReader, RecordingWriter, HEADER};

fn coordinator(writer: &Arc<RecordingWriter>, config: PipelineConfig) -> PipelineCoordinator {
    PipelineCoordinator::new(writer.clone(), config)
}

fn input(text: impl Into<Vec<u8>>) -> Cursor<Vec<u8>> {
    Cursor::new(text.into())
}

/// `ward_csv(rows)` with the data rows at `short` (0-based) cut to three fields
fn csv_with_short_rows(rows: usize, short: &[usize]) -> String {
    let mut out = format!("{HEADER}\n");
    for i in 0..rows {
        if short.contains(&i) {
            out.push_str(&format!("District {i},Mandal {i},Village {i}\n"));
        } else {
            out.push_str(&common::ward_line(i));
            out.push('\n');
        }
    }
    out
}

fn sorted_desc(mut sizes: Vec<usize>) -> Vec<usize> {
    sizes.sort_unstable_by(|a, b| b.cmp(a));
    sizes
}

// ============================================================================
// Batch boundaries
// ============================================================================

#[tokio::test]
async fn test_1500_rows_single_worker_commits_two_transactions() {
    let writer = Arc::new(RecordingWriter::new());
    let pipeline = coordinator(&writer, PipelineConfig::default().with_workers(1));

    let summary = pipeline.run(input(ward_csv(1500))).await.unwrap();

    assert_eq!(summary.rows_received, 1500);
    assert_eq!(summary.rows_committed, 1500);
    assert_eq!(summary.batches_committed, 2);
    assert_eq!(writer.committed_batch_sizes(), vec![1000, 500]);
    assert_eq!(writer.committed_rows().len(), 1500);
}

#[tokio::test]
async fn test_1500_rows_default_pool_commits_every_row_once() {
    let writer = Arc::new(RecordingWriter::new());
    let pipeline = coordinator(&writer, PipelineConfig::default());

    let summary = pipeline.run(input(ward_csv(1500))).await.unwrap();

    assert_eq!(summary.rows_committed, 1500);
    assert_eq!(summary.batches_committed, 2);
    assert_eq!(summary.batches_failed, 0);
    assert_eq!(sorted_desc(writer.committed_batch_sizes()), vec![1000, 500]);

    let mut lines: Vec<u64> = writer.attempts().into_iter().flat_map(|a| a.lines).collect();
    lines.sort_unstable();
    let expected: Vec<u64> = (2..=1501).collect();
    assert_eq!(lines, expected);
}

#[tokio::test]
async fn test_threshold_plus_one_rows_produce_full_and_single_batches() {
    let writer = Arc::new(RecordingWriter::new());
    let pipeline = coordinator(&writer, PipelineConfig::default());

    let summary = pipeline.run(input(ward_csv(1001))).await.unwrap();

    assert_eq!(summary.rows_committed, 1001);
    assert_eq!(sorted_desc(writer.committed_batch_sizes()), vec![1000, 1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_default_pool_batch_shapes_on_multi_thread_runtime() {
    let writer = Arc::new(RecordingWriter::new());
    let pipeline = coordinator(&writer, PipelineConfig::default());

    pipeline.run(input(ward_csv(1001))).await.unwrap();

    assert_eq!(sorted_desc(writer.committed_batch_sizes()), vec![1000, 1]);
}

#[tokio::test]
async fn test_header_only_commits_nothing() {
    let writer = Arc::new(RecordingWriter::new());
    let pipeline = coordinator(&writer, PipelineConfig::default());

    let summary = pipeline.run(input(format!("{HEADER}\n"))).await.unwrap();

    assert_eq!(summary.rows_received, 0);
    assert_eq!(summary.rows_committed, 0);
    assert_eq!(summary.batches_committed, 0);
    assert!(writer.attempts().is_empty());
}

#[tokio::test]
async fn test_empty_stream_fails_without_writing() {
    let writer = Arc::new(RecordingWriter::new());
    let pipeline = coordinator(&writer, PipelineConfig::default());

    let result = pipeline.run(input(Vec::new())).await;

    assert!(matches!(result, Err(IngestError::MissingHeader)));
    assert!(writer.attempts().is_empty());
}

#[tokio::test]
async fn test_rows_within_a_worker_keep_channel_order() {
    let writer = Arc::new(RecordingWriter::new());
    let config = PipelineConfig::default().with_workers(3).with_batch_size(8);
    let pipeline = coordinator(&writer, config);

    pipeline.run(input(ward_csv(200))).await.unwrap();

    for worker_id in 0..3 {
        let attempts: Vec<_> =
            writer.attempts().into_iter().filter(|a| a.worker_id == worker_id).collect();
        let sequences: Vec<u64> = attempts.iter().map(|a| a.sequence).collect();
        let lines: Vec<u64> = attempts.iter().flat_map(|a| a.lines.clone()).collect();

        assert!(sequences.windows(2).all(|w| w[0] < w[1]));
        assert!(lines.windows(2).all(|w| w[0] < w[1]));
    }
}

// ============================================================================
// Malformed rows
// ============================================================================

#[tokio::test]
async fn test_malformed_row_rolls_back_only_its_batch() {
    let writer = Arc::new(RecordingWriter::new());
    let config = PipelineConfig::default().with_workers(1).with_batch_size(10);
    let pipeline = coordinator(&writer, config);

    // Data row 14 sits on line 16, inside the second batch (lines 12..=21)
    let summary = pipeline.run(input(csv_with_short_rows(35, &[14]))).await.unwrap();

    assert_eq!(summary.rows_received, 35);
    assert_eq!(summary.batches_committed, 3);
    assert_eq!(summary.batches_failed, 1);
    assert_eq!(summary.rows_failed, 10);
    assert_eq!(summary.rows_committed, 25);

    let failure = &summary.failed_batches[0];
    assert_eq!(failure.sequence, 1);
    assert_eq!(failure.first_line, Some(12));
    assert!(failure.error.contains("line 16"));

    // Nothing from the rolled back batch is visible
    let committed = writer.committed_rows();
    assert_eq!(committed.len(), 25);
    assert!(!committed.iter().any(|r| r.district == "District 10"));
    assert!(committed.iter().any(|r| r.district == "District 20"));
}

#[tokio::test]
async fn test_malformed_row_isolation_with_worker_pool() {
    let writer = Arc::new(RecordingWriter::new());
    let config = PipelineConfig::default().with_workers(4).with_batch_size(16);
    let pipeline = coordinator(&writer, config);

    let summary = pipeline.run(input(csv_with_short_rows(300, &[123]))).await.unwrap();

    assert_eq!(summary.batches_failed, 1);
    assert!(summary.rows_failed >= 1 && summary.rows_failed <= 16);
    assert_eq!(summary.rows_committed, 300 - summary.rows_failed);
    assert!(summary.failed_batches[0].error.contains("line 125"));
}

#[tokio::test]
async fn test_skip_row_policy_drops_only_bad_rows() {
    let writer = Arc::new(RecordingWriter::new());
    let config = PipelineConfig::default()
        .with_workers(1)
        .with_batch_size(10)
        .with_malformed_rows(MalformedRowPolicy::SkipRow);
    let pipeline = coordinator(&writer, config);

    let summary = pipeline.run(input(csv_with_short_rows(25, &[3, 17]))).await.unwrap();

    assert_eq!(summary.rows_received, 25);
    assert_eq!(summary.rows_malformed, 2);
    assert_eq!(summary.batches_failed, 0);
    assert_eq!(summary.rows_committed, 23);
    assert_eq!(writer.committed_batch_sizes(), vec![10, 10, 3]);
}

#[tokio::test]
async fn test_undecodable_row_is_skipped_before_the_channel() {
    let writer = Arc::new(RecordingWriter::new());
    let pipeline = coordinator(&writer, PipelineConfig::default().with_workers(2));

    let mut csv = ward_csv(20).into_bytes();
    csv.extend_from_slice(b"Dis\xfftrict,Mandal,Village,MP,MLA,3\n");
    csv.extend_from_slice(format!("{}\n", common::ward_line(20)).as_bytes());

    let summary = pipeline.run(input(csv)).await.unwrap();

    assert_eq!(summary.rows_skipped, 1);
    assert_eq!(summary.rows_received, 21);
    assert_eq!(summary.rows_committed, 21);
}

#[tokio::test]
async fn test_committed_rows_account_for_skips_and_rollbacks() {
    let writer = Arc::new(RecordingWriter::new());
    let config = PipelineConfig::default().with_workers(5).with_batch_size(7);
    let pipeline = coordinator(&writer, config);

    let mut csv = csv_with_short_rows(400, &[5, 150, 151, 399]).into_bytes();
    csv.extend_from_slice(b"\xff\xfe,b,c,d,e,f\n");
    let data_rows = 401;

    let summary = pipeline.run(input(csv)).await.unwrap();

    assert_eq!(summary.rows_received + summary.rows_skipped, data_rows);
    assert_eq!(
        summary.rows_committed,
        data_rows - summary.rows_skipped - summary.rows_failed
    );
    assert_eq!(writer.committed_rows().len() as u64, summary.rows_committed);
}

#[tokio::test]
async fn test_quoted_fields_are_stored_verbatim() {
    let writer = Arc::new(RecordingWriter::new());
    let pipeline = coordinator(&writer, PipelineConfig::default());

    let csv = format!("{HEADER}\n\"Guntur, East\",Tenali,Kollipara,MP 1,MLA 2,007\n");
    pipeline.run(input(csv)).await.unwrap();

    let rows = writer.committed_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].district, "Guntur, East");
    // Ward counts stay text
    assert_eq!(rows[0].no_of_wards, "007");
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_buffered_rows_never_exceed_workers_times_threshold() {
    // Slow writes keep every worker busy, so the channel backs up
    let writer = Arc::new(RecordingWriter::new().with_delay(Duration::from_millis(5)));
    let config = PipelineConfig::default().with_workers(4).with_batch_size(25);
    let bound = config.max_buffered_rows();
    let pipeline = coordinator(&writer, config);

    let summary = pipeline.run(input(ward_csv(1000))).await.unwrap();

    assert_eq!(summary.rows_committed, 1000);
    assert!(summary.peak_buffered_rows as usize <= bound);
    // More than one batch was held at once, so the gauge saw the pool
    assert!(summary.peak_buffered_rows > 25);
    assert!(writer.peak_in_flight_rows() <= bound);
    assert!(writer.committed_batch_sizes().iter().all(|&n| n == 25));
}

#[tokio::test]
async fn test_rerunning_an_upload_duplicates_rows() {
    let writer = Arc::new(RecordingWriter::new());
    let pipeline = coordinator(&writer, PipelineConfig::default().with_workers(3));

    let first = pipeline.run(input(ward_csv(120))).await.unwrap();
    let second = pipeline.run(input(ward_csv(120))).await.unwrap();

    assert_ne!(first.run_id, second.run_id);
    let rows = writer.committed_rows();
    assert_eq!(rows.len(), 240);
    assert_eq!(rows.iter().filter(|r| r.district == "District 7").count(), 2);
}

// ============================================================================
// Fatal errors and truncated input
// ============================================================================

#[tokio::test]
async fn test_connection_loss_aborts_the_run() {
    let writer = Arc::new(RecordingWriter::new().losing_connection_after(2));
    let config = PipelineConfig::default().with_workers(1).with_batch_size(10);
    let pipeline = coordinator(&writer, config);

    let result = pipeline.run(input(ward_csv(100))).await;

    assert!(matches!(result, Err(IngestError::Connection(sqlx::Error::PoolClosed))));
    // Batches committed before the failure stay committed
    assert_eq!(writer.committed_rows().len(), 20);
    assert_eq!(writer.attempts().len(), 3);
}

#[tokio::test]
async fn test_connection_loss_stops_every_worker() {
    let writer = Arc::new(RecordingWriter::new().losing_connection_after(0));
    let config = PipelineConfig::default().with_workers(4).with_batch_size(10);
    let pipeline = coordinator(&writer, config);

    let result = pipeline.run(input(ward_csv(5000))).await;

    assert!(matches!(result, Err(IngestError::Connection(_))));
    assert!(writer.committed_rows().is_empty());
    // At most one attempt per worker before cancellation is observed
    assert!(writer.attempts().len() <= 4);
}

#[tokio::test]
async fn test_read_failure_truncates_but_keeps_committed_rows() {
    let writer = Arc::new(RecordingWriter::new());
    let pipeline = coordinator(&writer, PipelineConfig::default().with_workers(2));

    let summary = pipeline.run(FailingReader::new(ward_csv(30))).await.unwrap();

    assert!(summary.stream_truncated);
    assert!(summary.rows_received <= 30);
    assert_eq!(summary.rows_committed, summary.rows_received);
}

#[tokio::test]
async fn test_read_failure_before_header_is_fatal() {
    let writer = Arc::new(RecordingWriter::new());
    let pipeline = coordinator(&writer, PipelineConfig::default());

    let result = pipeline.run(FailingReader::new(Vec::new())).await;

    assert!(matches!(result, Err(IngestError::Header(_))));
    assert!(writer.attempts().is_empty());
}
