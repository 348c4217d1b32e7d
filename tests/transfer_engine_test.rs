//! Transfer engine tests
//!
//! Drives `TransferEngine` over an in-memory store:
//! - exactly-once appends (idempotency, normalized duplicate keys)
//! - full-width destination rows
//! - skip outcomes (missing key, no lock)
//! - failure handling (missing destination, transient store errors, reorder)

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rowsync::audit::MemoryAuditSink;
use rowsync::config::{ColumnPair, PostTransferAction, RetryConfig};
use rowsync::error::StoreError;
use rowsync::lock::LockGuard;
use rowsync::store::StoreResult;
use rowsync::{
	CallbackBuilder, CellValue, Config, DuplicateCheckPolicy, EditEvent, EngineContext, LockProvider, MemoryStore,
	ProcessLock, ResultCode, Row, TableStore, TransferEngine, TransferSpec,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn t(s: &str) -> CellValue {
	CellValue::text(s)
}

fn forecast_store() -> MemoryStore {
	let store = MemoryStore::new();
	store.insert_table(
		"Forecast",
		vec![
			vec![t("Project"), t("Status"), t("Due")],
			vec![t("Acme"), t("approved"), CellValue::date(2024, 5, 10).unwrap()],
			vec![CellValue::Empty, t("approved"), CellValue::Empty],
			vec![t("Zeta"), t("approved"), CellValue::date(2024, 1, 2).unwrap()],
		],
	);
	store.create_table("Upcoming", vec![t("Project"), t("Room"), t("Status")]);
	store
}

fn forecast_to_upcoming() -> TransferSpec {
	TransferSpec::new("forecast-to-upcoming", "Forecast", "Upcoming", vec![ColumnPair::new(1, 1), ColumnPair::new(2, 3)])
		.with_source_columns(vec![1, 2])
		.with_duplicate_check(DuplicateCheckPolicy::new(ColumnPair::new(1, 1)))
}

fn test_config(spec: TransferSpec) -> Config {
	let mut config = Config::default();
	config.acting_user = "tester".to_string();
	config.retry = RetryConfig::new(3, Duration::from_millis(1));
	config.lock.timeout_ms = 2000;
	config.transfers = vec![spec];
	config
}

struct Harness {
	engine: TransferEngine,
	audit: Arc<MemoryAuditSink>,
	notices: Arc<Mutex<Vec<String>>>,
	written: Arc<Mutex<Vec<(String, usize)>>>,
}

fn harness(config: Config, store: Arc<dyn TableStore>) -> Harness {
	harness_with_lock(config, store, Arc::new(ProcessLock::new()))
}

fn harness_with_lock(config: Config, store: Arc<dyn TableStore>, lock: Arc<dyn LockProvider>) -> Harness {
	let audit = Arc::new(MemoryAuditSink::new());
	let notices = Arc::new(Mutex::new(Vec::new()));
	let written = Arc::new(Mutex::new(Vec::new()));
	let (n, w) = (notices.clone(), written.clone());
	let callbacks = CallbackBuilder::new()
		.on_notify(move |subject, _err, _table| n.lock().unwrap().push(subject.to_string()))
		.on_row_written(move |table, row| w.lock().unwrap().push((table.to_string(), row)))
		.build();
	let ctx = EngineContext::builder(config, store).lock(lock).audit(audit.clone()).callbacks(callbacks).build();
	Harness { engine: TransferEngine::new(ctx), audit, notices, written }
}

/// Store wrapper with injectable failures
struct FlakyStore {
	inner: MemoryStore,
	/// Number of upcoming append calls that fail
	failing_appends: AtomicUsize,
	/// Whether a failing append still lands in the table
	land_failed_appends: bool,
	failing_width_reads: AtomicUsize,
	fail_sort: AtomicBool,
	append_calls: AtomicUsize,
}

impl FlakyStore {
	fn new(inner: MemoryStore) -> Self {
		FlakyStore {
			inner,
			failing_appends: AtomicUsize::new(0),
			land_failed_appends: false,
			failing_width_reads: AtomicUsize::new(0),
			fail_sort: AtomicBool::new(false),
			append_calls: AtomicUsize::new(0),
		}
	}

	fn take_failure(counter: &AtomicUsize) -> bool {
		counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
	}
}

fn unavailable() -> StoreError {
	StoreError::Unavailable { message: "service busy".to_string() }
}

#[async_trait]
impl TableStore for FlakyStore {
	async fn has_table(&self, table: &str) -> bool {
		self.inner.has_table(table).await
	}

	async fn width(&self, table: &str) -> StoreResult<usize> {
		if Self::take_failure(&self.failing_width_reads) {
			return Err(unavailable());
		}
		self.inner.width(table).await
	}

	async fn last_row(&self, table: &str) -> StoreResult<usize> {
		self.inner.last_row(table).await
	}

	async fn read_range(
		&self,
		table: &str,
		row: usize,
		col: usize,
		num_rows: usize,
		num_cols: usize,
	) -> StoreResult<Vec<Row>> {
		self.inner.read_range(table, row, col, num_rows, num_cols).await
	}

	async fn append_row(&self, table: &str, row: Row) -> StoreResult<usize> {
		self.append_calls.fetch_add(1, Ordering::SeqCst);
		if Self::take_failure(&self.failing_appends) {
			if self.land_failed_appends {
				self.inner.append_row(table, row).await?;
			}
			return Err(unavailable());
		}
		self.inner.append_row(table, row).await
	}

	async fn write_cell(&self, table: &str, row: usize, col: usize, value: CellValue) -> StoreResult<()> {
		self.inner.write_cell(table, row, col, value).await
	}

	async fn sort_region(&self, table: &str, start_row: usize, col: usize, ascending: bool) -> StoreResult<()> {
		if self.fail_sort.load(Ordering::SeqCst) {
			return Err(unavailable());
		}
		self.inner.sort_region(table, start_row, col, ascending).await
	}
}

fn data_rows(store: &MemoryStore, table: &str) -> Vec<Row> {
	store.rows(table).unwrap().into_iter().skip(1).collect()
}

// ============================================================================
// Exactly-once transfers
// ============================================================================

#[tokio::test]
async fn test_transfer_builds_mapped_row() {
	let store = Arc::new(forecast_store());
	let h = harness(test_config(forecast_to_upcoming()), store.clone());

	let entry = h.engine.transfer_row("forecast-to-upcoming", 2).await;

	assert_eq!(entry.result, ResultCode::Success, "{:?}", entry);
	assert_eq!(entry.project, "Acme");
	assert_eq!(entry.user, "tester");
	assert_eq!(data_rows(&store, "Upcoming"), vec![vec![t("Acme"), CellValue::Empty, t("approved")]]);
	assert!(h.notices.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_transfer_is_idempotent() {
	let store = Arc::new(forecast_store());
	let h = harness(test_config(forecast_to_upcoming()), store.clone());
	let spec = forecast_to_upcoming();
	let event = EditEvent::new("Forecast", 2, 2).with_values(CellValue::Empty, t("approved"));

	let first = h.engine.execute_transfer(&event, &spec).await;
	let second = h.engine.execute_transfer(&event, &spec).await;
	let third = h.engine.execute_transfer(&event, &spec).await;

	assert_eq!(first.result, ResultCode::Success);
	assert_eq!(second.result, ResultCode::SkippedDuplicate);
	assert_eq!(third.result, ResultCode::SkippedDuplicate);
	assert_eq!(data_rows(&store, "Upcoming").len(), 1);
	assert_eq!(h.audit.entries().len(), 3);
}

#[tokio::test]
async fn test_normalized_key_is_duplicate() {
	let store = Arc::new(forecast_store());
	store.insert_table(
		"Upcoming",
		vec![vec![t("Project"), t("Room"), t("Status")], vec![t("  ACME"), t("Lobby"), t("approved")]],
	);
	let h = harness(test_config(forecast_to_upcoming()), store.clone());

	let entry = h.engine.transfer_row("forecast-to-upcoming", 2).await;

	assert_eq!(entry.result, ResultCode::SkippedDuplicate);
	assert_eq!(data_rows(&store, "Upcoming").len(), 1);
}

#[tokio::test]
async fn test_compound_key_distinguishes_dates() {
	let store = Arc::new(forecast_store());
	let spec = TransferSpec::new(
		"by-due",
		"Forecast",
		"Upcoming",
		vec![ColumnPair::new(1, 1), ColumnPair::new(3, 2)],
	)
	.with_duplicate_check(DuplicateCheckPolicy::new(ColumnPair::new(1, 1)).with_compound(vec![ColumnPair::new(3, 2)]));
	store.insert_table(
		"Upcoming",
		vec![
			vec![t("Project"), t("Due"), t("Status")],
			vec![t("Acme"), CellValue::date(2024, 6, 1).unwrap(), CellValue::Empty],
		],
	);
	let h = harness(test_config(spec), store.clone());

	// Same project, different due date: a distinct key
	let entry = h.engine.transfer_row("by-due", 2).await;
	assert_eq!(entry.result, ResultCode::Success);

	let entry = h.engine.transfer_row("by-due", 2).await;
	assert_eq!(entry.result, ResultCode::SkippedDuplicate);
	assert_eq!(data_rows(&store, "Upcoming").len(), 2);
}

#[tokio::test]
async fn test_disabled_duplicate_check_appends_every_time() {
	let store = Arc::new(forecast_store());
	let spec = TransferSpec::new("log", "Forecast", "Upcoming", vec![ColumnPair::new(1, 1)])
		.with_duplicate_check(DuplicateCheckPolicy::new(ColumnPair::new(1, 1)).disabled());
	let h = harness(test_config(spec), store.clone());

	assert_eq!(h.engine.transfer_row("log", 2).await.result, ResultCode::Success);
	assert_eq!(h.engine.transfer_row("log", 2).await.result, ResultCode::Success);
	assert_eq!(data_rows(&store, "Upcoming").len(), 2);
}

// ============================================================================
// Destination row shape
// ============================================================================

#[tokio::test]
async fn test_appended_row_spans_destination_width() {
	let store = Arc::new(forecast_store());
	store.create_table("Upcoming", vec![t("Project"), t("Room"), t("Status"), t("Notes"), t("Owner"), t("Edited")]);
	let h = harness(test_config(forecast_to_upcoming()), store.clone());

	let entry = h.engine.transfer_row("forecast-to-upcoming", 2).await;
	assert_eq!(entry.result, ResultCode::Success);

	let rows = data_rows(&store, "Upcoming");
	assert_eq!(rows[0].len(), 6);
	assert_eq!(rows[0][0], t("Acme"));
	assert_eq!(rows[0][2], t("approved"));
	for i in [1, 3, 4, 5] {
		assert_eq!(rows[0][i], CellValue::Empty, "column {} must stay empty", i + 1);
	}
}

// ============================================================================
// Skip outcomes
// ============================================================================

#[tokio::test]
async fn test_missing_identity_is_skipped_without_notification() {
	let store = Arc::new(forecast_store());
	let h = harness(test_config(forecast_to_upcoming()), store.clone());

	let entry = h.engine.transfer_row("forecast-to-upcoming", 3).await;

	assert_eq!(entry.result, ResultCode::SkippedMissingKey);
	assert!(data_rows(&store, "Upcoming").is_empty());
	assert!(h.notices.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_header_row_is_missing_key() {
	let store = Arc::new(forecast_store());
	let h = harness(test_config(forecast_to_upcoming()), store.clone());

	let entry = h.engine.transfer_row("forecast-to-upcoming", 1).await;
	assert_eq!(entry.result, ResultCode::SkippedMissingKey);
	assert!(data_rows(&store, "Upcoming").is_empty());
}

#[tokio::test]
async fn test_row_outside_grid_is_skipped() {
	let store = Arc::new(forecast_store());
	let h = harness(test_config(forecast_to_upcoming()), store.clone());

	let entry = h.engine.transfer_row("forecast-to-upcoming", usize::MAX).await;

	assert_eq!(entry.result, ResultCode::SkippedMissingKey);
	assert!(entry.error.as_deref().unwrap_or("").contains("outside the grid"));
	assert!(data_rows(&store, "Upcoming").is_empty());
	assert!(h.notices.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_lock_timeout_skips() {
	let store = Arc::new(forecast_store());
	let lock: Arc<dyn LockProvider> = Arc::new(ProcessLock::new());
	let mut config = test_config(forecast_to_upcoming());
	config.lock.timeout_ms = 50;
	let h = harness_with_lock(config, store.clone(), lock.clone());

	let held = LockGuard::acquire(lock.clone(), Duration::from_millis(10)).await.expect("lock is free");
	let entry = h.engine.transfer_row("forecast-to-upcoming", 2).await;
	drop(held);

	assert_eq!(entry.result, ResultCode::SkippedNoLock);
	assert!(entry.detail.contains("50 ms"));
	assert!(data_rows(&store, "Upcoming").is_empty());

	// Released lock is usable again
	let entry = h.engine.transfer_row("forecast-to-upcoming", 2).await;
	assert_eq!(entry.result, ResultCode::Success);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_missing_destination_is_error_with_one_notification() {
	let store = Arc::new(forecast_store());
	let spec = TransferSpec::new("to-nowhere", "Forecast", "Archive", vec![ColumnPair::new(1, 1)]);
	let h = harness(test_config(spec), store.clone());

	let entry = h.engine.transfer_row("to-nowhere", 2).await;

	assert_eq!(entry.result, ResultCode::Error);
	assert!(entry.error.as_deref().unwrap_or("").contains("Archive"));
	assert_eq!(*h.notices.lock().unwrap(), vec!["to-nowhere failed".to_string()]);
	assert_eq!(h.audit.count(ResultCode::Error), 1);
}

#[tokio::test]
async fn test_unknown_transfer_is_error() {
	let store = Arc::new(forecast_store());
	let h = harness(test_config(forecast_to_upcoming()), store);

	let entry = h.engine.transfer_row("nope", 2).await;
	assert_eq!(entry.result, ResultCode::Error);
	assert_eq!(h.notices.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_transient_read_failure_is_retried() {
	let flaky = Arc::new(FlakyStore::new(forecast_store()));
	flaky.failing_width_reads.store(2, Ordering::SeqCst);
	let h = harness(test_config(forecast_to_upcoming()), flaky.clone());

	let entry = h.engine.transfer_row("forecast-to-upcoming", 2).await;

	assert_eq!(entry.result, ResultCode::Success);
	assert_eq!(data_rows(&flaky.inner, "Upcoming").len(), 1);
}

#[tokio::test]
async fn test_persistent_failure_exhausts_retries() {
	let flaky = Arc::new(FlakyStore::new(forecast_store()));
	flaky.failing_width_reads.store(100, Ordering::SeqCst);
	let h = harness(test_config(forecast_to_upcoming()), flaky.clone());

	let entry = h.engine.transfer_row("forecast-to-upcoming", 2).await;

	assert_eq!(entry.result, ResultCode::Error);
	assert!(entry.error.as_deref().unwrap_or("").contains("3 attempt"), "{:?}", entry.error);
	assert_eq!(h.notices.lock().unwrap().len(), 1);
	// First width read failed three times, nothing else ran
	assert_eq!(flaky.failing_width_reads.load(Ordering::SeqCst), 97);
	assert_eq!(flaky.append_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_append_that_landed_is_not_repeated() {
	let mut flaky = FlakyStore::new(forecast_store());
	flaky.land_failed_appends = true;
	flaky.failing_appends.store(1, Ordering::SeqCst);
	let flaky = Arc::new(flaky);
	let h = harness(test_config(forecast_to_upcoming()), flaky.clone());

	h.engine.transfer_row("forecast-to-upcoming", 2).await;

	assert_eq!(flaky.append_calls.load(Ordering::SeqCst), 1);
	assert_eq!(data_rows(&flaky.inner, "Upcoming").len(), 1);
}

#[tokio::test]
async fn test_failed_append_is_retried_with_duplicate_check() {
	let flaky = Arc::new(FlakyStore::new(forecast_store()));
	flaky.failing_appends.store(1, Ordering::SeqCst);
	let h = harness(test_config(forecast_to_upcoming()), flaky.clone());

	let entry = h.engine.transfer_row("forecast-to-upcoming", 2).await;

	assert_eq!(entry.result, ResultCode::Success);
	assert_eq!(flaky.append_calls.load(Ordering::SeqCst), 2);
	assert_eq!(data_rows(&flaky.inner, "Upcoming").len(), 1);
}

#[tokio::test]
async fn test_append_without_duplicate_check_is_not_retried() {
	let flaky = Arc::new(FlakyStore::new(forecast_store()));
	flaky.failing_appends.store(1, Ordering::SeqCst);
	let spec = TransferSpec::new("log", "Forecast", "Upcoming", vec![ColumnPair::new(1, 1)]);
	let h = harness(test_config(spec), flaky.clone());

	let entry = h.engine.transfer_row("log", 2).await;

	assert_eq!(entry.result, ResultCode::Error);
	assert_eq!(flaky.append_calls.load(Ordering::SeqCst), 1);
	assert!(data_rows(&flaky.inner, "Upcoming").is_empty());
}

// ============================================================================
// Post-transfer reorder and tracking
// ============================================================================

#[tokio::test]
async fn test_reorder_after_transfer() {
	let store = Arc::new(forecast_store());
	let spec = forecast_to_upcoming().with_post_transfer(PostTransferAction::SortBy { column: 1, ascending: false });
	let mut config = test_config(spec);
	config.tracked_tables = vec!["Upcoming".to_string()];
	let h = harness(config, store.clone());

	h.engine.transfer_row("forecast-to-upcoming", 2).await;
	h.engine.transfer_row("forecast-to-upcoming", 4).await;

	let projects: Vec<CellValue> = data_rows(&store, "Upcoming").into_iter().map(|r| r[0].clone()).collect();
	assert_eq!(projects, vec![t("Zeta"), t("Acme")]);
	assert_eq!(
		*h.written.lock().unwrap(),
		vec![("Upcoming".to_string(), 2), ("Upcoming".to_string(), 3)]
	);
}

#[tokio::test]
async fn test_reorder_failure_keeps_transfer() {
	let flaky = Arc::new(FlakyStore::new(forecast_store()));
	flaky.fail_sort.store(true, Ordering::SeqCst);
	let spec = forecast_to_upcoming().with_post_transfer(PostTransferAction::SortBy { column: 1, ascending: true });
	let h = harness(test_config(spec), flaky.clone());

	let entry = h.engine.transfer_row("forecast-to-upcoming", 2).await;

	assert_eq!(entry.result, ResultCode::Success);
	assert!(entry.detail.contains("reorder failed"));
	assert_eq!(*h.notices.lock().unwrap(), vec!["reorder failed".to_string()]);
	assert_eq!(data_rows(&flaky.inner, "Upcoming").len(), 1);
}

#[tokio::test]
async fn test_untracked_destination_not_reported() {
	let store = Arc::new(forecast_store());
	let h = harness(test_config(forecast_to_upcoming()), store);

	h.engine.transfer_row("forecast-to-upcoming", 2).await;
	assert!(h.written.lock().unwrap().is_empty());
}

// vim: ts=4
