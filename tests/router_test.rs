//! Router dispatch tests
//!
//! One edit may fire field syncs and any number of transfers; header edits
//! and non-matching trigger values fire nothing.

use std::sync::Arc;
use std::time::Duration;

use rowsync::audit::MemoryAuditSink;
use rowsync::config::{ColumnPair, MirrorSide, RetryConfig};
use rowsync::{
	CellValue, Config, DuplicateCheckPolicy, EditEvent, EngineContext, MemoryStore, ResultCode, Router,
	SyncPairSpec, TableStore, TransferSpec,
};

fn t(s: &str) -> CellValue {
	CellValue::text(s)
}

fn store() -> Arc<MemoryStore> {
	let store = MemoryStore::new();
	store.insert_table(
		"Forecast",
		vec![vec![t("Project"), t("Status"), t("Lead")], vec![t("Acme"), t("pending"), t("Kim")]],
	);
	store.create_table("Upcoming", vec![t("Project"), t("Lead"), t("Status")]);
	store.create_table("Inventory", vec![t("Project")]);
	store.insert_table("Billing", vec![vec![t("Project"), t("Lead")], vec![t("acme"), t("Kim")]]);
	Arc::new(store)
}

fn config() -> Config {
	let mut config = Config::default();
	config.retry = RetryConfig::new(2, Duration::from_millis(1));
	config.transfers = vec![
		TransferSpec::new(
			"forecast-to-upcoming",
			"Forecast",
			"Upcoming",
			vec![ColumnPair::new(1, 1), ColumnPair::new(3, 2), ColumnPair::new(2, 3)],
		)
		.with_trigger(2, "Approved")
		.with_duplicate_check(DuplicateCheckPolicy::new(ColumnPair::new(1, 1))),
		TransferSpec::new("forecast-to-inventory", "Forecast", "Inventory", vec![ColumnPair::new(1, 1)])
			.with_trigger(2, "approved")
			.with_duplicate_check(DuplicateCheckPolicy::new(ColumnPair::new(1, 1))),
		TransferSpec::new("forecast-archive", "Forecast", "Inventory", vec![ColumnPair::new(1, 1)])
			.with_trigger(2, "cancelled"),
	];
	config.syncs = vec![SyncPairSpec::new(
		"lead",
		MirrorSide::new("Forecast", 1, 3),
		MirrorSide::new("Billing", 1, 2),
	)];
	config
}

fn router(store: Arc<MemoryStore>) -> (Router, Arc<MemoryAuditSink>) {
	let audit = Arc::new(MemoryAuditSink::new());
	let store: Arc<dyn TableStore> = store;
	let ctx = EngineContext::builder(config(), store).audit(audit.clone()).build();
	(Router::new(ctx), audit)
}

async fn edit(store: &MemoryStore, table: &str, row: usize, column: usize, value: &str) -> EditEvent {
	store.write_cell(table, row, column, t(value)).await.unwrap();
	EditEvent::new(table, row, column).with_values(CellValue::Empty, t(value))
}

#[tokio::test]
async fn test_trigger_fires_every_matching_transfer() {
	let store = store();
	let (router, audit) = router(store.clone());

	let event = edit(&store, "Forecast", 2, 2, "APPROVED").await;
	let entries = router.dispatch(&event).await;

	let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
	assert_eq!(actions, vec!["forecast-to-upcoming", "forecast-to-inventory"]);
	assert!(entries.iter().all(|e| e.result == ResultCode::Success));
	assert_eq!(store.rows("Upcoming").unwrap()[1], vec![t("Acme"), t("Kim"), t("APPROVED")]);
	assert_eq!(store.rows("Inventory").unwrap().len(), 2);
	assert_eq!(audit.entries().len(), 2);
}

#[tokio::test]
async fn test_repeated_trigger_is_deduplicated() {
	let store = store();
	let (router, _audit) = router(store.clone());

	let event = edit(&store, "Forecast", 2, 2, "approved").await;
	router.dispatch(&event).await;
	let entries = router.dispatch(&event).await;

	assert!(entries.iter().all(|e| e.result == ResultCode::SkippedDuplicate));
	assert_eq!(store.rows("Upcoming").unwrap().len(), 2);
}

#[tokio::test]
async fn test_non_matching_value_fires_nothing() {
	let store = store();
	let (router, audit) = router(store.clone());

	let event = edit(&store, "Forecast", 2, 2, "on hold").await;
	assert!(router.dispatch(&event).await.is_empty());
	assert!(audit.entries().is_empty());
	assert_eq!(store.rows("Upcoming").unwrap().len(), 1);
}

#[tokio::test]
async fn test_header_edit_ignored() {
	let store = store();
	let (router, _audit) = router(store.clone());

	let event = EditEvent::new("Forecast", 1, 2).with_values(t("Status"), t("approved"));
	assert!(router.dispatch(&event).await.is_empty());
}

#[tokio::test]
async fn test_watched_field_runs_sync() {
	let store = store();
	let (router, _audit) = router(store.clone());

	let event = edit(&store, "Forecast", 2, 3, "Lee").await;
	let entries = router.dispatch(&event).await;

	assert_eq!(entries.len(), 1);
	assert_eq!(entries[0].action, "lead");
	assert_eq!(entries[0].result, ResultCode::Success);
	assert_eq!(store.rows("Billing").unwrap()[1][1], t("Lee"));

	// Echo from the mirrored side settles without a write
	let echo = EditEvent::new("Billing", 2, 2).with_values(t("Kim"), t("Lee"));
	let entries = router.dispatch(&echo).await;
	assert_eq!(entries.len(), 1);
	assert_eq!(entries[0].result, ResultCode::SkippedDuplicate);
}

// vim: ts=4
