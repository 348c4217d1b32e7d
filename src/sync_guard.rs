//! Bidirectional field mirroring between two tables
//!
//! An edit of a mirrored field is copied to the counterpart row in the other
//! table. The counterpart is located by identity value, never by stored row
//! position. A write that would not change the normalized value is skipped,
//! which is what stops the other side's edit handler from bouncing the value
//! back forever.

use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, ResultCode};
use crate::config::{MirrorSide, SyncPairSpec};
use crate::context::EngineContext;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::key::{same_value, KeyOptions};
use crate::lock::LockGuard;
use crate::retry::with_retry;
use crate::store::{TableStore, FIRST_DATA_ROW};
use crate::types::{cell_at, CellValue, EditEvent};

/// What a sync did
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
	/// Counterpart cell at `row` was updated
	Written { row: usize },
	/// Counterpart at `row` already holds the same normalized value
	AlreadyInSync { row: usize },
	/// No counterpart row carries the identity value
	NoCounterpart,
	/// Edited row has no identity value
	MissingKey,
}

/// Mirrors fields between configured table pairs
#[derive(Clone)]
pub struct SyncGuard {
	ctx: EngineContext,
}

impl SyncGuard {
	pub fn new(ctx: EngineContext) -> Self {
		SyncGuard { ctx }
	}

	/// Propagate the edited field of `event` to the other side of `pair`
	///
	/// Never fails: every path ends in exactly one audit entry, which is
	/// also returned.
	pub async fn sync_field(&self, event: &EditEvent, pair: &SyncPairSpec) -> AuditEntry {
		let user = event.user.clone().unwrap_or_else(|| self.ctx.config.acting_user.clone());
		let entry = |result| AuditEntry::new(user.clone(), &pair.name, &event.table, event.row, result);

		let (edited, counterpart) = match pair.sides_for(&event.table, event.column) {
			Some(sides) => sides,
			None => {
				let err = SyncError::configuration(format!(
					"Sync pair '{}' does not watch {} column {}",
					pair.name, event.table, event.column
				));
				let failed = entry(ResultCode::Error).with_error(err.to_string());
				return self.ctx.reporter.report(failed, Some(&err)).await;
			}
		};

		let timeout = self.ctx.config.lock.timeout();
		let guard = match LockGuard::acquire(self.ctx.lock.clone(), timeout).await {
			Some(guard) => guard,
			None => {
				let skipped = entry(ResultCode::SkippedNoLock)
					.with_detail(format!("lock not acquired within {} ms", timeout.as_millis()));
				return self.ctx.reporter.report(skipped, None).await;
			}
		};

		let options = KeyOptions { date_aware: pair.date_aware };
		let mut project = String::new();
		let result = self.run(event.row, edited, counterpart, options, &mut project).await;
		drop(guard);

		let (entry, failure) = match result {
			Ok(SyncOutcome::Written { row }) => {
				let detail = format!("{} column {} updated at row {}", counterpart.table, counterpart.field_column, row);
				info!("{}: '{}' {}", pair.name, project, detail);
				(entry(ResultCode::Success).with_detail(detail), None)
			}
			Ok(SyncOutcome::AlreadyInSync { row }) => {
				let detail = format!("already in sync with {} row {}", counterpart.table, row);
				(entry(ResultCode::SkippedDuplicate).with_detail(detail), None)
			}
			Ok(SyncOutcome::NoCounterpart) => {
				let detail = format!("no counterpart row in {}", counterpart.table);
				(entry(ResultCode::SkippedMissingKey).with_detail(detail), None)
			}
			Ok(SyncOutcome::MissingKey) => {
				let detail = format!("no identity value in column {}", edited.identity_column);
				(entry(ResultCode::SkippedMissingKey).with_detail(detail), None)
			}
			Err(err) if err.kind() == ErrorKind::Validation => {
				let e = entry(ResultCode::SkippedMissingKey).with_detail("edited row not usable").with_error(err.to_string());
				(e, None)
			}
			Err(err) => {
				warn!("{}: sync from {}!{} failed: {}", pair.name, event.table, event.row, err);
				let e = entry(ResultCode::Error).with_detail(format!("{} failure", err.kind())).with_error(err.to_string());
				(e, Some(err))
			}
		};
		self.ctx.reporter.report(entry.with_project(project), failure.as_ref()).await
	}

	async fn run(
		&self,
		row: usize,
		edited: &MirrorSide,
		counterpart: &MirrorSide,
		options: KeyOptions,
		project: &mut String,
	) -> SyncResult<SyncOutcome> {
		let store: &dyn TableStore = self.ctx.store.as_ref();
		let retry = &self.ctx.config.retry;

		if !store.has_table(&counterpart.table).await {
			return Err(SyncError::configuration(format!("Mirror table '{}' not found", counterpart.table)));
		}
		if row < FIRST_DATA_ROW {
			return Ok(SyncOutcome::MissingKey);
		}

		// Current value under the lock, not the possibly stale event payload
		let span = edited.identity_column.max(edited.field_column);
		let table = edited.table.as_str();
		let cells = with_retry("read edited row", retry, move || async move {
			Ok::<_, SyncError>(store.read_range(table, row, 1, 1, span).await?)
		})
		.await?
		.into_iter()
		.next()
		.unwrap_or_default();

		let identity = cell_at(&cells, edited.identity_column).clone();
		if identity.is_blank() {
			return Ok(SyncOutcome::MissingKey);
		}
		*project = identity.to_string().trim().to_string();
		let incoming = cell_at(&cells, edited.field_column).clone();

		let target_row = match find_row_by_identity(store, counterpart, &identity, options, retry).await? {
			Some(r) => r,
			None => {
				debug!("No counterpart for '{}' in {}", project, counterpart.table);
				return Ok(SyncOutcome::NoCounterpart);
			}
		};

		let target_table = counterpart.table.as_str();
		let target_col = counterpart.field_column;
		let current = with_retry("read counterpart cell", retry, move || async move {
			Ok::<_, SyncError>(store.read_range(target_table, target_row, target_col, 1, 1).await?)
		})
		.await?
		.into_iter()
		.next()
		.and_then(|r| r.into_iter().next())
		.unwrap_or_default();

		if same_value(&current, &incoming, options) {
			return Ok(SyncOutcome::AlreadyInSync { row: target_row });
		}

		let value = &incoming;
		with_retry("write counterpart cell", retry, move || async move {
			Ok::<_, SyncError>(store.write_cell(target_table, target_row, target_col, value.clone()).await?)
		})
		.await?;
		self.ctx.row_written(target_table, target_row);

		Ok(SyncOutcome::Written { row: target_row })
	}
}

/// First data row of `side.table` whose identity cell normalizes equal to `identity`
pub async fn find_row_by_identity(
	store: &dyn TableStore,
	side: &MirrorSide,
	identity: &CellValue,
	options: KeyOptions,
	retry: &crate::config::RetryConfig,
) -> SyncResult<Option<usize>> {
	let table = side.table.as_str();
	let last_row = with_retry("read last row", retry, move || async move {
		Ok::<_, SyncError>(store.last_row(table).await?)
	})
	.await?;
	if last_row < FIRST_DATA_ROW {
		return Ok(None);
	}

	let column = side.identity_column;
	let num_rows = last_row - FIRST_DATA_ROW + 1;
	let ids = with_retry("read identity column", retry, move || async move {
		Ok::<_, SyncError>(store.read_range(table, FIRST_DATA_ROW, column, num_rows, 1).await?)
	})
	.await?;

	Ok(ids
		.iter()
		.position(|r| {
			let cell = cell_at(r, 1);
			!cell.is_blank() && same_value(cell, identity, options)
		})
		.map(|offset| FIRST_DATA_ROW + offset))
}


// vim: ts=4
