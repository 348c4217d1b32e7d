//! Row transfer engine
//!
//! Moves one source row into a destination table at most once per logical
//! event:
//!
//! 1. take the global lock (bounded wait, `skipped-no-lock` on timeout)
//! 2. resolve the destination, read the source row's needed span
//! 3. skip rows without an identity value (`skipped-missing-key`)
//! 4. skip rows whose key already exists in the destination (`skipped-duplicate`)
//! 5. append a full-width row built from the column mapping
//! 6. notify the timestamp tracker, reorder the destination if configured
//! 7. release the lock and record exactly one audit entry
//!
//! The destination is only read and written while the lock is held.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::audit::{AuditEntry, ResultCode};
use crate::config::{PostTransferAction, RetryConfig, TransferSpec};
use crate::context::EngineContext;
use crate::duplicate;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::lock::LockGuard;
use crate::retry::with_retry;
use crate::store::{TableStore, FIRST_DATA_ROW};
use crate::types::{cell_at, CellValue, EditEvent, Row};

/// What a transfer did
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
	/// Row appended at `row`; `reorder_error` holds a failed post-transfer sort
	Transferred { row: usize, reorder_error: Option<String> },
	/// Key already present in the destination
	Duplicate,
	/// Source row has no usable identity value
	MissingKey,
}

/// Executes configured transfers
#[derive(Clone)]
pub struct TransferEngine {
	ctx: EngineContext,
}

impl TransferEngine {
	pub fn new(ctx: EngineContext) -> Self {
		TransferEngine { ctx }
	}

	pub fn context(&self) -> &EngineContext {
		&self.ctx
	}

	/// Run a named transfer for one source row
	pub async fn transfer_row(&self, name: &str, row: usize) -> AuditEntry {
		match self.ctx.config.transfer(name) {
			Some(spec) => {
				let event = EditEvent::new(spec.source_table.clone(), row, spec.identity_column);
				self.execute_transfer(&event, spec).await
			}
			None => {
				let err = SyncError::configuration(format!("Unknown transfer '{}'", name));
				let entry = AuditEntry::new(&self.ctx.config.acting_user, name, "", row, ResultCode::Error)
					.with_error(err.to_string());
				self.ctx.reporter.report(entry, Some(&err)).await
			}
		}
	}

	/// Transfer the event's row according to `spec`
	///
	/// Never fails: every path ends in exactly one audit entry, which is
	/// also returned.
	pub async fn execute_transfer(&self, event: &EditEvent, spec: &TransferSpec) -> AuditEntry {
		let user = event.user.clone().unwrap_or_else(|| self.ctx.config.acting_user.clone());
		let entry = |result| AuditEntry::new(user.clone(), &spec.name, &event.table, event.row, result);

		let timeout = self.ctx.config.lock.timeout();
		let guard = match LockGuard::acquire(self.ctx.lock.clone(), timeout).await {
			Some(guard) => guard,
			None => {
				let skipped = entry(ResultCode::SkippedNoLock)
					.with_detail(format!("lock not acquired within {} ms", timeout.as_millis()));
				return self.ctx.reporter.report(skipped, None).await;
			}
		};

		let mut project = String::new();
		let result = self.run(event, spec, &mut project).await;
		drop(guard);

		match result {
			Ok(TransferOutcome::Transferred { row, reorder_error }) => {
				let mut detail = format!("appended to {} at row {}", spec.destination, row);
				if let Some(e) = reorder_error {
					detail.push_str(&format!("; reorder failed: {}", e));
				}
				info!("{}: '{}' from {}!{} {}", spec.name, project, event.table, event.row, detail);
				let done = entry(ResultCode::Success).with_project(project).with_detail(detail);
				self.ctx.reporter.report(done, None).await
			}
			Ok(TransferOutcome::Duplicate) => {
				let skipped = entry(ResultCode::SkippedDuplicate)
					.with_detail(format!("already present in {}", spec.destination))
					.with_project(project);
				self.ctx.reporter.report(skipped, None).await
			}
			Ok(TransferOutcome::MissingKey) => {
				let skipped = entry(ResultCode::SkippedMissingKey)
					.with_detail(format!("no identity value in column {}", spec.identity_column))
					.with_project(project);
				self.ctx.reporter.report(skipped, None).await
			}
			Err(err) if err.kind() == ErrorKind::Validation => {
				let skipped = entry(ResultCode::SkippedMissingKey)
					.with_project(project)
					.with_detail("source row not usable")
					.with_error(err.to_string());
				self.ctx.reporter.report(skipped, None).await
			}
			Err(err) => {
				warn!("{}: transfer from {}!{} failed: {}", spec.name, event.table, event.row, err);
				let failed = entry(ResultCode::Error)
					.with_project(project)
					.with_detail(format!("{} failure", err.kind()))
					.with_error(err.to_string());
				self.ctx.reporter.report(failed, Some(&err)).await
			}
		}
	}

	/// Transfer steps performed under the lock
	async fn run(&self, event: &EditEvent, spec: &TransferSpec, project: &mut String) -> SyncResult<TransferOutcome> {
		let store: &dyn TableStore = self.ctx.store.as_ref();
		let retry = &self.ctx.config.retry;
		let source = event.table.as_str();
		let dest = spec.destination.as_str();

		if !store.has_table(dest).await {
			return Err(SyncError::configuration(format!(
				"Destination table '{}' of transfer '{}' not found",
				dest, spec.name
			)));
		}
		if event.row < FIRST_DATA_ROW {
			return Ok(TransferOutcome::MissingKey);
		}

		let source_width = with_retry("read source width", retry, move || async move {
			Ok::<_, SyncError>(store.width(source).await?)
		})
		.await?;
		let span = spec.source_span().min(source_width);
		if span == 0 || spec.identity_column > span {
			return Ok(TransferOutcome::MissingKey);
		}

		let row = event.row;
		let source_row: Row = with_retry("read source row", retry, move || async move {
			Ok::<_, SyncError>(store.read_range(source, row, 1, 1, span).await?)
		})
		.await?
		.into_iter()
		.next()
		.unwrap_or_default();

		let identity = cell_at(&source_row, spec.identity_column);
		if identity.is_blank() {
			return Ok(TransferOutcome::MissingKey);
		}
		*project = identity.to_string().trim().to_string();

		let dedup = spec.active_duplicate_check().map(|policy| (policy, duplicate::source_key(&source_row, policy)));
		if let Some((policy, key)) = &dedup {
			let found = with_retry("duplicate check", retry, move || duplicate::exists(store, dest, key, policy)).await?;
			if found {
				return Ok(TransferOutcome::Duplicate);
			}
		}

		let dest_width = with_retry("read destination width", retry, move || async move {
			Ok::<_, SyncError>(store.width(dest).await?)
		})
		.await?;
		let new_row = build_destination_row(&source_row, spec, dest_width);

		// An append is only retried when a duplicate check can tell whether
		// the failed attempt landed anyway
		let append_retry = if dedup.is_some() { retry.clone() } else { RetryConfig::no_retry() };
		let first_attempt = &AtomicBool::new(true);
		let dedup = &dedup;
		let new_row = &new_row;
		let appended = with_retry("append row", &append_retry, move || async move {
			if !first_attempt.swap(false, Ordering::SeqCst) {
				if let Some((policy, key)) = dedup {
					if duplicate::exists(store, dest, key, policy).await? {
						return Ok(None);
					}
				}
			}
			Ok::<_, SyncError>(Some(store.append_row(dest, new_row.clone()).await?))
		})
		.await?;
		let appended_row = match appended {
			Some(r) => r,
			None => return Ok(TransferOutcome::Duplicate),
		};

		self.ctx.row_written(dest, appended_row);

		let reorder_error = match &spec.post_transfer {
			Some(action) => self.post_transfer(dest, action).await,
			None => None,
		};

		Ok(TransferOutcome::Transferred { row: appended_row, reorder_error })
	}

	/// Best-effort reorder; a failure is reported but keeps the transfer
	async fn post_transfer(&self, dest: &str, action: &PostTransferAction) -> Option<String> {
		let PostTransferAction::SortBy { column, ascending } = action;
		let store = self.ctx.store.as_ref();
		let sorted = async {
			store.flush().await?;
			store.sort_region(dest, FIRST_DATA_ROW, *column, *ascending).await
		}
		.await;
		match sorted {
			Ok(()) => None,
			Err(e) => {
				let err = SyncError::from(e);
				warn!("Reorder of {} by column {} failed: {}", dest, column, err);
				self.ctx.reporter.notify("reorder failed", &err, dest);
				Some(err.to_string())
			}
		}
	}
}

/// Destination row at the destination's full width (or the highest mapped
/// column when that is wider); unmapped cells are empty
pub fn build_destination_row(source_row: &[CellValue], spec: &TransferSpec, dest_width: usize) -> Row {
	let width = dest_width.max(spec.max_destination_column());
	let mut row = vec![CellValue::Empty; width];
	for pair in &spec.column_mapping {
		if pair.destination == 0 {
			continue;
		}
		row[pair.destination - 1] = cell_at(source_row, pair.source).clone();
	}
	row
}


// vim: ts=4
