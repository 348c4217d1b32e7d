//! Duplicate detection against a destination table
//!
//! Reads the smallest contiguous column block that covers every key column
//! of the policy, rebuilds each data row's key the same way the query key
//! was built, and stops at the first exact match.

use tracing::{debug, warn};

use crate::config::DuplicateCheckPolicy;
use crate::error::SyncResult;
use crate::key::{build_key, KeyOptions};
use crate::store::{TableStore, FIRST_DATA_ROW};
use crate::types::{cell_at, CellValue, Row};

/// Key options implied by a policy
pub fn key_options(policy: &DuplicateCheckPolicy) -> KeyOptions {
	KeyOptions { date_aware: policy.date_aware }
}

/// Build the query key for a source row
pub fn source_key(row: &Row, policy: &DuplicateCheckPolicy) -> String {
	build_key(
		cell_at(row, policy.primary.source),
		policy.compound.iter().map(|p| cell_at(row, p.source)),
		&policy.separator,
		key_options(policy),
	)
}

/// Whether `key` already exists in `table` under `policy`
///
/// Compound columns beyond the table's current width are read as empty
/// segments, so the check degrades instead of failing.
pub async fn exists(
	store: &dyn TableStore,
	table: &str,
	key: &str,
	policy: &DuplicateCheckPolicy,
) -> SyncResult<bool> {
	let last_row = store.last_row(table).await?;
	if last_row < FIRST_DATA_ROW {
		return Ok(false);
	}

	let width = store.width(table).await?;
	if policy.primary.destination > width {
		warn!(
			"Duplicate check on {}: identity column {} is beyond table width {}",
			table, policy.primary.destination, width
		);
		return Ok(false);
	}
	for pair in policy.compound.iter().filter(|p| p.destination > width) {
		warn!(
			"Duplicate check on {}: compound column {} is beyond table width {}, comparing it as empty",
			table, pair.destination, width
		);
	}

	let columns: Vec<usize> =
		policy.pairs().map(|p| p.destination).filter(|&c| c >= 1 && c <= width).collect();
	let first = columns.iter().copied().min().unwrap_or(policy.primary.destination);
	let last = columns.iter().copied().max().unwrap_or(policy.primary.destination);
	let num_rows = last_row - FIRST_DATA_ROW + 1;

	let block = store.read_range(table, FIRST_DATA_ROW, first, num_rows, last - first + 1).await?;

	let options = key_options(policy);
	let empty = CellValue::Empty;
	let relative = |row: &Row, column: usize| -> CellValue {
		if column < first || column > last {
			return empty.clone();
		}
		cell_at(row, column - first + 1).clone()
	};

	for (offset, row) in block.iter().enumerate() {
		let primary = relative(row, policy.primary.destination);
		let compound: Vec<CellValue> = policy.compound.iter().map(|p| relative(row, p.destination)).collect();
		let row_key = build_key(&primary, compound.iter(), &policy.separator, options);
		if row_key == key {
			debug!("Duplicate of '{}' found in {} at row {}", key, table, FIRST_DATA_ROW + offset);
			return Ok(true);
		}
	}
	Ok(false)
}


// vim: ts=4
