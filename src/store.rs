//! Table accessor abstraction and the in-memory table store
//!
//! All persistence goes through [`TableStore`]. Rows and columns are
//! 1-based; row 1 holds the headers and data rows start at row 2.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use crate::error::StoreError;
use crate::types::{CellValue, Row};

/// First data row (row 1 holds headers)
pub const FIRST_DATA_ROW: usize = 2;

/// Largest addressable row (row 1 is the header)
pub const MAX_ROWS: usize = 1_048_576;

/// Largest addressable column
pub const MAX_COLUMNS: usize = 16_384;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Core trait for tabular storage backends
#[async_trait]
pub trait TableStore: Send + Sync {
	/// Whether a table with this name exists
	async fn has_table(&self, table: &str) -> bool;

	/// Column extent of the table (widest row, header included)
	async fn width(&self, table: &str) -> StoreResult<usize>;

	/// Index of the last row holding data (0 for a table with no rows)
	async fn last_row(&self, table: &str) -> StoreResult<usize>;

	/// Read a rectangular block. Every returned row has exactly `num_cols` cells;
	/// cells outside the stored data are `Empty`.
	async fn read_range(
		&self,
		table: &str,
		row: usize,
		col: usize,
		num_rows: usize,
		num_cols: usize,
	) -> StoreResult<Vec<Row>>;

	/// Append a row after the last row, returning its 1-based index
	async fn append_row(&self, table: &str, row: Row) -> StoreResult<usize>;

	/// Overwrite a single cell
	async fn write_cell(&self, table: &str, row: usize, col: usize, value: CellValue) -> StoreResult<()>;

	/// Sort rows `start_row..=last_row` by one column
	async fn sort_region(&self, table: &str, start_row: usize, col: usize, ascending: bool) -> StoreResult<()>;

	/// Make buffered writes visible to subsequent reads
	async fn flush(&self) -> StoreResult<()> {
		Ok(())
	}
}

/// Serialized form of a [`MemoryStore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
	pub tables: BTreeMap<String, Vec<Row>>,
}

/// In-memory table store
///
/// Rows are stored as written; reads pad to the requested span.
#[derive(Debug, Default)]
pub struct MemoryStore {
	tables: Mutex<BTreeMap<String, Vec<Row>>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		MemoryStore::default()
	}

	/// Create (or replace) a table with the given header row
	pub fn create_table(&self, table: &str, header: Row) {
		let mut tables = self.lock();
		tables.insert(table.to_string(), vec![header]);
	}

	/// Create (or replace) a table with the given rows
	pub fn insert_table(&self, table: &str, rows: Vec<Row>) {
		let mut tables = self.lock();
		tables.insert(table.to_string(), rows);
	}

	/// Copy of all rows of a table
	pub fn rows(&self, table: &str) -> Option<Vec<Row>> {
		self.lock().get(table).cloned()
	}

	pub fn table_names(&self) -> Vec<String> {
		self.lock().keys().cloned().collect()
	}

	pub fn snapshot(&self) -> StoreSnapshot {
		StoreSnapshot { tables: self.lock().clone() }
	}

	pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
		MemoryStore { tables: Mutex::new(snapshot.tables) }
	}

	/// Load a store from a JSON file
	pub async fn load_json(path: &Path) -> StoreResult<Self> {
		let contents = tokio::fs::read_to_string(path).await?;
		let snapshot: StoreSnapshot = serde_json::from_str(&contents)?;
		debug!("Loaded {} table(s) from {}", snapshot.tables.len(), path.display());
		Ok(MemoryStore::from_snapshot(snapshot))
	}

	/// Save the store to a JSON file
	pub async fn save_json(&self, path: &Path) -> StoreResult<()> {
		let json = serde_json::to_string_pretty(&self.snapshot())?;
		tokio::fs::write(path, json).await?;
		Ok(())
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<Row>>> {
		// A poisoned map still holds consistent rows; every mutation is a single call
		self.tables.lock().unwrap_or_else(|e| e.into_inner())
	}
}

fn not_found(table: &str) -> StoreError {
	StoreError::TableNotFound { table: table.to_string() }
}

/// Exclusive (row, column) ends of a block, or `OutOfBounds` when the block
/// starts at 0 or leaves the addressable grid
fn check_range(table: &str, row: usize, col: usize, num_rows: usize, num_cols: usize) -> StoreResult<(usize, usize)> {
	let row_end = row.checked_add(num_rows).filter(|&end| row >= 1 && end <= MAX_ROWS + 1);
	let col_end = col.checked_add(num_cols).filter(|&end| col >= 1 && end <= MAX_COLUMNS + 1);
	match (row_end, col_end) {
		(Some(r), Some(c)) => Ok((r, c)),
		_ => Err(StoreError::OutOfBounds {
			table: table.to_string(),
			message: format!("{}x{} block at row {}, column {} is outside the grid", num_rows, num_cols, row, col),
		}),
	}
}

fn table_width(rows: &[Row]) -> usize {
	rows.iter().map(|r| r.len()).max().unwrap_or(0)
}

#[async_trait]
impl TableStore for MemoryStore {
	async fn has_table(&self, table: &str) -> bool {
		self.lock().contains_key(table)
	}

	async fn width(&self, table: &str) -> StoreResult<usize> {
		let tables = self.lock();
		let rows = tables.get(table).ok_or_else(|| not_found(table))?;
		Ok(table_width(rows))
	}

	async fn last_row(&self, table: &str) -> StoreResult<usize> {
		let tables = self.lock();
		let rows = tables.get(table).ok_or_else(|| not_found(table))?;
		Ok(rows.len())
	}

	async fn read_range(
		&self,
		table: &str,
		row: usize,
		col: usize,
		num_rows: usize,
		num_cols: usize,
	) -> StoreResult<Vec<Row>> {
		let (row_end, col_end) = check_range(table, row, col, num_rows, num_cols)?;
		let tables = self.lock();
		let rows = tables.get(table).ok_or_else(|| not_found(table))?;
		let mut out = Vec::with_capacity(num_rows);
		for r in row..row_end {
			let source = rows.get(r - 1);
			let cells = (col..col_end)
				.map(|c| source.and_then(|s| s.get(c - 1)).cloned().unwrap_or_default())
				.collect();
			out.push(cells);
		}
		Ok(out)
	}

	async fn append_row(&self, table: &str, row: Row) -> StoreResult<usize> {
		let mut tables = self.lock();
		let rows = tables.get_mut(table).ok_or_else(|| not_found(table))?;
		rows.push(row);
		Ok(rows.len())
	}

	async fn write_cell(&self, table: &str, row: usize, col: usize, value: CellValue) -> StoreResult<()> {
		check_range(table, row, col, 1, 1)?;
		let mut tables = self.lock();
		let rows = tables.get_mut(table).ok_or_else(|| not_found(table))?;
		if rows.len() < row {
			rows.resize_with(row, Vec::new);
		}
		let target = &mut rows[row - 1];
		if target.len() < col {
			target.resize(col, CellValue::Empty);
		}
		target[col - 1] = value;
		Ok(())
	}

	async fn sort_region(&self, table: &str, start_row: usize, col: usize, ascending: bool) -> StoreResult<()> {
		check_range(table, start_row, col, 1, 1)?;
		let mut tables = self.lock();
		let rows = tables.get_mut(table).ok_or_else(|| not_found(table))?;
		if rows.len() < start_row {
			return Ok(());
		}
		let region = &mut rows[start_row - 1..];
		region.sort_by(|a, b| {
			let x = a.get(col - 1).unwrap_or(&CellValue::Empty);
			let y = b.get(col - 1).unwrap_or(&CellValue::Empty);
			compare_for_sort(x, y, ascending)
		});
		Ok(())
	}
}

/// Sort order: numbers, dates, text, booleans; empties always last
pub fn compare_for_sort(a: &CellValue, b: &CellValue, ascending: bool) -> Ordering {
	match (a.is_blank(), b.is_blank()) {
		(true, true) => return Ordering::Equal,
		(true, false) => return Ordering::Greater,
		(false, true) => return Ordering::Less,
		(false, false) => {}
	}
	let ord = match (a, b) {
		(CellValue::Number(x), CellValue::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
		(CellValue::Date(x), CellValue::Date(y)) => x.cmp(y),
		(CellValue::Text(x), CellValue::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
		(CellValue::Bool(x), CellValue::Bool(y)) => x.cmp(y),
		_ => type_rank(a).cmp(&type_rank(b)),
	};
	if ascending {
		ord
	} else {
		ord.reverse()
	}
}

fn type_rank(v: &CellValue) -> u8 {
	match v {
		CellValue::Number(_) => 0,
		CellValue::Date(_) => 1,
		CellValue::Text(_) => 2,
		CellValue::Bool(_) => 3,
		CellValue::Empty => 4,
	}
}


// vim: ts=4
