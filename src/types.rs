//! Cell, row and edit-event types shared by every component

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single cell value
///
/// Cells are a closed set of types. Normalization dispatches on the variant,
/// so a text cell that happens to look like a date stays text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "WireCell", into = "WireCell")]
pub enum CellValue {
	#[default]
	Empty,
	Bool(bool),
	Number(f64),
	Text(String),
	Date(NaiveDateTime),
}

impl CellValue {
	pub fn text(s: impl Into<String>) -> Self {
		CellValue::Text(s.into())
	}

	/// Date cell at midnight of the given calendar day
	pub fn date(year: i32, month: u32, day: u32) -> Option<Self> {
		NaiveDate::from_ymd_opt(year, month, day)
			.and_then(|d| d.and_hms_opt(0, 0, 0))
			.map(CellValue::Date)
	}

	/// True for `Empty` and for text that is blank after trimming
	pub fn is_blank(&self) -> bool {
		match self {
			CellValue::Empty => true,
			CellValue::Text(s) => s.trim().is_empty(),
			_ => false,
		}
	}

	/// Parse a command-line literal: `true`/`false`, numbers, `date:YYYY-MM-DD`,
	/// empty string as `Empty`, anything else as text
	pub fn parse_literal(s: &str) -> Self {
		if s.is_empty() {
			return CellValue::Empty;
		}
		if let Some(rest) = s.strip_prefix("date:") {
			if let Ok(d) = NaiveDate::parse_from_str(rest.trim(), "%Y-%m-%d") {
				if let Some(dt) = d.and_hms_opt(0, 0, 0) {
					return CellValue::Date(dt);
				}
			}
			return CellValue::Text(s.to_string());
		}
		match s {
			"true" => CellValue::Bool(true),
			"false" => CellValue::Bool(false),
			_ => match s.parse::<f64>() {
				Ok(n) if n.is_finite() => CellValue::Number(n),
				_ => CellValue::Text(s.to_string()),
			},
		}
	}
}

impl fmt::Display for CellValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CellValue::Empty => Ok(()),
			CellValue::Bool(b) => write!(f, "{}", b),
			CellValue::Number(n) => write!(f, "{}", n),
			CellValue::Text(s) => write!(f, "{}", s),
			CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S")),
		}
	}
}

impl From<&str> for CellValue {
	fn from(s: &str) -> Self {
		CellValue::Text(s.to_string())
	}
}

impl From<String> for CellValue {
	fn from(s: String) -> Self {
		CellValue::Text(s)
	}
}

impl From<f64> for CellValue {
	fn from(n: f64) -> Self {
		CellValue::Number(n)
	}
}

impl From<bool> for CellValue {
	fn from(b: bool) -> Self {
		CellValue::Bool(b)
	}
}

impl From<NaiveDateTime> for CellValue {
	fn from(d: NaiveDateTime) -> Self {
		CellValue::Date(d)
	}
}

/// JSON shape of a cell: scalars map directly, dates are `{"date": "..."}`
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireCell {
	Empty,
	Bool(bool),
	Number(f64),
	Text(String),
	Date { date: NaiveDateTime },
}

impl From<WireCell> for CellValue {
	fn from(w: WireCell) -> Self {
		match w {
			WireCell::Empty => CellValue::Empty,
			WireCell::Bool(b) => CellValue::Bool(b),
			WireCell::Number(n) => CellValue::Number(n),
			WireCell::Text(s) => CellValue::Text(s),
			WireCell::Date { date } => CellValue::Date(date),
		}
	}
}

impl From<CellValue> for WireCell {
	fn from(c: CellValue) -> Self {
		match c {
			CellValue::Empty => WireCell::Empty,
			CellValue::Bool(b) => WireCell::Bool(b),
			CellValue::Number(n) => WireCell::Number(n),
			CellValue::Text(s) => WireCell::Text(s),
			CellValue::Date(date) => WireCell::Date { date },
		}
	}
}

/// An ordered sequence of cells addressed by 1-based column
pub type Row = Vec<CellValue>;

/// Cell at a 1-based column, `Empty` when the row is too narrow
pub fn cell_at(row: &[CellValue], column: usize) -> &CellValue {
	const EMPTY: &CellValue = &CellValue::Empty;
	if column == 0 {
		return EMPTY;
	}
	row.get(column - 1).unwrap_or(EMPTY)
}

/// An edit on a watched table, as dispatched by the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditEvent {
	pub table: String,
	pub row: usize,
	pub column: usize,
	#[serde(default)]
	pub old_value: CellValue,
	#[serde(default)]
	pub new_value: CellValue,
	/// Acting user, overrides the configured default when present
	#[serde(default)]
	pub user: Option<String>,
}

impl EditEvent {
	pub fn new(table: impl Into<String>, row: usize, column: usize) -> Self {
		EditEvent {
			table: table.into(),
			row,
			column,
			old_value: CellValue::Empty,
			new_value: CellValue::Empty,
			user: None,
		}
	}

	pub fn with_values(mut self, old_value: CellValue, new_value: CellValue) -> Self {
		self.old_value = old_value;
		self.new_value = new_value;
		self
	}

	pub fn with_user(mut self, user: impl Into<String>) -> Self {
		self.user = Some(user.into());
		self
	}
}


// vim: ts=4
