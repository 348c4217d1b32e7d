//! Comparison keys for duplicate detection and counterpart lookup
//!
//! A key is the normalized primary field followed by each compound field,
//! joined with a separator. Normalization is driven by the cell's declared
//! type: a `Date` cell becomes `YYYY-MM-DD`, a text cell that merely looks
//! like a date stays lower-cased text unless date-aware comparison is
//! requested through [`KeyOptions`].

use chrono::NaiveDate;

use crate::types::CellValue;

/// Default separator between key segments
pub const DEFAULT_SEPARATOR: &str = "|";

/// Normalization options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyOptions {
	/// Parse date-looking text into calendar days before comparing
	pub date_aware: bool,
}

impl KeyOptions {
	pub fn date_aware() -> Self {
		KeyOptions { date_aware: true }
	}
}

/// Normalize a cell under default (type-driven) rules
pub fn normalize(value: &CellValue) -> String {
	normalize_with(value, KeyOptions::default())
}

/// Normalize a cell
pub fn normalize_with(value: &CellValue, options: KeyOptions) -> String {
	match value {
		CellValue::Empty => String::new(),
		CellValue::Bool(true) => "true".to_string(),
		CellValue::Bool(false) => "false".to_string(),
		CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
		CellValue::Number(n) => format_number(*n),
		CellValue::Text(s) => {
			let trimmed = s.trim();
			if options.date_aware {
				if let Some(day) = parse_date_text(trimmed) {
					return day.format("%Y-%m-%d").to_string();
				}
			}
			trimmed.to_lowercase()
		}
	}
}

/// Build a key from the primary field and compound fields, in order
pub fn build_key<'a, I>(primary: &CellValue, compound: I, separator: &str, options: KeyOptions) -> String
where
	I: IntoIterator<Item = &'a CellValue>,
{
	let mut key = normalize_with(primary, options);
	for field in compound {
		key.push_str(separator);
		key.push_str(&normalize_with(field, options));
	}
	key
}

/// True when two cells normalize to the same value
pub fn same_value(a: &CellValue, b: &CellValue, options: KeyOptions) -> bool {
	normalize_with(a, options) == normalize_with(b, options)
}

fn format_number(n: f64) -> String {
	if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
		format!("{}", n as i64)
	} else {
		n.to_string().to_lowercase()
	}
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
	["%m/%d/%Y", "%Y-%m-%d", "%Y/%m/%d"]
		.iter()
		.find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}


// vim: ts=4
