//! Configuration validation functions

use std::collections::HashSet;

use super::{ValidationError, Validator};
use crate::config::{ColumnPair, Config, DuplicateCheckPolicy, MirrorSide, PostTransferAction, SyncPairSpec, TransferSpec};

/// Maximum lock wait in milliseconds (ten minutes)
pub const MAX_LOCK_TIMEOUT_MS: u64 = 600_000;

/// Validate a 1-based column reference
pub fn validate_column(what: &str, column: usize) -> Result<(), ValidationError> {
	if column == 0 {
		return Err(ValidationError::ColumnError(format!("{} must be a 1-based column, got 0", what)));
	}
	Ok(())
}

/// Validate retry count
pub fn validate_retry_count(count: u32) -> Result<(), ValidationError> {
	if count == 0 {
		return Err(ValidationError::ConfigError("Retry count must be at least 1".to_string()));
	}
	if count > 100 {
		return Err(ValidationError::ConfigError(format!("Retry count too high: {}", count)));
	}
	Ok(())
}

/// Validate lock timeout in milliseconds
pub fn validate_lock_timeout_ms(timeout_ms: u64) -> Result<(), ValidationError> {
	if timeout_ms == 0 {
		return Err(ValidationError::ConfigError("Lock timeout must be greater than 0".to_string()));
	}
	if timeout_ms > MAX_LOCK_TIMEOUT_MS {
		return Err(ValidationError::ConfigError(format!(
			"Lock timeout too large: {} ms (max {})",
			timeout_ms, MAX_LOCK_TIMEOUT_MS
		)));
	}
	Ok(())
}

fn validate_pair(what: &str, pair: &ColumnPair) -> Result<(), ValidationError> {
	validate_column(&format!("{} source", what), pair.source)?;
	validate_column(&format!("{} destination", what), pair.destination)
}

impl Validator for DuplicateCheckPolicy {
	fn validate(&self) -> Result<(), ValidationError> {
		validate_pair("duplicate check primary", &self.primary)?;
		for pair in &self.compound {
			validate_pair("duplicate check compound", pair)?;
		}
		if self.separator.is_empty() {
			return Err(ValidationError::ConfigError("Duplicate check separator must not be empty".to_string()));
		}
		Ok(())
	}
}

impl Validator for TransferSpec {
	fn validate(&self) -> Result<(), ValidationError> {
		let ctx = |e: ValidationError| match e {
			ValidationError::ColumnError(m) => ValidationError::ColumnError(format!("transfer '{}': {}", self.name, m)),
			ValidationError::ConfigError(m) => ValidationError::ConfigError(format!("transfer '{}': {}", self.name, m)),
			other => other,
		};

		if self.source_table.is_empty() || self.destination.is_empty() {
			return Err(ctx(ValidationError::ConfigError("source and destination tables are required".to_string())));
		}
		if self.source_table == self.destination {
			return Err(ctx(ValidationError::ConfigError(format!(
				"destination '{}' is the source table",
				self.destination
			))));
		}
		validate_column("identity column", self.identity_column).map_err(ctx)?;
		for &column in &self.source_columns_needed {
			validate_column("needed source column", column).map_err(ctx)?;
		}
		for pair in &self.column_mapping {
			validate_pair("mapping", pair).map_err(ctx)?;
		}
		if let Some(needed) = self.source_columns_needed.iter().copied().max() {
			if let Some(pair) = self.column_mapping.iter().find(|p| p.source > needed) {
				return Err(ctx(ValidationError::ColumnError(format!(
					"mapped source column {} is outside the needed columns (max {})",
					pair.source, needed
				))));
			}
		}
		if let Some(policy) = &self.duplicate_check {
			policy.validate().map_err(ctx)?;
		}
		if let Some(PostTransferAction::SortBy { column, .. }) = &self.post_transfer {
			validate_column("sort column", *column).map_err(ctx)?;
		}
		if let Some(trigger) = &self.trigger {
			validate_column("trigger column", trigger.column).map_err(ctx)?;
		}
		Ok(())
	}
}

fn validate_side(pair: &str, side: &MirrorSide) -> Result<(), ValidationError> {
	if side.table.is_empty() {
		return Err(ValidationError::ConfigError(format!("sync '{}': table is required", pair)));
	}
	validate_column(&format!("sync '{}' identity column", pair), side.identity_column)?;
	validate_column(&format!("sync '{}' field column", pair), side.field_column)
}

impl Validator for SyncPairSpec {
	fn validate(&self) -> Result<(), ValidationError> {
		validate_side(&self.name, &self.left)?;
		validate_side(&self.name, &self.right)?;
		if self.left.table == self.right.table && self.left.field_column == self.right.field_column {
			return Err(ValidationError::ConfigError(format!(
				"sync '{}' mirrors {} column {} onto itself",
				self.name, self.left.table, self.left.field_column
			)));
		}
		Ok(())
	}
}

impl Validator for Config {
	fn validate(&self) -> Result<(), ValidationError> {
		validate_retry_count(self.retry.max_attempts)?;
		validate_lock_timeout_ms(self.lock.timeout_ms)?;
		if !(0.0..=1.0).contains(&self.retry.max_jitter) {
			return Err(ValidationError::ConfigError(format!(
				"Retry jitter must be within 0..=1, got {}",
				self.retry.max_jitter
			)));
		}

		let mut names = HashSet::new();
		for spec in &self.transfers {
			if spec.name.is_empty() {
				return Err(ValidationError::ConfigError("Transfer name must not be empty".to_string()));
			}
			if !names.insert(spec.name.as_str()) {
				return Err(ValidationError::ConfigError(format!("Duplicate transfer name '{}'", spec.name)));
			}
			spec.validate()?;
		}

		let mut names = HashSet::new();
		for pair in &self.syncs {
			if !names.insert(pair.name.as_str()) {
				return Err(ValidationError::ConfigError(format!("Duplicate sync name '{}'", pair.name)));
			}
			pair.validate()?;
		}
		Ok(())
	}
}


// vim: ts=4
