//! Configuration for rowsync
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (TOML, JSON or JSON5, chosen by extension)
//! 3. Environment variables (ROWSYNC_* prefix)
//! 4. CLI flags (highest priority)
//!
//! A loaded `Config` is immutable and handed to each invocation explicitly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::key::DEFAULT_SEPARATOR;

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// User recorded in audit entries when the event carries none
	pub acting_user: String,

	/// Log level (trace, debug, info, warn, error)
	pub log_level: String,

	/// Global lock settings
	pub lock: LockConfig,

	/// Retry settings for store operations
	pub retry: RetryConfig,

	/// Audit log settings
	pub audit: AuditConfig,

	/// Tables whose row writes are reported to the edit-timestamp tracker
	pub tracked_tables: Vec<String>,

	/// Named row transfers
	pub transfers: Vec<TransferSpec>,

	/// Bidirectionally mirrored fields
	pub syncs: Vec<SyncPairSpec>,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			acting_user: std::env::var("USER").unwrap_or_else(|_| "system".to_string()),
			log_level: "info".to_string(),
			lock: LockConfig::default(),
			retry: RetryConfig::default(),
			audit: AuditConfig::default(),
			tracked_tables: vec![],
			transfers: vec![],
			syncs: vec![],
		}
	}
}

impl Config {
	/// Load configuration from a file; the extension selects the format
	pub fn load(path: &Path) -> SyncResult<Self> {
		let contents = std::fs::read_to_string(path).map_err(|e| {
			SyncError::configuration(format!("Cannot read config {}: {}", path.display(), e))
		})?;
		let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
		let config = Self::parse(&contents, &ext)?;
		debug!(
			"Loaded config {}: {} transfer(s), {} sync pair(s)",
			path.display(),
			config.transfers.len(),
			config.syncs.len()
		);
		Ok(config)
	}

	/// Parse configuration text in the given format (`toml`, `json` or `json5`)
	pub fn parse(contents: &str, format: &str) -> SyncResult<Self> {
		match format {
			"toml" => Ok(toml::from_str(contents)?),
			"json" => serde_json::from_str(contents)
				.map_err(|e| SyncError::configuration(format!("Invalid JSON: {}", e))),
			"json5" => Ok(json5::from_str(contents)?),
			other => Err(SyncError::configuration(format!(
				"Unsupported config format '{}'. Valid options: toml, json, json5",
				other
			))),
		}
	}

	/// Apply ROWSYNC_* environment overrides
	pub fn apply_env_overrides(&mut self) -> SyncResult<()> {
		self.apply_overrides(|name| std::env::var(name).ok())
	}

	fn apply_overrides<F>(&mut self, lookup: F) -> SyncResult<()>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(level) = lookup("ROWSYNC_LOG_LEVEL") {
			self.log_level = level;
		}
		if let Some(user) = lookup("ROWSYNC_ACTING_USER") {
			self.acting_user = user;
		}
		if let Some(timeout) = lookup("ROWSYNC_LOCK_TIMEOUT_MS") {
			self.lock.timeout_ms = timeout.parse().map_err(|_| {
				SyncError::configuration(format!("ROWSYNC_LOCK_TIMEOUT_MS is not a number: {}", timeout))
			})?;
		}
		Ok(())
	}

	pub fn transfer(&self, name: &str) -> Option<&TransferSpec> {
		self.transfers.iter().find(|t| t.name == name)
	}

	pub fn sync_pair(&self, name: &str) -> Option<&SyncPairSpec> {
		self.syncs.iter().find(|s| s.name == name)
	}

	pub fn is_tracked(&self, table: &str) -> bool {
		self.tracked_tables.iter().any(|t| t == table)
	}
}

// ============================================================================
// RUNTIME SETTINGS
// ============================================================================

/// Global lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LockConfig {
	/// Maximum wait for the lock, in milliseconds
	pub timeout_ms: u64,

	/// Age after which a file lock is considered abandoned
	pub lease_secs: u64,

	/// Lock file shared between processes; in-process lock when unset
	pub lock_file: Option<PathBuf>,
}

impl LockConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}

	pub fn lease(&self) -> Duration {
		Duration::from_secs(self.lease_secs)
	}
}

impl Default for LockConfig {
	fn default() -> Self {
		LockConfig { timeout_ms: 5000, lease_secs: 30, lock_file: None }
	}
}

/// Retry behaviour for store operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
	/// Total attempts including the first one
	pub max_attempts: u32,

	/// Base delay, doubled for each further retry
	pub initial_delay_ms: u64,

	/// Upper bound (exclusive) of the random jitter fraction
	pub max_jitter: f64,
}

impl RetryConfig {
	pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
		let initial_delay_ms = u64::try_from(initial_delay.as_millis()).unwrap_or(u64::MAX);
		RetryConfig { max_attempts, initial_delay_ms, max_jitter: 0.2 }
	}

	/// A configuration that tries exactly once
	pub fn no_retry() -> Self {
		RetryConfig { max_attempts: 1, initial_delay_ms: 0, max_jitter: 0.0 }
	}

	pub fn initial_delay(&self) -> Duration {
		Duration::from_millis(self.initial_delay_ms)
	}
}

impl Default for RetryConfig {
	fn default() -> Self {
		RetryConfig { max_attempts: 3, initial_delay_ms: 500, max_jitter: 0.2 }
	}
}

/// Audit log configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditConfig {
	/// JSON-lines file receiving audit entries; tracing output when unset
	pub log_file: Option<PathBuf>,
}

// ============================================================================
// TRANSFERS
// ============================================================================

/// Source column to destination column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPair {
	pub source: usize,
	pub destination: usize,
}

impl ColumnPair {
	pub fn new(source: usize, destination: usize) -> Self {
		ColumnPair { source, destination }
	}
}

/// One configured row transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSpec {
	pub name: String,

	/// Table the row is read from
	pub source_table: String,

	/// Table the row is appended to
	pub destination: String,

	/// Source column holding the row's identity (project name)
	#[serde(default = "default_identity_column")]
	pub identity_column: usize,

	/// Source columns the transfer needs; the read span covers the largest
	#[serde(default)]
	pub source_columns_needed: Vec<usize>,

	pub column_mapping: Vec<ColumnPair>,

	#[serde(default)]
	pub duplicate_check: Option<DuplicateCheckPolicy>,

	#[serde(default)]
	pub post_transfer: Option<PostTransferAction>,

	/// Edit that fires this transfer through the router
	#[serde(default)]
	pub trigger: Option<TransferTrigger>,
}

fn default_identity_column() -> usize {
	1
}

impl TransferSpec {
	/// Minimal transfer: identity in column 1, no duplicate check
	pub fn new(
		name: impl Into<String>,
		source_table: impl Into<String>,
		destination: impl Into<String>,
		column_mapping: Vec<ColumnPair>,
	) -> Self {
		TransferSpec {
			name: name.into(),
			source_table: source_table.into(),
			destination: destination.into(),
			identity_column: 1,
			source_columns_needed: vec![],
			column_mapping,
			duplicate_check: None,
			post_transfer: None,
			trigger: None,
		}
	}

	pub fn with_duplicate_check(mut self, policy: DuplicateCheckPolicy) -> Self {
		self.duplicate_check = Some(policy);
		self
	}

	pub fn with_post_transfer(mut self, action: PostTransferAction) -> Self {
		self.post_transfer = Some(action);
		self
	}

	pub fn with_trigger(mut self, column: usize, value: impl Into<String>) -> Self {
		self.trigger = Some(TransferTrigger { column, value: value.into() });
		self
	}

	pub fn with_identity_column(mut self, column: usize) -> Self {
		self.identity_column = column;
		self
	}

	pub fn with_source_columns(mut self, columns: Vec<usize>) -> Self {
		self.source_columns_needed = columns;
		self
	}

	/// Widest source column any part of the transfer reads
	pub fn source_span(&self) -> usize {
		let mapped = self.column_mapping.iter().map(|p| p.source);
		let keyed = self
			.duplicate_check
			.iter()
			.filter(|p| p.enabled)
			.flat_map(|p| p.pairs().map(|c| c.source).collect::<Vec<_>>());
		self.source_columns_needed
			.iter()
			.copied()
			.chain(mapped)
			.chain(keyed)
			.chain(std::iter::once(self.identity_column))
			.max()
			.unwrap_or(0)
	}

	/// Highest destination column written by the mapping
	pub fn max_destination_column(&self) -> usize {
		self.column_mapping.iter().map(|p| p.destination).max().unwrap_or(0)
	}

	/// Enabled duplicate policy, if any
	pub fn active_duplicate_check(&self) -> Option<&DuplicateCheckPolicy> {
		self.duplicate_check.as_ref().filter(|p| p.enabled)
	}
}

/// Duplicate detection policy for a transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCheckPolicy {
	#[serde(default = "default_true")]
	pub enabled: bool,

	/// Identity column pair
	pub primary: ColumnPair,

	/// Additional pairs forming a compound key, in order
	#[serde(default)]
	pub compound: Vec<ColumnPair>,

	#[serde(default = "default_separator")]
	pub separator: String,

	/// Compare date-looking text as calendar days
	#[serde(default)]
	pub date_aware: bool,
}

fn default_true() -> bool {
	true
}

fn default_separator() -> String {
	DEFAULT_SEPARATOR.to_string()
}

impl DuplicateCheckPolicy {
	pub fn new(primary: ColumnPair) -> Self {
		DuplicateCheckPolicy {
			enabled: true,
			primary,
			compound: vec![],
			separator: default_separator(),
			date_aware: false,
		}
	}

	pub fn with_compound(mut self, compound: Vec<ColumnPair>) -> Self {
		self.compound = compound;
		self
	}

	pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
		self.separator = separator.into();
		self
	}

	pub fn disabled(mut self) -> Self {
		self.enabled = false;
		self
	}

	/// Primary pair followed by compound pairs
	pub fn pairs(&self) -> impl Iterator<Item = &ColumnPair> {
		std::iter::once(&self.primary).chain(self.compound.iter())
	}
}

/// Optional step after a successful append
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PostTransferAction {
	/// Reorder destination data rows by a column
	SortBy {
		column: usize,
		#[serde(default = "default_true")]
		ascending: bool,
	},
}

/// Cell edit that fires a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTrigger {
	pub column: usize,
	pub value: String,
}

// ============================================================================
// BIDIRECTIONAL SYNC
// ============================================================================

/// One side of a mirrored field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorSide {
	pub table: String,
	pub identity_column: usize,
	pub field_column: usize,
}

impl MirrorSide {
	pub fn new(table: impl Into<String>, identity_column: usize, field_column: usize) -> Self {
		MirrorSide { table: table.into(), identity_column, field_column }
	}

	pub fn matches(&self, table: &str, column: usize) -> bool {
		self.table == table && self.field_column == column
	}
}

/// A field kept equal between two tables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPairSpec {
	pub name: String,
	pub left: MirrorSide,
	pub right: MirrorSide,
	#[serde(default)]
	pub date_aware: bool,
}

impl SyncPairSpec {
	pub fn new(name: impl Into<String>, left: MirrorSide, right: MirrorSide) -> Self {
		SyncPairSpec { name: name.into(), left, right, date_aware: false }
	}

	/// (edited side, counterpart side) for an edit, if this pair watches it
	pub fn sides_for(&self, table: &str, column: usize) -> Option<(&MirrorSide, &MirrorSide)> {
		if self.left.matches(table, column) {
			Some((&self.left, &self.right))
		} else if self.right.matches(table, column) {
			Some((&self.right, &self.left))
		} else {
			None
		}
	}
}


// vim: ts=4
