//! Audit trail of transfer and sync invocations
//!
//! Each invocation produces exactly one [`AuditEntry`]. Entries are
//! append-only and never mutated after creation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

/// Outcome recorded for one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultCode {
	Success,
	SkippedDuplicate,
	SkippedNoLock,
	SkippedMissingKey,
	Error,
}

impl ResultCode {
	pub fn is_skip(self) -> bool {
		matches!(self, ResultCode::SkippedDuplicate | ResultCode::SkippedNoLock | ResultCode::SkippedMissingKey)
	}
}

impl fmt::Display for ResultCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ResultCode::Success => write!(f, "success"),
			ResultCode::SkippedDuplicate => write!(f, "skipped-duplicate"),
			ResultCode::SkippedNoLock => write!(f, "skipped-no-lock"),
			ResultCode::SkippedMissingKey => write!(f, "skipped-missing-key"),
			ResultCode::Error => write!(f, "error"),
		}
	}
}

/// One invocation's outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
	pub timestamp: DateTime<Utc>,
	pub correlation_id: Uuid,
	pub user: String,
	/// Transfer or sync pair name
	pub action: String,
	pub source_table: String,
	pub source_row: usize,
	/// Identity value of the row (project identifier), empty when unknown
	pub project: String,
	pub detail: String,
	pub result: ResultCode,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl AuditEntry {
	/// Fresh entry with a new correlation id and the current time
	pub fn new(
		user: impl Into<String>,
		action: impl Into<String>,
		source_table: impl Into<String>,
		source_row: usize,
		result: ResultCode,
	) -> Self {
		AuditEntry {
			timestamp: Utc::now(),
			correlation_id: Uuid::new_v4(),
			user: user.into(),
			action: action.into(),
			source_table: source_table.into(),
			source_row,
			project: String::new(),
			detail: String::new(),
			result,
			error: None,
		}
	}

	pub fn with_project(mut self, project: impl Into<String>) -> Self {
		self.project = project.into();
		self
	}

	pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
		self.detail = detail.into();
		self
	}

	pub fn with_error(mut self, error: impl Into<String>) -> Self {
		self.error = Some(error.into());
		self
	}
}

/// Destination for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
	async fn record(&self, entry: &AuditEntry) -> SyncResult<()>;
}

/// Writes entries to the tracing log
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
	async fn record(&self, entry: &AuditEntry) -> SyncResult<()> {
		info!(
			correlation_id = %entry.correlation_id,
			user = %entry.user,
			result = %entry.result,
			"audit: {} {}!{} [{}] {}{}",
			entry.action,
			entry.source_table,
			entry.source_row,
			entry.project,
			entry.detail,
			entry.error.as_deref().map(|e| format!(" ({})", e)).unwrap_or_default()
		);
		Ok(())
	}
}

/// Keeps entries in memory
#[derive(Default)]
pub struct MemoryAuditSink {
	entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
	pub fn new() -> Self {
		MemoryAuditSink::default()
	}

	pub fn entries(&self) -> Vec<AuditEntry> {
		self.entries.lock().map(|e| e.clone()).unwrap_or_default()
	}

	pub fn count(&self, result: ResultCode) -> usize {
		self.entries().iter().filter(|e| e.result == result).count()
	}
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
	async fn record(&self, entry: &AuditEntry) -> SyncResult<()> {
		self.entries.lock().unwrap_or_else(|e| e.into_inner()).push(entry.clone());
		Ok(())
	}
}

/// Appends entries as JSON lines to a file
pub struct JsonLinesAuditSink {
	path: PathBuf,
	write: tokio::sync::Mutex<()>,
}

impl JsonLinesAuditSink {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		JsonLinesAuditSink { path: path.into(), write: tokio::sync::Mutex::new(()) }
	}

	/// Read all entries back
	pub async fn read_all(&self) -> SyncResult<Vec<AuditEntry>> {
		let contents = match tokio::fs::read_to_string(&self.path).await {
			Ok(c) => c,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
			Err(e) => return Err(e.into()),
		};
		contents
			.lines()
			.filter(|l| !l.trim().is_empty())
			.map(|l| serde_json::from_str::<AuditEntry>(l).map_err(SyncError::from))
			.collect()
	}
}

#[async_trait]
impl AuditSink for JsonLinesAuditSink {
	async fn record(&self, entry: &AuditEntry) -> SyncResult<()> {
		let mut line = serde_json::to_string(entry)?;
		line.push('\n');

		let _serial = self.write.lock().await;
		let mut file =
			tokio::fs::OpenOptions::new().create(true).append(true).open(&self.path).await?;
		file.write_all(line.as_bytes()).await?;
		file.flush().await?;
		Ok(())
	}
}


// vim: ts=4
