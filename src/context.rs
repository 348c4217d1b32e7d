//! Collaborators shared by the transfer engine, sync guard and router

use std::sync::Arc;

use crate::audit::{AuditSink, JsonLinesAuditSink, TracingAuditSink};
use crate::callbacks::{Callbacks, Notifier, RowWrittenTracker};
use crate::config::Config;
use crate::lock::{FileLock, LockProvider, ProcessLock};
use crate::report::Reporter;
use crate::store::TableStore;

/// Everything an invocation needs besides the event itself
#[derive(Clone)]
pub struct EngineContext {
	pub config: Arc<Config>,
	pub store: Arc<dyn TableStore>,
	pub lock: Arc<dyn LockProvider>,
	pub reporter: Reporter,
	pub tracker: Arc<dyn RowWrittenTracker>,
}

impl EngineContext {
	/// Start building a context over `store` with `config`
	pub fn builder(config: Config, store: Arc<dyn TableStore>) -> EngineContextBuilder {
		EngineContextBuilder {
			config,
			store,
			lock: None,
			audit: None,
			callbacks: Callbacks::default(),
		}
	}

	/// Notify the edit-timestamp tracker if `table` is tracked
	pub fn row_written(&self, table: &str, row: usize) {
		if self.config.is_tracked(table) {
			self.tracker.on_row_written(table, row);
		}
	}
}

/// Builder for [`EngineContext`]
///
/// Unset collaborators come from the configuration: a file lock when
/// `lock.lockFile` is set (process lock otherwise), a JSON-lines audit sink
/// when `audit.logFile` is set (tracing otherwise).
pub struct EngineContextBuilder {
	config: Config,
	store: Arc<dyn TableStore>,
	lock: Option<Arc<dyn LockProvider>>,
	audit: Option<Arc<dyn AuditSink>>,
	callbacks: Callbacks,
}

impl EngineContextBuilder {
	pub fn lock(mut self, lock: Arc<dyn LockProvider>) -> Self {
		self.lock = Some(lock);
		self
	}

	pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
		self.audit = Some(audit);
		self
	}

	pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
		self.callbacks.notifier = notifier;
		self
	}

	pub fn tracker(mut self, tracker: Arc<dyn RowWrittenTracker>) -> Self {
		self.callbacks.tracker = tracker;
		self
	}

	pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
		self.callbacks = callbacks;
		self
	}

	pub fn build(self) -> EngineContext {
		let lock = self.lock.unwrap_or_else(|| match &self.config.lock.lock_file {
			Some(path) => Arc::new(FileLock::new(path, self.config.lock.lease())) as Arc<dyn LockProvider>,
			None => Arc::new(ProcessLock::new()),
		});
		let audit = self.audit.unwrap_or_else(|| match &self.config.audit.log_file {
			Some(path) => Arc::new(JsonLinesAuditSink::new(path)) as Arc<dyn AuditSink>,
			None => Arc::new(TracingAuditSink),
		});
		EngineContext {
			config: Arc::new(self.config),
			store: self.store,
			lock,
			reporter: Reporter::new(audit, self.callbacks.notifier),
			tracker: self.callbacks.tracker,
		}
	}
}

// vim: ts=4
