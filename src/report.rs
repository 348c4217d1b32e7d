//! Outcome boundary: audit recording and failure notification
//!
//! The engine and the sync guard only compute outcomes. This layer turns an
//! outcome into one audit entry and, for `error` outcomes, one notification.
//! Failures of the audit sink or notifier never propagate back.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::audit::{AuditEntry, AuditSink, ResultCode};
use crate::callbacks::Notifier;
use crate::error::SyncError;

/// Subject prefix for notifications about the reporting path itself
pub const DEGRADED_PREFIX: &str = "[degraded]";

/// Records audit entries and raises notifications
#[derive(Clone)]
pub struct Reporter {
	audit: Arc<dyn AuditSink>,
	notifier: Arc<dyn Notifier>,
}

impl Reporter {
	pub fn new(audit: Arc<dyn AuditSink>, notifier: Arc<dyn Notifier>) -> Self {
		Reporter { audit, notifier }
	}

	/// Record an outcome; `failure` is notified when the entry is an error
	pub async fn report(&self, entry: AuditEntry, failure: Option<&SyncError>) -> AuditEntry {
		if entry.result == ResultCode::Error {
			let fallback;
			let err = match failure {
				Some(e) => e,
				None => {
					fallback = SyncError::dependency(entry.error.clone().unwrap_or_default());
					&fallback
				}
			};
			self.notify(&format!("{} failed", entry.action), err, &entry.source_table);
		} else if entry.result.is_skip() {
			debug!("{} on {}!{}: {} {}", entry.action, entry.source_table, entry.source_row, entry.result, entry.detail);
		}

		if let Err(e) = self.audit.record(&entry).await {
			warn!("Audit entry {} not recorded: {}", entry.correlation_id, e);
			self.notify(&format!("{} audit write failed", DEGRADED_PREFIX), &e, &entry.source_table);
		}
		entry
	}

	/// Best-effort notification, also outside of an audit entry
	pub fn notify(&self, subject: &str, error: &SyncError, context_table: &str) {
		let notifier = &self.notifier;
		let delivered = std::panic::catch_unwind(AssertUnwindSafe(|| {
			notifier.notify(subject, error, context_table)
		}));
		if delivered.is_err() {
			warn!("Notifier panicked while reporting '{}' on {}", subject, context_table);
		}
	}
}


// vim: ts=4
