//! Collaborator traits for notifications and edit-timestamp tracking

use std::sync::Arc;
use tracing::{error, warn};

use crate::error::SyncError;

// Type aliases to reduce complexity
type NotifyFn = dyn Fn(&str, &SyncError, &str) + Send + Sync;
type RowWrittenFn = dyn Fn(&str, usize) + Send + Sync;

/// Best-effort delivery of failure notifications
///
/// Implementations must not panic and must swallow their own failures.
pub trait Notifier: Send + Sync {
	/// Called for `error` outcomes and degraded audit delivery
	///
	/// # Arguments
	/// * `subject` - Short description of what failed
	/// * `error` - The failure
	/// * `context_table` - Table the failed operation was working on
	fn notify(&self, subject: &str, error: &SyncError, context_table: &str);
}

/// Notifier that drops everything
pub struct NoNotifier;

impl Notifier for NoNotifier {
	fn notify(&self, _subject: &str, _error: &SyncError, _context_table: &str) {}
}

/// Notifier that writes to the tracing log
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
	fn notify(&self, subject: &str, error: &SyncError, context_table: &str) {
		if subject.starts_with(crate::report::DEGRADED_PREFIX) {
			warn!(table = context_table, kind = %error.kind(), "{}: {}", subject, error);
		} else {
			error!(table = context_table, kind = %error.kind(), "{}: {}", subject, error);
		}
	}
}

/// Edit-timestamp bookkeeping for tables configured as tracked
pub trait RowWrittenTracker: Send + Sync {
	/// Called after the engine wrote a row of a tracked table
	fn on_row_written(&self, table: &str, row: usize);
}

/// Tracker that does nothing
pub struct NoTracker;

impl RowWrittenTracker for NoTracker {
	fn on_row_written(&self, _table: &str, _row: usize) {}
}

/// Collaborators built from closures
pub struct Callbacks {
	pub notifier: Arc<dyn Notifier>,
	pub tracker: Arc<dyn RowWrittenTracker>,
}

impl Default for Callbacks {
	fn default() -> Self {
		Callbacks { notifier: Arc::new(TracingNotifier), tracker: Arc::new(NoTracker) }
	}
}

/// Builder for callbacks using function closures
pub struct CallbackBuilder {
	notify: Option<Box<NotifyFn>>,
	row_written: Option<Box<RowWrittenFn>>,
}

impl CallbackBuilder {
	/// Create a new callback builder
	pub fn new() -> Self {
		CallbackBuilder { notify: None, row_written: None }
	}

	/// Set notification callback
	pub fn on_notify<F>(mut self, callback: F) -> Self
	where
		F: Fn(&str, &SyncError, &str) + Send + Sync + 'static,
	{
		self.notify = Some(Box::new(callback));
		self
	}

	/// Set row-written callback
	pub fn on_row_written<F>(mut self, callback: F) -> Self
	where
		F: Fn(&str, usize) + Send + Sync + 'static,
	{
		self.row_written = Some(Box::new(callback));
		self
	}

	/// Build the collaborators; unset callbacks fall back to the defaults
	pub fn build(self) -> Callbacks {
		let defaults = Callbacks::default();
		Callbacks {
			notifier: match self.notify {
				Some(f) => Arc::new(ClosureNotifier(f)),
				None => defaults.notifier,
			},
			tracker: match self.row_written {
				Some(f) => Arc::new(ClosureTracker(f)),
				None => defaults.tracker,
			},
		}
	}
}

impl Default for CallbackBuilder {
	fn default() -> Self {
		Self::new()
	}
}

struct ClosureNotifier(Box<NotifyFn>);

impl Notifier for ClosureNotifier {
	fn notify(&self, subject: &str, error: &SyncError, context_table: &str) {
		(self.0)(subject, error, context_table);
	}
}

struct ClosureTracker(Box<RowWrittenFn>);

impl RowWrittenTracker for ClosureTracker {
	fn on_row_written(&self, table: &str, row: usize) {
		(self.0)(table, row);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex;

	#[test]
	fn test_builder_wires_closures() {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let rows = seen.clone();
		let callbacks = CallbackBuilder::new()
			.on_row_written(move |table, row| rows.lock().unwrap().push((table.to_string(), row)))
			.build();

		callbacks.tracker.on_row_written("Upcoming", 7);
		assert_eq!(*seen.lock().unwrap(), vec![("Upcoming".to_string(), 7)]);
	}

	#[test]
	fn test_builder_notify() {
		let subjects = Arc::new(Mutex::new(Vec::new()));
		let sink = subjects.clone();
		let callbacks = CallbackBuilder::new()
			.on_notify(move |subject, _err, table| sink.lock().unwrap().push(format!("{}@{}", subject, table)))
			.build();

		callbacks.notifier.notify("transfer failed", &SyncError::dependency("down"), "Upcoming");
		assert_eq!(*subjects.lock().unwrap(), vec!["transfer failed@Upcoming".to_string()]);
	}
}

// vim: ts=4
