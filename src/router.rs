//! Edit event dispatch
//!
//! A single cell edit may fire several handlers: every sync pair that
//! watches the edited field, then every transfer whose trigger matches the
//! new value. Header-row edits are ignored.

use tracing::debug;

use crate::audit::AuditEntry;
use crate::context::EngineContext;
use crate::key::{same_value, KeyOptions};
use crate::store::FIRST_DATA_ROW;
use crate::sync_guard::SyncGuard;
use crate::transfer::TransferEngine;
use crate::types::{CellValue, EditEvent};

/// Routes edit events to the sync guard and transfer engine
#[derive(Clone)]
pub struct Router {
	ctx: EngineContext,
	transfers: TransferEngine,
	syncs: SyncGuard,
}

impl Router {
	pub fn new(ctx: EngineContext) -> Self {
		Router { transfers: TransferEngine::new(ctx.clone()), syncs: SyncGuard::new(ctx.clone()), ctx }
	}

	pub fn transfer_engine(&self) -> &TransferEngine {
		&self.transfers
	}

	pub fn sync_guard(&self) -> &SyncGuard {
		&self.syncs
	}

	/// Handle one edit; returns the audit entry of every handler that ran
	pub async fn dispatch(&self, event: &EditEvent) -> Vec<AuditEntry> {
		let mut entries = Vec::new();
		if event.row < FIRST_DATA_ROW {
			debug!("Ignoring header edit on {} column {}", event.table, event.column);
			return entries;
		}

		let config = self.ctx.config.clone();
		for pair in config.syncs.iter().filter(|p| p.sides_for(&event.table, event.column).is_some()) {
			entries.push(self.syncs.sync_field(event, pair).await);
		}

		for spec in config.transfers.iter().filter(|s| s.source_table == event.table) {
			let trigger = match &spec.trigger {
				Some(t) if t.column == event.column => t,
				_ => continue,
			};
			let wanted = CellValue::text(trigger.value.as_str());
			if same_value(&event.new_value, &wanted, KeyOptions::default()) {
				entries.push(self.transfers.execute_transfer(event, spec).await);
			}
		}

		if entries.is_empty() {
			debug!("No handler for {}!{} column {}", event.table, event.row, event.column);
		}
		entries
	}
}

// vim: ts=4
