//! # rowsync - Row Synchronization & Transfer Engine
//!
//! rowsync moves rows between tables of a shared tabular store exactly once
//! per logical event and keeps mirrored fields of two tables equal without
//! bouncing edits back and forth.
//!
//! Every invocation (a transfer or a field sync) runs under one global lock,
//! retries transient store failures with backoff, and ends in exactly one
//! audit entry.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rowsync::{Config, EngineContext, EditEvent, MemoryStore, Router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("rowsync.toml".as_ref())?;
//!     let store = Arc::new(MemoryStore::load_json("tables.json".as_ref()).await?);
//!     let router = Router::new(EngineContext::builder(config, store).build());
//!
//!     let event = EditEvent::new("Forecast", 5, 2).with_values("".into(), "Approved".into());
//!     for entry in router.dispatch(&event).await {
//!         println!("{}: {}", entry.action, entry.result);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Using the Builder Pattern
//!
//! ```rust,ignore
//! let ctx = EngineContext::builder(config, store)
//!     .lock(Arc::new(ProcessLock::new()))
//!     .callbacks(
//!         CallbackBuilder::new()
//!             .on_notify(|subject, err, table| eprintln!("{} on {}: {}", subject, table, err))
//!             .on_row_written(|table, row| eprintln!("{}!{} written", table, row))
//!             .build(),
//!     )
//!     .build();
//! let entry = TransferEngine::new(ctx).transfer_row("forecast-to-upcoming", 5).await;
//! ```

pub mod audit;
pub mod callbacks;
pub mod config;
pub mod context;
pub mod duplicate;
pub mod error;
pub mod key;
pub mod lock;
pub mod logging;
pub mod report;
pub mod retry;
pub mod router;
pub mod store;
pub mod sync_guard;
pub mod transfer;
pub mod types;
pub mod validation;

// Re-export commonly used types and functions
pub use audit::{AuditEntry, AuditSink, ResultCode};
pub use callbacks::{CallbackBuilder, Callbacks};
pub use config::{Config, DuplicateCheckPolicy, SyncPairSpec, TransferSpec};
pub use context::EngineContext;
pub use error::{ErrorKind, StoreError, SyncError, SyncResult};
pub use lock::{FileLock, LockProvider, ProcessLock};
pub use router::Router;
pub use store::{MemoryStore, TableStore};
pub use sync_guard::{SyncGuard, SyncOutcome};
pub use transfer::{TransferEngine, TransferOutcome};
pub use types::{CellValue, EditEvent, Row};

// vim: ts=4
