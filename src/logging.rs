//! Logging prelude module for convenient access to tracing macros.
//!
//! # Usage
//!
//! ```ignore
//! use rowsync::logging::*;
//!
//! info!("Transfer finished");
//! warn!("Reorder failed");
//! ```

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (usually the
/// configured `logLevel`) applies:
///
/// ```bash
/// RUST_LOG=debug rowsync check
/// RUST_LOG=rowsync::transfer=trace rowsync transfer forecast-to-upcoming 5
/// ```
pub fn init_tracing(default_level: &str) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
	// A second init (tests, embedding) keeps the first subscriber
	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

// vim: ts=4
