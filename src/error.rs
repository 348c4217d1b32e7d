//! Error types for rowsync operations
//!
//! Every failure is classified into one of four kinds (see [`ErrorKind`]).
//! The kind decides whether the retry wrapper tries again and whether the
//! reporting boundary raises a notification.

use std::error::Error;
use std::fmt;
use std::io;

/// Failure classification used by the retry wrapper and the reporting boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// Bad or missing input data. Never retried.
	Validation,

	/// Bad setup (unknown table, invalid spec). Never retried.
	Configuration,

	/// Time-bounded dependency failure that is safe to retry
	Transient,

	/// Any other external-call failure
	Dependency,
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ErrorKind::Validation => write!(f, "validation"),
			ErrorKind::Configuration => write!(f, "configuration"),
			ErrorKind::Transient => write!(f, "transient"),
			ErrorKind::Dependency => write!(f, "dependency"),
		}
	}
}

/// Main error type for transfer and sync operations
#[derive(Debug)]
pub enum SyncError {
	/// Input data is unusable
	Validation { message: String },

	/// Configuration is invalid or refers to something that does not exist
	Configuration { message: String },

	/// Temporary failure (lock contention, store hiccup)
	Transient { message: String },

	/// External dependency failed
	Dependency { message: String },

	/// Retries were exhausted for an operation
	RetryExhausted { operation: String, attempts: u32, source: Box<SyncError> },

	/// Table store error (nested)
	Store(StoreError),

	/// I/O error
	Io(io::Error),

	/// Serialization or parse error
	Serialization { message: String },
}

impl SyncError {
	/// Classify this error
	pub fn kind(&self) -> ErrorKind {
		match self {
			SyncError::Validation { .. } => ErrorKind::Validation,
			SyncError::Configuration { .. } => ErrorKind::Configuration,
			SyncError::Transient { .. } => ErrorKind::Transient,
			SyncError::Dependency { .. } => ErrorKind::Dependency,
			SyncError::RetryExhausted { .. } => ErrorKind::Dependency,
			SyncError::Store(e) => e.kind(),
			SyncError::Io(_) => ErrorKind::Transient,
			SyncError::Serialization { .. } => ErrorKind::Dependency,
		}
	}

	/// Whether the retry wrapper may try the failed operation again
	pub fn is_retryable(&self) -> bool {
		!matches!(self.kind(), ErrorKind::Validation | ErrorKind::Configuration)
	}

	pub fn validation(message: impl Into<String>) -> Self {
		SyncError::Validation { message: message.into() }
	}

	pub fn configuration(message: impl Into<String>) -> Self {
		SyncError::Configuration { message: message.into() }
	}

	pub fn transient(message: impl Into<String>) -> Self {
		SyncError::Transient { message: message.into() }
	}

	pub fn dependency(message: impl Into<String>) -> Self {
		SyncError::Dependency { message: message.into() }
	}
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Validation { message } => write!(f, "Validation error: {}", message),
			SyncError::Configuration { message } => {
				write!(f, "Configuration error: {}", message)
			}
			SyncError::Transient { message } => write!(f, "Transient error: {}", message),
			SyncError::Dependency { message } => write!(f, "Dependency error: {}", message),
			SyncError::RetryExhausted { operation, attempts, source } => {
				write!(f, "Operation '{}' failed after {} attempt(s): {}", operation, attempts, source)
			}
			SyncError::Store(e) => write!(f, "Store error: {}", e),
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::Serialization { message } => {
				write!(f, "Serialization error: {}", message)
			}
		}
	}
}

impl Error for SyncError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			SyncError::RetryExhausted { source, .. } => Some(source.as_ref()),
			SyncError::Store(e) => Some(e),
			SyncError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<StoreError> for SyncError {
	fn from(e: StoreError) -> Self {
		SyncError::Store(e)
	}
}

impl From<serde_json::Error> for SyncError {
	fn from(e: serde_json::Error) -> Self {
		SyncError::Serialization { message: e.to_string() }
	}
}

impl From<toml::de::Error> for SyncError {
	fn from(e: toml::de::Error) -> Self {
		SyncError::Configuration { message: format!("Invalid TOML: {}", e) }
	}
}

impl From<json5::Error> for SyncError {
	fn from(e: json5::Error) -> Self {
		SyncError::Configuration { message: format!("Invalid JSON5: {}", e) }
	}
}

impl From<String> for SyncError {
	fn from(e: String) -> Self {
		SyncError::Dependency { message: e }
	}
}

/// Table store errors
#[derive(Debug)]
pub enum StoreError {
	/// Table with the given name does not exist
	TableNotFound { table: String },

	/// Requested range is not addressable (row or column 0, negative span)
	OutOfBounds { table: String, message: String },

	/// Store is temporarily unavailable
	Unavailable { message: String },

	/// Backing file I/O failed
	Io(io::Error),

	/// Backing data cannot be decoded
	Corrupted { message: String },
}

impl StoreError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			StoreError::TableNotFound { .. } => ErrorKind::Configuration,
			StoreError::OutOfBounds { .. } => ErrorKind::Validation,
			StoreError::Unavailable { .. } => ErrorKind::Transient,
			StoreError::Io(_) => ErrorKind::Transient,
			StoreError::Corrupted { .. } => ErrorKind::Dependency,
		}
	}
}

impl fmt::Display for StoreError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StoreError::TableNotFound { table } => write!(f, "Table not found: {}", table),
			StoreError::OutOfBounds { table, message } => {
				write!(f, "Out of bounds on {}: {}", table, message)
			}
			StoreError::Unavailable { message } => write!(f, "Store unavailable: {}", message),
			StoreError::Io(e) => write!(f, "Store I/O error: {}", e),
			StoreError::Corrupted { message } => write!(f, "Store data corrupted: {}", message),
		}
	}
}

impl Error for StoreError {}

impl From<io::Error> for StoreError {
	fn from(e: io::Error) -> Self {
		StoreError::Io(e)
	}
}

impl From<serde_json::Error> for StoreError {
	fn from(e: serde_json::Error) -> Self {
		StoreError::Corrupted { message: e.to_string() }
	}
}

/// Result alias for rowsync operations
pub type SyncResult<T> = Result<T, SyncError>;


// vim: ts=4
