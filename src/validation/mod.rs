//! Centralized validation for rowsync
//!
//! Configuration is checked once after loading; the engine assumes a
//! validated configuration (non-zero columns, sane limits).

use std::error::Error;
use std::fmt;

pub mod config;

pub use config::*;

use crate::error::SyncError;

/// Generic validation error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
	/// Invalid configuration
	ConfigError(String),
	/// Invalid column reference
	ColumnError(String),
	/// Other validation error
	Other(String),
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ValidationError::ConfigError(msg) => write!(f, "Config validation error: {}", msg),
			ValidationError::ColumnError(msg) => write!(f, "Column validation error: {}", msg),
			ValidationError::Other(msg) => write!(f, "Validation error: {}", msg),
		}
	}
}

impl Error for ValidationError {}

impl From<ValidationError> for SyncError {
	fn from(err: ValidationError) -> Self {
		SyncError::configuration(err.to_string())
	}
}

/// Trait for validatable types
pub trait Validator {
	/// Validate this type
	/// Returns Ok(()) if valid, Err(ValidationError) if invalid
	fn validate(&self) -> Result<(), ValidationError>;
}


// vim: ts=4
