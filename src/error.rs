//! Crate-wide error type
//!
//! One taxonomy covers both backend families. Construction errors surface
//! synchronously from the query builder; everything else is returned from
//! the async adapter operations.

use thiserror::Error;

/// Result type for all database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Unified error type for the data-access layer
#[derive(Debug, Error)]
pub enum DatabaseError {
	/// Builder misuse: wrong clause type, statement-order violation,
	/// placeholder/parameter mismatch. Programmer error in the calling layer.
	#[error("query construction error: {0}")]
	QueryBuild(String),

	/// Pool exhaustion or unreachable host. No retry is performed here.
	#[error("connection error: {0}")]
	Connection(String),

	/// Begin/commit/rollback failure, or use of a dead transaction clone.
	#[error("transaction error: {0}")]
	Transaction(String),

	/// An entity field could not round-trip through the record format.
	#[error("serialization error: {0}")]
	Serialization(String),

	/// A lookup that must match exactly one record matched none.
	#[error("not found: {0}")]
	NotFound(String),

	/// A value could not be converted to the requested Rust type.
	#[error("type error: {0}")]
	TypeError(String),

	/// A row was missing a column the caller asked for.
	#[error("column not found: {0}")]
	ColumnNotFound(String),

	#[cfg(feature = "mysql")]
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),

	#[cfg(feature = "mongodb")]
	#[error(transparent)]
	Mongo(#[from] mongodb::error::Error),
}

#[cfg(feature = "mongodb")]
impl From<bson::error::Error> for DatabaseError {
	fn from(err: bson::error::Error) -> Self {
		DatabaseError::Serialization(err.to_string())
	}
}

impl From<serde_json::Error> for DatabaseError {
	fn from(err: serde_json::Error) -> Self {
		DatabaseError::Serialization(err.to_string())
	}
}
