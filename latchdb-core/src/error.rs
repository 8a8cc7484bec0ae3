//! Error types and result types for record access operations.
//!
//! Use [`DataResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use std::time::Duration;
use thiserror::Error;

/// Represents all possible errors that can occur when accessing records through the pool.
///
/// The first four variants are shape-validation failures. They are detected before the
/// pool or the store is touched and are never retried.
#[derive(Error, Debug)]
pub enum DataAccessError {
    /// The record was handed over by value, so nothing can be written back into it.
    #[error("Record is not passed by mutable reference")]
    NotAPointer,
    /// The record was handed over as a reference to another indirection.
    #[error("Record is a reference to a reference")]
    DoublePointer,
    /// The record type resolves to an empty collection name.
    #[error("Record type {0} has no collection name")]
    MissingCollectionName(String),
    /// The result argument is not a mutable reference to a sequence of records.
    #[error("Result argument must be a mutable reference to a record sequence")]
    NotASliceAddress,
    /// The store matched no document for the query or selector.
    #[error("No document matched in collection {collection}")]
    NoMatch {
        /// The collection that was searched.
        collection: String,
    },
    /// Any other failure reported by the backing store.
    #[error("{operation} on collection {collection} failed: {message}")]
    StoreOperationFailed {
        /// The collection the operation targeted.
        collection: String,
        /// The name of the operation (e.g. `insert`, `find_one`).
        operation: &'static str,
        /// The driver-reported failure.
        message: String,
    },
    /// A filter, update or pipeline document uses syntax the backend cannot evaluate.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// Serialization/deserialization error when converting records to and from BSON or JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store dialing or pool setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// No session became available before the deadline.
    #[error("No session available within {0:?}")]
    AcquireTimeout(Duration),
    /// The process-wide default store was used before it was initialized.
    #[error("Default store is not initialized")]
    Uninitialized,
}

impl DataAccessError {
    /// Builds a [`DataAccessError::StoreOperationFailed`] from any displayable driver error.
    pub fn store(operation: &'static str, collection: &str, err: impl ToString) -> Self {
        DataAccessError::StoreOperationFailed {
            collection: collection.to_string(),
            operation,
            message: err.to_string(),
        }
    }

    /// Builds a [`DataAccessError::NoMatch`] for the given collection.
    pub fn no_match(collection: &str) -> Self {
        DataAccessError::NoMatch { collection: collection.to_string() }
    }

    /// Returns `true` when the store simply matched nothing.
    pub fn is_no_match(&self) -> bool {
        matches!(self, DataAccessError::NoMatch { .. })
    }

    /// Returns `true` for the shape-validation failures raised before any store access.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DataAccessError::NotAPointer
                | DataAccessError::DoublePointer
                | DataAccessError::MissingCollectionName(_)
                | DataAccessError::NotASliceAddress
        )
    }
}

/// A specialized `Result` type for record access operations.
pub type DataResult<T> = Result<T, DataAccessError>;

impl From<BsonError> for DataAccessError {
    fn from(err: BsonError) -> Self {
        DataAccessError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DataAccessError {
    fn from(err: SerdeJsonError) -> Self {
        DataAccessError::Serialization(err.to_string())
    }
}
