//! Error types for hash table operations.

use crate::strategy::HashFunctionType;
use thiserror::Error;

/// Errors that can occur during hash table operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HashTableError {
    /// A bucket array or Zobrist table could not be allocated.
    #[error("allocating {requested} table slots failed")]
    AllocationFailure {
        /// Number of slots requested.
        requested: usize,
    },

    /// An item with the same {key, yield} is already stored.
    #[error("{{key, yield}} pair already exists in the table")]
    DuplicateEntry,

    /// The operation only makes sense for a different hash function.
    #[error("operation not supported by the {function} hash function")]
    InvalidStrategyOperation {
        /// The hash function the operation was attempted on.
        function: HashFunctionType,
    },

    /// The maximum bucket occupancy ratio must be finite and positive.
    #[error("invalid maximum bucket occupancy ratio: {ratio}")]
    InvalidOccupancyRatio {
        /// The rejected ratio.
        ratio: f32,
    },
}

/// A specialized Result type for hash table operations.
pub type Result<T> = std::result::Result<T, HashTableError>;
