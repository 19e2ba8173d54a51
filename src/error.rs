//! Error types for the cadence storage engine.

use thiserror::Error;

/// The main error type for all cadence operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error while mutating or decoding a sequence.
    #[error("sequence error: {0}")]
    Sequence(#[from] SequenceError),

    /// Error during a query operation (read path).
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Error during a store operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised by sequence mutations and decoding.
#[derive(Error, Debug)]
pub enum SequenceError {
    /// The timestamp maps to a slot outside the sequence window.
    #[error("timestamp {timestamp} is outside the sequence window")]
    OutOfBounds {
        /// The offending unix timestamp, in seconds.
        timestamp: i64,
    },

    /// The targeted slot is already populated; sequences are append-only.
    #[error("cannot overwrite the slot at timestamp {timestamp}")]
    CannotOverwrite {
        /// The offending unix timestamp, in seconds.
        timestamp: i64,
    },

    /// The supplied buffer is not a valid encoded sequence.
    #[error("cannot decode sequence: {reason}")]
    Decode {
        /// What was wrong with the buffer.
        reason: String,
    },
}

/// Errors raised by the query engine.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The time filter is inverted.
    #[error("invalid time range: start {start} is after end {end}")]
    InvalidTimeRange {
        /// Requested start, unix seconds.
        start: i64,
        /// Requested end, unix seconds.
        end: i64,
    },

    /// The grouping interval is shorter than the sequence frequency.
    #[error("invalid grouping interval: {seconds}s is shorter than one slot")]
    InvalidGroupingInterval {
        /// The rejected interval, in seconds.
        seconds: u64,
    },

    /// The time filter does not overlap the sequence window.
    #[error("time range [{start}, {end}] does not overlap the sequence window")]
    OutOfBounds {
        /// Requested start, unix seconds.
        start: i64,
        /// Requested end, unix seconds.
        end: i64,
    },
}

/// Errors raised by store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The identifier is not present in the store.
    #[error("key '{key}' does not exist")]
    KeyNotFound {
        /// The missing identifier.
        key: String,
    },

    /// The statement kind is outside the recognised set.
    #[error("unknown statement kind: {kind}")]
    UnknownStatement {
        /// The unrecognised kind tag.
        kind: u8,
    },

    /// A dump blob failed structural validation during load.
    #[error("corrupted store dump: {reason}")]
    CorruptedDump {
        /// What was wrong with the blob.
        reason: String,
    },
}

/// Error returned by [`Store::batch`](crate::store::Store::batch) when one
/// or more statements failed.
///
/// The batch is never aborted mid-way: every statement is attempted and the
/// failures are collected by input index.
#[derive(Error, Debug)]
#[error("{} of {total} statements could not be executed", .errors.len())]
pub struct BatchError {
    /// Number of statements in the batch.
    pub total: usize,
    /// Failures, as `(statement index, error)` pairs in input order.
    pub errors: Vec<(usize, Error)>,
}

/// Type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
