//! # cadence
//!
//! Run-length encoded storage and querying for regularly spaced state
//! streams.
//!
//! cadence records low-cardinality state observations (inactive, active,
//! unknown) on a fixed time grid and compresses them with run-length
//! encoding, one varint record per run. It is a library, not a database:
//! everything lives in memory, timestamps enter as parameters, and the
//! only persistence surface is an opaque byte blob.
//!
//! ## Key Properties
//!
//! - Two informational bits per sample; long steady periods collapse into
//!   a handful of bytes
//! - Append-only ingestion with a sliding-window variant that discards the
//!   oldest slots when capacity is reached
//! - Point and grouped aggregate queries that walk runs, not samples
//! - A concurrent named collection of streams, exportable as a single blob
//! - No background threads, no clocks, no I/O
//!
//! ## Example
//!
//! ```rust
//! use cadence::{Sequence, State, SERIALIZE_COUNT, SERIALIZE_MEAN};
//! use chrono::{DateTime, Utc};
//! use std::time::Duration;
//!
//! let t0 = DateTime::from_timestamp(946_771_200, 0).unwrap();
//! let states: Vec<State> = [1, 1, 1, 0, 0, 0, 1, 1, 1]
//!     .iter()
//!     .map(|&x| State::from(x))
//!     .collect();
//! let s = Sequence::with_values(t0, 60, &states);
//!
//! let end = DateTime::from_timestamp(946_771_200 + 599, 0).unwrap();
//! let groups = s.query(t0, end, Duration::from_secs(300))?;
//! assert_eq!(groups.count, vec![5, 4]);
//! assert_eq!(groups.sum, vec![3, 3]);
//!
//! let json = groups.serialize("%Y-%m-%d %H:%M", &Utc, 2, SERIALIZE_COUNT | SERIALIZE_MEAN);
//! assert_eq!(
//!     String::from_utf8(json).unwrap(),
//!     r#"[{"date":"2000-01-02 00:00","count":5,"mean":0.60},{"date":"2000-01-02 00:05","count":4,"mean":0.75}]"#,
//! );
//! # Ok::<(), cadence::Error>(())
//! ```

pub mod error;
pub mod query;
pub mod sequence;
pub mod serializer;
pub mod store;

mod codec;
mod interval;

pub use codec::State;
pub use error::{BatchError, Error, Result};
pub use query::{GroupedQuerySet, QuerySet};
pub use sequence::{Sequence, MAX_SEQUENCE_LENGTH};
pub use serializer::{SERIALIZE_COUNT, SERIALIZE_MEAN, SERIALIZE_SUM};
pub use store::{Statement, StatementKind, Store};
