//! A named collection of sequences behind a readers-writer lock.
//!
//! The [`Store`] owns a map from identifier to [`Sequence`] and is the only
//! synchronized surface of the crate: readers (`get`, `query`, `keys`,
//! `dump`) share the lock, writers (`create`, `add`, `delete`, `execute`,
//! `batch`, `load`, `shrink`) hold it exclusively for the whole operation.
//! Sequences never escape by reference; [`Store::get`] hands out deep
//! copies.
//!
//! Mutations arrive as [`Statement`] values, either one at a time through
//! [`Store::execute`] or grouped through [`Store::batch`], which runs every
//! statement under one lock acquisition and reports failures by input
//! index without aborting the batch.
//!
//! # Example
//!
//! ```rust
//! use cadence::{State, Statement, StatementKind, Store};
//! use chrono::DateTime;
//!
//! let store = Store::new();
//! let t0 = DateTime::from_timestamp(946_782_245, 0).unwrap();
//!
//! store.execute(&Statement {
//!     key: "sensor-1".to_string(),
//!     kind: StatementKind::Add,
//!     timestamp: t0,
//!     value: State::Active,
//!     create_if_not_exists: true,
//!     create_with_timestamp: t0,
//!     create_with_frequency: 60,
//!     create_with_length: 0,
//! })?;
//!
//! let sequence = store.get("sensor-1").unwrap();
//! assert_eq!(sequence.count(), 1);
//! # Ok::<(), cadence::Error>(())
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec::State;
use crate::error::{BatchError, Error, Result, StoreError};
use crate::query::GroupedQuerySet;
use crate::sequence::Sequence;

/// The operation a [`Statement`] performs on its target sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    /// Append within the sequence window.
    Add,
    /// Append, sliding the window forward on overflow.
    Roll,
}

impl TryFrom<u8> for StatementKind {
    type Error = Error;

    /// Converts from the wire tag, rejecting kinds outside the recognised
    /// set.
    fn try_from(kind: u8) -> Result<Self> {
        match kind {
            0 => Ok(StatementKind::Add),
            1 => Ok(StatementKind::Roll),
            _ => Err(StoreError::UnknownStatement { kind }.into()),
        }
    }
}

impl From<StatementKind> for u8 {
    fn from(kind: StatementKind) -> Self {
        match kind {
            StatementKind::Add => 0,
            StatementKind::Roll => 1,
        }
    }
}

/// One operation to perform against a store.
///
/// The `create_with_*` fields are consulted only when `key` is absent and
/// `create_if_not_exists` is set; a `create_with_length` of 0 keeps the
/// default capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    /// Identifier of the target sequence.
    pub key: String,
    /// The operation to perform.
    pub kind: StatementKind,
    /// Timestamp of the slot to populate.
    pub timestamp: DateTime<Utc>,
    /// The state to record.
    pub value: State,
    /// Create the sequence when the key is absent.
    pub create_if_not_exists: bool,
    /// Reference timestamp for a created sequence.
    pub create_with_timestamp: DateTime<Utc>,
    /// Frequency for a created sequence.
    pub create_with_frequency: u16,
    /// Capacity for a created sequence; 0 keeps the default.
    pub create_with_length: u32,
}

/// A concurrent, named collection of sequences.
///
/// All methods take `&self`; interior mutability goes through a single
/// readers-writer lock, so a `Store` can be shared across threads as-is
/// (or behind an `Arc`).
#[derive(Debug, Default)]
pub struct Store {
    sequences: RwLock<HashMap<String, Sequence>>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty sequence under `key`, silently replacing any
    /// existing entry.
    pub fn create(&self, t: DateTime<Utc>, frequency: u16, key: &str) {
        let mut sequences = self.sequences.write();
        sequences.insert(key.to_string(), Sequence::new(t, frequency));
    }

    /// Stores a deep copy of `sequence` under `key`, silently replacing
    /// any existing entry.
    pub fn add(&self, key: &str, sequence: &Sequence) {
        let mut sequences = self.sequences.write();
        sequences.insert(key.to_string(), sequence.clone());
    }

    /// Removes the sequence under `key`; a missing key is a no-op.
    pub fn delete(&self, key: &str) {
        let mut sequences = self.sequences.write();
        sequences.remove(key);
    }

    /// Returns a deep copy of the sequence under `key`.
    pub fn get(&self, key: &str) -> Option<Sequence> {
        self.sequences.read().get(key).cloned()
    }

    /// Runs a grouped query against the sequence under `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::KeyNotFound`] if the key is absent, otherwise any
    /// error of [`Sequence::query`].
    pub fn query(
        &self,
        key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        d: Duration,
    ) -> Result<GroupedQuerySet> {
        let sequences = self.sequences.read();
        let Some(sequence) = sequences.get(key) else {
            return Err(StoreError::KeyNotFound {
                key: key.to_string(),
            }
            .into());
        };
        sequence.query(start, end, d)
    }

    /// Returns the identifiers known to the store, in unspecified order.
    pub fn keys(&self) -> Vec<String> {
        self.sequences.read().keys().cloned().collect()
    }

    /// Returns the number of sequences in the store.
    pub fn len(&self) -> usize {
        self.sequences.read().len()
    }

    /// Returns whether the store holds no sequences.
    pub fn is_empty(&self) -> bool {
        self.sequences.read().is_empty()
    }

    /// Executes one statement under the writer lock.
    ///
    /// # Errors
    ///
    /// [`StoreError::KeyNotFound`] if the key is absent and creation is
    /// disabled, otherwise any error of the dispatched sequence operation.
    pub fn execute(&self, statement: &Statement) -> Result<()> {
        let mut sequences = self.sequences.write();
        Self::execute_locked(&mut sequences, statement)
    }

    /// Executes every statement in input order under one writer lock.
    ///
    /// Individual failures do not abort the batch; they are collected by
    /// statement index into the returned [`BatchError`].
    pub fn batch(&self, statements: &[Statement]) -> std::result::Result<(), BatchError> {
        let mut sequences = self.sequences.write();
        let mut errors = Vec::new();
        for (i, statement) in statements.iter().enumerate() {
            if let Err(e) = Self::execute_locked(&mut sequences, statement) {
                errors.push((i, e));
            }
        }
        if errors.is_empty() {
            return Ok(());
        }
        warn!(
            failed = errors.len(),
            total = statements.len(),
            "batch completed with errors"
        );
        Err(BatchError {
            total: statements.len(),
            errors,
        })
    }

    /// Exports the store as one opaque byte blob.
    ///
    /// Each record is `varint(key length) | key | varint(sequence length) |
    /// sequence bytes`, with the signed zig-zag varint also used by
    /// [`load`](Self::load). Records follow map iteration order, so two
    /// dumps of equal stores need not be byte-identical.
    pub fn dump(&self) -> Vec<u8> {
        let sequences = self.sequences.read();
        let mut out = Vec::new();
        for (key, sequence) in sequences.iter() {
            put_varint(&mut out, key.len() as i64);
            out.extend_from_slice(key.as_bytes());
            let bytes = sequence.to_bytes();
            put_varint(&mut out, bytes.len() as i64);
            out.extend_from_slice(&bytes);
        }
        debug!(sequences = sequences.len(), bytes = out.len(), "dumped store");
        out
    }

    /// Replaces the store content with a blob produced by
    /// [`dump`](Self::dump).
    ///
    /// Loading stops at the first decode failure; entries decoded before
    /// the failure remain in the store, so callers should discard the
    /// store when this returns an error.
    ///
    /// # Errors
    ///
    /// [`StoreError::CorruptedDump`] on framing errors,
    /// [`SequenceError::Decode`](crate::error::SequenceError::Decode) if a
    /// sequence payload is invalid.
    pub fn load(&self, data: &[u8]) -> Result<()> {
        let mut sequences = self.sequences.write();
        sequences.clear();
        let mut i = 0;
        while i < data.len() {
            let (key, n) = take_prefixed(&data[i..], "key")?;
            let key = std::str::from_utf8(key)
                .map_err(|_| StoreError::CorruptedDump {
                    reason: "key is not valid UTF-8".to_string(),
                })?
                .to_string();
            i += n;
            let (bytes, n) = take_prefixed(&data[i..], "sequence")?;
            sequences.insert(key, Sequence::from_bytes(bytes)?);
            i += n;
        }
        debug!(sequences = sequences.len(), "loaded store dump");
        Ok(())
    }

    /// Rebuilds the map to its current size and releases spare capacity
    /// held by each sequence.
    pub fn shrink(&self) {
        let mut sequences = self.sequences.write();
        sequences.shrink_to_fit();
        for sequence in sequences.values_mut() {
            sequence.shrink();
        }
        debug!(sequences = sequences.len(), "shrunk store");
    }

    /// Statement execution against an already-locked map. Internal calls
    /// must never re-acquire the store lock.
    fn execute_locked(
        sequences: &mut HashMap<String, Sequence>,
        statement: &Statement,
    ) -> Result<()> {
        let sequence = match sequences.entry(statement.key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                if !statement.create_if_not_exists {
                    return Err(StoreError::KeyNotFound {
                        key: statement.key.clone(),
                    }
                    .into());
                }
                let mut sequence = Sequence::new(
                    statement.create_with_timestamp,
                    statement.create_with_frequency,
                );
                if statement.create_with_length > 0 {
                    sequence.set_length(statement.create_with_length);
                }
                entry.insert(sequence)
            }
        };
        match statement.kind {
            StatementKind::Add => sequence.add(statement.timestamp, statement.value),
            StatementKind::Roll => sequence.roll(statement.timestamp, statement.value),
        }
    }
}

/// Appends the signed zig-zag little-endian varint encoding of `x`.
fn put_varint(out: &mut Vec<u8>, x: i64) {
    let mut u = ((x << 1) ^ (x >> 63)) as u64;
    while u >= 0x80 {
        out.push((u as u8) | 0x80);
        u >>= 7;
    }
    out.push(u as u8);
}

/// Reads a signed zig-zag little-endian varint from the front of `data`.
fn take_varint(data: &[u8]) -> Option<(i64, usize)> {
    let mut u: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 {
            return None;
        }
        u |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            let x = ((u >> 1) as i64) ^ -((u & 1) as i64);
            return Some((x, i + 1));
        }
        shift += 7;
    }
    None
}

/// Reads one length-prefixed field from the front of `data`, returning the
/// field and the total number of bytes consumed.
fn take_prefixed<'a>(data: &'a [u8], what: &str) -> Result<(&'a [u8], usize)> {
    let Some((len, n)) = take_varint(data) else {
        return Err(StoreError::CorruptedDump {
            reason: format!("truncated {what} length"),
        }
        .into());
    };
    let Ok(len) = usize::try_from(len) else {
        return Err(StoreError::CorruptedDump {
            reason: format!("negative {what} length"),
        }
        .into());
    };
    let Some(end) = n.checked_add(len) else {
        return Err(StoreError::CorruptedDump {
            reason: format!("{what} length overflows the buffer"),
        }
        .into());
    };
    let Some(field) = data.get(n..end) else {
        return Err(StoreError::CorruptedDump {
            reason: format!("{what} extends past the end of the buffer"),
        }
        .into());
    };
    Ok((field, end))
}
