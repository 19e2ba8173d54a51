//! Run-length compressed storage for one fixed-grid state stream.
//!
//! A [`Sequence`] records one 2-bit [`State`] per slot of a regular time
//! grid. Slot `i` covers the wall-clock second `ts + i * frequency`, slots
//! are populated densely from index 0, and consecutive slots sharing a
//! state collapse into a single run record (see the codec module for the
//! record layout).
//!
//! Sequences are append-only. [`Sequence::add`] writes strictly after the
//! populated prefix, filling any gap with [`State::Unknown`];
//! [`Sequence::roll`] additionally slides the window forward when the
//! target slot lies beyond the configured capacity, discarding the oldest
//! slots.
//!
//! # Example
//!
//! ```rust
//! use cadence::{Sequence, State};
//! use chrono::DateTime;
//!
//! let t0 = DateTime::from_timestamp(946_782_245, 0).unwrap();
//! let mut s = Sequence::new(t0, 60);
//!
//! s.add(t0, State::Active).unwrap();
//! let t1 = DateTime::from_timestamp(946_782_245 + 60, 0).unwrap();
//! s.add(t1, State::Inactive).unwrap();
//!
//! assert_eq!(s.count(), 2);
//! assert_eq!(s.values(), vec![State::Active, State::Inactive]);
//! ```

use chrono::{DateTime, Utc};

use crate::codec::{decode_run, encode_run, runs, State};
use crate::error::{Result, SequenceError};
use crate::interval::{ceil_div, Interval};

/// Maximum number of slots a sequence can hold.
pub const MAX_SEQUENCE_LENGTH: u32 = u32::MAX;

/// Size of the serialized sequence header, in bytes.
const HEADER_LEN: usize = 14;

/// A run-length compressed, append-only stream of 2-bit states on a fixed
/// time grid.
///
/// # Thread Safety
///
/// A `Sequence` is not synchronized. [`Store`](crate::store::Store)
/// establishes safety through its lock discipline; a sequence obtained from
/// [`Store::get`](crate::store::Store::get) is a deep copy and can be used
/// without further coordination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    /// Unix timestamp of slot 0, in seconds.
    pub(crate) ts: i64,
    /// Slot width in seconds, always at least 1.
    pub(crate) frequency: u16,
    /// Maximum number of slots.
    pub(crate) length: u32,
    /// Number of populated slots.
    pub(crate) count: u32,
    /// Concatenated run records covering the populated prefix.
    pub(crate) data: Vec<u8>,
}

impl Sequence {
    /// Creates an empty sequence.
    ///
    /// The reference timestamp is `t` truncated to whole seconds. A zero
    /// `frequency` is remapped to 1. The capacity defaults to
    /// [`MAX_SEQUENCE_LENGTH`] and can be narrowed with
    /// [`set_length`](Self::set_length).
    pub fn new(t: DateTime<Utc>, frequency: u16) -> Self {
        Self {
            ts: t.timestamp(),
            frequency: if frequency == 0 { 1 } else { frequency },
            length: MAX_SEQUENCE_LENGTH,
            count: 0,
            data: Vec::new(),
        }
    }

    /// Creates a sequence pre-populated with `values`, the first value
    /// landing in slot 0.
    ///
    /// Values beyond the sequence capacity are silently discarded.
    pub fn with_values(t: DateTime<Utc>, frequency: u16, values: &[State]) -> Self {
        let mut sequence = Self::new(t, frequency);
        let n = values.len().min(sequence.length as usize);
        for &value in &values[..n] {
            sequence.add_series(1, value);
        }
        sequence
    }

    /// Decodes a sequence previously produced by [`to_bytes`](Self::to_bytes).
    ///
    /// The payload is validated structurally: every run record must decode,
    /// and the run lengths must sum to the recorded slot count.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::Decode`] if the buffer is shorter than the
    /// header or fails validation.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(SequenceError::Decode {
                reason: "buffer is shorter than the header".to_string(),
            }
            .into());
        }
        let ts = i64::from(u32::from_le_bytes([data[0], data[1], data[2], data[3]]));
        let frequency = u16::from_le_bytes([data[4], data[5]]);
        let length = u32::from_le_bytes([data[6], data[7], data[8], data[9]]);
        let count = u32::from_le_bytes([data[10], data[11], data[12], data[13]]);
        let length = if length == 0 { MAX_SEQUENCE_LENGTH } else { length };
        if count > length {
            return Err(SequenceError::Decode {
                reason: format!("count {count} exceeds length {length}"),
            }
            .into());
        }
        let payload = &data[HEADER_LEN..];
        let mut total: u64 = 0;
        let mut pos = 0;
        while pos < payload.len() {
            let Some((n, _, consumed)) = decode_run(&payload[pos..]) else {
                return Err(SequenceError::Decode {
                    reason: "truncated run record".to_string(),
                }
                .into());
            };
            total += u64::from(n);
            pos += consumed;
        }
        if total != u64::from(count) {
            return Err(SequenceError::Decode {
                reason: format!("run lengths sum to {total}, recorded count is {count}"),
            }
            .into());
        }
        Ok(Self {
            ts,
            frequency: if frequency == 0 { 1 } else { frequency },
            length,
            count,
            data: payload.to_vec(),
        })
    }

    /// Appends a value at the slot containing `t`.
    ///
    /// The target slot must lie after the populated prefix and within the
    /// sequence capacity. Slots between the populated prefix and the target
    /// are filled with [`State::Unknown`]; exactly one slot receives
    /// `value`.
    ///
    /// # Errors
    ///
    /// - [`SequenceError::OutOfBounds`] if `t` falls outside the window.
    /// - [`SequenceError::CannotOverwrite`] if the slot is already
    ///   populated.
    pub fn add(&mut self, t: DateTime<Utc>, value: State) -> Result<()> {
        let timestamp = t.timestamp();
        let offset = self.offset_of(timestamp);
        if offset < 1 || offset > i64::from(self.length) {
            return Err(SequenceError::OutOfBounds { timestamp }.into());
        }
        if offset <= i64::from(self.count) {
            return Err(SequenceError::CannotOverwrite { timestamp }.into());
        }
        self.fill_to(offset, value);
        Ok(())
    }

    /// Appends a value at the slot containing `t`, sliding the window
    /// forward if the slot lies beyond the sequence capacity.
    ///
    /// When sliding, the oldest slots are discarded and the reference
    /// timestamp advances so the target becomes the last slot of the
    /// window.
    ///
    /// # Errors
    ///
    /// - [`SequenceError::OutOfBounds`] if `t` falls before the window.
    /// - [`SequenceError::CannotOverwrite`] if the slot is already
    ///   populated.
    pub fn roll(&mut self, t: DateTime<Utc>, value: State) -> Result<()> {
        let timestamp = t.timestamp();
        let offset = self.offset_of(timestamp);
        if offset < 1 {
            return Err(SequenceError::OutOfBounds { timestamp }.into());
        }
        if offset <= i64::from(self.count) {
            return Err(SequenceError::CannotOverwrite { timestamp }.into());
        }
        if offset <= i64::from(self.length) {
            self.fill_to(offset, value);
            return Ok(());
        }

        let overflow = offset - i64::from(self.length);
        let frequency = i64::from(self.frequency);

        if overflow >= i64::from(self.count) {
            // The whole current window shifts out; rebuild from scratch.
            self.data.clear();
            self.count = 0;
            if self.length > 1 {
                self.add_series(self.length - 1, State::Unknown);
            }
            self.add_series(1, value);
            self.ts += overflow * frequency;
            return Ok(());
        }

        if offset - i64::from(self.count) == 1
            && self.data.len() == 1
            && State::from(self.data[0]) == value
        {
            // A full window made of one single-byte run keeps its shape
            // when shifted by one slot.
            self.ts += frequency;
            return Ok(());
        }

        self.trim_slots(overflow as u32);
        self.fill_to(i64::from(self.length), value);
        Ok(())
    }

    /// Sets the maximum number of slots, truncating the populated prefix if
    /// it no longer fits. A `length` of 0 selects [`MAX_SEQUENCE_LENGTH`].
    pub fn set_length(&mut self, length: u32) {
        let length = if length == 0 { MAX_SEQUENCE_LENGTH } else { length };
        self.length = length;
        if length >= self.count {
            return;
        }
        let mut kept: u64 = 0;
        let mut cut = None;
        for run in runs(&self.data) {
            let next = kept + u64::from(run.count);
            if next == u64::from(length) {
                cut = Some((run.offset + run.len, None));
                break;
            }
            if next > u64::from(length) {
                cut = Some((run.offset, Some((length - kept as u32, run.state))));
                break;
            }
            kept = next;
        }
        if let Some((end, rewrite)) = cut {
            self.data.truncate(end);
            if let Some((n, v)) = rewrite {
                let (buf, len) = encode_run(n, v);
                self.data.extend_from_slice(&buf[..len]);
            }
        }
        self.count = length;
    }

    /// Drops every slot whose timestamp is strictly before `t`, advancing
    /// the reference timestamp accordingly.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::OutOfBounds`] if `t` falls more than one
    /// full slot before the window.
    pub fn trim_left(&mut self, t: DateTime<Utc>) -> Result<()> {
        let timestamp = t.timestamp();
        let x = ceil_div(timestamp - self.ts, i64::from(self.frequency));
        if x < 0 {
            return Err(SequenceError::OutOfBounds { timestamp }.into());
        }
        if x == 0 {
            return Ok(());
        }
        if x >= i64::from(self.count) {
            self.data.clear();
            self.count = 0;
            self.ts += x * i64::from(self.frequency);
            return Ok(());
        }
        self.trim_slots(x as u32);
        Ok(())
    }

    /// Materialises the populated prefix as a dense vector of states.
    ///
    /// This is the only sequence operation that is linear in the number of
    /// slots rather than in the number of runs.
    pub fn values(&self) -> Vec<State> {
        let mut out = Vec::with_capacity(self.count as usize);
        for run in runs(&self.data) {
            out.extend(std::iter::repeat(run.state).take(run.count as usize));
        }
        out
    }

    /// Encodes the sequence as a self-contained byte buffer.
    ///
    /// The 14-byte header records, little-endian: the low 32 bits of the
    /// reference timestamp, the frequency, the length (0 standing for
    /// [`MAX_SEQUENCE_LENGTH`]), and the slot count. The run records follow
    /// verbatim.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len());
        out.extend_from_slice(&(self.ts as u32).to_le_bytes());
        out.extend_from_slice(&self.frequency.to_le_bytes());
        let length = if self.length == MAX_SEQUENCE_LENGTH {
            0
        } else {
            self.length
        };
        out.extend_from_slice(&length.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Releases any spare capacity held by the run buffer.
    pub fn shrink(&mut self) {
        self.data.shrink_to_fit();
    }

    /// Returns the unix timestamp of slot 0, in seconds.
    pub fn timestamp(&self) -> i64 {
        self.ts
    }

    /// Returns the slot width in seconds.
    pub fn frequency(&self) -> u16 {
        self.frequency
    }

    /// Returns the maximum number of slots.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Returns the number of populated slots.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Returns whether the sequence holds no slots.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the closed time interval covered by the whole window.
    pub(crate) fn interval(&self) -> Interval {
        Interval::new(
            self.ts,
            self.ts + (i64::from(self.length) - 1) * i64::from(self.frequency),
        )
    }

    /// Returns the 1-based slot offset of `timestamp` on the grid.
    fn offset_of(&self, timestamp: i64) -> i64 {
        (timestamp - self.ts) / i64::from(self.frequency) + 1
    }

    /// Populates slots up to `offset` inclusive: an unknown run for the gap
    /// past the current prefix, then one slot of `value`.
    ///
    /// Precondition: `count < offset <= length`.
    fn fill_to(&mut self, offset: i64, value: State) {
        let gap = offset - i64::from(self.count);
        if gap > 1 {
            self.add_series((gap - 1) as u32, State::Unknown);
        }
        self.add_series(1, value);
    }

    /// Appends a run of `n` slots of `value`, extending the last run in
    /// place when the value matches so runs stay maximal.
    ///
    /// Precondition: `n >= 1` and `count + n <= length`.
    fn add_series(&mut self, n: u32, value: State) {
        if self.count > 0 {
            if let Some((last_n, last_v, last_len)) = self.last() {
                if last_v == value {
                    let start = self.data.len() - last_len;
                    let (buf, len) = encode_run(last_n + n, value);
                    self.data.truncate(start);
                    self.data.extend_from_slice(&buf[..len]);
                    self.count += n;
                    return;
                }
            }
        }
        if n == 1 {
            self.data.push((1u8 << 2) | u8::from(value));
        } else {
            let (buf, len) = encode_run(n, value);
            self.data.extend_from_slice(&buf[..len]);
        }
        self.count += n;
    }

    /// Drops the leftmost `x` slots, advancing the reference timestamp.
    ///
    /// Precondition: `0 < x < count`.
    fn trim_slots(&mut self, x: u32) {
        let mut cut = None;
        let mut dropped: u64 = 0;
        for run in runs(&self.data) {
            let next = dropped + u64::from(run.count);
            if next == u64::from(x) {
                cut = Some((run.offset + run.len, None));
                break;
            }
            if next > u64::from(x) {
                let surviving = (next - u64::from(x)) as u32;
                cut = Some((run.offset + run.len, Some((surviving, run.state))));
                break;
            }
            dropped = next;
        }
        if let Some((end, rewrite)) = cut {
            self.data.drain(..end);
            if let Some((n, v)) = rewrite {
                let (buf, len) = encode_run(n, v);
                self.data.splice(0..0, buf[..len].iter().copied());
            }
        }
        self.ts += i64::from(x) * i64::from(self.frequency);
        self.count -= x;
    }

    /// Returns the length, state, and encoded size of the last run, or
    /// `None` when the sequence is empty.
    fn last(&self) -> Option<(u32, State, usize)> {
        if self.data.is_empty() {
            return None;
        }
        let mut start = 0;
        for i in (0..self.data.len() - 1).rev() {
            if self.data[i] & 0x80 == 0 {
                start = i + 1;
                break;
            }
        }
        decode_run(&self.data[start..])
    }
}
