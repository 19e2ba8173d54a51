//! Query interface for reading values out of a sequence.
//!
//! Two query modes are supported:
//!
//! - **Raw range queries** ([`Sequence::query_values`]) materialise every
//!   slot of a closed time interval, clipping the interval to the sequence
//!   window and filling slots past the populated prefix with
//!   [`State::Unknown`].
//! - **Grouped queries** ([`Sequence::query`]) bucket slots into
//!   fixed-width groups and report a per-group sum of active slots and a
//!   per-group count of observed slots. Unknown slots are invisible to
//!   both vectors, so the two together distinguish "all inactive" from "no
//!   data".
//!
//! Both walks are linear in the number of runs touched; the grouped walk
//! can be sub-linear in the number of slots when runs are long.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::codec::{runs, State};
use crate::error::{QueryError, Result};
use crate::interval::{ceil_div, Interval};
use crate::sequence::Sequence;

/// The dense result of a raw range query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySet {
    /// Unix timestamp of the first element of `values`, in seconds.
    pub timestamp: i64,
    /// One state per slot, at the sequence frequency.
    pub values: Vec<State>,
}

/// The result of a grouped aggregate query.
///
/// `sum` and `count` always have the same length. `count[k]` is the number
/// of observed (non-unknown) slots that landed in group `k`; `sum[k]` is
/// the number of those that were active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedQuerySet {
    /// Unix timestamp of the first group, in seconds.
    pub timestamp: i64,
    /// Width of one group, in seconds.
    pub frequency: i64,
    /// Sum of active slots per group.
    pub sum: Vec<i64>,
    /// Number of observed slots per group.
    pub count: Vec<i64>,
}

impl Sequence {
    /// Returns the slot values of the closed interval `[start, end]`.
    ///
    /// The interval is clipped to the sequence window. The first returned
    /// value sits on the first grid slot at or after the clipped start;
    /// slots beyond the populated prefix come back as [`State::Unknown`].
    ///
    /// # Errors
    ///
    /// - [`QueryError::InvalidTimeRange`] if `start > end`.
    /// - [`QueryError::OutOfBounds`] if the interval does not overlap the
    ///   sequence window.
    pub fn query_values(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<QuerySet> {
        let (start, end) = (start.timestamp(), end.timestamp());
        if start > end {
            return Err(QueryError::InvalidTimeRange { start, end }.into());
        }
        let Some(r) = self.interval().intersect(Interval::new(start, end)) else {
            return Err(QueryError::OutOfBounds { start, end }.into());
        };

        let f = i64::from(self.frequency);
        let x = ceil_div(r.start - self.ts, f);
        let y = (r.end - self.ts) / f;
        let mut values = vec![State::Unknown; (y - x + 1) as usize];

        let mut src: i64 = 0;
        let mut dst: usize = 0;
        for run in runs(&self.data) {
            let n = i64::from(run.count);
            if src + n < x {
                src += n;
                continue;
            }
            let head = if dst == 0 { x - src } else { 0 };
            if y < src + n {
                for _ in 0..=(y - src - head) {
                    values[dst] = run.state;
                    dst += 1;
                }
                break;
            }
            for _ in 0..(n - head) {
                values[dst] = run.state;
                dst += 1;
            }
            src += n;
        }

        Ok(QuerySet {
            timestamp: self.ts + x * f,
            values,
        })
    }

    /// Aggregates the closed interval `[start, end]` into groups of
    /// duration `d`.
    ///
    /// The grouping duration is floored to a whole number of slots. The
    /// first group starts at `start` exactly; callers wanting groups
    /// aligned on wall-clock boundaries align `start` themselves. A filter
    /// that does not overlap the sequence window yields zero-filled
    /// vectors rather than an error.
    ///
    /// Unknown slots contribute to neither `sum` nor `count`. A reserved
    /// slot counts as observed but never adds to `sum`.
    ///
    /// # Errors
    ///
    /// - [`QueryError::InvalidTimeRange`] if `start > end`.
    /// - [`QueryError::InvalidGroupingInterval`] if `d` is shorter than
    ///   one slot.
    pub fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        d: Duration,
    ) -> Result<GroupedQuerySet> {
        let (start, end) = (start.timestamp(), end.timestamp());
        if start > end {
            return Err(QueryError::InvalidTimeRange { start, end }.into());
        }
        let f = i64::from(self.frequency);
        let aggregation =
            i64::try_from(d.as_secs() / u64::from(self.frequency)).unwrap_or(i64::MAX);
        if aggregation < 1 {
            return Err(QueryError::InvalidGroupingInterval {
                seconds: d.as_secs(),
            }
            .into());
        }

        let groups = ((end - start) / f / aggregation + 1) as usize;
        let mut set = GroupedQuerySet {
            timestamp: start,
            frequency: f * aggregation,
            sum: vec![0; groups],
            count: vec![0; groups],
        };

        let Some(r) = self.interval().intersect(Interval::new(start, end)) else {
            return Ok(set);
        };

        let x = ceil_div(r.start - self.ts, f);
        let y = (r.end - self.ts) / f;
        let shift = if start < self.ts {
            (self.ts - start) / f
        } else {
            0
        };

        let mut src: i64 = 0;
        for run in runs(&self.data) {
            let next = src + i64::from(run.count);
            if x >= next || run.state == State::Unknown {
                src = next;
                continue;
            }

            let mut first = true;
            if x > src {
                src = x;
            }
            let target = if y < next { y + 1 } else { next };

            while src < target {
                let dst = ((shift + src - x) / aggregation) as usize;
                let mut m = aggregation;
                if first {
                    m -= (shift + src - x) % aggregation;
                    first = false;
                }
                if src + m > target {
                    m = target - src;
                }
                set.count[dst] += m;
                if run.state == State::Active {
                    set.sum[dst] += m;
                }
                src += m;
            }

            if next > y {
                break;
            }
        }

        Ok(set)
    }
}
