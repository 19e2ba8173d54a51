//! Canonical JSON rendering of grouped query results.
//!
//! The output is built byte by byte rather than through a generic JSON
//! encoder: the shape is fixed, field order matters to downstream
//! consumers, and empty groups must render as `"count":0`, `"sum":null`,
//! `"mean":null` regardless of the vector contents.

use std::fmt::Write;

use chrono::{DateTime, TimeZone, Utc};

use crate::query::GroupedQuerySet;

/// Include the per-group count of observed slots.
pub const SERIALIZE_COUNT: u8 = 1;
/// Include the per-group sum of active slots.
pub const SERIALIZE_SUM: u8 = 1 << 1;
/// Include the per-group mean (`sum / count`).
pub const SERIALIZE_MEAN: u8 = 1 << 2;

impl GroupedQuerySet {
    /// Returns the JSON encoding of the grouped result.
    ///
    /// `layout` is a strftime format string applied to each group's
    /// timestamp in the `tz` time zone; an empty layout renders raw unix
    /// timestamps instead, and `tz` is not consulted. `precision` is the
    /// exact number of fractional digits for means, and `flags` is a bitset
    /// of [`SERIALIZE_COUNT`], [`SERIALIZE_SUM`] and [`SERIALIZE_MEAN`]
    /// selecting the emitted fields.
    ///
    /// A group with no observed slots renders `0` for its count and `null`
    /// for its sum and mean.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cadence::{GroupedQuerySet, SERIALIZE_COUNT, SERIALIZE_MEAN};
    /// use chrono::Utc;
    ///
    /// let set = GroupedQuerySet {
    ///     timestamp: 946_771_200,
    ///     frequency: 300,
    ///     sum: vec![3, 3],
    ///     count: vec![5, 4],
    /// };
    /// let json = set.serialize("%Y-%m-%d %H:%M", &Utc, 2, SERIALIZE_COUNT | SERIALIZE_MEAN);
    /// assert_eq!(
    ///     String::from_utf8(json).unwrap(),
    ///     r#"[{"date":"2000-01-02 00:00","count":5,"mean":0.60},{"date":"2000-01-02 00:05","count":4,"mean":0.75}]"#,
    /// );
    /// ```
    pub fn serialize<Tz: TimeZone>(
        &self,
        layout: &str,
        tz: &Tz,
        precision: usize,
        flags: u8,
    ) -> Vec<u8>
    where
        Tz::Offset: std::fmt::Display,
    {
        if self.count.is_empty() {
            return b"[]".to_vec();
        }

        let count = flags & SERIALIZE_COUNT != 0;
        let sum = flags & SERIALIZE_SUM != 0;
        let mean = flags & SERIALIZE_MEAN != 0;

        let mut empty_row = String::new();
        if count {
            empty_row.push_str(",\"count\":0");
        }
        if sum {
            empty_row.push_str(",\"sum\":null");
        }
        if mean {
            empty_row.push_str(",\"mean\":null");
        }
        empty_row.push_str("},");

        let mut out = String::with_capacity(2 + self.count.len() * (24 + empty_row.len()));
        out.push('[');
        let mut ts = self.timestamp;
        for i in 0..self.count.len() {
            out.push_str("{\"date\":");
            if layout.is_empty() {
                let _ = write!(out, "{ts}");
            } else {
                match DateTime::<Utc>::from_timestamp(ts, 0) {
                    Some(t) => {
                        let _ = write!(out, "\"{}\"", t.with_timezone(tz).format(layout));
                    }
                    // Out of the representable calendar range; fall back to
                    // the raw timestamp.
                    None => {
                        let _ = write!(out, "{ts}");
                    }
                }
            }
            if self.count[i] == 0 {
                out.push_str(&empty_row);
            } else {
                if count {
                    let _ = write!(out, ",\"count\":{}", self.count[i]);
                }
                if sum {
                    let _ = write!(out, ",\"sum\":{}", self.sum[i]);
                }
                if mean {
                    let value = self.sum[i] as f64 / self.count[i] as f64;
                    let _ = write!(out, ",\"mean\":{value:.precision$}");
                }
                out.push_str("},");
            }
            ts += self.frequency;
        }
        let mut out = out.into_bytes();
        if let Some(last) = out.last_mut() {
            *last = b']';
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> GroupedQuerySet {
        GroupedQuerySet {
            timestamp: 946_782_245, // 2000-01-02 03:04:05 UTC
            frequency: 300,
            sum: vec![5, 0, 1],
            count: vec![5, 0, 4],
        }
    }

    #[test]
    fn test_serialize_count_and_mean() {
        let got = sample_set().serialize(
            "%Y-%m-%d %H:%M:%S",
            &Utc,
            4,
            SERIALIZE_COUNT | SERIALIZE_MEAN,
        );
        let want = concat!(
            r#"[{"date":"2000-01-02 03:04:05","count":5,"mean":1.0000},"#,
            r#"{"date":"2000-01-02 03:09:05","count":0,"mean":null},"#,
            r#"{"date":"2000-01-02 03:14:05","count":4,"mean":0.2500}]"#,
        );
        assert_eq!(String::from_utf8(got).unwrap(), want);
    }

    #[test]
    fn test_serialize_sum_and_mean() {
        let got = sample_set().serialize("%H:%M:%S", &Utc, 2, SERIALIZE_SUM | SERIALIZE_MEAN);
        let want = concat!(
            r#"[{"date":"03:04:05","sum":5,"mean":1.00},"#,
            r#"{"date":"03:09:05","sum":null,"mean":null},"#,
            r#"{"date":"03:14:05","sum":1,"mean":0.25}]"#,
        );
        assert_eq!(String::from_utf8(got).unwrap(), want);
    }

    #[test]
    fn test_serialize_unix_timestamps() {
        let got = sample_set().serialize("", &Utc, 0, SERIALIZE_COUNT);
        let want = concat!(
            r#"[{"date":946782245,"count":5},"#,
            r#"{"date":946782545,"count":0},"#,
            r#"{"date":946782845,"count":4}]"#,
        );
        assert_eq!(String::from_utf8(got).unwrap(), want);
    }

    #[test]
    fn test_serialize_empty_set() {
        let set = GroupedQuerySet {
            timestamp: 0,
            frequency: 300,
            sum: vec![],
            count: vec![],
        };
        assert_eq!(set.serialize("", &Utc, 2, SERIALIZE_COUNT), b"[]");
    }

    #[test]
    fn test_serialize_is_valid_json() {
        let got = sample_set().serialize(
            "%Y-%m-%d %H:%M:%S",
            &Utc,
            3,
            SERIALIZE_COUNT | SERIALIZE_SUM | SERIALIZE_MEAN,
        );
        let parsed: serde_json::Value = serde_json::from_slice(&got).unwrap();
        let rows = parsed.as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["count"], 5);
        assert_eq!(rows[0]["sum"], 5);
        assert!(rows[1]["sum"].is_null());
        assert!(rows[1]["mean"].is_null());
    }
}
