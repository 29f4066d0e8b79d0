//! Composable record filter with in-memory matching and SQL projection.
//!
//! A [`LogFilter`] is an immutable conjunction of optional per-field
//! predicates. The same filter value drives three things:
//!
//! - [`LogFilter::matches`] — predicate evaluation against in-memory records
//! - [`LogFilter::sql`] — the canonical `WHERE` projection (display and
//!   fingerprinting; the database crate builds the real parameterized query)
//! - [`Fingerprint`] — the cache key derived from the canonical projection
//!
//! Structural equality is plain value equality (`PartialEq`): two filters
//! are equal iff each field is either empty in both or set to equal operands.

use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::{Level, LogRecord};
use crate::traits::Fingerprint;

/// Operators for a single filter field. Which operators are meaningful
/// depends on the field: level/source/group/message use `eq` only, the time
/// field supports any subset of `eq`/`le`/`ge`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter<T> {
    pub eq: Option<T>,
    pub le: Option<T>,
    pub ge: Option<T>,
}

impl<T> Default for FieldFilter<T> {
    fn default() -> Self {
        Self {
            eq: None,
            le: None,
            ge: None,
        }
    }
}

impl<T> FieldFilter<T> {
    /// Equality on the operand.
    pub fn eq(value: T) -> Self {
        Self {
            eq: Some(value),
            ..Self::default()
        }
    }

    /// Inclusive upper bound.
    pub fn at_most(value: T) -> Self {
        Self {
            le: Some(value),
            ..Self::default()
        }
    }

    /// Inclusive lower bound.
    pub fn at_least(value: T) -> Self {
        Self {
            ge: Some(value),
            ..Self::default()
        }
    }

    /// Inclusive closed interval `[ge, le]`.
    pub fn between(ge: T, le: T) -> Self {
        Self {
            eq: None,
            le: Some(le),
            ge: Some(ge),
        }
    }
}

/// An immutable conjunction of optional per-field predicates over records.
///
/// A filter with all fields empty matches every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    pub level: Option<FieldFilter<Level>>,
    pub source: Option<FieldFilter<String>>,
    pub group: Option<FieldFilter<String>>,
    pub message: Option<FieldFilter<String>>,
    pub received_at: Option<FieldFilter<DateTime<Utc>>>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require an exact severity.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(FieldFilter::eq(level));
        self
    }

    /// Require `source` to contain the given substring.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(FieldFilter::eq(source.into()));
        self
    }

    /// Require `group` to contain the given substring.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(FieldFilter::eq(group.into()));
        self
    }

    /// Require `message` to match the given regular expression.
    pub fn with_message(mut self, pattern: impl Into<String>) -> Self {
        self.message = Some(FieldFilter::eq(pattern.into()));
        self
    }

    /// Constrain the record time. At least one operator must be set.
    pub fn with_received_at(mut self, field: FieldFilter<DateTime<Utc>>) -> Self {
        self.received_at = Some(field);
        self
    }

    /// True when no field predicate is set.
    pub fn is_empty(&self) -> bool {
        self.level.is_none()
            && self.source.is_none()
            && self.group.is_none()
            && self.message.is_none()
            && self.received_at.is_none()
    }

    /// Evaluate every non-empty field predicate against the record.
    ///
    /// Returns `Error::Filter` when the message pattern does not compile.
    ///
    /// # Panics
    ///
    /// Panics on a structurally broken filter (a field slot present with no
    /// operand) — that is a programmer error, not an input error.
    pub fn matches(&self, record: &LogRecord) -> Result<bool> {
        if let Some(f) = &self.level {
            let want = f.eq.as_ref().expect("level filter without operand");
            if record.level != *want {
                return Ok(false);
            }
        }

        if let Some(f) = &self.source {
            let want = f.eq.as_ref().expect("source filter without operand");
            match &record.source {
                Some(source) if source.contains(want.as_str()) => {}
                _ => return Ok(false),
            }
        }

        if let Some(f) = &self.group {
            let want = f.eq.as_ref().expect("group filter without operand");
            match &record.group {
                Some(group) if group.contains(want.as_str()) => {}
                _ => return Ok(false),
            }
        }

        if let Some(f) = &self.message {
            let pattern = f.eq.as_ref().expect("message filter without operand");
            let re = Regex::new(pattern).map_err(|e| Error::Filter(e.to_string()))?;
            if !re.is_match(&record.message) {
                return Ok(false);
            }
        }

        if let Some(f) = &self.received_at {
            // The sender-supplied instant is the canonical time here.
            let at = record.recorded_at;
            let ok = match (&f.eq, &f.le, &f.ge) {
                (Some(eq), _, _) => at == *eq,
                (None, Some(le), Some(ge)) => at <= *le && at >= *ge,
                (None, Some(le), None) => at <= *le,
                (None, None, Some(ge)) => at >= *ge,
                (None, None, None) => panic!("time filter with no operators"),
            };
            if !ok {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Canonical `WHERE` projection of this filter, clauses joined with
    /// `AND`. The empty filter projects the no-op clause `TRUE`.
    ///
    /// Operands are embedded verbatim; escaping is the backend driver's
    /// responsibility. The database crate binds parameters instead of using
    /// this string — this projection exists for logging and as the
    /// fingerprint input.
    pub fn sql(&self) -> String {
        let mut clauses = Vec::new();

        if let Some(f) = &self.level {
            if let Some(level) = &f.eq {
                clauses.push(format!("level = '{}'", level));
            }
        }
        if let Some(f) = &self.source {
            if let Some(source) = &f.eq {
                clauses.push(format!("source LIKE '%{}%'", source));
            }
        }
        if let Some(f) = &self.group {
            if let Some(group) = &f.eq {
                clauses.push(format!("group_name LIKE '%{}%'", group));
            }
        }
        if let Some(f) = &self.message {
            if let Some(pattern) = &f.eq {
                clauses.push(format!("message ~ '{}'", pattern));
            }
        }
        if let Some(f) = &self.received_at {
            if let Some(eq) = &f.eq {
                clauses.push(format!("recorded_at = '{}'", eq.to_rfc3339()));
            }
            if let Some(le) = &f.le {
                clauses.push(format!("recorded_at <= '{}'", le.to_rfc3339()));
            }
            if let Some(ge) = &f.ge {
                clauses.push(format!("recorded_at >= '{}'", ge.to_rfc3339()));
            }
        }

        if clauses.is_empty() {
            "TRUE".to_string()
        } else {
            clauses.join(" AND ")
        }
    }
}

impl Fingerprint for LogFilter {
    /// Cache key: leading 8 bytes of the SHA-256 of the canonical SQL
    /// projection. Equal filters always fingerprint equally because the
    /// projection is a pure function of the operand values.
    fn fingerprint(&self) -> u64 {
        let digest = Sha256::digest(self.sql().as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_record() -> LogRecord {
        let mut record = LogRecord::new(Level::Info, "hello 42");
        record.source = Some("api-gateway".to_string());
        record.group = Some("checkout".to_string());
        record
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = LogFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&sample_record()).unwrap());
    }

    #[test]
    fn test_combined_filter_match() {
        let filter = LogFilter::new()
            .with_level(Level::Info)
            .with_source("gate")
            .with_message(r"hello \d+");
        assert!(filter.matches(&sample_record()).unwrap());

        let filter = LogFilter::new().with_level(Level::Warn);
        assert!(!filter.matches(&sample_record()).unwrap());
    }

    #[test]
    fn test_source_absent_fails_predicate() {
        let mut record = sample_record();
        record.source = None;
        let filter = LogFilter::new().with_source("gate");
        assert!(!filter.matches(&record).unwrap());
    }

    #[test]
    fn test_group_substring() {
        let filter = LogFilter::new().with_group("check");
        assert!(filter.matches(&sample_record()).unwrap());

        let filter = LogFilter::new().with_group("billing");
        assert!(!filter.matches(&sample_record()).unwrap());
    }

    #[test]
    fn test_message_regex_mismatch() {
        let filter = LogFilter::new().with_message(r"^\d+$");
        assert!(!filter.matches(&sample_record()).unwrap());
    }

    #[test]
    fn test_malformed_regex_is_error() {
        let filter = LogFilter::new().with_message("(unclosed");
        match filter.matches(&sample_record()) {
            Err(Error::Filter(_)) => {}
            other => panic!("Expected Filter error, got {:?}", other),
        }
    }

    #[test]
    fn test_time_predicates() {
        let record = sample_record();
        let now = record.recorded_at;
        let before = now - Duration::hours(1);
        let after = now + Duration::hours(1);

        // eq
        let filter = LogFilter::new().with_received_at(FieldFilter::eq(now));
        assert!(filter.matches(&record).unwrap());
        let filter = LogFilter::new().with_received_at(FieldFilter::eq(after));
        assert!(!filter.matches(&record).unwrap());

        // le only
        let filter = LogFilter::new().with_received_at(FieldFilter::at_most(after));
        assert!(filter.matches(&record).unwrap());
        let filter = LogFilter::new().with_received_at(FieldFilter::at_most(before));
        assert!(!filter.matches(&record).unwrap());

        // ge only
        let filter = LogFilter::new().with_received_at(FieldFilter::at_least(before));
        assert!(filter.matches(&record).unwrap());
        let filter = LogFilter::new().with_received_at(FieldFilter::at_least(after));
        assert!(!filter.matches(&record).unwrap());

        // closed interval
        let filter = LogFilter::new().with_received_at(FieldFilter::between(before, after));
        assert!(filter.matches(&record).unwrap());
        let filter = LogFilter::new().with_received_at(FieldFilter::between(after, before));
        assert!(!filter.matches(&record).unwrap());

        // interval bounds are inclusive
        let filter = LogFilter::new().with_received_at(FieldFilter::between(now, now));
        assert!(filter.matches(&record).unwrap());
    }

    #[test]
    #[should_panic(expected = "time filter with no operators")]
    fn test_time_filter_without_operators_panics() {
        let filter = LogFilter::new().with_received_at(FieldFilter::default());
        let _ = filter.matches(&sample_record());
    }

    #[test]
    fn test_equality_is_structural() {
        let now = Utc::now();
        let build = || {
            LogFilter::new()
                .with_level(Level::Error)
                .with_source("app")
                .with_received_at(FieldFilter::at_most(now))
        };
        let f = build();
        let g = build();

        // reflexive and symmetric; distinct values, equal operands
        assert_eq!(f, f);
        assert_eq!(f, g);
        assert_eq!(g, f);

        let h = LogFilter::new().with_level(Level::Warn);
        assert_ne!(f, h);
        assert_ne!(LogFilter::new().with_level(Level::Error), LogFilter::new());
    }

    #[test]
    fn test_sql_projection() {
        assert_eq!(LogFilter::new().sql(), "TRUE");

        let filter = LogFilter::new()
            .with_level(Level::Warn)
            .with_source("gw")
            .with_message(r"timeout \d+ms");
        assert_eq!(
            filter.sql(),
            "level = 'warn' AND source LIKE '%gw%' AND message ~ 'timeout \\d+ms'"
        );
    }

    #[test]
    fn test_sql_time_operators() {
        let now = Utc::now();
        let filter =
            LogFilter::new().with_received_at(FieldFilter::between(now - Duration::hours(1), now));
        let sql = filter.sql();
        assert!(sql.contains("recorded_at <= "));
        assert!(sql.contains("recorded_at >= "));
        assert!(!sql.contains("recorded_at = "));
    }

    #[test]
    fn test_fingerprint_follows_equality() {
        let f = LogFilter::new().with_level(Level::Info).with_group("pay");
        let g = LogFilter::new().with_level(Level::Info).with_group("pay");
        assert_eq!(f.fingerprint(), g.fingerprint());

        let h = LogFilter::new().with_level(Level::Info).with_group("ship");
        assert_ne!(f.fingerprint(), h.fingerprint());
    }
}
