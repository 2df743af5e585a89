//! Text/regex search over a loaded record set.

use crate::error::Result;
use crate::record::{Record, value_text};
use memchr::memmem;
use regex::{Regex, RegexBuilder};
use std::borrow::Cow;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterQuery {
    pub text: String,
    pub is_regex: bool,
    /// Restrict matching to the value of one top-level field.
    pub field_scope: Option<String>,
}

impl FilterQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            text: pattern.into(),
            is_regex: true,
            field_scope: None,
        }
    }

    pub fn in_field(mut self, field: impl Into<String>) -> Self {
        self.field_scope = Some(field.into());
        self
    }

    pub fn is_identity(&self) -> bool {
        self.text.is_empty() && self.field_scope.is_none()
    }
}

/// Indices into the record set, ascending.
pub type FilteredIndexSet = Vec<usize>;

enum Matcher {
    Any,
    Regex(Regex),
    /// Needle is stored lowercased.
    Plain(memmem::Finder<'static>),
}

impl Matcher {
    fn compile(query: &FilterQuery) -> Result<Self> {
        if query.text.is_empty() {
            return Ok(Matcher::Any);
        }
        if query.is_regex {
            let regex = RegexBuilder::new(&query.text)
                .case_insensitive(true)
                .build()?;
            Ok(Matcher::Regex(regex))
        } else {
            let needle = query.text.to_lowercase();
            Ok(Matcher::Plain(memmem::Finder::new(&needle).into_owned()))
        }
    }

    fn is_match(&self, haystack: &str) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Regex(regex) => regex.is_match(haystack),
            Matcher::Plain(finder) => finder.find(haystack.to_lowercase().as_bytes()).is_some(),
        }
    }
}

/// Every record index satisfying `query`, in record order.
///
/// Fails only when a regex query does not compile.
pub fn compute(records: &[Record], query: &FilterQuery) -> Result<FilteredIndexSet> {
    if query.is_identity() {
        return Ok((0..records.len()).collect());
    }

    let matcher = Matcher::compile(query)?;
    let indices = records
        .iter()
        .enumerate()
        .filter(|(_, record)| {
            let target: Cow<'_, str> = match &query.field_scope {
                Some(field) => match record.field(field) {
                    Some(value) => value_text(value),
                    None => return false,
                },
                None => Cow::Borrowed(record.raw_text.as_str()),
            };
            matcher.is_match(&target)
        })
        .map(|(index, _)| index)
        .collect();

    Ok(indices)
}

/// The active query and its result, kept intact when a new query fails to compile.
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    query: FilterQuery,
    indices: FilteredIndexSet,
}

impl FilterState {
    pub fn query(&self) -> &FilterQuery {
        &self.query
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Recompute for `query`. On error the previous query and indices are retained.
    pub fn apply(&mut self, records: &[Record], query: FilterQuery) -> Result<usize> {
        let indices = compute(records, &query)?;
        self.query = query;
        self.indices = indices;
        Ok(self.indices.len())
    }

    /// Recompute the current query, e.g. after the record set changed.
    pub fn refresh(&mut self, records: &[Record]) -> Result<usize> {
        let query = self.query.clone();
        self.apply(records, query)
    }

    pub fn reset(&mut self, record_count: usize) {
        self.query = FilterQuery::default();
        self.indices = (0..record_count).collect();
    }
}

/// Coalesces rapid updates, releasing only the latest once `delay` has passed.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.delay));
    }

    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, deadline)) if *deadline <= now => self.pending.take().map(|(value, _)| value),
            _ => None,
        }
    }

    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Time left before the pending value is due.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.pending
            .as_ref()
            .map(|(_, deadline)| deadline.saturating_duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViewerError;
    use serde_json::json;

    fn sample() -> Vec<Record> {
        vec![
            Record::new(1, json!({"a": 1}), r#"{"a":1}"#),
            Record::new(2, json!({"b": "x"}), r#"{"b":"x"}"#),
            Record::new(4, json!({"a": 2, "b": "y"}), r#"{"a":2,"b":"y"}"#),
        ]
    }

    #[test]
    fn empty_query_is_identity() {
        let records = sample();
        assert_eq!(compute(&records, &FilterQuery::default()).unwrap(), vec![0, 1, 2]);
        assert!(compute(&[], &FilterQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn field_scope_requires_key_and_matches_its_value() {
        let records = sample();
        let query = FilterQuery::text("x").in_field("b");
        assert_eq!(compute(&records, &query).unwrap(), vec![1]);
    }

    #[test]
    fn field_scope_with_empty_text_keeps_records_having_the_key() {
        let records = sample();
        let query = FilterQuery::text("").in_field("a");
        assert_eq!(compute(&records, &query).unwrap(), vec![0, 2]);
    }

    #[test]
    fn plain_search_is_case_insensitive_on_raw_text() {
        let records = vec![
            Record::new(1, json!({"msg": "Hello World"}), r#"{"msg": "Hello World"}"#),
            Record::new(2, json!({"msg": "bye"}), r#"{"msg": "bye"}"#),
        ];
        assert_eq!(compute(&records, &FilterQuery::text("WORLD")).unwrap(), vec![0]);
        // raw formatting is matched, not the re-serialized value
        assert_eq!(compute(&records, &FilterQuery::text("\": \"")).unwrap(), vec![0, 1]);
    }

    #[test]
    fn regex_matches_full_raw_line() {
        let records = vec![
            Record::new(1, json!("abc"), "\"abc\""),
            Record::new(2, json!(["a"]), "[\"a\"]"),
            Record::new(3, json!(1), "1"),
        ];
        let raw = vec![
            Record::new(1, json!(null), "Alpha"),
            Record::new(2, json!(null), "beta a"),
        ];
        assert!(compute(&records, &FilterQuery::regex("^a")).unwrap().is_empty());
        assert_eq!(compute(&raw, &FilterQuery::regex("^a")).unwrap(), vec![0]);
    }

    #[test]
    fn scoped_values_are_stringified() {
        let records = vec![
            Record::new(1, json!({"v": true}), ""),
            Record::new(2, json!({"v": {"deep": 10}}), ""),
            Record::new(3, json!({"v": 3.5}), ""),
        ];
        assert_eq!(
            compute(&records, &FilterQuery::text("TRUE").in_field("v")).unwrap(),
            vec![0]
        );
        assert_eq!(
            compute(&records, &FilterQuery::text("deep").in_field("v")).unwrap(),
            vec![1]
        );
        assert_eq!(
            compute(&records, &FilterQuery::regex(r"^\d+\.\d$").in_field("v")).unwrap(),
            vec![2]
        );
    }

    #[test]
    fn invalid_regex_keeps_previous_result() {
        let records = sample();
        let mut state = FilterState::default();
        state.apply(&records, FilterQuery::text("x")).unwrap();
        assert_eq!(state.indices(), &[1]);

        let err = state.apply(&records, FilterQuery::regex("(")).unwrap_err();
        assert!(matches!(err, ViewerError::InvalidQuery(_)));
        assert_eq!(state.indices(), &[1]);
        assert_eq!(state.query(), &FilterQuery::text("x"));
    }

    #[test]
    fn repeated_compute_is_stable() {
        let records = sample();
        let query = FilterQuery::regex("[ab]");
        let first = compute(&records, &query).unwrap();
        let second = compute(&records, &query).unwrap();
        assert_eq!(first, second);
        assert!(first.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn debouncer_releases_latest_after_delay() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(300));

        debouncer.push("a", start);
        debouncer.push("ab", start + Duration::from_millis(100));
        assert_eq!(debouncer.take_due(start + Duration::from_millis(350)), None);
        assert_eq!(
            debouncer.remaining(start + Duration::from_millis(350)),
            Some(Duration::from_millis(50))
        );
        assert_eq!(debouncer.take_due(start + Duration::from_millis(400)), Some("ab"));
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn debouncer_flush_returns_pending_immediately() {
        let now = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_secs(10));
        debouncer.push(1, now);
        assert_eq!(debouncer.flush(), Some(1));
        assert_eq!(debouncer.flush(), None);
    }
}
