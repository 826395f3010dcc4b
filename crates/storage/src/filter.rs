//! Row filters for scans.
//!
//! A [`Filter`] is a conjunction of [`Predicate`]s plus an optional `take`
//! cap. Predicates compare the partition key, the sort key, or a named
//! field against a value with either equality or less-than-or-equal.
//!
//! Comparisons never coerce: a row whose field is missing, or holds a value
//! of a different kind, does not match.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use idtable_storage::Filter;
//!
//! let expired = Filter::new().field_le("Expiration", Utc::now()).take(100);
//! assert_eq!(expired.take_limit(), Some(100));
//! ```

use std::cmp::Ordering;

use crate::types::{FieldValue, Row};

/// The part of a row a predicate inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// The row's partition key.
    PartitionKey,
    /// The row's sort key.
    SortKey,
    /// A named field.
    Named(String),
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `field == value`
    Eq,
    /// `field <= value`
    Le,
}

/// A single `field <op> value` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// What to compare.
    pub field: Field,
    /// How to compare.
    pub op: Comparison,
    /// What to compare against.
    pub value: FieldValue,
}

impl Predicate {
    /// Evaluates this predicate against a row.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        let ordering = match &self.field {
            Field::PartitionKey => compare_key(&row.key.partition, &self.value),
            Field::SortKey => compare_key(&row.key.sort, &self.value),
            Field::Named(name) => row.fields.get(name).and_then(|v| v.compare(&self.value)),
        };
        match (ordering, self.op) {
            (Some(Ordering::Equal), _) => true,
            (Some(Ordering::Less), Comparison::Le) => true,
            _ => false,
        }
    }
}

fn compare_key(key: &str, value: &FieldValue) -> Option<Ordering> {
    match value {
        FieldValue::String(s) => Some(key.cmp(s.as_str())),
        _ => None,
    }
}

/// Conjunctive filter with an optional result cap.
///
/// An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    predicates: Vec<Predicate>,
    take: Option<usize>,
}

impl Filter {
    /// Creates a filter that matches every row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts matches to a single partition.
    #[must_use]
    pub fn partition_eq(self, partition: impl Into<String>) -> Self {
        self.with(Field::PartitionKey, Comparison::Eq, FieldValue::String(partition.into()))
    }

    /// Restricts matches to a single sort key.
    #[must_use]
    pub fn sort_eq(self, sort: impl Into<String>) -> Self {
        self.with(Field::SortKey, Comparison::Eq, FieldValue::String(sort.into()))
    }

    /// Requires a named field to equal `value`.
    #[must_use]
    pub fn field_eq(self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.with(Field::Named(name.into()), Comparison::Eq, value.into())
    }

    /// Requires a named field to be less than or equal to `value`.
    #[must_use]
    pub fn field_le(self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.with(Field::Named(name.into()), Comparison::Le, value.into())
    }

    /// Caps the number of rows a scan yields.
    #[must_use]
    pub fn take(mut self, limit: usize) -> Self {
        self.take = Some(limit);
        self
    }

    fn with(mut self, field: Field, op: Comparison, value: FieldValue) -> Self {
        self.predicates.push(Predicate { field, op, value });
        self
    }

    /// Returns the predicates in the order they were added.
    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Returns the `take` cap, if any.
    #[must_use]
    pub fn take_limit(&self) -> Option<usize> {
        self.take
    }

    /// Returns the partition this filter pins, if it has a partition
    /// equality predicate.
    ///
    /// Services use this to narrow a scan to one partition's key range.
    #[must_use]
    pub fn partition(&self) -> Option<&str> {
        self.predicates.iter().find_map(|p| match (&p.field, p.op, &p.value) {
            (Field::PartitionKey, Comparison::Eq, FieldValue::String(s)) => Some(s.as_str()),
            _ => None,
        })
    }

    /// Returns `true` if every predicate matches the row.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.predicates.iter().all(|p| p.matches(row))
    }
}
