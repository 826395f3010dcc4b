//! Common types used across table operations.
//!
//! A table holds [`Row`]s. Each row is identified by a [`RowKey`] (a
//! partition key that groups related rows plus a sort key that orders rows
//! within the partition) and carries a flat set of typed [`Fields`].

use std::{cmp::Ordering, collections::BTreeMap, fmt};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TableError, TableResult};

/// Two-level identity of a row: `(partition, sort)`.
///
/// Within one table the pair is unique. Writing a row whose key already
/// exists replaces it.
///
/// Keys order by partition first, then by sort key, both compared
/// lexicographically.
///
/// # Examples
///
/// ```
/// use idtable_storage::RowKey;
///
/// let a = RowKey::new("client-1", "0000");
/// let b = RowKey::new("client-1", "0001");
/// assert!(a < b);
/// assert_eq!(a.to_string(), "client-1/0000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey {
    /// Groups related rows for efficient range scans.
    pub partition: String,

    /// Orders and disambiguates rows within a partition.
    pub sort: String,
}

impl RowKey {
    /// Creates a new row key.
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self { partition: partition.into(), sort: sort.into() }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition, self.sort)
    }
}

/// A single typed field value.
///
/// Absent optional values are represented by leaving the field out of
/// [`Fields`] entirely, so there is no null variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// UTF-8 text.
    String(String),
    /// Boolean flag.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// UTC timestamp.
    DateTime(DateTime<Utc>),
    /// Opaque bytes.
    Binary(Bytes),
}

impl FieldValue {
    /// Compares two values of the same kind.
    ///
    /// Returns `None` when the kinds differ; filters treat that as a
    /// non-match rather than coercing.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::Binary(a), Self::Binary(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::DateTime(_) => "datetime",
            Self::Binary(_) => "binary",
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

impl From<Bytes> for FieldValue {
    fn from(value: Bytes) -> Self {
        Self::Binary(value)
    }
}

/// Flat, named field set carried by a row.
///
/// Typed getters return `Ok(None)` for a missing field and a
/// [`TableError::Decode`] when the field exists with a different kind.
///
/// # Examples
///
/// ```
/// use idtable_storage::Fields;
///
/// let mut fields = Fields::new();
/// fields.set("Enabled", true);
/// fields.set_opt("Description", None::<String>);
///
/// assert_eq!(fields.get_bool("Enabled").unwrap(), Some(true));
/// assert_eq!(fields.get_str("Description").unwrap(), None);
/// assert!(fields.get_str("Enabled").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    /// Creates an empty field set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Sets a field when `value` is `Some`, removes it otherwise.
    pub fn set_opt<V: Into<FieldValue>>(
        &mut self,
        name: impl Into<String>,
        value: Option<V>,
    ) -> &mut Self {
        let name = name.into();
        match value {
            Some(v) => {
                self.0.insert(name, v.into());
            },
            None => {
                self.0.remove(&name);
            },
        }
        self
    }

    /// Returns the raw value of a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no fields are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Reads a string field.
    pub fn get_str(&self, name: &str) -> TableResult<Option<String>> {
        match self.0.get(name) {
            None => Ok(None),
            Some(FieldValue::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(mismatch(name, "string", other)),
        }
    }

    /// Reads a boolean field.
    pub fn get_bool(&self, name: &str) -> TableResult<Option<bool>> {
        match self.0.get(name) {
            None => Ok(None),
            Some(FieldValue::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(mismatch(name, "bool", other)),
        }
    }

    /// Reads an integer field.
    pub fn get_i64(&self, name: &str) -> TableResult<Option<i64>> {
        match self.0.get(name) {
            None => Ok(None),
            Some(FieldValue::Int(n)) => Ok(Some(*n)),
            Some(other) => Err(mismatch(name, "int", other)),
        }
    }

    /// Reads an integer field that must fit in an `i32`.
    pub fn get_i32(&self, name: &str) -> TableResult<Option<i32>> {
        self.get_i64(name)?
            .map(|n| {
                i32::try_from(n).map_err(|e| {
                    TableError::decode_with_source(format!("field {name} out of range: {n}"), e)
                })
            })
            .transpose()
    }

    /// Reads a timestamp field.
    pub fn get_datetime(&self, name: &str) -> TableResult<Option<DateTime<Utc>>> {
        match self.0.get(name) {
            None => Ok(None),
            Some(FieldValue::DateTime(t)) => Ok(Some(*t)),
            Some(other) => Err(mismatch(name, "datetime", other)),
        }
    }

    /// Reads a binary field.
    pub fn get_binary(&self, name: &str) -> TableResult<Option<Bytes>> {
        match self.0.get(name) {
            None => Ok(None),
            Some(FieldValue::Binary(b)) => Ok(Some(b.clone())),
            Some(other) => Err(mismatch(name, "binary", other)),
        }
    }
}

fn mismatch(name: &str, expected: &str, found: &FieldValue) -> TableError {
    TableError::decode(format!("field {name}: expected {expected}, found {}", found.kind()))
}

impl FromIterator<(String, FieldValue)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Fields {
    type Item = (String, FieldValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A stored row: key plus fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// The row's identity.
    pub key: RowKey,

    /// The row's typed fields.
    pub fields: Fields,
}

impl Row {
    /// Creates a new row.
    pub fn new(key: RowKey, fields: Fields) -> Self {
        Self { key, fields }
    }
}

/// Opaque cursor naming where the next scan page starts.
///
/// Tokens are produced by a [`TableService`](crate::TableService) and only
/// meaningful to the service that issued them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken(pub RowKey);

/// One page of scan results.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Rows in key order.
    pub rows: Vec<Row>,

    /// Cursor for the next page; `None` when the scan is complete.
    pub continuation: Option<ContinuationToken>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_row_key_orders_partition_then_sort() {
        let mut keys = vec![
            RowKey::new("b", "0000"),
            RowKey::new("a", "0001"),
            RowKey::new("a", "0000"),
        ];
        keys.sort();
        assert_eq!(keys[0], RowKey::new("a", "0000"));
        assert_eq!(keys[1], RowKey::new("a", "0001"));
        assert_eq!(keys[2], RowKey::new("b", "0000"));
    }

    #[test]
    fn test_compare_same_kind_only() {
        let early = FieldValue::from(Utc.with_ymd_and_hms(2016, 8, 1, 0, 0, 0).unwrap());
        let late = FieldValue::from(Utc.with_ymd_and_hms(2016, 8, 31, 0, 0, 0).unwrap());
        assert_eq!(early.compare(&late), Some(Ordering::Less));
        assert_eq!(FieldValue::from(1_i64).compare(&FieldValue::from("1")), None);
    }

    #[test]
    fn test_set_opt_none_removes_field() {
        let mut fields = Fields::new();
        fields.set("Description", "first");
        fields.set_opt("Description", None::<String>);
        assert!(fields.is_empty());
    }

    #[test]
    fn test_typed_getters() {
        let mut fields = Fields::new();
        fields.set("Name", "api1").set("Enabled", false).set("Lifetime", 3600_i32);

        assert_eq!(fields.get_str("Name").unwrap().as_deref(), Some("api1"));
        assert_eq!(fields.get_bool("Enabled").unwrap(), Some(false));
        assert_eq!(fields.get_i32("Lifetime").unwrap(), Some(3600));
        assert_eq!(fields.get_datetime("Missing").unwrap(), None);
    }

    #[test]
    fn test_kind_mismatch_is_decode_error() {
        let mut fields = Fields::new();
        fields.set("Enabled", "yes");
        assert!(matches!(fields.get_bool("Enabled"), Err(TableError::Decode { .. })));
    }

    #[test]
    fn test_i32_out_of_range_is_decode_error() {
        let mut fields = Fields::new();
        fields.set("Lifetime", i64::MAX);
        assert!(matches!(fields.get_i32("Lifetime"), Err(TableError::Decode { .. })));
    }
}
