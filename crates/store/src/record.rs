//! The mapping every stored record shape implements.

use idtable_storage::{Fields, Row, RowKey, TableResult};

/// A typed record that lives in exactly one table.
///
/// Implementations convert to and from the flat `(key, fields)` row form.
/// The conversion is pure: no I/O, no clock.
///
/// # Example
///
/// ```
/// use idtable_storage::{Fields, Row, RowKey, TableResult};
/// use idtable_store::record::TableRecord;
///
/// struct Note {
///     owner: String,
///     id: String,
///     text: String,
/// }
///
/// impl TableRecord for Note {
///     fn key(&self) -> RowKey {
///         RowKey::new(&self.owner, &self.id)
///     }
///
///     fn to_fields(&self) -> Fields {
///         let mut fields = Fields::new();
///         fields.set("Text", self.text.as_str());
///         fields
///     }
///
///     fn from_row(row: Row) -> TableResult<Self> {
///         let text = row.fields.get_str("Text")?.unwrap_or_default();
///         Ok(Self { owner: row.key.partition, id: row.key.sort, text })
///     }
/// }
/// ```
pub trait TableRecord: Sized + Send + Sync + 'static {
    /// Returns the record's `(partition, sort)` identity.
    fn key(&self) -> RowKey;

    /// Returns the non-key fields.
    fn to_fields(&self) -> Fields;

    /// Rebuilds a record from a stored row.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Decode`](idtable_storage::TableError::Decode)
    /// when the key or a field cannot be parsed.
    fn from_row(row: Row) -> TableResult<Self>;

    /// Returns the full row form.
    fn to_row(&self) -> Row {
        Row::new(self.key(), self.to_fields())
    }
}
