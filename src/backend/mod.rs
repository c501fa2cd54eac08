//! Backends - the store interface the benchmark harness drives
//!
//! Every backend implements [Backend], the same operation set a YCSB client
//! issues: read, insert, update, delete and scan of single records. Records
//! are lists of [Field]s, but every backend here stores exactly one value per
//! key. Tables and requested field lists are accepted and ignored.

mod amortized;
mod rwlock;
mod segmented;

pub use self::amortized::AmortizedBackend;
pub use self::rwlock::RwLockBackend;
pub use self::segmented::SegmentedBackend;

use crate::error::BackendError;
use tracing::warn;

/// One named value of a record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Field {
    /// The field name.
    pub name: String,
    /// The field content.
    pub value: String,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Field {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The outcome of an operation that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The operation completed.
    Ok,
    /// A read found no value for the key.
    NotFound,
}

/// The operations a store exposes to the harness.
///
/// Backends are shared by every worker thread, so all operations take `&self`.
/// Writes and deletes always report [Status::Ok], even when nothing changed.
pub trait Backend: Send + Sync {
    /// The name this backend is registered under.
    fn name(&self) -> &'static str;

    /// Called once per worker thread before the workload starts.
    fn init(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Called once per worker thread after the workload finished.
    fn cleanup(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Read the record for `key`. On success a single field is pushed to
    /// `result`.
    fn read(
        &self,
        table: &str,
        key: &str,
        fields: Option<&[String]>,
        result: &mut Vec<Field>,
    ) -> Result<Status, BackendError>;

    /// Range queries are not supported. Always succeeds with no results.
    fn scan(
        &self,
        _table: &str,
        _key: &str,
        _len: usize,
        _fields: Option<&[String]>,
        _result: &mut Vec<Vec<Field>>,
    ) -> Result<Status, BackendError> {
        Ok(Status::Ok)
    }

    /// Overwrite the record for `key`. Whether the key exists is not checked.
    fn update(&self, table: &str, key: &str, values: &[Field]) -> Result<Status, BackendError>;

    /// Store the record for `key`. Identical to `update`.
    fn insert(&self, table: &str, key: &str, values: &[Field]) -> Result<Status, BackendError>;

    /// Remove the record for `key`. Deleting an absent key succeeds.
    fn delete(&self, table: &str, key: &str) -> Result<Status, BackendError>;
}

/// Collapse a record to the single value the backends store.
pub(crate) fn single_value<'a>(key: &str, values: &'a [Field]) -> Result<&'a str, BackendError> {
    match values {
        [] => Err(BackendError::EmptyRecord {
            key: key.to_string(),
        }),
        [only] => Ok(&only.value),
        [first, rest @ ..] => {
            warn!(
                key,
                dropped = rest.len(),
                "record has more than one field, storing the first"
            );
            Ok(&first.value)
        }
    }
}

/// Push the stored value to a read result.
pub(crate) fn read_result(key: &str, value: Option<String>, result: &mut Vec<Field>) -> Status {
    match value {
        Some(value) => {
            result.push(Field::new(key, value));
            Status::Ok
        }
        None => Status::NotFound,
    }
}
