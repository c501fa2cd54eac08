use super::{read_result, single_value, Backend, Field, Status};
use crate::error::BackendError;
use crate::registry::Properties;
use crate::utils::{fast_map, FastMap};

use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// A single hash map behind one global read-write lock.
pub struct RwLockBackend {
    map: RwLock<FastMap<String, String>>,
}

impl Default for RwLockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RwLockBackend {
    /// The registry name of this backend.
    pub const NAME: &'static str = "rwlock";

    /// Create an empty backend.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty backend with room for `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        RwLockBackend {
            map: RwLock::new(fast_map(capacity)),
        }
    }

    /// Configure from harness properties. Reads `capacity`.
    pub fn from_properties(props: &Properties) -> Result<Self, BackendError> {
        let capacity = props.parse::<usize>("capacity")?.unwrap_or(0);
        debug!(capacity, "creating rwlock backend");
        Ok(Self::with_capacity(capacity))
    }
}

impl Backend for RwLockBackend {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn read(
        &self,
        _table: &str,
        key: &str,
        _fields: Option<&[String]>,
        result: &mut Vec<Field>,
    ) -> Result<Status, BackendError> {
        let value = self
            .map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        Ok(read_result(key, value, result))
    }

    fn update(&self, table: &str, key: &str, values: &[Field]) -> Result<Status, BackendError> {
        self.insert(table, key, values)
    }

    fn insert(&self, _table: &str, key: &str, values: &[Field]) -> Result<Status, BackendError> {
        let value = single_value(key, values)?;
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(Status::Ok)
    }

    fn delete(&self, _table: &str, key: &str) -> Result<Status, BackendError> {
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(Status::Ok)
    }
}
