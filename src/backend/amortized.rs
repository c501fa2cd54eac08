use super::{read_result, single_value, Backend, Field, Status};
use crate::amortmap::{AmortizedMap, AmortizedMapBuilder, MissPolicy};
use crate::error::BackendError;
use crate::registry::Properties;

use tracing::debug;

/// A backend over an [AmortizedMap]. Reads and overwrites of existing keys
/// are lock free.
pub struct AmortizedBackend {
    map: AmortizedMap<String, String>,
}

impl Default for AmortizedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AmortizedBackend {
    /// The registry name of this backend.
    pub const NAME: &'static str = "amortized";

    /// Create a backend over an empty map with default settings.
    pub fn new() -> Self {
        AmortizedBackend {
            map: AmortizedMap::new(),
        }
    }

    /// Create a backend over an existing map.
    pub fn with_map(map: AmortizedMap<String, String>) -> Self {
        AmortizedBackend { map }
    }

    /// Configure from harness properties. Reads `amortized.miss_policy`
    /// (`hits` or `all`) and `capacity`.
    pub fn from_properties(props: &Properties) -> Result<Self, BackendError> {
        let miss_policy = props
            .parse::<MissPolicy>("amortized.miss_policy")?
            .unwrap_or_default();
        let mut builder = AmortizedMapBuilder::new().set_miss_policy(miss_policy);
        if let Some(capacity) = props.parse::<usize>("capacity")? {
            builder = builder.set_capacity(capacity);
        }
        debug!(?miss_policy, "creating amortized backend");
        Ok(Self::with_map(builder.build()))
    }

    /// Access the underlying map, e.g. for its stats.
    pub fn map(&self) -> &AmortizedMap<String, String> {
        &self.map
    }
}

impl Backend for AmortizedBackend {
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
        Ok(read_result(key, self.map.get(key), result))
    }

    fn update(&self, table: &str, key: &str, values: &[Field]) -> Result<Status, BackendError> {
        self.insert(table, key, values)
    }

    fn insert(&self, _table: &str, key: &str, values: &[Field]) -> Result<Status, BackendError> {
        let value = single_value(key, values)?;
        self.map.insert(key.to_string(), value.to_string());
        Ok(Status::Ok)
    }

    fn delete(&self, _table: &str, key: &str) -> Result<Status, BackendError> {
        self.map.remove(key);
        Ok(Status::Ok)
    }
}
