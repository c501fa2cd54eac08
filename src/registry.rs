//! Registry - select a backend by name from harness properties
//!
//! The harness describes a run with a bag of string [Properties]. The
//! `dbname` property names the backend, and the rest are handed to that
//! backend's constructor. An unset `dbname` means [DEFAULT_BACKEND], which
//! this crate does not provide, so a run must always name its backend.
//!
//! # Examples
//! ```
//! use amortkv::registry::{Properties, Registry};
//!
//! let registry = Registry::with_defaults();
//! let props: Properties = [("dbname", "segmented"), ("segmented.segments", "8")]
//!     .into_iter()
//!     .collect();
//! let backend = registry.create(&props).unwrap();
//! assert_eq!(backend.name(), "segmented");
//! ```

use crate::backend::{AmortizedBackend, Backend, RwLockBackend, SegmentedBackend};
use crate::error::BackendError;

use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

/// The backend name assumed when `dbname` is not set.
pub const DEFAULT_BACKEND: &str = "basic";

/// Builds a backend from the run properties.
pub type BackendCtor = fn(&Properties) -> Result<Box<dyn Backend>, BackendError>;

/// String key value settings for a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Properties {
    inner: BTreeMap<String, String>,
}

impl Properties {
    /// Create an empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, returning the previous value.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.inner.insert(name.into(), value.into())
    }

    /// The value of `name`, if set.
    pub fn get_property(&self, name: &str) -> Option<&str> {
        self.inner.get(name).map(String::as_str)
    }

    /// The value of `name`, or `default` if unset.
    pub fn get_property_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get_property(name).unwrap_or(default)
    }

    /// Parse the value of `name`. Unset properties are `Ok(None)`.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, BackendError> {
        self.get_property(name)
            .map(|value| {
                value.trim().parse().map_err(|_| BackendError::InvalidProperty {
                    name: name.to_string(),
                    value: value.to_string(),
                })
            })
            .transpose()
    }
}

impl<K, V> FromIterator<(K, V)> for Properties
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Properties {
            inner: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Maps backend names to their constructors.
#[derive(Default)]
pub struct Registry {
    backends: BTreeMap<&'static str, BackendCtor>,
}

fn amortized(props: &Properties) -> Result<Box<dyn Backend>, BackendError> {
    Ok(Box::new(AmortizedBackend::from_properties(props)?))
}

fn segmented(props: &Properties) -> Result<Box<dyn Backend>, BackendError> {
    Ok(Box::new(SegmentedBackend::from_properties(props)?))
}

fn rwlock(props: &Properties) -> Result<Box<dyn Backend>, BackendError> {
    Ok(Box::new(RwLockBackend::from_properties(props)?))
}

impl Registry {
    /// Create a registry with nothing registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every backend in this crate registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(AmortizedBackend::NAME, amortized);
        registry.register(SegmentedBackend::NAME, segmented);
        registry.register(RwLockBackend::NAME, rwlock);
        registry
    }

    /// Register `ctor` under `name`. Returns false if the name was taken, in
    /// which case the previous constructor is replaced.
    pub fn register(&mut self, name: &'static str, ctor: BackendCtor) -> bool {
        self.backends.insert(name, ctor).is_none()
    }

    /// The registered names, in order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.backends.keys().copied()
    }

    /// Build the backend named by the `dbname` property.
    pub fn create(&self, props: &Properties) -> Result<Box<dyn Backend>, BackendError> {
        let name = props.get_property_or("dbname", DEFAULT_BACKEND);
        let ctor = self
            .backends
            .get(name)
            .ok_or_else(|| BackendError::UnknownBackend(name.to_string()))?;
        debug!(name, "creating backend");
        ctor(props)
    }
}
