use std::fmt;

/// Errors a backend or the registry can report to the harness.
///
/// Contended paths retry internally, so every variant is harness misuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// A write carried no field to store
    EmptyRecord {
        /// The key the write was for
        key: String,
    },
    /// No backend is registered under this name
    UnknownBackend(String),
    /// A property was set to a value that could not be understood
    InvalidProperty {
        /// The property name
        name: String,
        /// The rejected value
        value: String,
    },
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::EmptyRecord { key } => {
                write!(f, "Write to key '{}' carried no fields", key)
            }
            BackendError::UnknownBackend(name) => {
                write!(f, "No backend registered as '{}'", name)
            }
            BackendError::InvalidProperty { name, value } => {
                write!(f, "Invalid value '{}' for property '{}'", value, name)
            }
        }
    }
}

impl std::error::Error for BackendError {}
