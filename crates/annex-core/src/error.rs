//! Error types for the attachment registry.
//!
//! Lookup failures (`UnknownOperation`, `MissingDelegateOperation`) and configuration
//! failures (`UnsupportedType`, `AbstractType`, `TypeNameConflict`) are raised by the
//! registry itself. Failures of the invoked operation travel through `Invocation`
//! untouched, so callers can downcast to whatever the delegate produced.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the attachment registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    // Dispatch errors
    #[error("Unknown operation '{operation}' on type {type_name}")]
    UnknownOperation { type_name: String, operation: String },

    #[error("Delegate '{delegate}' has no operation named '{operation}'")]
    MissingDelegateOperation { delegate: String, operation: String },

    /// The invoked operation failed. Display and source are the operation's own.
    #[error(transparent)]
    Invocation(anyhow::Error),

    // Configuration errors
    #[error("Unsupported type: {type_name} does not take part in method attachment")]
    UnsupportedType { type_name: String },

    #[error("Abstract type {type_name} cannot hold attached methods")]
    AbstractType { type_name: String },

    #[error("Type name {type_name} is already registered for a different type")]
    TypeNameConflict { type_name: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // Cache backend errors
    #[error("Cache error: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        RegistryError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for RegistryError {
    fn from(err: rusqlite::Error) -> Self {
        RegistryError::Cache {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RegistryError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        RegistryError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// True when a call found no attached method under the requested name.
    pub fn is_unknown_operation(&self) -> bool {
        matches!(self, RegistryError::UnknownOperation { .. })
    }

    /// True for programming errors in how types were declared or registered.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            RegistryError::UnsupportedType { .. }
                | RegistryError::AbstractType { .. }
                | RegistryError::TypeNameConflict { .. }
                | RegistryError::Config { .. }
        )
    }

    /// Hand back the invoked operation's original error.
    ///
    /// Returns `Err(self)` for every error the registry raised on its own.
    pub fn into_invocation_error(self) -> std::result::Result<anyhow::Error, Self> {
        match self {
            RegistryError::Invocation(err) => Ok(err),
            other => Err(other),
        }
    }
}
