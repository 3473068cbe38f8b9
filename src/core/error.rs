//! Error types for Workbench.

use thiserror::Error;

/// Result type alias for Workbench operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Workbench operations.
#[derive(Error, Debug)]
pub enum Error {
    // Lookup errors
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    // Plugin errors
    #[error("Plugin validation failed for {module}: {reason}")]
    PluginValidation { module: String, reason: String },

    #[error("Worker {worker} failed on {sample}: {message}")]
    PluginExecution {
        worker: String,
        sample: String,
        message: String,
    },

    #[error("Dependency cycle: {0}")]
    DependencyCycle(String),

    // Result shaping errors
    #[error("Missing subkey: {0}")]
    MissingSubkey(String),

    #[error("Cannot stream sample {sample} with type tag {type_tag}")]
    UnsupportedType { sample: String, type_tag: String },

    #[error("Decode error ({type_tag}): {message}")]
    Decode { type_tag: String, message: String },

    // Infrastructure errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File watch error: {0}")]
    Watch(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a missing sample.
    pub fn sample_not_found(id: &str) -> Self {
        Error::NotFound {
            kind: "sample",
            id: id.to_string(),
        }
    }

    /// Shorthand for a missing sample set.
    pub fn sample_set_not_found(id: &str) -> Self {
        Error::NotFound {
            kind: "sample_set",
            id: id.to_string(),
        }
    }

    /// Whether batch and stream operations skip this error per element.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::MissingSubkey(_))
    }

    /// Stable snake_case tag for the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::UnknownWorker(_) => "unknown_worker",
            Error::PluginValidation { .. } => "plugin_validation",
            Error::PluginExecution { .. } => "plugin_execution",
            Error::DependencyCycle(_) => "dependency_cycle",
            Error::MissingSubkey(_) => "missing_subkey",
            Error::UnsupportedType { .. } => "unsupported_type",
            Error::Decode { .. } => "decode",
            Error::Config(_) => "config",
            Error::Watch(_) => "watch",
            Error::Protocol(_) => "protocol",
            Error::SerializationError(_) => "serialization",
            Error::Internal(_) => "internal",
            Error::Io(_) => "io",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<notify_debouncer_full::notify::Error> for Error {
    fn from(err: notify_debouncer_full::notify::Error) -> Self {
        Error::Watch(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skippable_errors() {
        assert!(Error::sample_not_found("abc").is_skippable());
        assert!(Error::MissingSubkey("a.b".to_string()).is_skippable());
        assert!(!Error::PluginExecution {
            worker: "meta".to_string(),
            sample: "abc".to_string(),
            message: "boom".to_string(),
        }
        .is_skippable());
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::sample_set_not_found("deadbeef");
        assert_eq!(err.to_string(), "sample_set not found: deadbeef");
        assert_eq!(err.kind(), "not_found");
    }
}
