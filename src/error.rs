use std::path::Path;

use thiserror::Error;

/// Top-level error type for the uplog library.
#[derive(Error, Debug)]
pub enum UplogError {
    /// File-system failure while operating on the log directory or a segment.
    #[error("storage: {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },
    /// Observation could not be encoded.
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Invalid or unreadable configuration.
    #[error("config: {0}")]
    Config(String),
    /// Scheduler lifecycle misuse.
    #[error("scheduler: {0}")]
    Scheduler(String),
    /// Other error cases.
    #[error("other: {0}")]
    Other(String),
}

impl UplogError {
    pub(crate) fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        UplogError::Storage {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn at_path(what: &str, path: &Path, source: std::io::Error) -> Self {
        Self::storage(format!("{what} {}", path.display()), source)
    }
}

impl From<toml::de::Error> for UplogError {
    fn from(err: toml::de::Error) -> Self {
        UplogError::Config(format!("invalid config file: {err}"))
    }
}

impl From<toml::ser::Error> for UplogError {
    fn from(err: toml::ser::Error) -> Self {
        UplogError::Config(err.to_string())
    }
}
