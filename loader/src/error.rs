//! Error types for configuration loading and nested resolution.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or resolving configuration files.
#[derive(Debug, Error)]
pub enum LoadError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// No candidate file exists for a path source.
    #[error("configuration not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The document root is not a mapping.
    #[error("configuration root must be a mapping, found {0}")]
    InvalidRoot(String),

    /// The file extension maps to no known format.
    #[error("unsupported configuration format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// A residual key matches neither a file nor a directory.
    #[error("cannot resolve '{key}' in {}: no {key}.yaml, {key}.yml, {key}.json or {key}/ found", dir.display())]
    AmbiguousResolution {
        /// Key being resolved.
        key: String,
        /// Directory that was searched.
        dir: PathBuf,
    },
}

/// Convenience alias for results with [`LoadError`].
pub type Result<T> = std::result::Result<T, LoadError>;
