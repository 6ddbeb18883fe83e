//! Error types for parser building, dispatch and execution.

use std::fmt;
use std::path::PathBuf;

use multiplex_core::{PathError, SpecError};
use multiplex_loader::LoadError;
use thiserror::Error;

/// Boxed error returned by subprogram entry points.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The two things a subprogram module can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Builds the subprogram's parser from its parents.
    Parser,
    /// Runs the subprogram with the final configuration.
    EntryPoint,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parser => f.write_str("parser builder"),
            Self::EntryPoint => f.write_str("entry point"),
        }
    }
}

/// Errors that can occur while building parsers, dispatching or executing.
#[derive(Debug, Error)]
pub enum MultiplexError {
    /// Dotted-path addressing failed.
    #[error(transparent)]
    Path(#[from] PathError),

    /// The declarative parser description is invalid.
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// A configuration file could not be loaded or resolved.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Command-line tokens were rejected, or help was requested.
    ///
    /// Callers that own the process can hand the inner error to
    /// [`clap::Error::exit`].
    #[error(transparent)]
    ArgumentParse(#[from] clap::Error),

    /// A subprogram could not be loaded.
    #[error("failed to load subprogram from {}: {reason}", path.display())]
    ModuleLoadFailure {
        /// Resolved subprogram path.
        path: PathBuf,
        /// Loader-specific reason.
        reason: String,
    },

    /// A loaded subprogram lacks a required capability.
    #[error("subprogram '{module}' does not provide a {capability}")]
    MissingConvention {
        /// Module identity.
        module: String,
        /// Missing capability.
        capability: Capability,
    },

    /// A capability was registered twice for one module.
    #[error("subprogram '{module}' already has a registered {capability}")]
    DuplicateRegistration {
        /// Module identity.
        module: String,
        /// Capability registered twice.
        capability: Capability,
    },

    /// An API was used in a way the configuration does not allow.
    #[error("invalid usage: {0}")]
    InvalidUsage(String),

    /// An entry point returned an error.
    #[error("'{program}' failed: {source}")]
    EntryPoint {
        /// Program whose entry point failed.
        program: String,
        /// Error returned by the entry point.
        #[source]
        source: BoxError,
    },

    /// An external program could not be started.
    #[cfg(feature = "run-command")]
    #[error("failed to run {}: {source}", program.display())]
    Spawn {
        /// Executable that was started.
        program: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

impl MultiplexError {
    /// Returns the clap error when parsing failed or help was requested.
    pub fn as_clap(&self) -> Option<&clap::Error> {
        match self {
            Self::ArgumentParse(err) => Some(err),
            _ => None,
        }
    }
}

/// Convenience alias for results with [`MultiplexError`].
pub type Result<T> = std::result::Result<T, MultiplexError>;
