//! Configuration loading and file-backed nested resolution.
//!
//! This crate is the boundary between configuration files and the in-memory
//! [`ConfigTree`](multiplex_core::ConfigTree):
//!
//! - [`ConfigSource`] accepts a tree, a JSON mapping, a file path or inline
//!   text and loads it into a [`LoadedConfig`].
//! - [`NestedConfigResolver`] expands residual command-line keys into
//!   configurations read from sibling files and directories.
//!
//! # Quick start
//!
//! ```no_run
//! use multiplex_loader::{ConfigSource, NestedConfigResolver};
//! use multiplex_core::ConfigTree;
//! use serde_json::json;
//!
//! let loaded = ConfigSource::path("configs/train.yaml").load().unwrap();
//! let resolver = NestedConfigResolver::new(loaded.base_dir());
//! let residual = ConfigTree::try_from(json!({"optimizer": {"lr": 0.01}})).unwrap();
//! let nested = resolver.resolve(&residual).unwrap();
//! ```

mod error;
mod resolver;
mod source;

pub use error::{LoadError, Result};
pub use resolver::{NESTED_EXTENSIONS, NestedConfigResolver};
pub use source::{ConfigFormat, ConfigSource, LoadedConfig, PROBE_EXTENSIONS, load_file, parse_text};
