//! Core configuration types for multiplexed command-line programs.
//!
//! This crate holds the pieces that do not touch the command line or the
//! file system:
//!
//! - [`ConfigTree`]: an ordered nested mapping whose leaves are addressed by
//!   dotted paths such as `optim.lr`.
//! - [`merge`] / [`merge_all`]: right-biased structural merging of trees.
//! - [`ArgumentSpec`] / [`ParserSpec`]: the declarative argument model read
//!   from the `argparse` section of a configuration file.
//! - [`parse_parser_spec`]: validation of that section, reporting
//!   [`SpecError`] before anything is built.
//!
//! # Example
//!
//! ```
//! use multiplex_core::*;
//! use serde_json::json;
//!
//! let defaults = ConfigTree::try_from(json!({"lr": 0.1, "model": {"depth": 4}})).unwrap();
//! let overrides = ConfigTree::from_dotted([("model.depth", json!(8))], ".");
//! let merged = merge(&defaults, &overrides);
//! assert_eq!(merged.get("model.depth").unwrap(), &json!(8));
//! assert_eq!(merged.keys(), vec!["lr", "model.depth"]);
//!
//! let spec = parse_parser_spec(&json!([{"name_or_flags": ["--lr"], "type": "float"}])).unwrap();
//! assert_eq!(spec.arguments[0].dest(), "lr");
//! ```

mod merge;
mod tree;
mod types;
mod validate;

pub use merge::{deep_merge, merge, merge_all};
pub use tree::{ConfigTree, DEFAULT_SEPARATOR, PathError};
pub use types::*;
pub use validate::{
    ARGUMENT_ALLOWED_KEYS, ARGUMENT_REQUIRED_KEYS, ARGUMENTS_KEY, PARSER_ALLOWED_KEYS, PARSER_KEY,
    PARSER_UNSUPPORTED_KEYS, SpecError, parse_argument, parse_parser_meta, parse_parser_spec,
};
