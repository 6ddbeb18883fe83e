//! One configuration file for defaults, command-line arguments and
//! subprogram dispatch.
//!
//! A configuration root holds default values plus two reserved keys:
//!
//! - `argparse`: argument definitions in the style of Python's argparse,
//!   turned into a [`clap`] parser by [`ParserBuilder`];
//! - `subprograms`: names mapped to subprogram paths, selected by the first
//!   positional token.
//!
//! Every default leaf also becomes a `--dotted.path` option, so any value
//! can be overridden from the command line. Parsed values are merged over
//! the defaults into one [`ConfigTree`].
//!
//! # Main entry points
//!
//! - [`Multiplexor::get_conf`]: permissive parse against the root parser,
//!   ignoring any subprogram table.
//! - [`Multiplexor::dispatch`]: two-phase parse that selects a subprogram
//!   through a [`SubprogramLoader`] ([`SubprogramRegistry`] or
//!   [`DeclarativeLoader`]).
//! - [`Multiplexor::execute`]: dispatch, then run the selected entry point.
//!
//! # Example
//!
//! ```
//! use multiplex::{Multiplexor, ParserBuilder, Selection, SubprogramRegistry};
//! use serde_json::json;
//!
//! let plex = Multiplexor::from_text(
//!     r#"
//! lr: 0.1
//! subprograms:
//!   train: train_entry
//! "#,
//! )
//! .unwrap();
//!
//! let mut registry = SubprogramRegistry::new();
//! registry
//!     .register_parser("train_entry", |parents| {
//!         let spec = json!([{"name_or_flags": "--epochs", "type": "int", "default": 1}]);
//!         Ok(ParserBuilder::new().with_parents(parents).build_value(&spec)?.parser)
//!     })
//!     .unwrap();
//!
//! let selection = plex.dispatch(["train", "--lr", "0.5"], &registry).unwrap();
//! assert_eq!(selection.program(), Some("train"));
//! assert_eq!(selection.config().get("lr").unwrap(), &json!(0.5));
//! assert_eq!(selection.config().get("epochs").unwrap(), &json!(1));
//! assert!(!selection.config().contains("program"));
//!
//! let selection = plex.dispatch(Vec::<String>::new(), &registry).unwrap();
//! assert!(matches!(selection, Selection::Main { .. }));
//! ```
//!
//! [`ConfigTree`]: multiplex_core::ConfigTree

mod declarative;
mod defaults;
mod error;
mod facade;
mod residual;

pub mod dispatch;
pub mod parser;
pub mod registry;

#[cfg(feature = "run-command")]
pub mod exec;

pub use declarative::DeclarativeLoader;
pub use defaults::{DEFAULTS_HEADING, default_arguments};
pub use dispatch::{DispatchState, Selection, SubprogramDispatcher};
pub use error::{BoxError, Capability, MultiplexError, Result};
pub use facade::{MultiplexOptions, Multiplexor};
pub use parser::{ArgParser, BuiltParser, ParsedResult, ParserBuilder};
pub use registry::{SubprogramHandle, SubprogramLoader, SubprogramRegistry};
pub use residual::residual_tree;

#[cfg(feature = "run-command")]
pub use exec::{CONFIG_ENV_VAR, run_command};

pub use multiplex_core::{ConfigTree, merge};
pub use multiplex_loader::{ConfigSource, NestedConfigResolver};
