//! Selecting and configuring a subprogram from the command line.
//!
//! Dispatch runs in two phases. The first phase parses permissively with
//! the root parser plus a `program` positional whose choices are the
//! subprogram names. Help is held back so that `train --help` reaches the
//! subprogram instead of printing the root help.
//!
//! - When a subprogram is named, its parser is built with the shared root
//!   parser as parent and the residual tokens are parsed against it, with
//!   the first-phase values as namespace. Tokens it does not know either are
//!   read as `--key=value` pairs and resolved against files next to the
//!   subprogram.
//!
//! A selected subprogram's configuration is layered, lowest first: root
//! defaults, parsed values, the subprogram's own defaults, values given on
//! the command line, then resolved nested files.
//! - Otherwise help is restored and the original tokens are parsed again,
//!   strictly.

use std::fmt;
use std::path::{Path, PathBuf};

use multiplex_core::{ArgumentSpec, ConfigTree, Nargs, ParserMeta, ParserSpec, merge};
use multiplex_loader::NestedConfigResolver;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::Result;
use crate::facade::Multiplexor;
use crate::parser::{ArgParser, BuiltParser, ParsedResult, ParserBuilder};
use crate::registry::{SubprogramHandle, SubprogramLoader};
use crate::residual::residual_tree;

/// Destination of the subprogram selector.
pub const PROGRAM_DEST: &str = "program";

/// Help heading of the subprogram selector.
pub const SUBPROGRAMS_HEADING: &str = "subprograms";

/// Where dispatch stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// No subprogram table; one strict parse.
    NoSubprograms,
    /// Subprograms declared, tokens not parsed yet.
    AwaitingSelection,
    /// A subprogram was named and configured.
    SubprogramSelected,
    /// No subprogram was named; the main program runs.
    MainProgramSelected,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoSubprograms => "no-subprograms",
            Self::AwaitingSelection => "awaiting-selection",
            Self::SubprogramSelected => "subprogram-selected",
            Self::MainProgramSelected => "main-program-selected",
        };
        f.write_str(name)
    }
}

/// Outcome of dispatch.
#[derive(Debug, Clone)]
pub enum Selection {
    /// The configuration declares no subprograms.
    Standalone {
        /// Final configuration.
        config: ConfigTree,
    },
    /// Subprograms are declared but none was named.
    Main {
        /// Final configuration.
        config: ConfigTree,
    },
    /// A subprogram was named.
    Subprogram {
        /// Name from the subprogram table.
        name: String,
        /// Resolved subprogram path.
        path: PathBuf,
        /// Loaded handle.
        handle: SubprogramHandle,
        /// Final configuration.
        config: ConfigTree,
    },
}

impl Selection {
    /// Terminal dispatch state of this outcome.
    pub fn state(&self) -> DispatchState {
        match self {
            Self::Standalone { .. } => DispatchState::NoSubprograms,
            Self::Main { .. } => DispatchState::MainProgramSelected,
            Self::Subprogram { .. } => DispatchState::SubprogramSelected,
        }
    }

    /// Final configuration.
    pub fn config(&self) -> &ConfigTree {
        match self {
            Self::Standalone { config } | Self::Main { config } | Self::Subprogram { config, .. } => config,
        }
    }

    /// Selected subprogram name, if any.
    pub fn program(&self) -> Option<&str> {
        match self {
            Self::Subprogram { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Consumes the selection, returning the configuration.
    pub fn into_config(self) -> ConfigTree {
        match self {
            Self::Standalone { config } | Self::Main { config } | Self::Subprogram { config, .. } => config,
        }
    }
}

/// Runs the dispatch protocol for one [`Multiplexor`].
#[derive(Debug)]
pub struct SubprogramDispatcher<'a> {
    plex: &'a Multiplexor,
    state: DispatchState,
}

impl<'a> SubprogramDispatcher<'a> {
    /// Creates a dispatcher over `plex`.
    pub fn new(plex: &'a Multiplexor) -> Self {
        let state = if plex.has_subprograms() {
            DispatchState::AwaitingSelection
        } else {
            DispatchState::NoSubprograms
        };
        Self { plex, state }
    }

    /// Current state.
    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Parses `tokens` and selects the program to run.
    ///
    /// # Errors
    ///
    /// [`MultiplexError::ArgumentParse`](crate::MultiplexError::ArgumentParse)
    /// for tokens that do not parse (including `--help`), loader errors and
    /// [`MultiplexError::MissingConvention`](crate::MultiplexError::MissingConvention).
    pub fn dispatch<I, T>(&mut self, tokens: I, loader: &dyn SubprogramLoader) -> Result<Selection>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();

        if self.state == DispatchState::NoSubprograms {
            let parser = self.plex.get_parser(&[])?;
            let values = parser.parse(tokens)?;
            debug!(state = %self.state, "parsed standalone command line");
            return Ok(Selection::Standalone {
                config: merge(self.plex.defaults(), &values),
            });
        }

        let (shared, main) = self.parsers()?;
        let parsed = main.parse_known(tokens.iter().cloned(), &ConfigTree::new())?;
        let selected = match parsed.values.get(PROGRAM_DEST) {
            Ok(Value::String(name)) => Some(name.clone()),
            _ => None,
        };

        let Some(name) = selected else {
            let values = main.enable_help(&shared.deferred_help)?.parse(tokens)?;
            self.state = DispatchState::MainProgramSelected;
            info!(state = %self.state, "no subprogram named");
            return Ok(Selection::Main {
                config: merge(self.plex.defaults(), &values.without(PROGRAM_DEST)),
            });
        };

        self.select(&name, &main, &shared.parser, parsed, loader)
    }

    fn select(
        &mut self,
        name: &str,
        main: &ArgParser,
        shared: &ArgParser,
        first: ParsedResult,
        loader: &dyn SubprogramLoader,
    ) -> Result<Selection> {
        // Choices guarantee the name is in the table.
        let path = self
            .plex
            .subprogram_path(name)
            .unwrap_or_else(|| self.plex.base_dir().join(name));
        info!(program = name, path = %path.display(), "subprogram selected");

        let handle = loader.load(&path)?;
        let parser = handle
            .build_parser(&[shared])?
            .with_prog(format!("{} {name}", main.prog()));

        let parsed = parser.parse_known(first.residual, &first.values.without(PROGRAM_DEST))?;
        let given = merge(&first.explicit.without(PROGRAM_DEST), &parsed.explicit);
        let mut config = merge(self.plex.defaults(), &parsed.values);
        if !handle.defaults().is_empty() {
            config = merge(&merge(&config, handle.defaults()), &given);
        }

        let separator = self.plex.options().separator.as_str();
        let nested = residual_tree(&parsed.residual, separator, parser.prog())?;
        if !nested.is_empty() {
            let root = subprogram_dir(&path);
            debug!(keys = nested.len(), root = %root.display(), "resolving nested configuration");
            let resolved = NestedConfigResolver::new(root).resolve(&nested)?;
            config = merge(&config, &resolved.with_separator(separator));
        }

        self.state = DispatchState::SubprogramSelected;
        Ok(Selection::Subprogram {
            name: name.to_string(),
            path,
            handle,
            config,
        })
    }

    /// Builds the shared parser and the first-phase parser composed of the
    /// subprogram selector and the shared parser, both with help held back.
    pub(crate) fn parsers(&self) -> Result<(BuiltParser, ArgParser)> {
        let shared = self.plex.build_shared(&[PROGRAM_DEST])?;
        let exclusive = self.exclusive_parser()?;
        let main = self
            .plex
            .builder(&[&exclusive, &shared.parser])
            .suppress_help(true)
            .build(&ParserSpec {
                parser: self.plex.parser_spec().parser.clone(),
                arguments: Vec::new(),
            })?
            .parser;
        Ok((shared, main))
    }

    fn exclusive_parser(&self) -> Result<ArgParser> {
        let names: Vec<Value> = self
            .plex
            .subprograms()
            .iter()
            .map(|(name, _)| Value::String(name.clone()))
            .collect();
        let selector = ArgumentSpec::positional(PROGRAM_DEST)
            .with_nargs(Nargs::Optional)
            .with_choices(names)
            .with_help("subprogram to run")
            .with_heading(SUBPROGRAMS_HEADING);
        let spec = ParserSpec {
            parser: ParserMeta {
                add_help: false,
                ..ParserMeta::default()
            },
            arguments: vec![selector],
        };
        Ok(ParserBuilder::new().build(&spec)?.parser)
    }
}

fn subprogram_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;
    use serde_json::json;

    use super::*;
    use crate::MultiplexError;

    fn plex() -> Multiplexor {
        Multiplexor::new(
            ConfigTree::try_from(json!({
                "lr": 0.1,
                "subprograms": {"train": "train_entry", "eval": "eval_entry"},
            }))
            .unwrap(),
        )
        .unwrap()
    }

    fn loader(path: &Path) -> Result<SubprogramHandle> {
        let module = crate::registry::module_identity(path).unwrap_or_default();
        Ok(SubprogramHandle::new(module).with_parser(|parents| {
            Ok(ParserBuilder::new()
                .with_parents(parents)
                .build_value(&json!([{"name_or_flags": "--epochs", "type": "int", "default": 1}]))?
                .parser)
        }))
    }

    #[test]
    fn test_initial_state() {
        let plex = plex();
        assert_eq!(SubprogramDispatcher::new(&plex).state(), DispatchState::AwaitingSelection);

        let standalone = Multiplexor::new(ConfigTree::new()).unwrap();
        assert_eq!(
            SubprogramDispatcher::new(&standalone).state(),
            DispatchState::NoSubprograms
        );
    }

    #[test]
    fn test_subprogram_gets_shared_values() {
        let plex = plex();
        let mut dispatcher = SubprogramDispatcher::new(&plex);
        let selection = dispatcher
            .dispatch(["train", "--lr", "0.5", "--epochs", "3"], &loader)
            .unwrap();
        assert_eq!(dispatcher.state(), DispatchState::SubprogramSelected);
        assert_eq!(selection.program(), Some("train"));
        assert_eq!(selection.config().clone().into_value(), json!({"lr": 0.5, "epochs": 3}));
    }

    #[test]
    fn test_options_before_the_name() {
        let selection = plex().dispatch(["--lr", "0.3", "eval"], &loader).unwrap();
        assert_eq!(selection.program(), Some("eval"));
        assert_eq!(selection.config().get("lr").unwrap(), &json!(0.3));
    }

    #[test]
    fn test_main_program_parse_is_strict() {
        let err = plex().dispatch(["--epochs", "3"], &loader).unwrap_err();
        assert_eq!(err.as_clap().map(|e| e.kind()), Some(ErrorKind::UnknownArgument));
    }

    #[test]
    fn test_unknown_subprogram_name() {
        let err = plex().dispatch(["deploy"], &loader).unwrap_err();
        assert!(matches!(err, MultiplexError::ArgumentParse(_)));
    }

    #[test]
    fn test_subprogram_help_uses_subprogram_prog() {
        let plex = Multiplexor::new(
            ConfigTree::try_from(json!({
                "argparse": {"parser": {"prog": "tool"}},
                "subprograms": {"train": "train_entry"},
            }))
            .unwrap(),
        )
        .unwrap();
        let err = plex.dispatch(["train", "--help"], &loader).unwrap_err();
        let clap = err.as_clap().unwrap();
        assert_eq!(clap.kind(), ErrorKind::DisplayHelp);
        assert!(clap.to_string().contains("tool train"), "{clap}");
    }
}
