//! Command-line parsers derived from declarative argument specs.
//!
//! An [`ArgParser`] is an immutable description: a program name, parser
//! metadata and an ordered list of [`ArgumentSpec`]s. Each parse builds a
//! fresh [`clap::Command`] from it, so tokenization, validation, usage and
//! help rendering all come from clap.
//!
//! Two parse modes are offered:
//!
//! - [`ArgParser::parse`] is strict: any token no argument accepts is an
//!   error.
//! - [`ArgParser::parse_known`] is permissive: tokens that belong to no known
//!   argument are set aside as residual tokens and the rest is parsed
//!   strictly. Values not given on the command line are taken from an
//!   inherited namespace before falling back to defaults.

mod builder;
mod partition;
mod values;

use multiplex_core::{Action, ArgumentSpec, ConfigTree, Nargs, ParserMeta};
use tracing::debug;

pub use builder::{BuiltParser, ParserBuilder};
pub(crate) use builder::{HELP_FLAGS, HELP_ID};
pub(crate) use partition::is_option_like;

use crate::error::Result;

/// Values parsed from the command line plus the tokens nothing consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResult {
    /// Parsed values nested by destination.
    pub values: ConfigTree,
    /// Unconsumed tokens, in command-line order.
    pub residual: Vec<String>,
    /// The subset of `values` given on the command line in this parse.
    pub explicit: ConfigTree,
}

/// Immutable command-line parser description.
///
/// Built by [`ParserBuilder`]. Cloning is cheap enough to hand parsers to
/// subprograms as parents.
#[derive(Debug, Clone)]
pub struct ArgParser {
    prog: String,
    meta: ParserMeta,
    arguments: Vec<ArgumentSpec>,
    help_enabled: bool,
    separator: String,
}

impl ArgParser {
    /// Program name used in usage and error messages.
    pub fn prog(&self) -> &str {
        &self.prog
    }

    /// Returns the same parser under another program name.
    pub fn with_prog(mut self, prog: impl Into<String>) -> Self {
        self.prog = prog.into();
        self
    }

    /// Parser-level metadata.
    pub fn meta(&self) -> &ParserMeta {
        &self.meta
    }

    /// Registered arguments, inherited ones first.
    pub fn arguments(&self) -> &[ArgumentSpec] {
        &self.arguments
    }

    /// Returns `true` if an argument stores into `dest`.
    pub fn defines(&self, dest: &str) -> bool {
        self.arguments.iter().any(|a| a.dest() == dest)
    }

    /// Returns `true` if `-h/--help` is active.
    pub fn has_help(&self) -> bool {
        self.help_enabled
    }

    /// Returns a copy with help turned back on.
    ///
    /// The automatic `-h/--help` is restored when the parser metadata asks
    /// for it, and the `deferred` help-action arguments are registered.
    ///
    /// # Errors
    ///
    /// [`SchemaViolation`](multiplex_core::SpecError::SchemaViolation) if a
    /// deferred argument conflicts with a registered one.
    pub fn enable_help(&self, deferred: &[ArgumentSpec]) -> Result<ArgParser> {
        let mut table = builder::ArgTable::new(self.meta.add_help);
        for argument in &self.arguments {
            table.add(argument)?;
        }
        let mut parser = self.clone();
        for argument in deferred {
            table.add(argument)?;
            parser.arguments.push(argument.clone());
        }
        parser.help_enabled = self.meta.add_help;
        Ok(parser)
    }

    /// Builds the clap command for this parser.
    pub fn command(&self) -> clap::Command {
        let mut command = clap::Command::new(self.prog.clone())
            .no_binary_name(true)
            .args_override_self(true)
            .disable_version_flag(true)
            .disable_help_flag(!self.help_enabled);
        if let Some(usage) = &self.meta.usage {
            command = command.override_usage(usage.clone());
        }
        if let Some(description) = &self.meta.description {
            command = command.about(description.clone());
        }
        if let Some(epilog) = &self.meta.epilog {
            command = command.after_help(epilog.clone());
        }
        let order = partition::positional_order(&self.arguments);
        let mut positional = 0;
        for argument in &self.arguments {
            let mut arg = values::clap_arg(argument);
            if argument.is_positional() {
                let rank = order.iter().position(|index| *index == positional).unwrap_or(positional);
                arg = arg.index(rank + 1);
                positional += 1;
            }
            command = command.arg(arg);
        }
        command
    }

    /// Renders the full help text.
    pub fn render_help(&self) -> String {
        self.command().render_help().to_string()
    }

    /// Parses `tokens` strictly.
    ///
    /// # Errors
    ///
    /// [`MultiplexError::ArgumentParse`](crate::MultiplexError::ArgumentParse)
    /// for malformed or unknown tokens, and for `--help` (kind
    /// [`clap::error::ErrorKind::DisplayHelp`]).
    ///
    /// # Examples
    ///
    /// ```
    /// use multiplex::ParserBuilder;
    /// use serde_json::json;
    ///
    /// let parser = ParserBuilder::new()
    ///     .build_value(&json!([{"name_or_flags": ["-n", "--count"], "type": "int", "default": 1}]))
    ///     .unwrap()
    ///     .parser;
    ///
    /// assert_eq!(parser.parse(["-n", "3"]).unwrap().get("count").unwrap(), &json!(3));
    /// assert_eq!(parser.parse(Vec::<String>::new()).unwrap().get("count").unwrap(), &json!(1));
    /// assert!(parser.parse(["--other"]).is_err());
    /// ```
    pub fn parse<I, T>(&self, tokens: I) -> Result<ConfigTree>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        if partition::reorders_positionals(&self.arguments) {
            // Hand clap the positionals in index order; anything unknown is
            // left in place for clap to report.
            let split = partition::partition(&self.arguments, self.help_enabled, &tokens);
            if split.unknown.is_empty() {
                tokens = split.known;
            }
        }
        let matches = self.command().try_get_matches_from(&tokens)?;
        Ok(values::collect(self, &matches, &ConfigTree::new()).values)
    }

    /// Parses the tokens this parser knows and sets the rest aside.
    ///
    /// Values not given on the command line are taken from `namespace`
    /// when it holds their destination; namespace entries this parser does
    /// not define are carried into the result unchanged. Positionals whose
    /// destination the namespace already holds are not required again.
    ///
    /// # Errors
    ///
    /// [`MultiplexError::ArgumentParse`](crate::MultiplexError::ArgumentParse)
    /// when the known tokens do not parse.
    ///
    /// # Examples
    ///
    /// ```
    /// use multiplex::ParserBuilder;
    /// use multiplex_core::ConfigTree;
    /// use serde_json::json;
    ///
    /// let parser = ParserBuilder::new()
    ///     .build_value(&json!([{"name_or_flags": "--lr", "type": "float", "default": 0.1}]))
    ///     .unwrap()
    ///     .parser;
    ///
    /// let parsed = parser
    ///     .parse_known(["--lr", "0.5", "--model.depth", "4"], &ConfigTree::new())
    ///     .unwrap();
    /// assert_eq!(parsed.values.get("lr").unwrap(), &json!(0.5));
    /// assert_eq!(parsed.residual, vec!["--model.depth", "4"]);
    /// ```
    pub fn parse_known<I, T>(&self, tokens: I, namespace: &ConfigTree) -> Result<ParsedResult>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        let parser = self.relaxed(namespace);
        let split = partition::partition(&parser.arguments, parser.help_enabled, &tokens);
        debug!(
            prog = %parser.prog,
            known = split.known.len(),
            residual = split.unknown.len(),
            "partitioned tokens"
        );
        let matches = parser.command().try_get_matches_from(&split.known)?;
        let collected = values::collect(&parser, &matches, namespace);
        Ok(ParsedResult {
            values: collected.values,
            residual: split.unknown,
            explicit: collected.explicit,
        })
    }

    fn relaxed(&self, namespace: &ConfigTree) -> ArgParser {
        let mut parser = self.clone();
        for argument in &mut parser.arguments {
            let satisfied = argument.is_positional()
                && namespace.get(&argument.dest()).is_ok_and(|value| !value.is_null());
            if satisfied {
                argument.nargs = Some(match argument.nargs {
                    None | Some(Nargs::Optional) => Nargs::Optional,
                    Some(_) => Nargs::ZeroOrMore,
                });
            }
        }
        parser
    }

    pub(crate) fn separator(&self) -> &str {
        &self.separator
    }

    pub(crate) fn value_arguments(&self) -> impl Iterator<Item = &ArgumentSpec> {
        self.arguments.iter().filter(|a| a.action != Action::Help)
    }
}
