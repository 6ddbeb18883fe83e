//! Building [`ArgParser`]s from declarative specs.

use std::collections::HashSet;

use multiplex_core::{Action, ArgumentSpec, NameOrFlags, ParserSpec, SpecError, parse_parser_spec};
use serde_json::Value;
use tracing::debug;

use super::ArgParser;
use crate::error::Result;

/// Flags and id claimed by the automatic help argument.
pub(crate) const HELP_FLAGS: &[&str] = &["-h", "--help"];
pub(crate) const HELP_ID: &str = "help";

/// A built parser plus the help arguments held back while help was
/// suppressed.
#[derive(Debug, Clone)]
pub struct BuiltParser {
    /// The parser.
    pub parser: ArgParser,
    /// Help-action arguments to pass to [`ArgParser::enable_help`].
    pub deferred_help: Vec<ArgumentSpec>,
}

/// Builds an [`ArgParser`] from a [`ParserSpec`].
///
/// Every argument is checked before the parser is returned: conflicting
/// option strings or destinations, options clap cannot express and
/// positional layouts clap cannot parse all fail the build.
///
/// # Examples
///
/// ```
/// use multiplex::ParserBuilder;
/// use serde_json::json;
///
/// let built = ParserBuilder::new()
///     .with_prog("calc")
///     .build_value(&json!([
///         {"name_or_flags": "operation", "choices": ["add", "sub"]},
///         {"name_or_flags": "x", "type": "float"},
///         {"name_or_flags": "y", "type": "float"},
///     ]))
///     .unwrap();
///
/// let values = built.parser.parse(["add", "1", "2.5"]).unwrap();
/// assert_eq!(values.get("y").unwrap(), &json!(2.5));
/// ```
#[derive(Debug, Clone)]
pub struct ParserBuilder {
    prog: Option<String>,
    parents: Vec<ArgParser>,
    suppress_help: bool,
    separator: String,
    extra: Vec<ArgumentSpec>,
}

impl Default for ParserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserBuilder {
    /// Creates a builder with no parents and help enabled.
    pub fn new() -> Self {
        Self {
            prog: None,
            parents: Vec::new(),
            suppress_help: false,
            separator: multiplex_core::DEFAULT_SEPARATOR.to_string(),
            extra: Vec::new(),
        }
    }

    /// Overrides the program name.
    pub fn with_prog(mut self, prog: impl Into<String>) -> Self {
        self.prog = Some(prog.into());
        self
    }

    /// Inherits every argument of `parents`, in order, ahead of the parser spec's
    /// own arguments.
    pub fn with_parents(mut self, parents: &[&ArgParser]) -> Self {
        self.parents = parents.iter().map(|p| (*p).clone()).collect();
        self
    }

    /// Holds help back: no automatic `-h/--help`, and help-action arguments
    /// are returned as [`BuiltParser::deferred_help`].
    pub fn suppress_help(mut self, suppress: bool) -> Self {
        self.suppress_help = suppress;
        self
    }

    /// Separator used to nest dotted destinations in parsed results.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Appends arguments after the parser spec's own.
    pub fn with_arguments(mut self, arguments: Vec<ArgumentSpec>) -> Self {
        self.extra.extend(arguments);
        self
    }

    /// Destinations the parents already define.
    pub fn parent_dests(&self) -> HashSet<String> {
        self.parents
            .iter()
            .flat_map(|p| p.arguments().iter().map(ArgumentSpec::dest))
            .collect()
    }

    /// Validates a raw `argparse` section and builds it.
    ///
    /// # Errors
    ///
    /// See [`build`](Self::build).
    pub fn build_value(&self, section: &Value) -> Result<BuiltParser> {
        let spec = parse_parser_spec(section)?;
        self.build(&spec)
    }

    /// Builds a parser from a validated spec.
    ///
    /// # Errors
    ///
    /// [`SpecError::SchemaViolation`] for conflicting option strings or
    /// destinations and for positional layouts clap cannot parse;
    /// [`SpecError::UnsupportedFeature`] for multi-character single-dash
    /// options.
    pub fn build(&self, spec: &ParserSpec) -> Result<BuiltParser> {
        let meta = spec.parser.clone();
        let mut table = ArgTable::new(meta.add_help);
        let mut arguments = Vec::new();
        let mut deferred_help = Vec::new();

        for parent in &self.parents {
            for argument in parent.arguments() {
                table.add(argument)?;
                arguments.push(argument.clone());
            }
        }

        for argument in spec.arguments.iter().chain(&self.extra) {
            table.add(argument)?;
            let argument = with_argument_default(argument, meta.argument_default.as_ref());
            if argument.action == Action::Help && self.suppress_help {
                deferred_help.push(argument);
            } else {
                arguments.push(argument);
            }
        }

        check_positional_layout(&arguments)?;

        let prog = self
            .prog
            .clone()
            .or_else(|| meta.prog.clone())
            .unwrap_or_else(default_prog);
        debug!(
            prog = %prog,
            arguments = arguments.len(),
            deferred = deferred_help.len(),
            "built parser"
        );

        let help_enabled = meta.add_help && !self.suppress_help;
        Ok(BuiltParser {
            parser: ArgParser {
                prog,
                meta,
                arguments,
                help_enabled,
                separator: self.separator.clone(),
            },
            deferred_help,
        })
    }
}

fn with_argument_default(argument: &ArgumentSpec, fallback: Option<&Value>) -> ArgumentSpec {
    let mut argument = argument.clone();
    let takes_fallback = !matches!(
        argument.action,
        Action::StoreTrue | Action::StoreFalse | Action::Help
    );
    if argument.default.is_none() && takes_fallback {
        argument.default = fallback.cloned();
    }
    argument
}

fn default_prog() -> String {
    std::env::args_os()
        .next()
        .and_then(|arg| {
            std::path::Path::new(&arg)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "multiplex".to_string())
}

/// Option strings and destinations claimed so far.
pub(crate) struct ArgTable {
    flags: HashSet<String>,
    dests: HashSet<String>,
}

impl ArgTable {
    /// Starts a table, reserving the help flags when `add_help` is set.
    pub(crate) fn new(add_help: bool) -> Self {
        let mut table = Self {
            flags: HashSet::new(),
            dests: HashSet::new(),
        };
        if add_help {
            table.flags.extend(HELP_FLAGS.iter().map(|f| (*f).to_string()));
            table.dests.insert(HELP_ID.to_string());
        }
        table
    }

    /// Claims an argument's option strings and destination.
    pub(crate) fn add(&mut self, argument: &ArgumentSpec) -> std::result::Result<(), SpecError> {
        let label = argument.name_or_flags.names().join("/");

        if let NameOrFlags::Optional(flags) = &argument.name_or_flags {
            for flag in flags {
                check_flag(flag)?;
            }
            for flag in flags {
                if !self.flags.insert(flag.clone()) {
                    return Err(SpecError::SchemaViolation(format!(
                        "argument {label}: conflicting option string: {flag}"
                    )));
                }
            }
        }

        let dest = argument.dest();
        if !self.dests.insert(dest.clone()) {
            return Err(SpecError::SchemaViolation(format!(
                "argument {label}: conflicting destination '{dest}'"
            )));
        }
        Ok(())
    }
}

fn check_flag(flag: &str) -> std::result::Result<(), SpecError> {
    if let Some(long) = flag.strip_prefix("--") {
        if long.is_empty() || long.contains('=') {
            return Err(SpecError::SchemaViolation(format!(
                "invalid option string: '{flag}'"
            )));
        }
        return Ok(());
    }
    let short = flag.strip_prefix('-').unwrap_or(flag);
    let mut chars = short.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c != '-' && c != '=' => Ok(()),
        _ => Err(SpecError::UnsupportedFeature(format!(
            "option '{flag}': single-dash options must be one character, use '--{short}'"
        ))),
    }
}

fn check_positional_layout(arguments: &[ArgumentSpec]) -> std::result::Result<(), SpecError> {
    let positionals: Vec<&ArgumentSpec> = arguments.iter().filter(|a| a.is_positional()).collect();
    let Some((_, leading)) = positionals.split_last() else {
        return Ok(());
    };

    for (index, argument) in leading.iter().enumerate() {
        let name = argument.dest();
        if argument.nargs.is_some_and(|n| n.is_variadic()) {
            return Err(SpecError::SchemaViolation(format!(
                "positional '{name}' takes a variable number of values and must be last"
            )));
        }
        // An optional positional may precede fixed-size required ones; clap
        // indexes it after them.
        let optional = argument.nargs.is_some_and(|n| n.min_values() == 0);
        let required_after = positionals[index + 1..]
            .iter()
            .find(|later| later.nargs.is_some_and(|n| n.is_variadic() && n.min_values() > 0));
        if let (true, Some(later)) = (optional, required_after) {
            return Err(SpecError::SchemaViolation(format!(
                "optional positional '{name}' cannot precede required positional '{}'",
                later.dest()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use multiplex_core::{Nargs, ValueKind};
    use serde_json::json;

    use super::*;

    fn build(arguments: Vec<ArgumentSpec>) -> Result<BuiltParser> {
        ParserBuilder::new().with_prog("test").build(&ParserSpec::new(arguments))
    }

    #[test]
    fn test_conflicting_option_strings() {
        let err = build(vec![
            ArgumentSpec::optional(&["-v", "--verbose"]).with_action(Action::Count),
            ArgumentSpec::optional(&["-v", "--version"]).with_action(Action::StoreTrue),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("conflicting option string: -v"), "{err}");
    }

    #[test]
    fn test_help_flags_are_reserved() {
        let err = build(vec![ArgumentSpec::optional(&["-h", "--host"])]).unwrap_err();
        assert!(err.to_string().contains("-h"), "{err}");

        let spec = ParserSpec {
            parser: multiplex_core::ParserMeta {
                add_help: false,
                ..Default::default()
            },
            arguments: vec![ArgumentSpec::optional(&["-h", "--host"])],
        };
        assert!(ParserBuilder::new().build(&spec).is_ok());
    }

    #[test]
    fn test_conflicting_destinations() {
        let err = build(vec![
            ArgumentSpec::optional(&["--verbose"]).with_action(Action::StoreTrue),
            ArgumentSpec::optional(&["--quiet"])
                .with_action(Action::StoreFalse)
                .with_dest("verbose"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("conflicting destination 'verbose'"), "{err}");
    }

    #[test]
    fn test_multi_character_short_option_unsupported() {
        let err = build(vec![ArgumentSpec::optional(&["-lr"])]).unwrap_err();
        assert!(matches!(
            err,
            crate::MultiplexError::Spec(SpecError::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn test_variadic_positional_must_be_last() {
        let err = build(vec![
            ArgumentSpec::positional("inputs").with_nargs(Nargs::OneOrMore),
            ArgumentSpec::positional("output"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("must be last"), "{err}");

        assert!(build(vec![
            ArgumentSpec::positional("output"),
            ArgumentSpec::positional("inputs").with_nargs(Nargs::OneOrMore),
        ])
        .is_ok());
    }

    #[test]
    fn test_optional_positional_before_required() {
        let parser = build(vec![
            ArgumentSpec::positional("mode").with_nargs(Nargs::Optional),
            ArgumentSpec::positional("target"),
        ])
        .unwrap()
        .parser;
        let values = parser.parse(["out"]).unwrap();
        assert_eq!(values.clone().into_value(), json!({"mode": null, "target": "out"}));
        let values = parser.parse(["fast", "out"]).unwrap();
        assert_eq!(values.into_value(), json!({"mode": "fast", "target": "out"}));

        let err = build(vec![
            ArgumentSpec::positional("mode").with_nargs(Nargs::Optional),
            ArgumentSpec::positional("inputs").with_nargs(Nargs::OneOrMore),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("cannot precede"), "{err}");
    }

    #[test]
    fn test_count_saturates_per_parse() {
        let parser = build(vec![ArgumentSpec::optional(&["-v"]).with_action(Action::Count)])
            .unwrap()
            .parser;
        let values = parser.parse(vec!["-v"; 300]).unwrap();
        assert_eq!(values.get("v").unwrap(), &json!(255));
    }

    #[test]
    fn test_parents_come_first() {
        let parent = build(vec![ArgumentSpec::optional(&["--seed"]).with_type(ValueKind::Int)])
            .unwrap()
            .parser;
        let child = ParserBuilder::new()
            .with_parents(&[&parent])
            .build(&ParserSpec::new(vec![ArgumentSpec::optional(&["--epochs"])]))
            .unwrap()
            .parser;
        let dests: Vec<String> = child.arguments().iter().map(ArgumentSpec::dest).collect();
        assert_eq!(dests, vec!["seed", "epochs"]);

        let err = ParserBuilder::new()
            .with_parents(&[&parent])
            .build(&ParserSpec::new(vec![ArgumentSpec::optional(&["--seed"])]))
            .unwrap_err();
        assert!(err.to_string().contains("--seed"), "{err}");
    }

    #[test]
    fn test_suppressed_help_is_deferred() {
        let built = ParserBuilder::new()
            .suppress_help(true)
            .build(&ParserSpec {
                parser: multiplex_core::ParserMeta {
                    add_help: false,
                    ..Default::default()
                },
                arguments: vec![
                    ArgumentSpec::optional(&["-?", "--usage"]).with_action(Action::Help),
                    ArgumentSpec::optional(&["--name"]),
                ],
            })
            .unwrap();
        assert_eq!(built.deferred_help.len(), 1);
        assert_eq!(built.parser.arguments().len(), 1);
        assert!(!built.parser.has_help());
    }

    #[test]
    fn test_argument_default_fills_missing_defaults() {
        let built = ParserBuilder::new()
            .build_value(&json!({
                "parser": {"argument_default": 7},
                "arguments": [
                    {"name_or_flags": "--a", "type": "int"},
                    {"name_or_flags": "--b", "type": "int", "default": 1},
                    {"name_or_flags": "--c", "action": "store_true"},
                ],
            }))
            .unwrap();
        let values = built.parser.parse(Vec::<String>::new()).unwrap();
        assert_eq!(values.get("a").unwrap(), &json!(7));
        assert_eq!(values.get("b").unwrap(), &json!(1));
        assert_eq!(values.get("c").unwrap(), &json!(false));
    }
}
