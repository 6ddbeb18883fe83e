//! Validation of the declarative `argparse` section.
//!
//! [`parse_parser_spec`] turns the raw JSON value of an `argparse` section
//! into a [`ParserSpec`]. Every key is checked against fixed allow-lists
//! before anything is built, so a bad file never yields a half-configured
//! parser.
//!
//! Three failure kinds are kept apart:
//!
//! - [`SpecError::SchemaViolation`]: missing, unknown or ill-typed keys.
//! - [`SpecError::UnsupportedFeature`]: recognised keys this engine does not
//!   implement (parent chaining, custom formatters, conflict handlers, ...).
//! - [`SpecError::UnknownType`]: a `type` name that maps to no conversion.
//!
//! # Examples
//!
//! ```
//! use multiplex_core::*;
//! use serde_json::json;
//!
//! let spec = parse_parser_spec(&json!([
//!     {"name_or_flags": ["-e", "--epochs"], "type": "int", "default": 14},
//!     {"name_or_flags": "dataset"},
//! ]))
//! .unwrap();
//! assert_eq!(spec.arguments.len(), 2);
//!
//! // Missing name_or_flags
//! let err = parse_parser_spec(&json!([{"help": "nameless"}])).unwrap_err();
//! assert!(matches!(err, SpecError::SchemaViolation(_)));
//!
//! // Parent chaining is recognised but not implemented
//! let err = parse_parser_spec(&json!({"parser": {"parents": []}, "arguments": []})).unwrap_err();
//! assert!(matches!(err, SpecError::UnsupportedFeature(_)));
//! ```

use std::collections::BTreeSet;
use std::str::FromStr;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::{Action, ArgumentSpec, NameOrFlags, Nargs, ParserMeta, ParserSpec, ValueKind};

/// Sub-key holding parser metadata when the section is a mapping.
pub const PARSER_KEY: &str = "parser";

/// Sub-key holding the argument list when the section is a mapping.
pub const ARGUMENTS_KEY: &str = "arguments";

/// Keys accepted in parser metadata.
pub const PARSER_ALLOWED_KEYS: &[&str] = &[
    "prog",
    "usage",
    "description",
    "epilog",
    "parents",
    "formatter_class",
    "prefix_chars",
    "fromfile_prefix_chars",
    "argument_default",
    "conflict_handler",
    "add_help",
    "allow_abbrev",
];

/// Parser metadata keys that are recognised but not implemented.
pub const PARSER_UNSUPPORTED_KEYS: &[&str] = &[
    "parents",
    "formatter_class",
    "conflict_handler",
    "fromfile_prefix_chars",
];

/// Keys accepted in one argument definition.
pub const ARGUMENT_ALLOWED_KEYS: &[&str] = &[
    "name_or_flags",
    "action",
    "nargs",
    "const",
    "default",
    "type",
    "choices",
    "required",
    "help",
    "metavar",
    "dest",
];

/// Keys every argument definition must carry.
pub const ARGUMENT_REQUIRED_KEYS: &[&str] = &["name_or_flags"];

/// Errors found while validating a declarative parser description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    /// Missing, unrecognised or ill-typed keys.
    #[error("schema violation: {0}")]
    SchemaViolation(String),
    /// A recognised option that is not implemented.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    /// A `type` name with no known conversion.
    #[error("unknown type: '{0}'")]
    UnknownType(String),
}

fn violation(msg: impl Into<String>) -> SpecError {
    SpecError::SchemaViolation(msg.into())
}

/// Parses a complete `argparse` section.
///
/// Accepts `null` (no arguments), a plain list of argument definitions, or a
/// mapping with optional `parser` and `arguments` keys.
///
/// # Errors
///
/// See [`SpecError`]. All arguments are validated before the parser spec is
/// returned.
pub fn parse_parser_spec(section: &Value) -> Result<ParserSpec, SpecError> {
    match section {
        Value::Null => Ok(ParserSpec::default()),
        Value::Array(items) => Ok(ParserSpec::new(parse_arguments(items)?)),
        Value::Object(map) => {
            let extra: BTreeSet<&str> = map
                .keys()
                .map(String::as_str)
                .filter(|k| *k != PARSER_KEY && *k != ARGUMENTS_KEY)
                .collect();
            if !extra.is_empty() {
                return Err(violation(format!(
                    "unrecognized argparse section keys: {}",
                    join(&extra)
                )));
            }
            let parser = match map.get(PARSER_KEY) {
                None | Some(Value::Null) => ParserMeta::default(),
                Some(Value::Object(meta)) => parse_parser_meta(meta)?,
                Some(_) => return Err(violation("'parser' must be a mapping")),
            };
            let arguments = match map.get(ARGUMENTS_KEY) {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => parse_arguments(items)?,
                Some(_) => return Err(violation("'arguments' must be a list")),
            };
            Ok(ParserSpec { parser, arguments })
        }
        _ => Err(violation(
            "argparse section must be a list of arguments or a mapping",
        )),
    }
}

/// Validates parser metadata against the allow-list.
///
/// # Errors
///
/// [`SpecError::SchemaViolation`] for unknown keys or wrong value types,
/// [`SpecError::UnsupportedFeature`] for recognised but unimplemented keys
/// and for prefix characters other than `-`.
pub fn parse_parser_meta(meta: &Map<String, Value>) -> Result<ParserMeta, SpecError> {
    check_keys(meta, PARSER_ALLOWED_KEYS, &[], PARSER_UNSUPPORTED_KEYS, "parser")?;

    let mut parsed = ParserMeta::default();
    for (key, value) in meta {
        match key.as_str() {
            "prog" => parsed.prog = Some(expect_string(key, value)?),
            "usage" => parsed.usage = Some(expect_string(key, value)?),
            "description" => parsed.description = Some(expect_string(key, value)?),
            "epilog" => parsed.epilog = Some(expect_string(key, value)?),
            "argument_default" => parsed.argument_default = Some(value.clone()),
            "add_help" => parsed.add_help = expect_bool(key, value)?,
            "allow_abbrev" => parsed.allow_abbrev = expect_bool(key, value)?,
            "prefix_chars" => {
                let chars = expect_string(key, value)?;
                if chars != "-" {
                    return Err(SpecError::UnsupportedFeature(format!(
                        "prefix_chars '{chars}' (only '-' is supported)"
                    )));
                }
            }
            _ => {}
        }
    }
    Ok(parsed)
}

fn parse_arguments(items: &[Value]) -> Result<Vec<ArgumentSpec>, SpecError> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(map) => parse_argument(map),
            _ => Err(violation(format!("argument #{index} must be a mapping"))),
        })
        .collect()
}

/// Validates a single argument definition.
///
/// # Errors
///
/// [`SpecError::SchemaViolation`] for missing `name_or_flags`, unknown keys,
/// malformed names or incompatible modifiers; [`SpecError::UnknownType`] for
/// unresolvable `type` names.
pub fn parse_argument(map: &Map<String, Value>) -> Result<ArgumentSpec, SpecError> {
    check_keys(map, ARGUMENT_ALLOWED_KEYS, ARGUMENT_REQUIRED_KEYS, &[], "argument")?;

    let name_or_flags = map
        .get("name_or_flags")
        .map(parse_name_or_flags)
        .transpose()?
        .ok_or_else(|| violation("missing required argument keys: name_or_flags"))?;
    let label = name_or_flags.names().join("/");

    let mut spec = match &name_or_flags {
        NameOrFlags::Positional(name) => ArgumentSpec::positional(name),
        NameOrFlags::Optional(flags) => {
            let flags: Vec<&str> = flags.iter().map(String::as_str).collect();
            ArgumentSpec::optional(&flags)
        }
    };

    for (key, value) in map {
        match key.as_str() {
            "action" => {
                let name = expect_string(key, value)?;
                spec.action = Action::from_str(&name)
                    .map_err(|name| violation(format!("{label}: unknown action '{name}'")))?;
            }
            "nargs" => spec.nargs = Some(parse_nargs(&label, value)?),
            "const" => spec.constant = Some(value.clone()),
            "default" => spec.default = Some(value.clone()),
            "type" => {
                let name = expect_string(key, value)?;
                spec.value_type =
                    Some(ValueKind::from_type_name(&name).ok_or(SpecError::UnknownType(name))?);
            }
            "choices" => match value {
                Value::Array(choices) => spec.choices = Some(choices.clone()),
                _ => return Err(violation(format!("{label}: 'choices' must be a list"))),
            },
            "required" => spec.required = expect_bool(key, value)?,
            "help" => spec.help = Some(expect_string(key, value)?),
            "metavar" => spec.metavar = Some(expect_string(key, value)?),
            "dest" => spec.dest = Some(expect_string(key, value)?),
            _ => {}
        }
    }

    check_modifiers(&spec, &label)?;
    Ok(spec)
}

fn parse_name_or_flags(value: &Value) -> Result<NameOrFlags, SpecError> {
    let names: Vec<String> = match value {
        Value::String(name) => vec![name.clone()],
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| violation("name_or_flags entries must be strings"))
            })
            .collect::<Result<_, _>>()?,
        _ => return Err(violation("name_or_flags must be a string or a list of strings")),
    };

    if names.is_empty() {
        return Err(violation("name_or_flags cannot be empty"));
    }

    let flagged = names.iter().filter(|n| n.starts_with('-')).count();
    if flagged == names.len() {
        if let Some(bad) = names.iter().find(|n| n.trim_start_matches('-').is_empty()) {
            return Err(violation(format!("invalid option string: '{bad}'")));
        }
        return Ok(NameOrFlags::Optional(names));
    }
    if flagged > 0 {
        return Err(violation(format!(
            "cannot mix a positional name with option flags: {}",
            names.join(", ")
        )));
    }
    if names.len() > 1 {
        return Err(violation(format!(
            "a positional argument takes exactly one name: {}",
            names.join(", ")
        )));
    }
    let name = names.into_iter().next().unwrap_or_default();
    if name.trim().is_empty() {
        return Err(violation("positional name cannot be empty"));
    }
    Ok(NameOrFlags::Positional(name))
}

fn parse_nargs(label: &str, value: &Value) -> Result<Nargs, SpecError> {
    match value {
        Value::String(s) if s == "?" => Ok(Nargs::Optional),
        Value::String(s) if s == "*" => Ok(Nargs::ZeroOrMore),
        Value::String(s) if s == "+" => Ok(Nargs::OneOrMore),
        Value::String(s) if s == "..." || s == "A..." => Err(SpecError::UnsupportedFeature(
            format!("{label}: nargs '{s}' (remainder capture)"),
        )),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Err(violation(format!("{label}: nargs must be greater than 0"))),
            Some(count) => Ok(Nargs::Exactly(count as usize)),
            None => Err(violation(format!("{label}: invalid nargs {n}"))),
        },
        other => Err(violation(format!("{label}: invalid nargs {other}"))),
    }
}

fn check_modifiers(spec: &ArgumentSpec, label: &str) -> Result<(), SpecError> {
    if spec.action.is_flag() {
        if spec.nargs.is_some() {
            return Err(violation(format!(
                "{label}: action '{}' does not accept nargs",
                spec.action
            )));
        }
        if spec.value_type.is_some() || spec.choices.is_some() {
            return Err(violation(format!(
                "{label}: action '{}' does not accept type or choices",
                spec.action
            )));
        }
    }

    if spec.is_positional() {
        if spec.dest.is_some() {
            return Err(violation(format!(
                "{label}: dest supplied twice for positional argument"
            )));
        }
        if spec.required {
            return Err(violation(format!(
                "{label}: 'required' is an invalid argument for positionals"
            )));
        }
        if spec.action != Action::Store {
            return Err(SpecError::UnsupportedFeature(format!(
                "{label}: positional arguments only support the 'store' action"
            )));
        }
    }

    if spec.dest().is_empty() {
        return Err(violation(format!("{label}: cannot derive a destination key")));
    }
    Ok(())
}

fn check_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    required: &[&str],
    unsupported: &[&str],
    what: &str,
) -> Result<(), SpecError> {
    let present: BTreeSet<&str> = map.keys().map(String::as_str).collect();

    let missing: BTreeSet<&str> = required
        .iter()
        .copied()
        .filter(|k| !present.contains(k))
        .collect();
    if !missing.is_empty() {
        return Err(violation(format!(
            "missing required {what} keys: {}",
            join(&missing)
        )));
    }

    let extra: BTreeSet<&str> = present
        .iter()
        .copied()
        .filter(|k| !allowed.contains(k))
        .collect();
    if !extra.is_empty() {
        return Err(violation(format!(
            "unrecognized {what} keys: {}",
            join(&extra)
        )));
    }

    let disallowed: BTreeSet<&str> = present
        .iter()
        .copied()
        .filter(|k| unsupported.contains(k))
        .collect();
    if !disallowed.is_empty() {
        return Err(SpecError::UnsupportedFeature(format!(
            "{what} keys not implemented: {}",
            join(&disallowed)
        )));
    }
    Ok(())
}

fn expect_string(key: &str, value: &Value) -> Result<String, SpecError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| violation(format!("'{key}' must be a string")))
}

fn expect_bool(key: &str, value: &Value) -> Result<bool, SpecError> {
    value
        .as_bool()
        .ok_or_else(|| violation(format!("'{key}' must be a boolean")))
}

fn join(keys: &BTreeSet<&str>) -> String {
    keys.iter().copied().collect::<Vec<_>>().join(", ")
}
