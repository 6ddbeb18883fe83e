//! Declarative argument and parser descriptions.
//!
//! These types are the validated form of the `argparse` section of a
//! configuration file. They are produced by
//! [`parse_parser_spec`](crate::parse_parser_spec) and consumed by the parser
//! builder in the `multiplex` crate. They serialize with [`serde`] so a
//! loaded spec can be inspected as JSON or YAML.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

/// How an argument is named on the command line.
///
/// # Examples
///
/// ```
/// use multiplex_core::NameOrFlags;
///
/// let pos = NameOrFlags::Positional("input".into());
/// assert!(pos.is_positional());
///
/// let opt = NameOrFlags::Optional(vec!["-o".into(), "--output".into()]);
/// assert_eq!(opt.names(), vec!["-o", "--output"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameOrFlags {
    /// A single bare name (no leading `-`).
    Positional(String),
    /// One or more `-`-prefixed flags.
    Optional(Vec<String>),
}

impl NameOrFlags {
    /// Returns `true` for positional arguments.
    pub fn is_positional(&self) -> bool {
        matches!(self, Self::Positional(_))
    }

    /// All names, in declaration order.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::Positional(name) => vec![name.as_str()],
            Self::Optional(flags) => flags.iter().map(String::as_str).collect(),
        }
    }
}

/// What an argument does when it is encountered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Store the value (the default).
    #[default]
    Store,
    /// Store the `const` value.
    StoreConst,
    /// Store `true`.
    StoreTrue,
    /// Store `false`.
    StoreFalse,
    /// Append each value to a list.
    Append,
    /// Append the `const` value to a list.
    AppendConst,
    /// Count occurrences.
    ///
    /// clap keeps the count in a `u8`: one parse saturates at 255
    /// occurrences.
    Count,
    /// Print help and exit.
    Help,
}

impl Action {
    /// Returns `true` for actions that never consume a value token.
    pub fn is_flag(self) -> bool {
        matches!(
            self,
            Self::StoreConst
                | Self::StoreTrue
                | Self::StoreFalse
                | Self::AppendConst
                | Self::Count
                | Self::Help
        )
    }

    /// Name as written in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::StoreConst => "store_const",
            Self::StoreTrue => "store_true",
            Self::StoreFalse => "store_false",
            Self::Append => "append",
            Self::AppendConst => "append_const",
            Self::Count => "count",
            Self::Help => "help",
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "store" => Ok(Self::Store),
            "store_const" => Ok(Self::StoreConst),
            "store_true" => Ok(Self::StoreTrue),
            "store_false" => Ok(Self::StoreFalse),
            "append" => Ok(Self::Append),
            "append_const" => Ok(Self::AppendConst),
            "count" => Ok(Self::Count),
            "help" => Ok(Self::Help),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of values an argument consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Nargs {
    /// `?`: zero or one value.
    Optional,
    /// `*`: any number of values.
    ZeroOrMore,
    /// `+`: at least one value.
    OneOrMore,
    /// An exact count.
    Exactly(usize),
}

impl Nargs {
    /// Returns `true` if the result is always a list.
    pub fn yields_list(self) -> bool {
        !matches!(self, Self::Optional)
    }

    /// Returns `true` if the argument may consume an open-ended number of
    /// values.
    pub fn is_variadic(self) -> bool {
        matches!(self, Self::ZeroOrMore | Self::OneOrMore)
    }

    /// Fewest values accepted.
    pub fn min_values(self) -> usize {
        match self {
            Self::Optional | Self::ZeroOrMore => 0,
            Self::OneOrMore => 1,
            Self::Exactly(n) => n,
        }
    }

    /// Most values accepted, `None` when unbounded.
    pub fn max_values(self) -> Option<usize> {
        match self {
            Self::Optional => Some(1),
            Self::ZeroOrMore | Self::OneOrMore => None,
            Self::Exactly(n) => Some(n),
        }
    }
}

/// Scalar conversion applied to raw command-line values.
///
/// `Str`, `Int`, `Float` and `Bool` are the names accepted in the `type`
/// modifier. `Inferred` is used for values whose type is not declared: it
/// reads JSON scalars (`3`, `0.5`, `true`, `null`) and falls back to the raw
/// string.
///
/// # Examples
///
/// ```
/// use multiplex_core::ValueKind;
/// use serde_json::json;
///
/// assert_eq!(ValueKind::Int.convert("42").unwrap(), json!(42));
/// assert!(ValueKind::Int.convert("4.2").is_err());
/// assert_eq!(ValueKind::Bool.convert("yes").unwrap(), json!(true));
/// assert_eq!(ValueKind::Inferred.convert("0.5").unwrap(), json!(0.5));
/// assert_eq!(ValueKind::Inferred.convert("adam").unwrap(), json!("adam"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Keep the raw string.
    #[default]
    Str,
    /// Signed 64-bit integer.
    Int,
    /// 64-bit float.
    Float,
    /// `true/false`, `yes/no`, `on/off`, `1/0` (case-insensitive).
    Bool,
    /// JSON scalar if it parses as one, else the raw string.
    Inferred,
}

impl ValueKind {
    /// Resolves a `type` name from a configuration file.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "str" => Some(Self::Str),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "bool" => Some(Self::Bool),
            _ => None,
        }
    }

    /// Picks the kind that reproduces the type of an existing value.
    pub fn for_default(value: &Value) -> Self {
        match value {
            Value::Bool(_) => Self::Bool,
            Value::Number(n) if n.is_f64() => Self::Float,
            Value::Number(_) => Self::Int,
            Value::String(_) => Self::Str,
            _ => Self::Inferred,
        }
    }

    /// Converts one raw token.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message when the token does not parse.
    pub fn convert(self, raw: &str) -> Result<Value, String> {
        match self {
            Self::Str => Ok(Value::String(raw.to_string())),
            Self::Int => raw
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("invalid int value: '{raw}'")),
            Self::Float => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("invalid float value: '{raw}'")),
            Self::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("invalid bool value: '{raw}'")),
            },
            Self::Inferred => Ok(match serde_json::from_str::<Value>(raw.trim()) {
                Ok(value @ (Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_))) => {
                    value
                }
                _ => Value::String(raw.to_string()),
            }),
        }
    }
}

/// Declarative description of one command-line argument.
///
/// Build one with [`positional`](ArgumentSpec::positional) or
/// [`optional`](ArgumentSpec::optional) and chain the `with_*` methods.
///
/// # Examples
///
/// ```
/// use multiplex_core::{Action, ArgumentSpec, ValueKind};
/// use serde_json::json;
///
/// let batch = ArgumentSpec::optional(&["-b", "--batch-size"])
///     .with_type(ValueKind::Int)
///     .with_default(json!(64))
///     .with_help("input batch size");
/// assert_eq!(batch.dest(), "batch_size");
///
/// let verbose = ArgumentSpec::optional(&["-v"]).with_action(Action::Count);
/// assert_eq!(verbose.dest(), "v");
///
/// let input = ArgumentSpec::positional("input");
/// assert_eq!(input.dest(), "input");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgumentSpec {
    /// Positional name or option flags.
    pub name_or_flags: NameOrFlags,
    /// What happens when the argument is seen.
    pub action: Action,
    /// Value count, `None` for exactly one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nargs: Option<Nargs>,
    /// Value used by `store_const`, `append_const` and a bare `nargs: ?` option.
    #[serde(rename = "const", skip_serializing_if = "Option::is_none")]
    pub constant: Option<Value>,
    /// Value used when the argument is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Declared conversion, `None` keeps raw strings.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueKind>,
    /// Allowed values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Value>>,
    /// Whether an option must be given.
    pub required: bool,
    /// Help text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    /// Placeholder shown in usage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metavar: Option<String>,
    /// Explicit destination key; derived from the names when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    /// Help section title; not settable from configuration files.
    #[serde(skip)]
    pub heading: Option<String>,
}

impl ArgumentSpec {
    fn with_names(name_or_flags: NameOrFlags) -> Self {
        Self {
            name_or_flags,
            action: Action::Store,
            nargs: None,
            constant: None,
            default: None,
            value_type: None,
            choices: None,
            required: false,
            help: None,
            metavar: None,
            dest: None,
            heading: None,
        }
    }

    /// Creates a positional argument.
    pub fn positional(name: &str) -> Self {
        Self::with_names(NameOrFlags::Positional(name.to_string()))
    }

    /// Creates an option from one or more flags.
    pub fn optional(flags: &[&str]) -> Self {
        Self::with_names(NameOrFlags::Optional(
            flags.iter().map(|f| (*f).to_string()).collect(),
        ))
    }

    /// Sets the action.
    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    /// Sets the value count.
    pub fn with_nargs(mut self, nargs: Nargs) -> Self {
        self.nargs = Some(nargs);
        self
    }

    /// Sets the `const` value.
    pub fn with_const(mut self, value: Value) -> Self {
        self.constant = Some(value);
        self
    }

    /// Sets the default value.
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Sets the value conversion.
    pub fn with_type(mut self, kind: ValueKind) -> Self {
        self.value_type = Some(kind);
        self
    }

    /// Restricts values to `choices`.
    pub fn with_choices(mut self, choices: Vec<Value>) -> Self {
        self.choices = Some(choices);
        self
    }

    /// Marks the option as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Sets the usage placeholder.
    pub fn with_metavar(mut self, metavar: impl Into<String>) -> Self {
        self.metavar = Some(metavar.into());
        self
    }

    /// Sets the destination key.
    pub fn with_dest(mut self, dest: impl Into<String>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    /// Groups the argument under a help heading.
    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    /// Returns `true` for positional arguments.
    pub fn is_positional(&self) -> bool {
        self.name_or_flags.is_positional()
    }

    /// Key under which the parsed value is stored.
    ///
    /// Positionals use their name. Options use the first `--` flag, else
    /// the first flag, with leading dashes stripped and inner `-` turned
    /// into `_`.
    pub fn dest(&self) -> String {
        if let Some(dest) = &self.dest {
            return dest.clone();
        }
        match &self.name_or_flags {
            NameOrFlags::Positional(name) => name.clone(),
            NameOrFlags::Optional(flags) => flags
                .iter()
                .find(|f| f.starts_with("--"))
                .or_else(|| flags.first())
                .map(|f| f.trim_start_matches('-').replace('-', "_"))
                .unwrap_or_default(),
        }
    }

    /// Conversion applied to raw values.
    pub fn kind(&self) -> ValueKind {
        self.value_type.unwrap_or_default()
    }
}

/// Parser-level settings from the `parser` sub-key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParserMeta {
    /// Program name shown in usage and errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prog: Option<String>,
    /// Usage line replacing the generated one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    /// Text shown before the argument list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Text shown after the argument list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epilog: Option<String>,
    /// Fallback default for arguments that declare none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argument_default: Option<Value>,
    /// Whether `-h/--help` is added.
    pub add_help: bool,
    /// Accepted for compatibility; long options must be spelled out in full.
    pub allow_abbrev: bool,
}

impl Default for ParserMeta {
    fn default() -> Self {
        Self {
            prog: None,
            usage: None,
            description: None,
            epilog: None,
            argument_default: None,
            add_help: true,
            allow_abbrev: true,
        }
    }
}

/// Complete declarative parser: metadata plus ordered arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParserSpec {
    /// Parser-level settings.
    pub parser: ParserMeta,
    /// Arguments in registration order.
    pub arguments: Vec<ArgumentSpec>,
}

impl ParserSpec {
    /// Creates a spec with default metadata and the given arguments.
    pub fn new(arguments: Vec<ArgumentSpec>) -> Self {
        Self {
            parser: ParserMeta::default(),
            arguments,
        }
    }

    /// Returns `true` when there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_dest_prefers_long_flag() {
        let spec = ArgumentSpec::optional(&["-f", "--from-save"]);
        assert_eq!(spec.dest(), "from_save");
    }

    #[test]
    fn test_dest_explicit_wins() {
        let spec = ArgumentSpec::optional(&["-f", "--from-save"]).with_dest("model_path");
        assert_eq!(spec.dest(), "model_path");
    }

    #[test]
    fn test_action_round_trips_names() {
        for name in ["store", "store_const", "store_true", "store_false", "append", "append_const", "count", "help"] {
            let action: Action = name.parse().unwrap();
            assert_eq!(action.as_str(), name);
        }
        assert!("version".parse::<Action>().is_err());
    }

    #[test]
    fn test_value_kind_for_default() {
        assert_eq!(ValueKind::for_default(&json!(1)), ValueKind::Int);
        assert_eq!(ValueKind::for_default(&json!(1.5)), ValueKind::Float);
        assert_eq!(ValueKind::for_default(&json!(false)), ValueKind::Bool);
        assert_eq!(ValueKind::for_default(&json!("x")), ValueKind::Str);
        assert_eq!(ValueKind::for_default(&json!(null)), ValueKind::Inferred);
    }

    #[test]
    fn test_float_conversion_accepts_integers() {
        assert_eq!(ValueKind::Float.convert("3").unwrap(), json!(3.0));
        assert!(ValueKind::Float.convert("nan").is_err());
    }

    #[test]
    fn test_inferred_keeps_non_scalars_as_strings() {
        assert_eq!(ValueKind::Inferred.convert("[1, 2]").unwrap(), json!("[1, 2]"));
        assert_eq!(ValueKind::Inferred.convert("null").unwrap(), json!(null));
    }

    #[test]
    fn test_nargs_bounds() {
        assert_eq!(Nargs::OneOrMore.min_values(), 1);
        assert_eq!(Nargs::OneOrMore.max_values(), None);
        assert_eq!(Nargs::Exactly(2).max_values(), Some(2));
        assert!(!Nargs::Optional.yields_list());
    }
}
