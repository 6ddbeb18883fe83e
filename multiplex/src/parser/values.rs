//! Mapping argument specs onto clap and reading values back out.

use clap::builder::{PossibleValuesParser, StringValueParser, TypedValueParser, ValueParser, ValueRange};
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches};
use multiplex_core::{Action, ArgumentSpec, ConfigTree, NameOrFlags, Nargs, merge};
use serde_json::Value;

use super::ArgParser;

/// Translates one spec into a clap argument whose id is the destination.
pub(super) fn clap_arg(spec: &ArgumentSpec) -> Arg {
    let mut arg = Arg::new(spec.dest());

    match &spec.name_or_flags {
        NameOrFlags::Positional(name) => {
            let required = spec.nargs.is_none_or(|n| n.min_values() > 0);
            arg = arg
                .required(required)
                .value_name(spec.metavar.clone().unwrap_or_else(|| name.clone()));
        }
        NameOrFlags::Optional(flags) => {
            let mut longs = flags.iter().filter_map(|f| f.strip_prefix("--"));
            let mut shorts = flags
                .iter()
                .filter(|f| !f.starts_with("--"))
                .filter_map(|f| f.strip_prefix('-'))
                .filter_map(|s| s.chars().next());
            if let Some(long) = longs.next() {
                arg = arg.long(long.to_string());
            }
            for alias in longs {
                arg = arg.visible_alias(alias.to_string());
            }
            if let Some(short) = shorts.next() {
                arg = arg.short(short);
            }
            for alias in shorts {
                arg = arg.visible_short_alias(alias);
            }
            arg = arg.required(spec.required);
            if let Some(metavar) = &spec.metavar {
                arg = arg.value_name(metavar.clone());
            }
        }
    }

    if let Some(help) = &spec.help {
        arg = arg.help(help.clone());
    }
    if let Some(heading) = &spec.heading {
        arg = arg.help_heading(heading.clone());
    }

    match spec.action {
        Action::Store | Action::Append => {
            let action = if spec.action == Action::Append {
                ArgAction::Append
            } else {
                ArgAction::Set
            };
            arg.action(action)
                .num_args(value_range(spec.nargs))
                .value_parser(value_parser(spec))
                .allow_negative_numbers(true)
        }
        Action::StoreConst | Action::StoreTrue => arg.action(ArgAction::SetTrue),
        Action::StoreFalse => arg.action(ArgAction::SetFalse),
        Action::AppendConst | Action::Count => arg.action(ArgAction::Count),
        Action::Help => arg.action(ArgAction::Help),
    }
}

fn value_range(nargs: Option<Nargs>) -> ValueRange {
    match nargs {
        None => ValueRange::new(1),
        Some(Nargs::Optional) => ValueRange::new(0..=1),
        Some(Nargs::ZeroOrMore) => ValueRange::new(0..),
        Some(Nargs::OneOrMore) => ValueRange::new(1..),
        Some(Nargs::Exactly(n)) => ValueRange::new(n),
    }
}

fn value_parser(spec: &ArgumentSpec) -> ValueParser {
    let kind = spec.kind();
    match &spec.choices {
        None => ValueParser::new(StringValueParser::new().try_map(move |raw| kind.convert(&raw))),
        Some(choices) => {
            let names: Vec<String> = choices.iter().map(choice_name).collect();
            ValueParser::new(PossibleValuesParser::new(names).try_map(move |raw| kind.convert(&raw)))
        }
    }
}

pub(super) fn choice_name(choice: &Value) -> String {
    match choice {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Values read out of one parse.
pub(super) struct Collected {
    /// Every destination of the parser, plus namespace entries it does not
    /// define.
    pub(super) values: ConfigTree,
    /// Destinations given on the command line.
    pub(super) explicit: ConfigTree,
}

/// Reads every destination of `parser` out of `matches`.
///
/// Values given on the command line win; otherwise the namespace value, the
/// argument's default, then the action's implicit default are used.
/// Namespace entries the parser does not define are kept.
pub(super) fn collect(parser: &ArgParser, matches: &ArgMatches, namespace: &ConfigTree) -> Collected {
    let mut pairs = Vec::new();
    let mut explicit = Vec::new();
    for spec in parser.value_arguments() {
        let dest = spec.dest();
        let base = namespace
            .get(&dest)
            .ok()
            .cloned()
            .or_else(|| spec.default.clone());
        if given(matches, &dest) {
            let value = from_command_line(spec, matches, &dest, base);
            explicit.push((dest.clone(), value.clone()));
            pairs.push((dest, value));
        } else {
            pairs.push((dest, base.unwrap_or_else(|| implicit_default(spec))));
        }
    }

    let parsed = ConfigTree::from_dotted(pairs, parser.separator());
    Collected {
        values: merge(&namespace.clone().with_separator(parser.separator()), &parsed),
        explicit: ConfigTree::from_dotted(explicit, parser.separator()),
    }
}

fn given(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

fn implicit_default(spec: &ArgumentSpec) -> Value {
    match spec.action {
        Action::StoreTrue => Value::Bool(false),
        Action::StoreFalse => Value::Bool(true),
        _ if spec.is_positional() && spec.nargs == Some(Nargs::ZeroOrMore) => Value::Array(Vec::new()),
        _ => Value::Null,
    }
}

fn from_command_line(spec: &ArgumentSpec, matches: &ArgMatches, id: &str, base: Option<Value>) -> Value {
    let constant = || spec.constant.clone().unwrap_or(Value::Null);
    match spec.action {
        Action::StoreTrue => Value::Bool(true),
        Action::StoreFalse => Value::Bool(false),
        Action::StoreConst => constant(),
        // clap counts occurrences in a u8, so one parse adds at most 255.
        Action::Count => {
            let start = base.as_ref().and_then(Value::as_u64).unwrap_or(0);
            Value::from(start + u64::from(matches.get_count(id)))
        }
        Action::AppendConst => {
            let mut items = into_list(base);
            items.extend(std::iter::repeat_n(constant(), usize::from(matches.get_count(id))));
            Value::Array(items)
        }
        Action::Append => {
            let mut items = into_list(base);
            items.extend(
                occurrences(matches, id)
                    .into_iter()
                    .map(|values| occurrence_value(spec, values)),
            );
            Value::Array(items)
        }
        Action::Store => occurrences(matches, id)
            .pop()
            .map(|values| occurrence_value(spec, values))
            .unwrap_or(Value::Null),
        Action::Help => Value::Null,
    }
}

fn occurrence_value(spec: &ArgumentSpec, mut values: Vec<Value>) -> Value {
    match spec.nargs {
        None => values.pop().unwrap_or(Value::Null),
        Some(Nargs::Optional) => values
            .pop()
            .unwrap_or_else(|| spec.constant.clone().unwrap_or(Value::Null)),
        Some(_) => Value::Array(values),
    }
}

fn occurrences(matches: &ArgMatches, id: &str) -> Vec<Vec<Value>> {
    match matches.try_get_occurrences::<Value>(id) {
        Ok(Some(occurrences)) => occurrences.map(|values| values.cloned().collect()).collect(),
        _ => Vec::new(),
    }
}

fn into_list(base: Option<Value>) -> Vec<Value> {
    match base {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
    }
}
