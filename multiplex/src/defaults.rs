//! Command-line options derived from default values.
//!
//! Every leaf of the default configuration becomes an option named after its
//! dotted path: `{"optim": {"lr": 0.1}}` yields `--optim.lr`, storing into
//! `optim.lr`. The value type follows the default's type, so `--optim.lr 0.5`
//! parses as a float. Sequence leaves take any number of values and `null`
//! leaves accept any scalar.

use std::collections::HashSet;

use multiplex_core::{ArgumentSpec, ConfigTree, Nargs, ValueKind};
use serde_json::Value;
use tracing::debug;

/// Help heading for derived options.
pub const DEFAULTS_HEADING: &str = "default parameters";

/// Derives one option per default leaf.
///
/// Leaves whose destination is in `taken_dests`, or whose option string is
/// in `taken_flags`, are skipped; the existing argument keeps control of the
/// key.
///
/// # Examples
///
/// ```
/// use std::collections::HashSet;
///
/// use multiplex::default_arguments;
/// use multiplex_core::ConfigTree;
/// use serde_json::json;
///
/// let defaults = ConfigTree::try_from(json!({"batch size": 64, "optim": {"lr": 0.1}})).unwrap();
/// let args = default_arguments(&defaults, &HashSet::new(), &HashSet::new());
///
/// assert_eq!(args[0].name_or_flags.names(), vec!["--batch_size"]);
/// assert_eq!(args[0].dest(), "batch size");
/// assert_eq!(args[1].dest(), "optim.lr");
/// assert_eq!(args[1].help.as_deref(), Some("default is 0.1"));
/// ```
pub fn default_arguments(
    defaults: &ConfigTree,
    taken_dests: &HashSet<String>,
    taken_flags: &HashSet<String>,
) -> Vec<ArgumentSpec> {
    defaults
        .items()
        .filter_map(|(path, value)| {
            let flag = format!("--{}", path.replace(' ', "_"));
            if taken_dests.contains(&path) || taken_flags.contains(&flag) {
                debug!(key = %path, "default already covered by an argument");
                return None;
            }
            Some(default_argument(flag, path, value, defaults.separator()))
        })
        .collect()
}

fn default_argument(flag: String, path: String, value: &Value, separator: &str) -> ArgumentSpec {
    let metavar = path
        .rsplit(separator)
        .next()
        .unwrap_or(path.as_str())
        .replace(' ', "_")
        .to_uppercase();

    let spec = ArgumentSpec::optional(&[flag.as_str()])
        .with_dest(path.clone())
        .with_default(value.clone())
        .with_help(format!("default is {value}"))
        .with_metavar(metavar)
        .with_heading(DEFAULTS_HEADING);

    match value {
        Value::Array(_) => spec.with_nargs(Nargs::ZeroOrMore).with_type(ValueKind::Inferred),
        other => spec.with_type(ValueKind::for_default(other)),
    }
}
