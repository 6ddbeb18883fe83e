//! Turning residual tokens into a configuration tree.

use clap::error::ErrorKind;
use multiplex_core::{ConfigTree, ValueKind};

use crate::error::Result;
use crate::parser::is_option_like;

/// Reads `--key=value`, `--key value` and bare `--key` tokens into a tree.
///
/// Keys are dotted paths split on `separator`. Values are read as JSON
/// scalars (`3`, `0.5`, `true`, `null`) and otherwise kept as strings; a
/// bare `--key` stores `true`. A separate value token must not look like an
/// option: negative numbers are values, `-x` is not.
///
/// # Errors
///
/// Any other token is reported as a clap
/// [`UnknownArgument`](ErrorKind::UnknownArgument) error under `prog`.
///
/// # Examples
///
/// ```
/// use multiplex::residual_tree;
/// use serde_json::json;
///
/// let tokens = ["--database.port=5433", "--database.host", "db1", "--dry-run"];
/// let tree = residual_tree(&tokens, ".", "app").unwrap();
/// assert_eq!(tree.get("database.port").unwrap(), &json!(5433));
/// assert_eq!(tree.get("database.host").unwrap(), &json!("db1"));
/// assert_eq!(tree.get("dry-run").unwrap(), &json!(true));
///
/// assert!(residual_tree(&["stray"], ".", "app").is_err());
/// ```
pub fn residual_tree<T: AsRef<str>>(tokens: &[T], separator: &str, prog: &str) -> Result<ConfigTree> {
    let mut pairs = Vec::new();
    let mut strays = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].as_ref();
        i += 1;

        let Some(body) = token.strip_prefix("--").filter(|b| !b.is_empty() && !b.starts_with('=')) else {
            strays.push(token.to_string());
            continue;
        };

        let (key, raw) = match body.split_once('=') {
            Some((key, raw)) => (key, Some(raw.to_string())),
            None => match tokens.get(i).map(AsRef::as_ref) {
                Some(next) if !is_option_like(next) => {
                    i += 1;
                    (body, Some(next.to_string()))
                }
                _ => (body, None),
            },
        };

        let value = match raw {
            Some(raw) => ValueKind::Inferred.convert(&raw).unwrap_or_else(serde_json::Value::String),
            None => serde_json::Value::Bool(true),
        };
        pairs.push((key.to_string(), value));
    }

    if !strays.is_empty() {
        let err = clap::Command::new(prog.to_string()).error(
            ErrorKind::UnknownArgument,
            format!("unrecognized arguments: {}", strays.join(" ")),
        );
        return Err(err.into());
    }

    Ok(ConfigTree::from_dotted(pairs, separator))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_empty_tokens() {
        assert!(residual_tree::<&str>(&[], ".", "app").unwrap().is_empty());
    }

    #[test]
    fn test_negative_value_is_taken() {
        let tree = residual_tree(&["--offset", "-3"], ".", "app").unwrap();
        assert_eq!(tree.get("offset").unwrap(), &json!(-3));
    }

    #[test]
    fn test_short_option_is_not_a_value() {
        let err = residual_tree(&["--a", "-x"], ".", "app").unwrap_err();
        let clap = err.as_clap().unwrap();
        assert_eq!(clap.kind(), ErrorKind::UnknownArgument);
        assert!(clap.to_string().contains("-x"), "{clap}");
    }

    #[test]
    fn test_flag_before_flag_is_true() {
        let tree = residual_tree(&["--a", "--b", "x"], ".", "app").unwrap();
        assert_eq!(tree.into_value(), json!({"a": true, "b": "x"}));
    }

    #[test]
    fn test_strays_are_unknown_arguments() {
        let err = residual_tree(&["--ok=1", "loose", "-x"], ".", "app").unwrap_err();
        let clap = err.as_clap().unwrap();
        assert_eq!(clap.kind(), ErrorKind::UnknownArgument);
        assert!(clap.to_string().contains("loose -x"));
    }

    #[test]
    fn test_custom_separator() {
        let tree = residual_tree(&["--db/port=1"], "/", "app").unwrap();
        assert_eq!(tree.into_value(), json!({"db": {"port": 1}}));
    }
}
