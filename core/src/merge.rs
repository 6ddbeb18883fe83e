//! Right-biased structural merging of configuration trees.
//!
//! [`merge`] overlays one [`ConfigTree`] onto another and returns a new tree:
//!
//! - Mappings: merged key by key, recursively.
//! - Sequences: replaced whole, never concatenated.
//! - Scalars and `null`: the overlay wins.
//!
//! The overlay wins even when the shapes disagree. A scalar overlay on a
//! mapping drops the whole base subtree, and a mapping overlay on a scalar
//! replaces the scalar. No type compatibility is checked, so a typo in a
//! command-line override can silently discard a nested section.
//!
//! # Example
//!
//! ```
//! use multiplex_core::{ConfigTree, merge};
//! use serde_json::json;
//!
//! let defaults = ConfigTree::try_from(json!({"optim": {"lr": 0.1, "momentum": 0.9}})).unwrap();
//! let cli = ConfigTree::try_from(json!({"optim": {"lr": 0.5}})).unwrap();
//!
//! let merged = merge(&defaults, &cli);
//! assert_eq!(merged.get("optim.lr").unwrap(), &json!(0.5));
//! assert_eq!(merged.get("optim.momentum").unwrap(), &json!(0.9));
//! ```

use std::ops::Add;

use serde_json::Value;

use crate::ConfigTree;

/// Merges `overlay` onto `base` and returns the result.
///
/// The result keeps the base's separator. Neither input is modified.
pub fn merge(base: &ConfigTree, overlay: &ConfigTree) -> ConfigTree {
    let merged = deep_merge(
        Value::Object(base.as_map().clone()),
        Value::Object(overlay.as_map().clone()),
    );
    let map = match merged {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    ConfigTree::from_map(map).with_separator(base.separator())
}

/// Merges a sequence of layers in order; the last layer has the highest
/// precedence.
pub fn merge_all<'a, I>(layers: I) -> ConfigTree
where
    I: IntoIterator<Item = &'a ConfigTree>,
{
    let mut layers = layers.into_iter();
    let Some(first) = layers.next() else {
        return ConfigTree::new();
    };
    layers.fold(first.clone(), |acc, layer| merge(&acc, layer))
}

/// Deep merge of two JSON values with overlay precedence.
///
/// Existing keys keep their position; keys new in `overlay` are appended.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => {
                        let base_value = std::mem::take(slot);
                        *slot = deep_merge(base_value, overlay_value);
                    }
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

impl Add for &ConfigTree {
    type Output = ConfigTree;

    fn add(self, overlay: &ConfigTree) -> ConfigTree {
        merge(self, overlay)
    }
}
