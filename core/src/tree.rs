//! Nested configuration trees with dotted-path addressing.
//!
//! A [`ConfigTree`] wraps an insertion-ordered JSON object. Leaves are
//! addressed by joining the keys on the way down with a separator (`.` by
//! default), so `{"optim": {"lr": 0.1}}` exposes the leaf `optim.lr`.
//!
//! Trees are value objects: every operation that changes content returns a
//! new tree and leaves the receiver untouched.
//!
//! # Example
//!
//! ```
//! use multiplex_core::ConfigTree;
//! use serde_json::json;
//!
//! let tree = ConfigTree::try_from(json!({"a": {"b": 1, "c": 2}, "d": 3})).unwrap();
//! assert_eq!(tree.get("a.b").unwrap(), &json!(1));
//! assert_eq!(tree.keys(), vec!["a.b", "a.c", "d"]);
//!
//! let updated = tree.with_value("a.b", json!(10));
//! assert_eq!(updated.get("a.b").unwrap(), &json!(10));
//! assert_eq!(tree.get("a.b").unwrap(), &json!(1));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Separator used for leaf paths unless a tree is configured otherwise.
pub const DEFAULT_SEPARATOR: &str = ".";

/// Errors raised when addressing a tree by path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A path segment is absent, or a non-mapping value was indexed further.
    #[error("key not found: '{path}' (no segment '{segment}')")]
    KeyNotFound {
        /// Full path that was requested.
        path: String,
        /// First segment that could not be resolved.
        segment: String,
    },

    /// The path resolved, but to a leaf where a mapping was required.
    #[error("value at '{0}' is not a mapping")]
    NotAMapping(String),
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

/// Ordered nested mapping with dotted-path leaf access.
///
/// Equality compares content only; neither key order nor the separator take
/// part in it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigTree {
    data: Map<String, Value>,
    #[serde(skip, default = "default_separator")]
    separator: String,
}

impl Default for ConfigTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ConfigTree {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl ConfigTree {
    /// Creates an empty tree using [`DEFAULT_SEPARATOR`].
    pub fn new() -> Self {
        Self::from_map(Map::new())
    }

    /// Wraps an existing JSON object.
    pub fn from_map(data: Map<String, Value>) -> Self {
        Self {
            data,
            separator: default_separator(),
        }
    }

    /// Builds a nested tree from `(dotted path, value)` pairs.
    ///
    /// Later pairs win when paths collide; a pair that descends through an
    /// existing leaf replaces that leaf with a mapping.
    ///
    /// # Examples
    ///
    /// ```
    /// use multiplex_core::ConfigTree;
    /// use serde_json::json;
    ///
    /// let tree = ConfigTree::from_dotted([("db.host", json!("localhost")), ("seed", json!(1))], ".");
    /// assert_eq!(tree.get("db.host").unwrap(), &json!("localhost"));
    /// assert_eq!(tree.keys(), vec!["db.host", "seed"]);
    /// ```
    pub fn from_dotted<I, K>(pairs: I, separator: &str) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut data = Map::new();
        for (path, value) in pairs {
            let segments: Vec<&str> = path.as_ref().split(separator).collect();
            insert_path(&mut data, &segments, value);
        }
        Self {
            data,
            separator: separator.to_string(),
        }
    }

    /// Returns the same content addressed with a different separator.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Separator used to split leaf paths.
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Borrows the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Consumes the tree and returns the underlying JSON object.
    pub fn into_map(self) -> Map<String, Value> {
        self.data
    }

    /// Consumes the tree and returns it as a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }

    /// Returns `true` if the tree has no top-level keys.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of top-level keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Resolves a dotted path to a value (leaf or mapping).
    ///
    /// # Errors
    ///
    /// Returns [`PathError::KeyNotFound`] if any segment is missing or a
    /// non-mapping value would need to be indexed further.
    pub fn get(&self, path: &str) -> Result<&Value, PathError> {
        let mut segments = path.split(self.separator.as_str());
        let mut map = &self.data;
        let mut segment = segments.next().unwrap_or_default();
        loop {
            let value = map.get(segment).ok_or_else(|| PathError::KeyNotFound {
                path: path.to_string(),
                segment: segment.to_string(),
            })?;
            match segments.next() {
                None => return Ok(value),
                Some(next) => {
                    map = value.as_object().ok_or_else(|| PathError::KeyNotFound {
                        path: path.to_string(),
                        segment: next.to_string(),
                    })?;
                    segment = next;
                }
            }
        }
    }

    /// Returns `true` if `path` resolves.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    /// Returns the mapping at `path` as its own tree.
    ///
    /// # Errors
    ///
    /// [`PathError::KeyNotFound`] on a miss, [`PathError::NotAMapping`] if
    /// the path ends on a leaf.
    pub fn subtree(&self, path: &str) -> Result<ConfigTree, PathError> {
        match self.get(path)? {
            Value::Object(map) => {
                Ok(ConfigTree::from_map(map.clone()).with_separator(self.separator.clone()))
            }
            _ => Err(PathError::NotAMapping(path.to_string())),
        }
    }

    /// Lists every leaf path, depth first, in insertion order.
    ///
    /// Mappings are not listed themselves, so an empty mapping contributes
    /// nothing.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        collect_leaf_paths(&self.data, "", &self.separator, &mut keys);
        keys
    }

    /// Iterates `(leaf path, value)` pairs in the order of [`keys`](Self::keys).
    pub fn items(&self) -> impl Iterator<Item = (String, &Value)> + '_ {
        self.keys().into_iter().filter_map(move |key| {
            let value = self.get(&key).ok()?;
            Some((key, value))
        })
    }

    /// Returns a copy of this tree with `path` set to `value`.
    ///
    /// Intermediate mappings are created as needed; an intermediate leaf on
    /// the way is replaced by a mapping.
    pub fn with_value(&self, path: &str, value: Value) -> ConfigTree {
        let mut data = self.data.clone();
        let segments: Vec<&str> = path.split(self.separator.as_str()).collect();
        insert_path(&mut data, &segments, value);
        ConfigTree {
            data,
            separator: self.separator.clone(),
        }
    }

    /// Returns a copy of this tree without the top-level `key`.
    pub fn without(&self, key: &str) -> ConfigTree {
        let data = self
            .data
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        ConfigTree {
            data,
            separator: self.separator.clone(),
        }
    }
}

impl From<Map<String, Value>> for ConfigTree {
    fn from(data: Map<String, Value>) -> Self {
        Self::from_map(data)
    }
}

impl TryFrom<Value> for ConfigTree {
    type Error = Value;

    /// Accepts JSON objects; any other value is handed back unchanged.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(other),
        }
    }
}

fn insert_path(map: &mut Map<String, Value>, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert((*first).to_string(), value);
        return;
    }
    let entry = map
        .entry((*first).to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(inner) = entry {
        insert_path(inner, rest, value);
    }
}

fn collect_leaf_paths(map: &Map<String, Value>, prefix: &str, separator: &str, out: &mut Vec<String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}{separator}{key}")
        };
        match value {
            Value::Object(inner) => collect_leaf_paths(inner, &path, separator, out),
            _ => out.push(path),
        }
    }
}
