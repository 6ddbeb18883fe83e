//! File-backed resolution of residual configuration keys.
//!
//! Residual command-line values such as `--database.port=5433` name a
//! configuration that lives next to the main file. For every top-level key
//! of the residual tree the resolver looks, in its working directory, for:
//!
//! 1. `<key>.yaml`, `<key>.yml` or `<key>.json`: the file is loaded and the
//!    residual value is merged over it.
//! 2. `<key>/`: the resolver descends into the directory and resolves the
//!    residual subtree there.
//!
//! If neither exists, resolution fails with
//! [`LoadError::AmbiguousResolution`].
//!
//! The working directory belongs to the resolver, not the process. It is
//! changed only for the duration of a directory descent and a guard restores
//! it on every exit path, errors included.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use multiplex_core::{ConfigTree, deep_merge};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{LoadError, Result};
use crate::source::load_file;

/// Extensions tried for `<key>.<ext>` sibling files, in order.
pub const NESTED_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Resolves residual keys against files and directories on disk.
///
/// # Examples
///
/// ```no_run
/// use multiplex_core::ConfigTree;
/// use multiplex_loader::NestedConfigResolver;
/// use serde_json::json;
///
/// // configs/database.yaml holds {host: localhost, port: 5432}
/// let resolver = NestedConfigResolver::new("configs");
/// let residual = ConfigTree::try_from(json!({"database": {"port": 5433}})).unwrap();
/// let resolved = resolver.resolve(&residual).unwrap();
/// assert_eq!(resolved.get("database.host").unwrap(), &json!("localhost"));
/// assert_eq!(resolved.get("database.port").unwrap(), &json!(5433));
/// ```
#[derive(Debug)]
pub struct NestedConfigResolver {
    working_dir: RefCell<PathBuf>,
}

struct WorkingDirGuard<'a> {
    slot: &'a RefCell<PathBuf>,
    previous: PathBuf,
}

impl Drop for WorkingDirGuard<'_> {
    fn drop(&mut self) {
        let previous = std::mem::take(&mut self.previous);
        debug!(dir = %previous.display(), "restoring resolution directory");
        self.slot.replace(previous);
    }
}

impl NestedConfigResolver {
    /// Creates a resolver rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: RefCell::new(root.into()),
        }
    }

    /// Directory the next lookup will search.
    pub fn working_dir(&self) -> PathBuf {
        self.working_dir.borrow().clone()
    }

    /// Resolves every top-level key of `residual`.
    ///
    /// The result holds one entry per residual key, in residual order, and
    /// keeps the residual tree's separator.
    ///
    /// # Errors
    ///
    /// [`LoadError::AmbiguousResolution`] for keys with no matching file or
    /// directory, and any error raised while loading a matched file.
    pub fn resolve(&self, residual: &ConfigTree) -> Result<ConfigTree> {
        let resolved = self.resolve_map(residual.as_map())?;
        Ok(ConfigTree::from_map(resolved).with_separator(residual.separator()))
    }

    fn resolve_map(&self, residual: &Map<String, Value>) -> Result<Map<String, Value>> {
        residual
            .iter()
            .map(|(key, value)| -> Result<(String, Value)> {
                Ok((key.clone(), self.resolve_key(key, value)?))
            })
            .collect()
    }

    fn resolve_key(&self, key: &str, value: &Value) -> Result<Value> {
        let dir = self.working_dir();

        if let Some(file) = find_sibling_file(&dir, key) {
            debug!(key, file = %file.display(), "resolving key from file");
            let loaded = load_file(&file)?;
            return Ok(deep_merge(loaded.into_value(), value.clone()));
        }

        let nested_dir = dir.join(key);
        if nested_dir.is_dir() {
            let Value::Object(inner) = value else {
                return Err(LoadError::AmbiguousResolution {
                    key: key.to_string(),
                    dir,
                });
            };
            debug!(key, dir = %nested_dir.display(), "descending into directory");
            let _guard = self.enter(nested_dir);
            return self.resolve_map(inner).map(Value::Object);
        }

        Err(LoadError::AmbiguousResolution {
            key: key.to_string(),
            dir,
        })
    }

    fn enter(&self, dir: PathBuf) -> WorkingDirGuard<'_> {
        let previous = self.working_dir.replace(dir);
        WorkingDirGuard {
            slot: &self.working_dir,
            previous,
        }
    }
}

fn find_sibling_file(dir: &Path, key: &str) -> Option<PathBuf> {
    NESTED_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{key}.{ext}")))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tree(value: Value) -> ConfigTree {
        ConfigTree::try_from(value).unwrap()
    }

    #[test]
    fn test_missing_key_is_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = NestedConfigResolver::new(dir.path());
        let err = resolver.resolve(&tree(json!({"cache": {"size": 1}}))).unwrap_err();
        assert!(matches!(err, LoadError::AmbiguousResolution { ref key, .. } if key == "cache"));
    }

    #[test]
    fn test_guard_restores_on_drop() {
        let resolver = NestedConfigResolver::new("root");
        {
            let _guard = resolver.enter(PathBuf::from("root/inner"));
            assert_eq!(resolver.working_dir(), PathBuf::from("root/inner"));
        }
        assert_eq!(resolver.working_dir(), PathBuf::from("root"));
    }

    #[test]
    fn test_empty_residual_resolves_to_empty() {
        let resolver = NestedConfigResolver::new("does-not-matter");
        assert!(resolver.resolve(&ConfigTree::new()).unwrap().is_empty());
    }
}
