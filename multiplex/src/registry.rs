//! Subprogram handles, loaders and the explicit registry.
//!
//! A subprogram provides two capabilities:
//!
//! - a parser builder: given the parent parsers, return its own
//!   [`ArgParser`];
//! - an entry point: run with the final merged configuration.
//!
//! Capabilities are bundled in a [`SubprogramHandle`]. Dispatch obtains the
//! handle for a subprogram path through a [`SubprogramLoader`]; the
//! [`SubprogramRegistry`] is the in-process loader, keyed by module identity
//! (the file stem of the subprogram path).
//!
//! A handle may also carry the subprogram's own defaults, which dispatch
//! layers over the root defaults.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use multiplex_core::ConfigTree;
use tracing::debug;

use crate::error::{BoxError, Capability, MultiplexError, Result};
use crate::parser::ArgParser;

/// Builds a subprogram's parser from its parents.
pub type ParserFn = Arc<dyn Fn(&[&ArgParser]) -> Result<ArgParser> + Send + Sync>;

/// Runs a subprogram with its final configuration.
pub type EntryFn = Arc<dyn Fn(&ConfigTree) -> std::result::Result<(), BoxError> + Send + Sync>;

/// The capabilities one subprogram module provides.
#[derive(Clone)]
pub struct SubprogramHandle {
    module: String,
    parser: Option<ParserFn>,
    entry_point: Option<EntryFn>,
    defaults: ConfigTree,
}

impl fmt::Debug for SubprogramHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubprogramHandle")
            .field("module", &self.module)
            .field("parser", &self.parser.is_some())
            .field("entry_point", &self.entry_point.is_some())
            .field("defaults", &self.defaults.len())
            .finish()
    }
}

impl SubprogramHandle {
    /// Creates a handle with no capabilities.
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            parser: None,
            entry_point: None,
            defaults: ConfigTree::new(),
        }
    }

    /// Sets the parser builder.
    pub fn with_parser<F>(mut self, build: F) -> Self
    where
        F: Fn(&[&ArgParser]) -> Result<ArgParser> + Send + Sync + 'static,
    {
        self.parser = Some(Arc::new(build));
        self
    }

    /// Sets the entry point.
    pub fn with_entry_point<F>(mut self, run: F) -> Self
    where
        F: Fn(&ConfigTree) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.entry_point = Some(Arc::new(run));
        self
    }

    /// Sets defaults scoped to this subprogram.
    ///
    /// They override the root defaults, and values given on the command
    /// line override them.
    pub fn with_defaults(mut self, defaults: ConfigTree) -> Self {
        self.defaults = defaults;
        self
    }

    /// Defaults scoped to this subprogram.
    pub fn defaults(&self) -> &ConfigTree {
        &self.defaults
    }

    /// Module identity.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Returns `true` if a parser builder is present.
    pub fn has_parser(&self) -> bool {
        self.parser.is_some()
    }

    /// Returns `true` if an entry point is present.
    pub fn has_entry_point(&self) -> bool {
        self.entry_point.is_some()
    }

    /// Builds the subprogram's parser.
    ///
    /// # Errors
    ///
    /// [`MultiplexError::MissingConvention`] without a parser builder, and
    /// whatever the builder returns.
    pub fn build_parser(&self, parents: &[&ArgParser]) -> Result<ArgParser> {
        let build = self.parser.as_ref().ok_or_else(|| self.missing(Capability::Parser))?;
        build(parents)
    }

    /// Runs the entry point.
    ///
    /// # Errors
    ///
    /// [`MultiplexError::MissingConvention`] without an entry point,
    /// [`MultiplexError::EntryPoint`] when it fails.
    pub fn run(&self, config: &ConfigTree) -> Result<()> {
        let run = self
            .entry_point
            .as_ref()
            .ok_or_else(|| self.missing(Capability::EntryPoint))?;
        run(config).map_err(|source| MultiplexError::EntryPoint {
            program: self.module.clone(),
            source,
        })
    }

    fn missing(&self, capability: Capability) -> MultiplexError {
        MultiplexError::MissingConvention {
            module: self.module.clone(),
            capability,
        }
    }
}

/// Resolves a subprogram path to its handle.
pub trait SubprogramLoader {
    /// Loads the subprogram at `path`.
    ///
    /// # Errors
    ///
    /// [`MultiplexError::ModuleLoadFailure`] when nothing can be loaded
    /// from `path`.
    fn load(&self, path: &Path) -> Result<SubprogramHandle>;
}

impl<F> SubprogramLoader for F
where
    F: Fn(&Path) -> Result<SubprogramHandle>,
{
    fn load(&self, path: &Path) -> Result<SubprogramHandle> {
        self(path)
    }
}

/// Module identity of a subprogram path: its file stem.
pub fn module_identity(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}

/// In-process subprogram registry keyed by module identity.
///
/// Each module may register at most one parser builder and one entry point.
///
/// # Examples
///
/// ```
/// use std::path::Path;
///
/// use multiplex::{ParserBuilder, SubprogramLoader, SubprogramRegistry};
///
/// let mut registry = SubprogramRegistry::new();
/// registry
///     .register_parser("train", |parents| {
///         Ok(ParserBuilder::new().with_parents(parents).build_value(&serde_json::Value::Null)?.parser)
///     })
///     .unwrap();
/// registry.register_entry_point("train", |_config| Ok(())).unwrap();
///
/// // A second entry point for the same module is rejected.
/// assert!(registry.register_entry_point("train", |_config| Ok(())).is_err());
///
/// let handle = registry.load(Path::new("programs/train.py")).unwrap();
/// assert_eq!(handle.module(), "train");
/// ```
#[derive(Debug, Default)]
pub struct SubprogramRegistry {
    handles: HashMap<String, SubprogramHandle>,
}

impl SubprogramRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the parser builder of `module`.
    ///
    /// # Errors
    ///
    /// [`MultiplexError::DuplicateRegistration`] if one is already
    /// registered.
    pub fn register_parser<F>(&mut self, module: &str, build: F) -> Result<()>
    where
        F: Fn(&[&ArgParser]) -> Result<ArgParser> + Send + Sync + 'static,
    {
        let handle = self.slot(module, Capability::Parser)?;
        handle.parser = Some(Arc::new(build));
        debug!(module, "registered parser builder");
        Ok(())
    }

    /// Registers the entry point of `module`.
    ///
    /// # Errors
    ///
    /// [`MultiplexError::DuplicateRegistration`] if one is already
    /// registered.
    pub fn register_entry_point<F>(&mut self, module: &str, run: F) -> Result<()>
    where
        F: Fn(&ConfigTree) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        let handle = self.slot(module, Capability::EntryPoint)?;
        handle.entry_point = Some(Arc::new(run));
        debug!(module, "registered entry point");
        Ok(())
    }

    /// Handle registered for `module`.
    pub fn get(&self, module: &str) -> Option<&SubprogramHandle> {
        self.handles.get(module)
    }

    /// Returns `true` if anything is registered for `module`.
    pub fn contains(&self, module: &str) -> bool {
        self.handles.contains_key(module)
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Registered module identities in sorted order.
    pub fn modules(&self) -> Vec<&str> {
        let mut modules: Vec<&str> = self.handles.keys().map(String::as_str).collect();
        modules.sort_unstable();
        modules
    }

    fn slot(&mut self, module: &str, capability: Capability) -> Result<&mut SubprogramHandle> {
        let handle = self
            .handles
            .entry(module.to_string())
            .or_insert_with(|| SubprogramHandle::new(module));
        let taken = match capability {
            Capability::Parser => handle.parser.is_some(),
            Capability::EntryPoint => handle.entry_point.is_some(),
        };
        if taken {
            return Err(MultiplexError::DuplicateRegistration {
                module: module.to_string(),
                capability,
            });
        }
        Ok(handle)
    }
}

impl SubprogramLoader for SubprogramRegistry {
    fn load(&self, path: &Path) -> Result<SubprogramHandle> {
        let module = module_identity(path).ok_or_else(|| MultiplexError::ModuleLoadFailure {
            path: path.to_path_buf(),
            reason: "path has no file name".to_string(),
        })?;
        self.handles
            .get(&module)
            .cloned()
            .ok_or_else(|| MultiplexError::ModuleLoadFailure {
                path: path.to_path_buf(),
                reason: format!("no subprogram registered as '{module}'"),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_duplicate_parser_registration() {
        let mut registry = SubprogramRegistry::new();
        let build = |_: &[&ArgParser]| -> Result<ArgParser> {
            Err(MultiplexError::InvalidUsage("unused".into()))
        };
        registry.register_parser("eval", build).unwrap();
        let err = registry.register_parser("eval", build).unwrap_err();
        assert!(matches!(
            err,
            MultiplexError::DuplicateRegistration { capability: Capability::Parser, .. }
        ));
        // The entry point slot is independent.
        registry.register_entry_point("eval", |_| Ok(())).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_module_fails_to_load() {
        let registry = SubprogramRegistry::new();
        let err = registry.load(Path::new("sub/missing.yaml")).unwrap_err();
        match err {
            MultiplexError::ModuleLoadFailure { path, reason } => {
                assert_eq!(path, PathBuf::from("sub/missing.yaml"));
                assert!(reason.contains("'missing'"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_capabilities() {
        let handle = SubprogramHandle::new("bare");
        assert!(matches!(
            handle.build_parser(&[]).unwrap_err(),
            MultiplexError::MissingConvention { capability: Capability::Parser, .. }
        ));
        assert!(matches!(
            handle.run(&ConfigTree::new()).unwrap_err(),
            MultiplexError::MissingConvention { capability: Capability::EntryPoint, .. }
        ));
    }

    #[test]
    fn test_entry_point_errors_are_wrapped() {
        let handle = SubprogramHandle::new("train").with_entry_point(|_| Err("diverged".into()));
        let err = handle.run(&ConfigTree::new()).unwrap_err();
        assert_eq!(err.to_string(), "'train' failed: diverged");
    }

    #[test]
    fn test_closure_loader() {
        let loader = |path: &Path| -> Result<SubprogramHandle> {
            Ok(SubprogramHandle::new(module_identity(path).unwrap_or_default()))
        };
        let handle = loader.load(Path::new("a/b/test.yaml")).unwrap();
        assert_eq!(handle.module(), "test");
        assert!(!handle.has_parser());
    }
}
