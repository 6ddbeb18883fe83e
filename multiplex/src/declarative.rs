//! Subprograms described by configuration files.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use multiplex_core::ConfigTree;
use multiplex_loader::ConfigSource;
use tracing::debug;

use crate::error::{BoxError, MultiplexError, Result};
use crate::facade::{MultiplexOptions, Multiplexor};
use crate::registry::{SubprogramHandle, SubprogramLoader, module_identity};

type SharedEntry = Arc<dyn Fn(&str, &ConfigTree) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Loads each subprogram path as a configuration file of its own.
///
/// The subprogram's parser is that file's [`Multiplexor::get_parser`]
/// with the shared root parser as parent, and the file's defaults become the
/// handle's [defaults](SubprogramHandle::defaults). Entry points are optional; one
/// callback receives the module identity and the final configuration of
/// every subprogram.
///
/// # Examples
///
/// ```no_run
/// use multiplex::{DeclarativeLoader, Multiplexor};
///
/// let plex = Multiplexor::from_path("experiment.yaml")?;
/// let loader = DeclarativeLoader::new().with_entry_point(|module, config| {
///     println!("{module}: {} keys", config.len());
///     Ok(())
/// });
/// plex.execute(std::env::args().skip(1), &loader, |_config| Ok(()))?;
/// # Ok::<(), multiplex::MultiplexError>(())
/// ```
#[derive(Clone, Default)]
pub struct DeclarativeLoader {
    options: MultiplexOptions,
    entry_point: Option<SharedEntry>,
}

impl fmt::Debug for DeclarativeLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclarativeLoader")
            .field("options", &self.options)
            .field("entry_point", &self.entry_point.is_some())
            .finish()
    }
}

impl DeclarativeLoader {
    /// Creates a loader without an entry point.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options used to read subprogram files.
    pub fn with_options(mut self, options: MultiplexOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the callback run as every subprogram's entry point.
    pub fn with_entry_point<F>(mut self, run: F) -> Self
    where
        F: Fn(&str, &ConfigTree) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.entry_point = Some(Arc::new(run));
        self
    }
}

impl SubprogramLoader for DeclarativeLoader {
    fn load(&self, path: &Path) -> Result<SubprogramHandle> {
        let failure = |reason: String| MultiplexError::ModuleLoadFailure {
            path: path.to_path_buf(),
            reason,
        };
        let module = module_identity(path).ok_or_else(|| failure("path has no file name".to_string()))?;
        let plex = Multiplexor::with_options(ConfigSource::path(path), self.options.clone())
            .map_err(|err| failure(err.to_string()))?;
        if plex.has_subprograms() {
            return Err(failure(format!(
                "nested '{}' tables are not supported",
                self.options.subprogram_key
            )));
        }
        debug!(module = %module, origin = ?plex.origin(), "loaded declarative subprogram");

        let defaults = plex.defaults().clone();
        let plex = Arc::new(plex);
        let mut handle = SubprogramHandle::new(module.clone())
            .with_defaults(defaults)
            .with_parser(move |parents| plex.get_parser(parents));
        if let Some(entry_point) = &self.entry_point {
            let entry_point = Arc::clone(entry_point);
            handle = handle.with_entry_point(move |config| entry_point(&module, config));
        }
        Ok(handle)
    }
}
