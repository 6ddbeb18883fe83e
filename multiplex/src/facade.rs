//! The [`Multiplexor`]: one configuration file, one command line.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use multiplex_core::{ArgumentSpec, ConfigTree, NameOrFlags, ParserSpec, SpecError, merge, parse_parser_spec};
use multiplex_loader::{ConfigSource, NestedConfigResolver};
use serde_json::Value;
use tracing::{debug, info};

use crate::defaults::default_arguments;
use crate::dispatch::{Selection, SubprogramDispatcher};
use crate::error::{BoxError, MultiplexError, Result};
use crate::parser::{ArgParser, BuiltParser, HELP_FLAGS, HELP_ID, ParserBuilder};
use crate::registry::SubprogramLoader;
use crate::residual::residual_tree;

/// Reserved keys and path separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiplexOptions {
    /// Root key holding the parser description.
    pub argparse_key: String,
    /// Root key holding the subprogram table.
    pub subprogram_key: String,
    /// Separator of dotted paths.
    pub separator: String,
    /// Program name; defaults to the parser's `prog`, then the executable
    /// name.
    pub prog: Option<String>,
}

impl Default for MultiplexOptions {
    fn default() -> Self {
        Self {
            argparse_key: "argparse".to_string(),
            subprogram_key: "subprograms".to_string(),
            separator: multiplex_core::DEFAULT_SEPARATOR.to_string(),
            prog: None,
        }
    }
}

/// Defaults, parser description and subprogram table read from one root
/// configuration.
///
/// # Examples
///
/// ```
/// use multiplex::Multiplexor;
/// use serde_json::json;
///
/// let plex = Multiplexor::from_text(
///     r#"
/// lr: 0.1
/// model:
///   depth: 3
/// argparse:
///   - name_or_flags: ["-v", "--verbose"]
///     action: count
/// "#,
/// )
/// .unwrap();
///
/// let (config, residual) = plex.get_conf(["-vv", "--model.depth", "5", "--db.port=1"]).unwrap();
/// assert_eq!(config.get("lr").unwrap(), &json!(0.1));
/// assert_eq!(config.get("model.depth").unwrap(), &json!(5));
/// assert_eq!(config.get("verbose").unwrap(), &json!(2));
/// assert_eq!(residual.get("db.port").unwrap(), &json!(1));
/// ```
#[derive(Debug, Clone)]
pub struct Multiplexor {
    options: MultiplexOptions,
    defaults: ConfigTree,
    parser_spec: ParserSpec,
    subprograms: Vec<(String, String)>,
    origin: Option<PathBuf>,
    base_dir: PathBuf,
}

impl Multiplexor {
    /// Loads a configuration with default options.
    ///
    /// # Errors
    ///
    /// Load errors, [`SpecError`]s from the parser section, and a
    /// [`SpecError::SchemaViolation`] for a malformed subprogram table.
    pub fn new(source: impl Into<ConfigSource>) -> Result<Self> {
        Self::with_options(source, MultiplexOptions::default())
    }

    /// Loads a configuration file, probing `<stem>.yaml` then `<stem>.json`.
    ///
    /// # Errors
    ///
    /// See [`Multiplexor::new`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(ConfigSource::path(path.as_ref()))
    }

    /// Parses inline YAML or JSON text.
    ///
    /// # Errors
    ///
    /// See [`Multiplexor::new`].
    pub fn from_text(text: &str) -> Result<Self> {
        Self::new(ConfigSource::text(text))
    }

    /// Loads a configuration with explicit options.
    ///
    /// # Errors
    ///
    /// See [`Multiplexor::new`].
    pub fn with_options(source: impl Into<ConfigSource>, options: MultiplexOptions) -> Result<Self> {
        let loaded = source.into().load()?;
        let base_dir = loaded.base_dir();
        let root = loaded.tree.with_separator(options.separator.clone());

        let parser_spec = match root.as_map().get(&options.argparse_key) {
            Some(section) => parse_parser_spec(section)?,
            None => ParserSpec::default(),
        };
        let subprograms = match root.as_map().get(&options.subprogram_key) {
            Some(table) => subprogram_table(&options.subprogram_key, table)?,
            None => Vec::new(),
        };
        let defaults = root
            .without(&options.argparse_key)
            .without(&options.subprogram_key);

        info!(
            origin = ?loaded.origin,
            defaults = defaults.len(),
            arguments = parser_spec.arguments.len(),
            subprograms = subprograms.len(),
            "loaded configuration"
        );

        Ok(Self {
            options,
            defaults,
            parser_spec,
            subprograms,
            origin: loaded.origin,
            base_dir,
        })
    }

    /// Options in effect.
    pub fn options(&self) -> &MultiplexOptions {
        &self.options
    }

    /// Default values: the root without the reserved keys.
    pub fn defaults(&self) -> &ConfigTree {
        &self.defaults
    }

    /// Validated parser description.
    pub fn parser_spec(&self) -> &ParserSpec {
        &self.parser_spec
    }

    /// Subprogram names and paths, in file order.
    pub fn subprograms(&self) -> &[(String, String)] {
        &self.subprograms
    }

    /// Returns `true` if a subprogram table is declared.
    pub fn has_subprograms(&self) -> bool {
        !self.subprograms.is_empty()
    }

    /// File the configuration came from, if any.
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// Directory subprogram and nested paths are resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of subprogram `name`, resolved against [`base_dir`](Self::base_dir).
    pub fn subprogram_path(&self, name: &str) -> Option<PathBuf> {
        self.subprograms
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, path)| self.base_dir.join(path))
    }

    /// Program name for usage and error messages, when one is configured.
    pub fn prog(&self) -> Option<&str> {
        self.options
            .prog
            .as_deref()
            .or(self.parser_spec.parser.prog.as_deref())
    }

    /// Builds the root parser: the parser section plus one option per
    /// default leaf.
    ///
    /// Default leaves whose destination a parent already defines are not
    /// declared again.
    ///
    /// # Errors
    ///
    /// [`MultiplexError::InvalidUsage`] when subprograms are declared; use
    /// [`dispatch`](Self::dispatch) instead. Build errors otherwise.
    pub fn get_parser(&self, parents: &[&ArgParser]) -> Result<ArgParser> {
        if self.has_subprograms() {
            return Err(MultiplexError::InvalidUsage(format!(
                "the configuration declares '{}'; dispatch the command line instead of building a single parser",
                self.options.subprogram_key
            )));
        }
        Ok(self.build_root(parents, false)?.parser)
    }

    /// Renders the help shown for `--help` on the main program.
    ///
    /// # Errors
    ///
    /// Build errors.
    pub fn render_help(&self) -> Result<String> {
        if !self.has_subprograms() {
            return Ok(self.get_parser(&[])?.render_help());
        }
        let (shared, main) = SubprogramDispatcher::new(self).parsers()?;
        Ok(main.enable_help(&shared.deferred_help)?.render_help())
    }

    /// Parses `tokens` permissively against the root parser.
    ///
    /// Returns the defaults merged under the parsed values, and the
    /// residual tokens read as a tree. The subprogram table is ignored: a
    /// subprogram name on the command line is a stray token.
    ///
    /// # Errors
    ///
    /// Build errors, and [`MultiplexError::ArgumentParse`] for tokens that
    /// do not parse or residual tokens that are not `--key[=value]`.
    pub fn get_conf<I, T>(&self, tokens: I) -> Result<(ConfigTree, ConfigTree)>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let parser = self.build_root(&[], false)?.parser;
        let parsed = parser.parse_known(tokens, &ConfigTree::new())?;
        let config = merge(&self.defaults, &parsed.values);
        let residual = residual_tree(&parsed.residual, &self.options.separator, parser.prog())?;
        Ok((config, residual))
    }

    /// Resolves a residual tree against files next to the configuration.
    ///
    /// # Errors
    ///
    /// See [`NestedConfigResolver::resolve`].
    pub fn get_nested_config(&self, residual: &ConfigTree) -> Result<ConfigTree> {
        let resolved = NestedConfigResolver::new(&self.base_dir).resolve(residual)?;
        Ok(resolved.with_separator(self.options.separator.clone()))
    }

    /// Parses `tokens`, selecting a subprogram when one is named.
    ///
    /// # Errors
    ///
    /// Parse errors, [`MultiplexError::ModuleLoadFailure`] and
    /// [`MultiplexError::MissingConvention`] from the selected subprogram.
    pub fn dispatch<I, T>(&self, tokens: I, loader: &dyn SubprogramLoader) -> Result<Selection>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        SubprogramDispatcher::new(self).dispatch(tokens, loader)
    }

    /// Dispatches, then runs the selected subprogram's entry point or
    /// `main` with the final configuration.
    ///
    /// # Errors
    ///
    /// Dispatch errors, and entry point failures wrapped in
    /// [`MultiplexError::EntryPoint`].
    pub fn execute<I, T, F>(&self, tokens: I, loader: &dyn SubprogramLoader, main: F) -> Result<Selection>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
        F: FnOnce(&ConfigTree) -> std::result::Result<(), BoxError>,
    {
        let selection = self.dispatch(tokens, loader)?;
        match &selection {
            Selection::Subprogram { handle, config, .. } => handle.run(config)?,
            Selection::Main { config } | Selection::Standalone { config } => {
                main(config).map_err(|source| MultiplexError::EntryPoint {
                    program: self.prog().unwrap_or("main").to_string(),
                    source,
                })?;
            }
        }
        Ok(selection)
    }

    /// Builds the parser section plus default-derived options.
    pub(crate) fn build_root(&self, parents: &[&ArgParser], suppress_help: bool) -> Result<BuiltParser> {
        let builder = self.builder(parents).suppress_help(suppress_help);
        let (dests, flags) = self.taken(&builder, &[]);
        let derived = default_arguments(&self.defaults, &dests, &flags);
        debug!(derived = derived.len(), "derived options from defaults");
        Ok(builder.with_arguments(derived).build(&self.parser_spec)?)
    }

    /// Builds the shared parser of dispatch; destinations in `reserved` are
    /// left to other parsers.
    pub(crate) fn build_shared(&self, reserved: &[&str]) -> Result<BuiltParser> {
        let builder = self.builder(&[]).suppress_help(true);
        let (dests, flags) = self.taken(&builder, reserved);
        let derived = default_arguments(&self.defaults, &dests, &flags);
        Ok(builder.with_arguments(derived).build(&self.parser_spec)?)
    }

    pub(crate) fn builder(&self, parents: &[&ArgParser]) -> ParserBuilder {
        let mut builder = ParserBuilder::new()
            .with_parents(parents)
            .with_separator(self.options.separator.clone());
        if let Some(prog) = self.prog() {
            builder = builder.with_prog(prog);
        }
        builder
    }

    fn taken(&self, builder: &ParserBuilder, reserved: &[&str]) -> (HashSet<String>, HashSet<String>) {
        let mut dests = builder.parent_dests();
        dests.extend(reserved.iter().map(|d| (*d).to_string()));
        dests.extend(self.parser_spec.arguments.iter().map(ArgumentSpec::dest));

        let mut flags: HashSet<String> = self
            .parser_spec
            .arguments
            .iter()
            .filter_map(|a| match &a.name_or_flags {
                NameOrFlags::Optional(flags) => Some(flags.iter().cloned()),
                NameOrFlags::Positional(_) => None,
            })
            .flatten()
            .collect();
        if self.parser_spec.parser.add_help {
            flags.extend(HELP_FLAGS.iter().map(|f| (*f).to_string()));
            dests.insert(HELP_ID.to_string());
        }
        (dests, flags)
    }
}

fn subprogram_table(key: &str, table: &Value) -> std::result::Result<Vec<(String, String)>, SpecError> {
    let Value::Object(map) = table else {
        return Err(SpecError::SchemaViolation(format!(
            "'{key}' must map subprogram names to paths"
        )));
    };
    map.iter()
        .map(|(name, path)| match path {
            Value::String(path) if !name.is_empty() => Ok((name.clone(), path.clone())),
            _ => Err(SpecError::SchemaViolation(format!(
                "'{key}.{name}' must be a non-empty name mapped to a path string"
            ))),
        })
        .collect()
}
