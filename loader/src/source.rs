//! Configuration sources and file loading.
//!
//! A [`ConfigSource`] names one of the accepted input shapes. Loading it
//! yields a [`LoadedConfig`]: the root [`ConfigTree`] plus the directory the
//! configuration came from, which anchors relative subprogram paths and
//! nested resolution.
//!
//! # Loading patterns
//!
//! ```no_run
//! use multiplex_loader::ConfigSource;
//!
//! // Probes config.yaml, then config.json
//! let loaded = ConfigSource::path("config").load().unwrap();
//! println!("{} top-level keys", loaded.tree.len());
//!
//! // Inline YAML (JSON is accepted too)
//! let loaded = ConfigSource::text("lr: 0.1\nepochs: 14").load().unwrap();
//! assert!(loaded.origin.is_none());
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use multiplex_core::ConfigTree;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{LoadError, Result};

/// Extensions probed for a path source, in order.
pub const PROBE_EXTENSIONS: &[&str] = &["yaml", "json"];

/// Serialization format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.yaml` / `.yml`
    Yaml,
    /// `.json`
    Json,
}

impl ConfigFormat {
    /// Picks the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Some(Self::Yaml),
            Some("json") => Some(Self::Json),
            _ => None,
        }
    }
}

/// Accepted configuration input shapes.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// An already-built tree.
    Tree(ConfigTree),
    /// A plain JSON mapping.
    Mapping(Map<String, Value>),
    /// A file path; see [`ConfigSource::load`] for the probing rules.
    Path(PathBuf),
    /// Inline YAML or JSON text.
    Text(String),
}

impl ConfigSource {
    /// Creates a path source.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Creates an inline text source.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Loads the source.
    ///
    /// Path sources try `<stem>.yaml` then `<stem>.json` next to the given
    /// path, whatever extension it was given with, then the path itself.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::NotFound`] if no candidate file exists,
    /// [`LoadError::InvalidRoot`] if the root is not a mapping, or a parse
    /// error from the underlying format.
    pub fn load(self) -> Result<LoadedConfig> {
        match self {
            Self::Tree(tree) => Ok(LoadedConfig::detached(tree)),
            Self::Mapping(map) => Ok(LoadedConfig::detached(ConfigTree::from_map(map))),
            Self::Text(text) => Ok(LoadedConfig::detached(parse_text(&text)?)),
            Self::Path(path) => {
                let found = probe(&path).ok_or_else(|| LoadError::NotFound(path.clone()))?;
                let tree = load_file(&found)?;
                Ok(LoadedConfig {
                    tree,
                    origin: Some(found),
                })
            }
        }
    }
}

impl From<ConfigTree> for ConfigSource {
    fn from(tree: ConfigTree) -> Self {
        Self::Tree(tree)
    }
}

impl From<Map<String, Value>> for ConfigSource {
    fn from(map: Map<String, Value>) -> Self {
        Self::Mapping(map)
    }
}

impl From<PathBuf> for ConfigSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ConfigSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

/// A loaded root configuration and where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Root mapping.
    pub tree: ConfigTree,
    /// File the tree was read from, `None` for in-memory sources.
    pub origin: Option<PathBuf>,
}

impl LoadedConfig {
    fn detached(tree: ConfigTree) -> Self {
        Self { tree, origin: None }
    }

    /// Directory relative paths are resolved against.
    ///
    /// The origin file's directory, or `.` for in-memory sources.
    pub fn base_dir(&self) -> PathBuf {
        self.origin
            .as_deref()
            .and_then(Path::parent)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn probe(path: &Path) -> Option<PathBuf> {
    PROBE_EXTENSIONS
        .iter()
        .map(|ext| path.with_extension(ext))
        .chain(std::iter::once(path.to_path_buf()))
        .find(|candidate| candidate.is_file())
}

/// Loads one YAML or JSON file whose root must be a mapping.
///
/// An empty YAML document loads as an empty tree.
///
/// # Errors
///
/// [`LoadError::UnsupportedFormat`] for unknown extensions,
/// [`LoadError::InvalidRoot`] for non-mapping roots, and I/O or parse
/// errors otherwise.
pub fn load_file(path: &Path) -> Result<ConfigTree> {
    let format =
        ConfigFormat::from_path(path).ok_or_else(|| LoadError::UnsupportedFormat(path.to_path_buf()))?;
    debug!(path = %path.display(), ?format, "loading configuration file");

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let value: Value = match format {
        ConfigFormat::Yaml => serde_yaml::from_reader(reader)?,
        ConfigFormat::Json => serde_json::from_reader(reader)?,
    };
    into_tree(value)
}

/// Parses inline YAML or JSON text whose root must be a mapping.
///
/// # Errors
///
/// [`LoadError::Yaml`] on malformed text, [`LoadError::InvalidRoot`] for
/// non-mapping roots.
pub fn parse_text(text: &str) -> Result<ConfigTree> {
    let value: Value = serde_yaml::from_str(text)?;
    into_tree(value)
}

fn into_tree(value: Value) -> Result<ConfigTree> {
    match value {
        Value::Null => Ok(ConfigTree::new()),
        Value::Object(map) => Ok(ConfigTree::from_map(map)),
        other => Err(LoadError::InvalidRoot(kind_name(&other).to_string())),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.yml")), Some(ConfigFormat::Yaml));
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")), None);
    }

    #[test]
    fn test_text_source_accepts_json_and_yaml() {
        let yaml = ConfigSource::text("lr: 0.1\nmodel:\n  depth: 4\n").load().unwrap();
        assert_eq!(yaml.tree.get("model.depth").unwrap(), &json!(4));

        let json = ConfigSource::text(r#"{"lr": 0.1}"#).load().unwrap();
        assert_eq!(json.tree.get("lr").unwrap(), &json!(0.1));
    }

    #[test]
    fn test_text_root_must_be_mapping() {
        let err = ConfigSource::text("- a\n- b\n").load().unwrap_err();
        assert!(matches!(err, LoadError::InvalidRoot(ref kind) if kind == "a sequence"));
    }

    #[test]
    fn test_in_memory_base_dir_is_current_dir() {
        let loaded = ConfigSource::from(ConfigTree::new()).load().unwrap();
        assert_eq!(loaded.base_dir(), PathBuf::from("."));
    }

    #[test]
    fn test_base_dir_of_bare_file_name() {
        let loaded = LoadedConfig {
            tree: ConfigTree::new(),
            origin: Some(PathBuf::from("config.yaml")),
        };
        assert_eq!(loaded.base_dir(), PathBuf::from("."));
    }
}
