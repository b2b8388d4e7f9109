//! Mapper configuration documents
//!
//! Loads [`MapperConfig`]s from YAML or JSON. Documents cover every
//! data-only form of a path entry; transforms are referenced by name and
//! looked up in a [`TransformCatalog`].
//!
//! ```yaml
//! from: Person
//! to:
//!   id: '='
//!   name:
//!     from: [FirstName, LastName]
//!     read: join
//!     write: split
//!   active:
//!     from: Status
//!     pipe: [number, boolean]
//!   address:
//!     use: address
//!     with:
//!       from: MainAddress
//!   phones:
//!     from: PhoneList
//!     array: true
//!     to:
//!       number: Number
//! ```

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::config::{MapperConfig, PathConfig, Sources};
use crate::pipeline::{Step, TransformFn, paired};
use crate::registry::MapperRegistry;
use crate::{Error, Result};

/// Named transform steps available to configuration documents
#[derive(Debug, Clone, Default)]
pub struct TransformCatalog {
    steps: HashMap<String, Step>,
}

impl TransformCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `step` under `name`, replacing any previous step.
    pub fn register(&mut self, name: impl Into<String>, step: Step) {
        self.steps.insert(name.into(), step);
    }

    /// Builder form of [`TransformCatalog::register`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, step: Step) -> Self {
        self.register(name, step);
        self
    }

    /// The step registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTransform`] for unregistered names.
    pub fn step(&self, name: &str) -> Result<&Step> {
        self.steps.get(name).ok_or_else(|| Error::UnknownTransform {
            name: name.to_string(),
        })
    }

    /// The read side of the step registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTransform`] for unregistered names and
    /// [`Error::Config`] when the step has no read side.
    pub fn read(&self, name: &str) -> Result<TransformFn> {
        self.step(name)?
            .read
            .clone()
            .ok_or_else(|| Error::config(format!("transform '{name}' cannot be used to read")))
    }

    /// The write side of the step registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTransform`] for unregistered names and
    /// [`Error::Config`] when the step has no write side.
    pub fn write(&self, name: &str) -> Result<TransformFn> {
        self.step(name)?
            .write
            .clone()
            .ok_or_else(|| Error::config(format!("transform '{name}' cannot be used to write")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// A mapper as written in a configuration document
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MapperDocument {
    #[serde(default)]
    pub from: Option<String>,

    #[serde(default, deserialize_with = "ordered_entries")]
    pub to: Vec<(String, PathDocument)>,

    #[serde(default, deserialize_with = "present")]
    pub default_value: Option<Value>,

    #[serde(default)]
    pub strict: Option<bool>,
}

/// A target path entry as written in a configuration document
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PathDocument {
    /// `target: Source.Path`
    Source(String),
    /// `target: [SourceA, SourceB]`
    Sources(Vec<String>),
    Entry(Box<EntryDocument>),
}

/// The long form of a path entry
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EntryDocument {
    #[serde(default)]
    pub from: Option<SourcesDocument>,

    /// Names of read transforms, applied in order
    #[serde(default)]
    pub read: StepNames,

    /// Names of write transforms, applied in order
    #[serde(default)]
    pub write: StepNames,

    /// Names of paired steps: reads in order, writes reversed
    #[serde(default)]
    pub pipe: StepNames,

    #[serde(default, deserialize_with = "ordered_entries_opt")]
    pub to: Option<Vec<(String, PathDocument)>>,

    #[serde(default)]
    pub array: bool,

    /// Name of a registered mapper to delegate to
    #[serde(default, rename = "use")]
    pub use_mapper: Option<String>,

    /// Overrides applied to the mapper named by `use`
    #[serde(default)]
    pub with: Option<MapperDocument>,

    #[serde(default, deserialize_with = "present")]
    pub default_value: Option<Value>,

    #[serde(default)]
    pub strict: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SourcesDocument {
    Single(String),
    Many(Vec<String>),
}

/// One transform name, or a list of them
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(from = "OneOrMany")]
pub struct StepNames(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for StepNames {
    fn from(names: OneOrMany) -> Self {
        match names {
            OneOrMany::One(name) => StepNames(vec![name]),
            OneOrMany::Many(names) => StepNames(names),
        }
    }
}

impl StepNames {
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Keeps an explicit `null` apart from an absent field.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn ordered_entries<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<(String, PathDocument)>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_map(EntriesVisitor)
}

fn ordered_entries_opt<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Vec<(String, PathDocument)>>, D::Error>
where
    D: Deserializer<'de>,
{
    ordered_entries(deserializer).map(Some)
}

/// Reads a mapping into a list, keeping document order.
struct EntriesVisitor;

impl<'de> Visitor<'de> for EntriesVisitor {
    type Value = Vec<(String, PathDocument)>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of target paths to path entries")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries: Self::Value = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((target, entry)) = map.next_entry::<String, PathDocument>()? {
            match entries.iter_mut().find(|(key, _)| *key == target) {
                Some((_, existing)) => *existing = entry,
                None => entries.push((target, entry)),
            }
        }
        Ok(entries)
    }
}

/// Turns configuration documents into mapper configurations
///
/// `use` entries need a registry, attached with
/// [`ConfigLoader::with_registry`].
#[derive(Debug, Clone)]
pub struct ConfigLoader<'a> {
    catalog: &'a TransformCatalog,
    registry: Option<&'a MapperRegistry>,
}

impl<'a> ConfigLoader<'a> {
    pub fn new(catalog: &'a TransformCatalog) -> Self {
        Self {
            catalog,
            registry: None,
        }
    }

    /// Resolve `use` entries through `registry`.
    #[must_use]
    pub fn with_registry(mut self, registry: &'a MapperRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Parse a YAML mapper document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] with the location of malformed input, or
    /// any error from [`ConfigLoader::from_document`].
    pub fn from_yaml(&self, yaml: &str) -> Result<MapperConfig> {
        let document: MapperDocument = serde_yaml::from_str(yaml).map_err(yaml_error)?;
        self.from_document(&document)
    }

    /// Parse a JSON mapper document.
    ///
    /// # Errors
    ///
    /// See [`ConfigLoader::from_yaml`].
    pub fn from_json(&self, json: &str) -> Result<MapperConfig> {
        let document: MapperDocument = serde_json::from_str(json).map_err(json_error)?;
        self.from_document(&document)
    }

    /// Convert an already parsed JSON value.
    ///
    /// # Errors
    ///
    /// See [`ConfigLoader::from_yaml`].
    pub fn from_value(&self, value: Value) -> Result<MapperConfig> {
        let document: MapperDocument = serde_json::from_value(value).map_err(json_error)?;
        self.from_document(&document)
    }

    /// Load a document from disk; `.json` files are read as JSON, anything
    /// else as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the file cannot be read, otherwise see
    /// [`ConfigLoader::from_yaml`].
    pub fn from_file(&self, path: &Path) -> Result<MapperConfig> {
        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loading mapper document");
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => self.from_json(&content),
            _ => self.from_yaml(&content),
        }
    }

    /// Parse a YAML document of named mappers and define each of them in
    /// the attached registry, in document order.
    ///
    /// Returns the defined names.
    ///
    /// # Errors
    ///
    /// Fails without a registry, and on the first mapper that cannot be
    /// loaded or compiled; mappers defined before it stay defined.
    pub fn define_all(&self, yaml: &str) -> Result<Vec<String>> {
        let registry = self.registry()?;
        let documents: NamedDocuments = serde_yaml::from_str(yaml).map_err(yaml_error)?;
        let mut names = Vec::with_capacity(documents.0.len());
        for (name, document) in &documents.0 {
            registry.define(name.as_str(), self.from_document(document)?)?;
            names.push(name.clone());
        }
        Ok(names)
    }

    /// Convert a parsed document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTransform`] for unregistered transform names
    /// and [`Error::Config`] for entries that cannot be expressed.
    pub fn from_document(&self, document: &MapperDocument) -> Result<MapperConfig> {
        let mut config = MapperConfig {
            from: document.from.clone(),
            default_value: document.default_value.clone(),
            strict: document.strict,
            ..MapperConfig::default()
        };
        for (target, entry) in &document.to {
            config = config.map(target.as_str(), self.path_config(target, entry)?);
        }
        Ok(config)
    }

    fn path_config(&self, target: &str, document: &PathDocument) -> Result<PathConfig> {
        match document {
            PathDocument::Source(path) => Ok(PathConfig::source(path.as_str())),
            PathDocument::Sources(paths) => {
                Ok(PathConfig::sources(paths.iter().map(String::as_str)))
            }
            PathDocument::Entry(entry) => self.entry_config(target, entry),
        }
    }

    fn entry_config(&self, target: &str, entry: &EntryDocument) -> Result<PathConfig> {
        let from = entry.from.as_ref().map(|from| match from {
            SourcesDocument::Single(path) => Sources::Single(path.clone()),
            SourcesDocument::Many(paths) => Sources::Many(paths.clone()),
        });

        let mut config = match &entry.use_mapper {
            Some(name) => self.use_config(target, name, entry, from.as_ref())?,
            None => {
                if entry.with.is_some() {
                    return Err(Error::config(format!(
                        "entry '{target}' has `with` but no `use`"
                    )));
                }
                PathConfig {
                    from,
                    ..PathConfig::default()
                }
            }
        };

        if !entry.pipe.is_empty() {
            if !entry.read.is_empty() || !entry.write.is_empty() {
                return Err(Error::config(format!(
                    "entry '{target}' combines `pipe` with `read` or `write`"
                )));
            }
            let steps = entry
                .pipe
                .0
                .iter()
                .map(|name| self.catalog.step(name).cloned())
                .collect::<Result<Vec<_>>>()?;
            let (reads, writes) = paired(&steps);
            config.read = reads;
            config.write = writes;
        } else {
            config.read = names_to_fns(&entry.read, |name| self.catalog.read(name))?;
            config.write = names_to_fns(&entry.write, |name| self.catalog.write(name))?;
        }

        if let Some(to) = &entry.to {
            let mut nested = Vec::with_capacity(to.len());
            for (key, document) in to {
                nested.push((key.clone(), self.path_config(key, document)?));
            }
            config.to = Some(nested);
        }
        config.array = config.array || entry.array;
        if entry.default_value.is_some() {
            config.default_value = entry.default_value.clone();
        }
        if entry.strict.is_some() {
            config.strict = entry.strict;
        }
        Ok(config)
    }

    /// A deferred entry for `use: name`.
    ///
    /// On a sequence entry `from` names the sequence. Elsewhere it becomes
    /// the root of the referenced mapper, unless `with` already sets one.
    fn use_config(
        &self,
        target: &str,
        name: &str,
        entry: &EntryDocument,
        from: Option<&Sources>,
    ) -> Result<PathConfig> {
        let registry = self.registry()?;
        let mut overrides = match &entry.with {
            Some(with) => Some(self.from_document(with)?),
            None => None,
        };

        if entry.array {
            let mut config = match overrides {
                Some(overrides) => registry.use_mapper_with(name, overrides),
                None => registry.use_mapper(name),
            };
            config.from = from.cloned();
            return Ok(config);
        }

        if let Some(root) = from {
            let Sources::Single(root) = root else {
                return Err(Error::config(format!(
                    "entry '{target}' uses mapper '{name}' with more than one `from` path"
                )));
            };
            let overrides = overrides.get_or_insert_with(MapperConfig::default);
            if overrides.from.is_none() {
                overrides.from = Some(root.clone());
            }
        }

        Ok(match overrides {
            Some(overrides) => registry.use_mapper_with(name, overrides),
            None => registry.use_mapper(name),
        })
    }

    fn registry(&self) -> Result<&'a MapperRegistry> {
        self.registry
            .ok_or_else(|| Error::config("`use` entries need a mapper registry"))
    }
}

/// Top-level document of named mappers, in document order
struct NamedDocuments(Vec<(String, MapperDocument)>);

impl<'de> Deserialize<'de> for NamedDocuments {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct NamedVisitor;

        impl<'de> Visitor<'de> for NamedVisitor {
            type Value = NamedDocuments;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of mapper names to mapper documents")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut documents = Vec::new();
                while let Some(entry) = map.next_entry::<String, MapperDocument>()? {
                    documents.push(entry);
                }
                Ok(NamedDocuments(documents))
            }
        }

        deserializer.deserialize_map(NamedVisitor)
    }
}

fn names_to_fns(
    names: &StepNames,
    lookup: impl Fn(&str) -> Result<TransformFn>,
) -> Result<Vec<TransformFn>> {
    names.0.iter().map(|name| lookup(name)).collect()
}

fn yaml_error(e: serde_yaml::Error) -> Error {
    Error::Config {
        message: format!("Failed to parse mapper document: {e}"),
        line: e.location().map(|l| l.line()),
        column: e.location().map(|l| l.column()),
    }
}

fn json_error(e: serde_json::Error) -> Error {
    let located = e.line() > 0;
    Error::Config {
        message: format!("Failed to parse mapper document: {e}"),
        line: located.then(|| e.line()),
        column: located.then(|| e.column()),
    }
}
