//! Graph mapper
//!
//! Owns the compiled path mappers for one configuration and runs them to
//! read a source tree into a target tree, or write a target tree back.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, trace};

use crate::config::{MapperConfig, PathConfig};
use crate::mappers::{PathMapper, empty_tree};
use crate::path::SEPARATOR;
use crate::source_tree::SourceTree;
use crate::{Error, Result};

/// Options for [`GraphMapper::read_with`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Return the mapper's default value when every top-level field of the
    /// built target is null or missing.
    pub prevent_empty_target: bool,
}

impl ReadOptions {
    #[must_use]
    pub fn prevent_empty_target() -> Self {
        Self {
            prevent_empty_target: true,
        }
    }
}

/// A compiled, bidirectional mapping between a source tree and a target tree
pub struct GraphMapper {
    config: MapperConfig,
    mappers: Vec<PathMapper>,
    index: HashMap<String, usize>,
}

impl GraphMapper {
    /// Compile `config` into a mapper.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationConflict`] when an entry combines
    /// contradictory fields and the configuration is strict.
    pub fn new(config: MapperConfig) -> Result<Self> {
        let strict = config.is_strict();
        let root = config.from.as_deref();
        let mut mappers = Vec::with_capacity(config.to.len());
        let mut index = HashMap::with_capacity(config.to.len());

        for (target_path, path_config) in &config.to {
            let mapper = PathMapper::compile(target_path, path_config, root, strict)?;
            index.insert(target_path.clone(), mappers.len());
            mappers.push(mapper);
        }

        debug!(root = ?config.from, paths = mappers.len(), "Compiled graph mapper");
        Ok(Self {
            config,
            mappers,
            index,
        })
    }

    /// The configuration this mapper was compiled from.
    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn root_source_path(&self) -> Option<&str> {
        self.config.from.as_deref()
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.config.default_value.as_ref()
    }

    /// Configured target paths, in mapping order.
    pub fn target_paths(&self) -> impl Iterator<Item = &str> {
        self.config.to.iter().map(|(target, _)| target.as_str())
    }

    /// Read `source` into a new target tree.
    ///
    /// Returns `Ok(None)` when `source` is not an object.
    ///
    /// # Errors
    ///
    /// Propagates transform errors and failures to resolve nested mappers.
    pub fn read(&self, source: &Value) -> Result<Option<Value>> {
        self.read_with(source, ReadOptions::default())
    }

    /// Read `source` with explicit options.
    ///
    /// # Errors
    ///
    /// See [`GraphMapper::read`].
    pub fn read_with(&self, source: &Value, options: ReadOptions) -> Result<Option<Value>> {
        self.read_slice(Some(source), options)
    }

    /// Read `source` and deserialize the target into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deserialize`] when the target does not fit `T`, in
    /// addition to the errors of [`GraphMapper::read`].
    pub fn read_as<T: DeserializeOwned>(
        &self,
        source: &Value,
        options: ReadOptions,
    ) -> Result<Option<T>> {
        self.read_with(source, options)?
            .map(serde_json::from_value)
            .transpose()
            .map_err(Error::from)
    }

    pub(crate) fn read_slice(
        &self,
        source: Option<&Value>,
        options: ReadOptions,
    ) -> Result<Option<Value>> {
        let Some(source @ Value::Object(_)) = source else {
            return Ok(None);
        };

        let mut target = empty_tree();
        for mapper in &self.mappers {
            mapper.read(source, &mut target, options)?;
        }
        trace!(root = ?self.config.from, "Read target");

        if options.prevent_empty_target && is_empty_target(&target) {
            return Ok(self.config.default_value.clone());
        }

        match &self.config.finalize {
            Some(finalize) => finalize.apply(target).map(Some),
            None => Ok(Some(target)),
        }
    }

    /// Write `target` into a new source tree.
    ///
    /// Returns `Ok(None)` when `target` is not an object.
    ///
    /// # Errors
    ///
    /// Propagates transform errors and failures to resolve nested mappers.
    pub fn write(&self, target: &Value) -> Result<Option<Value>> {
        self.write_slice(Some(target))
    }

    pub(crate) fn write_slice(&self, target: Option<&Value>) -> Result<Option<Value>> {
        let Some(target @ Value::Object(_)) = target else {
            return Ok(None);
        };

        let mut source = empty_tree();
        for mapper in &self.mappers {
            mapper.write(target, &mut source)?;
        }
        trace!(root = ?self.config.from, "Wrote source");
        Ok(Some(source))
    }

    /// Every absolute source path this mapper reads or writes.
    ///
    /// Sequence positions are reported with a trailing `[]` segment.
    ///
    /// # Errors
    ///
    /// Fails when a deferred nested mapper cannot be resolved.
    pub fn source_list(&self) -> Result<Vec<String>> {
        let mut list = Vec::new();
        for mapper in &self.mappers {
            list.extend(mapper.source_list()?);
        }
        Ok(list)
    }

    /// The source paths needed for `target_paths` only.
    ///
    /// # Errors
    ///
    /// See [`GraphMapper::pick`].
    pub fn source_list_for<S: AsRef<str>>(&self, target_paths: &[S]) -> Result<Vec<String>> {
        self.pick(target_paths)?.source_list()
    }

    /// The source paths grouped into a tree by shared prefixes.
    ///
    /// # Errors
    ///
    /// See [`GraphMapper::source_list`].
    pub fn source_tree(&self) -> Result<SourceTree> {
        Ok(SourceTree::from_paths(&self.source_list()?))
    }

    /// The source tree needed for `target_paths` only.
    ///
    /// # Errors
    ///
    /// See [`GraphMapper::pick`].
    pub fn source_tree_for<S: AsRef<str>>(&self, target_paths: &[S]) -> Result<SourceTree> {
        Ok(SourceTree::from_paths(&self.source_list_for(target_paths)?))
    }

    /// Build a new mapper from this configuration deep-merged with `overrides`.
    ///
    /// # Errors
    ///
    /// Returns any error from compiling the merged configuration.
    pub fn extend(&self, overrides: &MapperConfig) -> Result<GraphMapper> {
        GraphMapper::new(self.config.merge(overrides))
    }

    /// Build a new mapper restricted to `target_paths`.
    ///
    /// Paths matching a configured key are kept as they are. Other paths are
    /// split at their first segment and delegated to the nested mapper of that
    /// entry.
    ///
    /// The picked mapper keeps the root path, `default_value` and `strict`
    /// setting. It has no `finalize`, which is written against the full
    /// target shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTargetPath`] when a path is neither configured
    /// nor reachable through a nested mapper.
    pub fn pick<S: AsRef<str>>(&self, target_paths: &[S]) -> Result<GraphMapper> {
        let mut config = MapperConfig {
            from: self.config.from.clone(),
            default_value: self.config.default_value.clone(),
            strict: self.config.strict,
            ..MapperConfig::default()
        };
        let mut nested: Vec<(&str, Vec<&str>)> = Vec::new();

        for target_path in target_paths {
            let target_path = target_path.as_ref();
            if let Some(entry) = self.config.get(target_path) {
                config = config.map(target_path, entry.clone());
                continue;
            }
            let (head, rest) = target_path
                .split_once(SEPARATOR)
                .unwrap_or((target_path, ""));
            match nested.iter_mut().find(|(key, _)| *key == head) {
                Some((_, rests)) => rests.push(rest),
                None => nested.push((head, vec![rest])),
            }
        }

        for (head, rests) in nested {
            let position = self
                .index
                .get(head)
                .copied()
                .ok_or_else(|| Error::unknown_target_path(head))?;
            let mapper = &self.mappers[position];
            let Some(child) = mapper.nested() else {
                let rest = rests.first().copied().unwrap_or_default();
                return Err(Error::unknown_target_path(format!(
                    "{head}{SEPARATOR}{rest}"
                )));
            };
            let picked = child.resolve()?.pick(&rests)?;
            let original = &self.config.to[position].1;
            config = config.map(head, mapper.splice(original, picked));
        }

        debug!(paths = target_paths.len(), "Picked graph mapper");
        GraphMapper::new(config)
    }

    /// The configuration entry for exactly `target_path`.
    pub fn path_config(&self, target_path: &str) -> Option<&PathConfig> {
        self.config.get(target_path)
    }
}

impl std::fmt::Debug for GraphMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphMapper")
            .field("from", &self.config.from)
            .field("to", &self.target_paths().collect::<Vec<_>>())
            .finish()
    }
}

/// Shallow emptiness check: nested empty objects count as present.
fn is_empty_target(target: &Value) -> bool {
    match target {
        Value::Object(fields) => fields.values().all(Value::is_null),
        _ => false,
    }
}
