//! Path mappers
//!
//! Each configured target path compiles into one [`PathMapper`]. The variant
//! is chosen once, at compile time, from the fields present in its
//! [`PathConfig`]; `read` and `write` never look at the configuration again.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

use crate::config::{DeferredMapper, MapperConfig, PathConfig, SAME_PATH, Sources};
use crate::graph::{GraphMapper, ReadOptions};
use crate::path;
use crate::pipeline::Pipeline;

/// Marker segment appended to a sequence path in source listings.
pub const ARRAY_MARKER: &str = "[]";

pub(crate) enum PathMapper {
    Scalar(ScalarProperty),
    MultiSource(MultiSourceProperty),
    Array(ArrayMapper),
    Child(ChildMapper),
}

pub(crate) struct ScalarProperty {
    target_path: String,
    source_path: String,
    read: Pipeline,
    write: Pipeline,
}

pub(crate) struct MultiSourceProperty {
    target_path: String,
    source_paths: Vec<String>,
    read: Pipeline,
    write: Pipeline,
}

pub(crate) struct ArrayMapper {
    target_path: String,
    source_path: String,
    element: NestedMapper,
}

pub(crate) struct ChildMapper {
    target_path: String,
    root_source_path: Option<String>,
    mapper: NestedMapper,
}

/// A nested mapper, compiled inline or resolved on first use.
pub(crate) enum NestedMapper {
    Inline(Arc<GraphMapper>),
    Deferred(DeferredMapper),
}

impl NestedMapper {
    pub(crate) fn resolve(&self) -> crate::Result<Arc<GraphMapper>> {
        match self {
            NestedMapper::Inline(mapper) => Ok(Arc::clone(mapper)),
            NestedMapper::Deferred(deferred) => deferred.resolve(),
        }
    }
}

impl PathMapper {
    /// Compile the mapper for `target_path` below the root source path `root`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ConfigurationConflict`] for contradictory
    /// entries when `strict` is set, or any error from compiling a nested
    /// mapper.
    pub(crate) fn compile(
        target_path: &str,
        config: &PathConfig,
        root: Option<&str>,
        strict: bool,
    ) -> crate::Result<Self> {
        let from = config.from.as_ref().map(|sources| resolve_same(sources, target_path));
        let nested = config.is_nested();

        if config.to.is_some() && config.mapper.is_some() {
            conflict(
                strict,
                target_path,
                "a nested `to` cannot be combined with a deferred `mapper`",
            )?;
        }
        if nested && from.as_ref().is_some_and(Sources::is_many) {
            conflict(
                strict,
                target_path,
                "a nested mapper cannot read from multiple `from` sources",
            )?;
        }
        if nested && config.array && from.is_none() {
            conflict(
                strict,
                target_path,
                "an `array` mapping needs a `from` path holding the sequence",
            )?;
        }

        if nested && config.array {
            let sequence = from
                .as_ref()
                .and_then(Sources::first)
                .unwrap_or(target_path);
            return Ok(PathMapper::Array(ArrayMapper {
                target_path: target_path.to_string(),
                source_path: path::join(root, sequence),
                element: nested_mapper(config, None, strict)?,
            }));
        }

        if nested {
            let nested_root = from.as_ref().and_then(Sources::first).map(str::to_string);
            return Ok(PathMapper::Child(ChildMapper {
                target_path: target_path.to_string(),
                root_source_path: root.map(str::to_string),
                mapper: nested_mapper(config, nested_root, strict)?,
            }));
        }

        let read = Pipeline::new(config.read.iter().cloned());
        let write = Pipeline::new(config.write.iter().cloned());
        let mapper = match from {
            Some(Sources::Many(paths)) => PathMapper::MultiSource(MultiSourceProperty {
                target_path: target_path.to_string(),
                source_paths: paths.iter().map(|p| path::join(root, p)).collect(),
                read,
                write,
            }),
            Some(Sources::Single(source)) => PathMapper::Scalar(ScalarProperty {
                target_path: target_path.to_string(),
                source_path: path::join(root, &source),
                read,
                write,
            }),
            None => PathMapper::Scalar(ScalarProperty {
                target_path: target_path.to_string(),
                source_path: path::join(root, target_path),
                read,
                write,
            }),
        };
        Ok(mapper)
    }

    pub(crate) fn read(
        &self,
        source: &Value,
        target: &mut Value,
        options: ReadOptions,
    ) -> crate::Result<()> {
        match self {
            PathMapper::Scalar(mapper) => mapper.read(source, target),
            PathMapper::MultiSource(mapper) => mapper.read(source, target),
            PathMapper::Array(mapper) => mapper.read(source, target, options),
            PathMapper::Child(mapper) => mapper.read(source, target, options),
        }
    }

    pub(crate) fn write(&self, target: &Value, source: &mut Value) -> crate::Result<()> {
        match self {
            PathMapper::Scalar(mapper) => mapper.write(target, source),
            PathMapper::MultiSource(mapper) => mapper.write(target, source),
            PathMapper::Array(mapper) => mapper.write(target, source),
            PathMapper::Child(mapper) => mapper.write(target, source),
        }
    }

    pub(crate) fn source_list(&self) -> crate::Result<Vec<String>> {
        match self {
            PathMapper::Scalar(mapper) => Ok(vec![mapper.source_path.clone()]),
            PathMapper::MultiSource(mapper) => Ok(mapper.source_paths.clone()),
            PathMapper::Array(mapper) => mapper.source_list(),
            PathMapper::Child(mapper) => mapper.source_list(),
        }
    }

    /// The nested mapper behind a child or array entry.
    pub(crate) fn nested(&self) -> Option<&NestedMapper> {
        match self {
            PathMapper::Array(mapper) => Some(&mapper.element),
            PathMapper::Child(mapper) => Some(&mapper.mapper),
            PathMapper::Scalar(_) | PathMapper::MultiSource(_) => None,
        }
    }

    /// Rebuild `original` so that it delegates to the already built `picked`.
    pub(crate) fn splice(&self, original: &PathConfig, picked: GraphMapper) -> PathConfig {
        let deferred = DeferredMapper::resolved(Arc::new(picked));
        match self {
            PathMapper::Array(_) => PathConfig {
                from: original.from.clone(),
                array: true,
                ..PathConfig::deferred(deferred)
            },
            _ => PathConfig::deferred(deferred),
        }
    }
}

impl ScalarProperty {
    fn read(&self, source: &Value, target: &mut Value) -> crate::Result<()> {
        let value = path::get(source, &self.source_path).cloned();
        path::set(target, &self.target_path, self.read.apply(vec![value])?);
        Ok(())
    }

    fn write(&self, target: &Value, source: &mut Value) -> crate::Result<()> {
        let value = path::get(target, &self.target_path).cloned();
        path::set(source, &self.source_path, self.write.apply(vec![value])?);
        Ok(())
    }
}

impl MultiSourceProperty {
    fn read(&self, source: &Value, target: &mut Value) -> crate::Result<()> {
        let values = self
            .source_paths
            .iter()
            .map(|p| path::get(source, p).cloned())
            .collect();
        path::set(target, &self.target_path, self.read.apply(values)?);
        Ok(())
    }

    fn write(&self, target: &Value, source: &mut Value) -> crate::Result<()> {
        let value = path::get(target, &self.target_path).cloned();
        let values = match self.write.apply(vec![value])? {
            Some(Value::Array(items)) => items.into_iter().map(Some).collect(),
            other => vec![other],
        };
        for (source_path, value) in self.source_paths.iter().zip(values) {
            path::set(source, source_path, value);
        }
        Ok(())
    }
}

impl ArrayMapper {
    fn read(&self, source: &Value, target: &mut Value, options: ReadOptions) -> crate::Result<()> {
        let Some(Value::Array(items)) = path::get(source, &self.source_path) else {
            return Ok(());
        };
        let element = self.element.resolve()?;
        let list = items
            .iter()
            .map(|item| Ok(element.read_slice(Some(item), options)?.unwrap_or(Value::Null)))
            .collect::<crate::Result<Vec<_>>>()?;
        path::set(target, &self.target_path, Some(Value::Array(list)));
        Ok(())
    }

    fn write(&self, target: &Value, source: &mut Value) -> crate::Result<()> {
        let Some(Value::Array(items)) = path::get(target, &self.target_path) else {
            return Ok(());
        };
        let element = self.element.resolve()?;
        let list = items
            .iter()
            .map(|item| Ok(element.write_slice(Some(item))?.unwrap_or(Value::Null)))
            .collect::<crate::Result<Vec<_>>>()?;
        path::set(source, &self.source_path, Some(Value::Array(list)));
        Ok(())
    }

    fn source_list(&self) -> crate::Result<Vec<String>> {
        let element = self.element.resolve()?;
        let mut list: Vec<String> = element
            .source_list()?
            .iter()
            .map(|p| path::join(Some(&self.source_path), p))
            .collect();
        list.push(path::join(Some(&self.source_path), ARRAY_MARKER));
        Ok(list)
    }
}

impl ChildMapper {
    fn read(&self, source: &Value, target: &mut Value, options: ReadOptions) -> crate::Result<()> {
        let slice = match &self.root_source_path {
            Some(root) => path::get(source, root),
            None => Some(source),
        };
        let value = self.mapper.resolve()?.read_slice(slice, options)?;
        path::set(target, &self.target_path, value);
        Ok(())
    }

    fn write(&self, target: &Value, source: &mut Value) -> crate::Result<()> {
        let slice = path::get(target, &self.target_path);
        if let Some(value) = self.mapper.resolve()?.write_slice(slice)? {
            path::merge(source, self.root_source_path.as_deref(), value);
        }
        Ok(())
    }

    fn source_list(&self) -> crate::Result<Vec<String>> {
        let root = self.root_source_path.as_deref();
        Ok(self
            .mapper
            .resolve()?
            .source_list()?
            .iter()
            .map(|p| path::join(root, p))
            .collect())
    }
}

fn resolve_same(sources: &Sources, target_path: &str) -> Sources {
    let resolve = |p: &str| {
        if p == SAME_PATH {
            target_path.to_string()
        } else {
            p.to_string()
        }
    };
    match sources {
        Sources::Single(p) => Sources::Single(resolve(p)),
        Sources::Many(paths) => Sources::Many(paths.iter().map(|p| resolve(p)).collect()),
    }
}

fn nested_mapper(
    config: &PathConfig,
    root: Option<String>,
    strict: bool,
) -> crate::Result<NestedMapper> {
    if let Some(deferred) = &config.mapper {
        return Ok(NestedMapper::Deferred(deferred.clone()));
    }
    let nested = MapperConfig::from_nested(config, root, strict);
    Ok(NestedMapper::Inline(Arc::new(GraphMapper::new(nested)?)))
}

fn conflict(strict: bool, target_path: &str, reason: &str) -> crate::Result<()> {
    if strict {
        return Err(crate::Error::conflict(target_path, reason));
    }
    warn!(target_path, reason, "Resolving conflicting mapper configuration");
    Ok(())
}

/// An empty object to build targets and sources into.
pub(crate) fn empty_tree() -> Value {
    Value::Object(Map::new())
}
