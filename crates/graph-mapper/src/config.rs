//! Mapper configuration
//!
//! A [`MapperConfig`] describes one graph mapper: an optional root source
//! path and an ordered list of target paths, each paired with a
//! [`PathConfig`]. Configurations are plain values: building a mapper never
//! mutates them, and [`MapperConfig::merge`] returns a new configuration.

use crate::graph::GraphMapper;
use crate::pipeline::{TransformError, TransformFn};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Source path marker meaning "same path as the target".
pub const SAME_PATH: &str = "=";

/// One source path, or an ordered list of source paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sources {
    Single(String),
    Many(Vec<String>),
}

impl Sources {
    /// All configured paths, in order.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Sources::Single(path) => vec![path.as_str()],
            Sources::Many(paths) => paths.iter().map(String::as_str).collect(),
        }
    }

    /// The first configured path, if any.
    pub fn first(&self) -> Option<&str> {
        match self {
            Sources::Single(path) => Some(path),
            Sources::Many(paths) => paths.first().map(String::as_str),
        }
    }

    pub fn is_many(&self) -> bool {
        matches!(self, Sources::Many(_))
    }
}

impl From<&str> for Sources {
    fn from(path: &str) -> Self {
        Sources::Single(path.to_string())
    }
}

impl From<String> for Sources {
    fn from(path: String) -> Self {
        Sources::Single(path)
    }
}

impl From<Vec<String>> for Sources {
    fn from(paths: Vec<String>) -> Self {
        Sources::Many(paths)
    }
}

impl From<Vec<&str>> for Sources {
    fn from(paths: Vec<&str>) -> Self {
        Sources::Many(paths.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Sources {
    fn from(paths: [&str; N]) -> Self {
        Sources::Many(paths.into_iter().map(str::to_string).collect())
    }
}

type FinalizeInner = dyn Fn(Value) -> std::result::Result<Value, TransformError> + Send + Sync;

/// Post-processing applied to every target a mapper builds
#[derive(Clone)]
pub struct Finalize(Arc<FinalizeInner>);

impl Finalize {
    pub fn new(
        func: impl Fn(Value) -> std::result::Result<Value, TransformError> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(func))
    }

    /// Apply the function to a built target.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Finalize`] wrapping the function's error.
    pub fn apply(&self, target: Value) -> crate::Result<Value> {
        (self.0)(target).map_err(crate::Error::Finalize)
    }
}

impl fmt::Debug for Finalize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Finalize")
    }
}

type Resolver = dyn Fn() -> crate::Result<Arc<GraphMapper>> + Send + Sync;

enum DeferredState {
    Pending(Box<Resolver>),
    Resolved(Arc<GraphMapper>),
}

/// A lazily resolved reference to another mapper
///
/// The resolver runs until it succeeds once, then is dropped; clones share
/// the cached mapper. A resolver must not resolve the reference that owns it.
#[derive(Clone)]
pub struct DeferredMapper(Arc<Mutex<DeferredState>>);

impl DeferredMapper {
    pub fn new(
        resolver: impl Fn() -> crate::Result<Arc<GraphMapper>> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(Mutex::new(DeferredState::Pending(Box::new(resolver)))))
    }

    /// A reference to an already built mapper.
    pub fn resolved(mapper: Arc<GraphMapper>) -> Self {
        Self(Arc::new(Mutex::new(DeferredState::Resolved(mapper))))
    }

    /// Resolve the referenced mapper, running the resolver on first use.
    ///
    /// # Errors
    ///
    /// Returns the resolver's error; a failed resolution is retried on the
    /// next call.
    pub fn resolve(&self) -> crate::Result<Arc<GraphMapper>> {
        let mut state = self.state();
        let mapper = match &*state {
            DeferredState::Resolved(mapper) => return Ok(Arc::clone(mapper)),
            DeferredState::Pending(resolver) => resolver()?,
        };
        *state = DeferredState::Resolved(Arc::clone(&mapper));
        Ok(mapper)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.state(), DeferredState::Resolved(_))
    }

    fn state(&self) -> MutexGuard<'_, DeferredState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for DeferredMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredMapper")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Configuration for a single target path
///
/// The fields present decide which kind of path mapper is compiled:
/// `to` or `mapper` make a nested mapper, `array` plus a nested mapper makes
/// a sequence mapper, anything else is a property mapping.
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    pub from: Option<Sources>,
    pub read: Vec<TransformFn>,
    pub write: Vec<TransformFn>,
    pub to: Option<Vec<(String, PathConfig)>>,
    pub array: bool,
    pub mapper: Option<DeferredMapper>,
    pub default_value: Option<Value>,
    pub finalize: Option<Finalize>,
    pub strict: Option<bool>,
}

impl PathConfig {
    /// Map the target path to a single source path.
    pub fn source(path: impl Into<String>) -> Self {
        Self {
            from: Some(Sources::Single(path.into())),
            ..Self::default()
        }
    }

    /// Map the target path to the identical source path.
    #[must_use]
    pub fn same() -> Self {
        Self::source(SAME_PATH)
    }

    /// Map the target path to several source paths.
    pub fn sources<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            from: Some(Sources::Many(paths.into_iter().map(Into::into).collect())),
            ..Self::default()
        }
    }

    /// Map the target path to a nested mapper built from `config`.
    pub fn nested(config: MapperConfig) -> Self {
        Self {
            from: config.from.map(Sources::Single),
            to: Some(config.to),
            default_value: config.default_value,
            finalize: config.finalize,
            strict: config.strict,
            ..Self::default()
        }
    }

    /// Map the sequence at `from` element by element with `element`.
    ///
    /// Paths in `element` are relative to each item; its root is not used.
    pub fn array(from: impl Into<String>, element: MapperConfig) -> Self {
        Self {
            from: Some(Sources::Single(from.into())),
            array: true,
            to: Some(element.to),
            default_value: element.default_value,
            finalize: element.finalize,
            strict: element.strict,
            ..Self::default()
        }
    }

    /// Delegate the target path to a lazily resolved mapper.
    pub fn deferred(mapper: DeferredMapper) -> Self {
        Self {
            mapper: Some(mapper),
            ..Self::default()
        }
    }

    /// Turn this entry into a sequence mapping of the items at `from`.
    #[must_use]
    pub fn over_array(mut self, from: impl Into<String>) -> Self {
        self.from = Some(Sources::Single(from.into()));
        self.array = true;
        self
    }

    /// Append a read step.
    #[must_use]
    pub fn read(mut self, step: TransformFn) -> Self {
        self.read.push(step);
        self
    }

    /// Append a write step.
    #[must_use]
    pub fn write(mut self, step: TransformFn) -> Self {
        self.write.push(step);
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    /// Whether this entry delegates to a nested mapper.
    pub fn is_nested(&self) -> bool {
        self.to.is_some() || self.mapper.is_some()
    }

    /// Whether this entry is nothing but a single source path.
    pub fn is_source_only(&self) -> bool {
        matches!(self.from, Some(Sources::Single(_)))
            && self.read.is_empty()
            && self.write.is_empty()
            && self.to.is_none()
            && !self.array
            && self.mapper.is_none()
            && self.default_value.is_none()
            && self.finalize.is_none()
            && self.strict.is_none()
    }

    /// Deep-merge `overrides` onto this configuration.
    ///
    /// Fields set in `overrides` win; nested `to` entries merge key by key.
    /// A bare source path on either side is not merged: `overrides` replaces
    /// the entry whole.
    #[must_use]
    pub fn merge(&self, overrides: &PathConfig) -> PathConfig {
        if self.is_source_only() || overrides.is_source_only() {
            return overrides.clone();
        }
        PathConfig {
            from: overrides.from.clone().or_else(|| self.from.clone()),
            read: pick_steps(&self.read, &overrides.read),
            write: pick_steps(&self.write, &overrides.write),
            to: match (&self.to, &overrides.to) {
                (Some(base), Some(over)) => Some(merge_entries(base, over)),
                (base, over) => over.clone().or_else(|| base.clone()),
            },
            array: self.array || overrides.array,
            mapper: overrides.mapper.clone().or_else(|| self.mapper.clone()),
            default_value: overrides
                .default_value
                .clone()
                .or_else(|| self.default_value.clone()),
            finalize: overrides.finalize.clone().or_else(|| self.finalize.clone()),
            strict: overrides.strict.or(self.strict),
        }
    }
}

fn pick_steps(base: &[TransformFn], overrides: &[TransformFn]) -> Vec<TransformFn> {
    if overrides.is_empty() {
        base.to_vec()
    } else {
        overrides.to_vec()
    }
}

fn merge_entries(
    base: &[(String, PathConfig)],
    overrides: &[(String, PathConfig)],
) -> Vec<(String, PathConfig)> {
    let mut merged = base.to_vec();
    for (target, over) in overrides {
        upsert(&mut merged, target, |existing| match existing {
            Some(existing) => existing.merge(over),
            None => over.clone(),
        });
    }
    merged
}

fn upsert(
    entries: &mut Vec<(String, PathConfig)>,
    target: &str,
    build: impl FnOnce(Option<&PathConfig>) -> PathConfig,
) {
    match entries.iter_mut().find(|(key, _)| key == target) {
        Some((_, existing)) => *existing = build(Some(&*existing)),
        None => entries.push((target.to_string(), build(None))),
    }
}

impl From<&str> for PathConfig {
    fn from(path: &str) -> Self {
        PathConfig::source(path)
    }
}

impl From<String> for PathConfig {
    fn from(path: String) -> Self {
        PathConfig::source(path)
    }
}

impl From<MapperConfig> for PathConfig {
    fn from(config: MapperConfig) -> Self {
        PathConfig::nested(config)
    }
}

/// Configuration for a whole graph mapper
#[derive(Debug, Clone, Default)]
pub struct MapperConfig {
    /// Prefix applied to every source path below this mapper.
    pub from: Option<String>,
    /// Target path entries, in the order they are mapped.
    pub to: Vec<(String, PathConfig)>,
    /// Returned by a read with `prevent_empty_target` when every field is empty.
    pub default_value: Option<Value>,
    pub finalize: Option<Finalize>,
    /// Compile-time validation of conflicting entries; enabled when unset.
    pub strict: Option<bool>,
}

impl MapperConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root source path.
    #[must_use]
    pub fn root(mut self, path: impl Into<String>) -> Self {
        self.from = Some(path.into());
        self
    }

    /// Add or replace the entry for `target`.
    ///
    /// A replaced entry keeps its original position.
    #[must_use]
    pub fn map(mut self, target: impl Into<String>, config: impl Into<PathConfig>) -> Self {
        let target = target.into();
        let config = config.into();
        upsert(&mut self.to, &target, |_| config);
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    #[must_use]
    pub fn finalize(mut self, finalize: Finalize) -> Self {
        self.finalize = Some(finalize);
        self
    }

    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict.unwrap_or(true)
    }

    /// The entry configured for exactly `target`.
    pub fn get(&self, target: &str) -> Option<&PathConfig> {
        self.to
            .iter()
            .find(|(key, _)| key == target)
            .map(|(_, config)| config)
    }

    /// Deep-merge `overrides` onto this configuration.
    #[must_use]
    pub fn merge(&self, overrides: &MapperConfig) -> MapperConfig {
        MapperConfig {
            from: overrides.from.clone().or_else(|| self.from.clone()),
            to: merge_entries(&self.to, &overrides.to),
            default_value: overrides
                .default_value
                .clone()
                .or_else(|| self.default_value.clone()),
            finalize: overrides.finalize.clone().or_else(|| self.finalize.clone()),
            strict: overrides.strict.or(self.strict),
        }
    }

    /// The nested mapper configuration held by a path entry.
    pub(crate) fn from_nested(config: &PathConfig, root: Option<String>, strict: bool) -> Self {
        MapperConfig {
            from: root,
            to: config.to.clone().unwrap_or_default(),
            default_value: config.default_value.clone(),
            finalize: config.finalize.clone(),
            strict: Some(config.strict.unwrap_or(strict)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_keeps_insertion_order_and_replaces_in_place() {
        let config = MapperConfig::new()
            .map("b", "B")
            .map("a", "A")
            .map("b", "OtherB");

        let keys: Vec<&str> = config.to.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(
            config.get("b").and_then(|c| c.from.clone()),
            Some(Sources::from("OtherB"))
        );
    }

    #[test]
    fn test_sources_conversions() {
        assert_eq!(Sources::from("A").paths(), vec!["A"]);
        let many = Sources::from(["A", "B"]);
        assert!(many.is_many());
        assert_eq!(many.first(), Some("A"));
        assert_eq!(many.paths(), vec!["A", "B"]);
    }

    #[test]
    fn test_nested_from_mapper_config() {
        let nested = PathConfig::from(
            MapperConfig::new()
                .root("Address")
                .map("city", "City")
                .default_value(Value::Null),
        );
        assert!(nested.is_nested());
        assert_eq!(nested.from, Some(Sources::from("Address")));
        assert_eq!(nested.default_value, Some(Value::Null));
        assert_eq!(nested.to.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_merge_overrides_root_and_keeps_entries() {
        let base = MapperConfig::new()
            .root("Address")
            .map("street", "Street1")
            .map("city", "City");
        let merged = base.merge(&MapperConfig::new().root("MainAddress"));

        assert_eq!(merged.from.as_deref(), Some("MainAddress"));
        assert_eq!(merged.to.len(), 2);
        assert_eq!(base.from.as_deref(), Some("Address"));
    }

    #[test]
    fn test_merge_recurses_into_nested_entries() {
        let base = MapperConfig::new().map(
            "address",
            MapperConfig::new()
                .root("Address")
                .map("city", "City")
                .map("zip", "Zip"),
        );
        let overrides = MapperConfig::new().map(
            "address",
            MapperConfig::new().map("city", "Town").map("country", "Country"),
        );
        let merged = base.merge(&overrides);

        let address = merged.get("address").expect("address entry");
        assert_eq!(address.from, Some(Sources::from("Address")));
        let to = address.to.as_ref().expect("nested entries");
        let keys: Vec<&str> = to.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["city", "zip", "country"]);
        assert_eq!(to[0].1.from, Some(Sources::from("Town")));
    }

    #[test]
    fn test_merge_default_value_and_strict() {
        let base = MapperConfig::new().default_value(json!("base")).strict(false);
        let merged = base.merge(&MapperConfig::new());
        assert_eq!(merged.default_value, Some(json!("base")));
        assert!(!merged.is_strict());

        let merged = base.merge(&MapperConfig::new().strict(true));
        assert!(merged.is_strict());
        assert!(MapperConfig::new().is_strict());
    }

    #[test]
    fn test_array_ignores_element_root() {
        let config = PathConfig::array(
            "ThingList",
            MapperConfig::new().root("ignored").map("id", "ID"),
        );
        assert!(config.array);
        assert_eq!(config.from, Some(Sources::from("ThingList")));
    }

    #[test]
    fn test_merge_replaces_entries_that_change_shape() {
        let nested = PathConfig::from(MapperConfig::new().root("Address").map("city", "City"));
        let text = PathConfig::source("AddressText");

        let merged = nested.merge(&text);
        assert!(merged.is_source_only());
        assert_eq!(merged.from, Some(Sources::from("AddressText")));

        let merged = text.merge(&nested);
        assert!(merged.is_nested());
        assert_eq!(merged.from, Some(Sources::from("Address")));

        let unrooted = PathConfig::from(MapperConfig::new().map("city", "City"));
        assert_eq!(text.merge(&unrooted).from, None);
    }

    #[test]
    fn test_source_only_entries() {
        assert!(PathConfig::source("A").is_source_only());
        assert!(PathConfig::same().is_source_only());
        assert!(!PathConfig::sources(["A", "B"]).is_source_only());
        assert!(!PathConfig::source("A").default_value(Value::Null).is_source_only());
        assert!(!PathConfig::from(MapperConfig::new().map("b", "B")).is_source_only());
    }
}
