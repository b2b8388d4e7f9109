//! Named mapper registry
//!
//! Lets mappers refer to each other by name. A reference created with
//! [`MapperRegistry::use_mapper`] is resolved on first use, so mappers may be
//! defined in any order.
//!
//! An unresolved reference keeps the registry's mappers alive; once resolved
//! it holds only the mapper it points to.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::{DeferredMapper, MapperConfig, PathConfig};
use crate::graph::GraphMapper;
use crate::loader::{ConfigLoader, TransformCatalog};
use crate::{Error, Result};

type Mappers = DashMap<String, Arc<GraphMapper>>;

/// A shared, cloneable set of named mappers
///
/// Clones refer to the same underlying set.
#[derive(Clone, Default)]
pub struct MapperRegistry {
    mappers: Arc<Mappers>,
}

impl MapperRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `config` and store it under `name`, replacing any previous
    /// mapper of that name.
    ///
    /// # Errors
    ///
    /// Returns any error from compiling `config`.
    pub fn define(
        &self,
        name: impl Into<String>,
        config: MapperConfig,
    ) -> Result<Arc<GraphMapper>> {
        let name = name.into();
        let mapper = Arc::new(GraphMapper::new(config)?);
        debug!(name = %name, "Defined mapper");
        self.mappers.insert(name, Arc::clone(&mapper));
        Ok(mapper)
    }

    /// Load a YAML mapper document and store it under `name`.
    ///
    /// `use` entries in the document resolve through this registry.
    ///
    /// # Errors
    ///
    /// Returns document parse errors, unknown transform names or compile
    /// errors.
    pub fn define_yaml(
        &self,
        name: impl Into<String>,
        yaml: &str,
        catalog: &TransformCatalog,
    ) -> Result<Arc<GraphMapper>> {
        let config = ConfigLoader::new(catalog).with_registry(self).from_yaml(yaml)?;
        self.define(name, config)
    }

    /// The mapper stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMapperName`] when nothing is stored under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<GraphMapper>> {
        lookup(&self.mappers, name)
    }

    /// A path entry delegating to the mapper named `name`.
    ///
    /// The name is looked up when the entry is first read, written or
    /// listed, not when it is created.
    pub fn use_mapper(&self, name: impl Into<String>) -> PathConfig {
        self.deferred(name.into(), None)
    }

    /// Like [`MapperRegistry::use_mapper`], extending the named mapper with
    /// `overrides` once it is resolved.
    pub fn use_mapper_with(&self, name: impl Into<String>, overrides: MapperConfig) -> PathConfig {
        self.deferred(name.into(), Some(overrides))
    }

    fn deferred(&self, name: String, overrides: Option<MapperConfig>) -> PathConfig {
        let mappers = Arc::clone(&self.mappers);
        PathConfig::deferred(DeferredMapper::new(move || {
            let mapper = lookup(&mappers, &name)?;
            debug!(name = %name, extended = overrides.is_some(), "Resolved deferred mapper");
            match &overrides {
                Some(overrides) => mapper.extend(overrides).map(Arc::new),
                None => Ok(mapper),
            }
        }))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.mappers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }

    /// Names of the stored mappers, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .mappers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

fn lookup(mappers: &Mappers, name: &str) -> Result<Arc<GraphMapper>> {
    mappers
        .get(name)
        .map(|entry| Arc::clone(entry.value()))
        .ok_or_else(|| Error::unknown_mapper_name(name))
}

impl std::fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn address() -> MapperConfig {
        MapperConfig::new()
            .root("Address")
            .map("street", "Street1")
            .map("city", "City")
    }

    #[test]
    fn test_define_and_get() {
        let registry = MapperRegistry::new();
        assert!(registry.is_empty());

        registry.define("address", address()).unwrap();
        assert!(registry.contains("address"));
        assert_eq!(registry.len(), 1);

        let mapper = registry.get("address").unwrap();
        assert_eq!(
            mapper.read(&json!({"Address": {"City": "Gotham"}})).unwrap(),
            Some(json!({"city": "Gotham"}))
        );
    }

    #[test]
    fn test_unknown_name() {
        let registry = MapperRegistry::new();
        let err = registry.get("missing").unwrap_err();
        assert_eq!(err.to_string(), "No mapper defined for 'missing'");
    }

    #[test]
    fn test_define_replaces_silently() {
        let registry = MapperRegistry::new();
        registry.define("address", address()).unwrap();
        registry
            .define("address", MapperConfig::new().map("zip", "Zip"))
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("address").unwrap().target_paths().collect::<Vec<_>>(),
            vec!["zip"]
        );
    }

    #[test]
    fn test_forward_reference_resolves_on_first_use() {
        let registry = MapperRegistry::new();
        let person = registry
            .define(
                "person",
                MapperConfig::new()
                    .root("Person")
                    .map("address", registry.use_mapper("address")),
            )
            .unwrap();
        registry.define("address", address()).unwrap();

        assert_eq!(
            person
                .read(&json!({"Person": {"Address": {"Street1": "1007 Mountain Drive"}}}))
                .unwrap(),
            Some(json!({"address": {"street": "1007 Mountain Drive"}}))
        );
    }

    #[test]
    fn test_missing_reference_fails_on_use() {
        let registry = MapperRegistry::new();
        let person = registry
            .define("person", MapperConfig::new().map("address", registry.use_mapper("nowhere")))
            .unwrap();
        assert!(matches!(
            person.read(&json!({})),
            Err(Error::UnknownMapperName { name }) if name == "nowhere"
        ));
    }

    #[test]
    fn test_use_mapper_with_overrides_root() {
        let registry = MapperRegistry::new();
        registry
            .define(
                "person",
                MapperConfig::new().root("Person").map(
                    "address",
                    registry.use_mapper_with("address", MapperConfig::new().root("MainAddress")),
                ),
            )
            .unwrap();
        registry.define("address", address()).unwrap();

        let source = json!({"Person": {"MainAddress": {"Street1": "s", "City": "c"}}});
        let target = json!({"address": {"street": "s", "city": "c"}});
        let person = registry.get("person").unwrap();
        assert_eq!(person.read(&source).unwrap(), Some(target.clone()));
        assert_eq!(person.write(&target).unwrap(), Some(source));
        assert_eq!(
            registry.get("address").unwrap().root_source_path(),
            Some("Address")
        );
    }

    #[test]
    fn test_resolution_is_memoized() {
        let registry = MapperRegistry::new();
        registry.define("address", address()).unwrap();
        let person = registry
            .define("person", MapperConfig::new().map("address", registry.use_mapper("address")))
            .unwrap();

        let source = json!({"Address": {"City": "Gotham"}});
        let first = person.read(&source).unwrap();
        registry
            .define("address", MapperConfig::new().root("Address").map("town", "City"))
            .unwrap();
        assert_eq!(person.read(&source).unwrap(), first);
    }

    #[test]
    fn test_clones_share_mappers() {
        let registry = MapperRegistry::new();
        let handle = registry.clone();
        handle.define("b", address()).unwrap();
        handle.define("a", address()).unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_references_outlive_the_registry_handle() {
        let person = {
            let registry = MapperRegistry::new();
            let person = registry
                .define(
                    "person",
                    MapperConfig::new().map("address", registry.use_mapper("address")),
                )
                .unwrap();
            registry.define("address", address()).unwrap();
            person
        };

        assert_eq!(
            person.read(&json!({"Address": {"City": "Gotham"}})).unwrap(),
            Some(json!({"address": {"city": "Gotham"}}))
        );
    }

    #[test]
    fn test_resolved_reference_releases_the_registry() {
        let registry = MapperRegistry::new();
        registry.define("address", address()).unwrap();
        let entry = registry.use_mapper("address");
        assert_eq!(Arc::strong_count(&registry.mappers), 2);

        let deferred = entry.mapper.clone().unwrap();
        deferred.resolve().unwrap();
        assert!(deferred.is_resolved());
        assert_eq!(Arc::strong_count(&registry.mappers), 1);
    }
}
