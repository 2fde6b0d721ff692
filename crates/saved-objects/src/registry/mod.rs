//! The saved object type registry.
//!
//! A [`TypeRegistry`] is built once at startup from [`SavedObjectType`]
//! definitions and is immutable afterwards. Everything that needs to know how
//! a type behaves (serializer, migration engine, repository) shares the same
//! registry through an `Arc`.
//!
//! # Examples
//!
//! ```
//! use helios_saved_objects::registry::{NamespaceType, SavedObjectType, TypeRegistry};
//!
//! let registry = TypeRegistry::builder()
//!     .register(SavedObjectType::new("dashboard", NamespaceType::Multiple))
//!     .register(SavedObjectType::new("config", NamespaceType::Single))
//!     .register(SavedObjectType::new("task", NamespaceType::Agnostic).hidden(true))
//!     .build()
//!     .unwrap();
//!
//! assert!(registry.is_multi_namespace("dashboard"));
//! assert!(registry.is_single_namespace("config"));
//! assert_eq!(registry.visible_types(), vec!["config", "dashboard"]);
//! ```

mod saved_object_type;

use std::collections::BTreeMap;

pub use saved_object_type::{AttributeValidator, NamespaceType, SavedObjectType};

use crate::error::ConfigError;

/// The immutable set of registered saved object types.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, SavedObjectType>,
}

impl TypeRegistry {
    /// Starts building a registry.
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// Returns the type definition for `type_name`.
    pub fn get_type(&self, type_name: &str) -> Option<&SavedObjectType> {
        self.types.get(type_name)
    }

    /// Returns `true` if `type_name` is registered.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Iterates all registered types in name order.
    pub fn all_types(&self) -> impl Iterator<Item = &SavedObjectType> {
        self.types.values()
    }

    /// Returns the names of all non-hidden types in name order.
    pub fn visible_types(&self) -> Vec<&str> {
        self.types
            .values()
            .filter(|t| !t.is_hidden())
            .map(SavedObjectType::name)
            .collect()
    }

    /// Returns `true` if the type is registered and hidden.
    pub fn is_hidden(&self, type_name: &str) -> bool {
        self.get_type(type_name).is_some_and(SavedObjectType::is_hidden)
    }

    /// Returns the namespace type of a registered type.
    pub fn namespace_type(&self, type_name: &str) -> Option<NamespaceType> {
        self.get_type(type_name).map(SavedObjectType::namespace_type)
    }

    /// Returns `true` for namespace-agnostic types.
    pub fn is_namespace_agnostic(&self, type_name: &str) -> bool {
        self.namespace_type(type_name) == Some(NamespaceType::Agnostic)
    }

    /// Returns `true` for multi-namespace types (shareable or isolated).
    pub fn is_multi_namespace(&self, type_name: &str) -> bool {
        self.namespace_type(type_name)
            .is_some_and(NamespaceType::is_multi_namespace)
    }

    /// Returns `true` for types whose objects can be shared across namespaces.
    pub fn is_shareable(&self, type_name: &str) -> bool {
        self.namespace_type(type_name) == Some(NamespaceType::Multiple)
    }

    /// Returns `true` for single-namespace types.
    ///
    /// Unregistered types are treated as single-namespace.
    pub fn is_single_namespace(&self, type_name: &str) -> bool {
        !self.is_namespace_agnostic(type_name) && !self.is_multi_namespace(type_name)
    }

    /// Returns the index that stores `type_name`, falling back to `default_index`.
    pub fn index_for_type<'a>(&'a self, type_name: &str, default_index: &'a str) -> &'a str {
        self.get_type(type_name)
            .and_then(SavedObjectType::index_pattern)
            .unwrap_or(default_index)
    }
}

/// Builder for [`TypeRegistry`].
#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    types: Vec<SavedObjectType>,
}

impl TypeRegistryBuilder {
    /// Adds a type.
    pub fn register(mut self, saved_object_type: SavedObjectType) -> Self {
        self.types.push(saved_object_type);
        self
    }

    /// Validates and freezes the registry.
    ///
    /// Type names must be non-empty, unique and free of `:` (the raw id
    /// separator).
    pub fn build(self) -> Result<TypeRegistry, ConfigError> {
        let mut types = BTreeMap::new();
        for t in self.types {
            let name = t.name().to_string();
            if name.is_empty() || name.contains(':') {
                return Err(ConfigError::InvalidType {
                    type_name: name,
                    message: "type names must be non-empty and cannot contain ':'".to_string(),
                });
            }
            if types.contains_key(&name) {
                return Err(ConfigError::DuplicateType { type_name: name });
            }
            types.insert(name, t);
        }
        Ok(TypeRegistry { types })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::builder()
            .register(SavedObjectType::new("dashboard", NamespaceType::Multiple))
            .register(SavedObjectType::new("secret", NamespaceType::MultipleIsolated).hidden(true))
            .register(SavedObjectType::new("config", NamespaceType::Single))
            .register(
                SavedObjectType::new("space", NamespaceType::Agnostic)
                    .with_index_pattern(".kibana_spaces"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_namespace_predicates() {
        let registry = registry();
        assert!(registry.is_multi_namespace("dashboard"));
        assert!(registry.is_shareable("dashboard"));
        assert!(registry.is_multi_namespace("secret"));
        assert!(!registry.is_shareable("secret"));
        assert!(registry.is_single_namespace("config"));
        assert!(registry.is_namespace_agnostic("space"));
        assert!(!registry.is_single_namespace("space"));
        assert!(registry.is_single_namespace("unknown"));
    }

    #[test]
    fn test_visible_types_excludes_hidden() {
        let registry = registry();
        assert_eq!(registry.visible_types(), vec!["config", "dashboard", "space"]);
        assert!(registry.is_hidden("secret"));
        assert!(!registry.is_hidden("unknown"));
        assert_eq!(registry.all_types().count(), 4);
    }

    #[test]
    fn test_index_for_type() {
        let registry = registry();
        assert_eq!(registry.index_for_type("space", ".kibana"), ".kibana_spaces");
        assert_eq!(registry.index_for_type("config", ".kibana"), ".kibana");
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let result = TypeRegistry::builder()
            .register(SavedObjectType::new("config", NamespaceType::Single))
            .register(SavedObjectType::new("config", NamespaceType::Agnostic))
            .build();
        assert!(matches!(result, Err(ConfigError::DuplicateType { .. })));
    }

    #[test]
    fn test_invalid_type_name_rejected() {
        for name in ["", "a:b"] {
            let result = TypeRegistry::builder()
                .register(SavedObjectType::new(name, NamespaceType::Single))
                .build();
            assert!(matches!(result, Err(ConfigError::InvalidType { .. })));
        }
    }
}
