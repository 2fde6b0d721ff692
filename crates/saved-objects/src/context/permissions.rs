//! Caller permission types.
//!
//! This module defines the permission model for repository calls: which
//! saved object types a caller may see, and which operations it may run.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Operations that can be performed on saved objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create new objects (single or bulk).
    Create,
    /// Read existing objects (single or bulk).
    Get,
    /// Update existing objects.
    Update,
    /// Delete objects (single or bulk).
    Delete,
}

impl Operation {
    /// Returns `true` for operations that write to the store.
    pub fn is_mutating(self) -> bool {
        !matches!(self, Operation::Get)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Get => write!(f, "get"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// Permissions granted to a caller.
///
/// A type outside `allowed_types` is invisible to the caller: reads and
/// deletes report it as not found, creates reject it as unsupported. An
/// operation outside `allowed_operations` is forbidden.
///
/// # Examples
///
/// ```
/// use helios_saved_objects::context::{Operation, TypePermissions};
///
/// let full = TypePermissions::full_access();
/// assert!(full.can_perform(Operation::Create, "dashboard"));
///
/// let read_only = TypePermissions::read_only();
/// assert!(read_only.can_perform(Operation::Get, "dashboard"));
/// assert!(!read_only.can_perform(Operation::Delete, "dashboard"));
///
/// let custom = TypePermissions::builder()
///     .allow_operations(vec![Operation::Get, Operation::Update])
///     .allow_types(vec!["dashboard", "visualization"])
///     .build();
/// assert!(!custom.can_access_type("config"));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypePermissions {
    /// Allowed operations. If None, all operations are allowed.
    allowed_operations: Option<HashSet<Operation>>,

    /// Allowed types. If None, every type the repository exposes is allowed.
    allowed_types: Option<HashSet<String>>,
}

impl TypePermissions {
    /// Creates permissions with full access to all operations and types.
    pub fn full_access() -> Self {
        Self::default()
    }

    /// Creates permissions that only allow reads.
    pub fn read_only() -> Self {
        Self::builder().allow_operations(vec![Operation::Get]).build()
    }

    /// Creates a builder for custom permissions.
    pub fn builder() -> TypePermissionsBuilder {
        TypePermissionsBuilder::default()
    }

    /// Returns `true` if the caller may see objects of `type_name`.
    pub fn can_access_type(&self, type_name: &str) -> bool {
        self.allowed_types
            .as_ref()
            .is_none_or(|types| types.contains(type_name))
    }

    /// Returns `true` if the caller may run `operation` at all.
    pub fn can_perform_operation(&self, operation: Operation) -> bool {
        self.allowed_operations
            .as_ref()
            .is_none_or(|ops| ops.contains(&operation))
    }

    /// Returns `true` if `operation` is permitted on `type_name`.
    pub fn can_perform(&self, operation: Operation, type_name: &str) -> bool {
        self.can_perform_operation(operation) && self.can_access_type(type_name)
    }

    /// Returns the set of allowed operations, or None if all are allowed.
    pub fn allowed_operations(&self) -> Option<&HashSet<Operation>> {
        self.allowed_operations.as_ref()
    }

    /// Returns the set of allowed types, or None if all are allowed.
    pub fn allowed_types(&self) -> Option<&HashSet<String>> {
        self.allowed_types.as_ref()
    }
}

/// Builder for custom caller permissions.
#[derive(Debug, Default)]
pub struct TypePermissionsBuilder {
    allowed_operations: Option<HashSet<Operation>>,
    allowed_types: Option<HashSet<String>>,
}

impl TypePermissionsBuilder {
    /// Sets the allowed operations.
    pub fn allow_operations(mut self, operations: Vec<Operation>) -> Self {
        self.allowed_operations = Some(operations.into_iter().collect());
        self
    }

    /// Sets the allowed types.
    pub fn allow_types(mut self, types: Vec<&str>) -> Self {
        self.allowed_types = Some(types.into_iter().map(String::from).collect());
        self
    }

    /// Builds the permissions.
    pub fn build(self) -> TypePermissions {
        TypePermissions {
            allowed_operations: self.allowed_operations,
            allowed_types: self.allowed_types,
        }
    }
}
