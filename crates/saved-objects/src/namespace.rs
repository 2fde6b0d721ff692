//! Namespace identifiers.
//!
//! Namespaces partition the identity space of saved objects. A document
//! written without a namespace lives in the default namespace, whose string
//! form is [`DEFAULT_NAMESPACE_STRING`]. Internally the default namespace is
//! represented by *absence* (`None`), which is also how it is stored: single
//! namespace documents in the default namespace carry no namespace prefix in
//! their raw id.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// String form of the default namespace.
pub const DEFAULT_NAMESPACE_STRING: &str = "default";

/// Wildcard namespace, meaning "every namespace".
pub const ALL_NAMESPACES_STRING: &str = "*";

/// A validated, non-default namespace identifier.
///
/// # Examples
///
/// ```
/// use helios_saved_objects::namespace::Namespace;
///
/// let ns = Namespace::new("marketing").unwrap();
/// assert_eq!(ns.as_str(), "marketing");
///
/// // The default namespace is represented by absence
/// assert!(Namespace::from_option_str(Some("default")).unwrap().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// Creates a namespace, rejecting empty strings, `"default"`, `"*"` and
    /// strings containing `:` (the raw id separator).
    pub fn new(namespace: impl Into<String>) -> Result<Self, RequestError> {
        let namespace = namespace.into();
        let invalid = |message: &str| RequestError::InvalidNamespace {
            namespace: namespace.clone(),
            message: message.to_string(),
        };

        if namespace.is_empty() {
            return Err(invalid("namespace cannot be an empty string"));
        }
        if namespace == DEFAULT_NAMESPACE_STRING {
            return Err(invalid("the default namespace is represented by absence"));
        }
        if namespace == ALL_NAMESPACES_STRING {
            return Err(invalid("the wildcard namespace cannot identify a document"));
        }
        if namespace.contains(':') {
            return Err(invalid("namespace cannot contain ':'"));
        }
        Ok(Self(namespace))
    }

    /// Converts a caller namespace string into an id, mapping `"default"` to `None`.
    pub fn from_option_str(namespace: Option<&str>) -> Result<Option<Self>, RequestError> {
        match namespace {
            None | Some(DEFAULT_NAMESPACE_STRING) => Ok(None),
            Some(ns) => Self::new(ns).map(Some),
        }
    }

    /// Returns the namespace as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Converts an optional namespace id to its string form (`None` → `"default"`).
pub fn namespace_id_to_string(namespace: Option<&Namespace>) -> String {
    namespace
        .map(|ns| ns.as_str().to_string())
        .unwrap_or_else(|| DEFAULT_NAMESPACE_STRING.to_string())
}

/// Returns `true` if the caller asked for the wildcard namespace.
pub fn is_all_namespaces(namespace: Option<&str>) -> bool {
    namespace == Some(ALL_NAMESPACES_STRING)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_namespace() {
        let ns = Namespace::new("space-a").unwrap();
        assert_eq!(ns.as_str(), "space-a");
        assert_eq!(ns.to_string(), "space-a");
    }

    #[test]
    fn test_rejects_reserved_values() {
        assert!(Namespace::new("").is_err());
        assert!(Namespace::new("default").is_err());
        assert!(Namespace::new("*").is_err());
        assert!(Namespace::new("a:b").is_err());
    }

    #[test]
    fn test_from_option_str() {
        assert_eq!(Namespace::from_option_str(None).unwrap(), None);
        assert_eq!(Namespace::from_option_str(Some("default")).unwrap(), None);
        assert_eq!(
            Namespace::from_option_str(Some("ops")).unwrap(),
            Some(Namespace::new("ops").unwrap())
        );
        assert!(Namespace::from_option_str(Some("")).is_err());
    }

    #[test]
    fn test_namespace_id_to_string() {
        assert_eq!(namespace_id_to_string(None), "default");
        let ns = Namespace::new("ops").unwrap();
        assert_eq!(namespace_id_to_string(Some(&ns)), "ops");
    }

    #[test]
    fn test_is_all_namespaces() {
        assert!(is_all_namespaces(Some("*")));
        assert!(!is_all_namespaces(Some("default")));
        assert!(!is_all_namespaces(None));
    }
}
