//! Per-request caller context.

use std::sync::Arc;

use super::permissions::{Operation, TypePermissions};
use crate::error::RequestError;

/// The caller context required for every repository operation.
///
/// A `RequestContext` carries the caller's [`TypePermissions`] and an optional
/// correlation id that is attached to every log span the operation emits.
/// There is no way to call the repository without one.
///
/// ```
/// use helios_saved_objects::context::{Operation, RequestContext, TypePermissions};
///
/// let ctx = RequestContext::new(TypePermissions::read_only())
///     .with_correlation_id("req-42");
///
/// assert_eq!(ctx.correlation_id(), Some("req-42"));
/// assert!(ctx.check_operation(Operation::Get, "dashboard").is_ok());
/// assert!(ctx.check_operation(Operation::Create, "dashboard").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    permissions: Arc<TypePermissions>,
    correlation_id: Option<String>,
    user_id: Option<String>,
}

impl RequestContext {
    /// Creates a context with the given permissions.
    pub fn new(permissions: TypePermissions) -> Self {
        Self {
            permissions: Arc::new(permissions),
            correlation_id: None,
            user_id: None,
        }
    }

    /// Creates an unrestricted context for internal callers.
    pub fn internal() -> Self {
        Self::new(TypePermissions::full_access())
    }

    /// Sets the correlation id used in log spans.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Sets the acting user, for audit logging.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Returns the permissions.
    pub fn permissions(&self) -> &TypePermissions {
        &self.permissions
    }

    /// Returns the correlation id, if set.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns the user id, if set.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Returns `true` if the caller may see `type_name`.
    pub fn can_access_type(&self, type_name: &str) -> bool {
        self.permissions.can_access_type(type_name)
    }

    /// Fails with [`RequestError::OperationNotPermitted`] if the caller may
    /// not run `operation`.
    pub fn check_operation(&self, operation: Operation, type_name: &str) -> Result<(), RequestError> {
        if self.permissions.can_perform_operation(operation) {
            Ok(())
        } else {
            Err(RequestError::OperationNotPermitted {
                operation: operation.to_string(),
                type_name: type_name.to_string(),
            })
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::internal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_context() {
        let ctx = RequestContext::internal();
        assert!(ctx.can_access_type("anything"));
        assert!(ctx.check_operation(Operation::Delete, "anything").is_ok());
        assert!(ctx.correlation_id().is_none());
    }

    #[test]
    fn test_with_ids() {
        let ctx = RequestContext::internal()
            .with_correlation_id("c-1")
            .with_user_id("elastic");
        assert_eq!(ctx.correlation_id(), Some("c-1"));
        assert_eq!(ctx.user_id(), Some("elastic"));
    }

    #[test]
    fn test_check_operation_error() {
        let ctx = RequestContext::new(TypePermissions::read_only());
        let err = ctx.check_operation(Operation::Update, "dashboard").unwrap_err();
        assert!(matches!(
            err,
            RequestError::OperationNotPermitted { ref operation, ref type_name }
                if operation == "update" && type_name == "dashboard"
        ));
    }

    #[test]
    fn test_type_restriction() {
        let ctx = RequestContext::new(
            TypePermissions::builder().allow_types(vec!["dashboard"]).build(),
        );
        assert!(ctx.can_access_type("dashboard"));
        assert!(!ctx.can_access_type("config"));
    }
}
