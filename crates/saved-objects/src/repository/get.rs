//! Get.

use tracing::{debug, instrument};

use super::{GetOptions, SavedObjectsRepository};
use crate::context::{Operation, RequestContext};
use crate::error::{RequestError, SavedObjectsError, StorageResult};
use crate::types::SavedObject;

impl SavedObjectsRepository {
    /// Reads one object, migrated to the current schema.
    ///
    /// A document outside `options.namespace`, or of a type the caller
    /// cannot see, is reported as not found.
    #[instrument(
        skip(self, ctx, options),
        fields(type_name = %type_name, id = %id, correlation_id = ctx.correlation_id())
    )]
    pub async fn get(
        &self,
        ctx: &RequestContext,
        type_name: &str,
        id: &str,
        options: GetOptions,
    ) -> StorageResult<SavedObject> {
        let namespace = self.parse_namespace("get", options.namespace.as_deref())?;
        self.check_existing_access(ctx, Operation::Get, type_name, id)?;
        if id.is_empty() {
            return Err(RequestError::EmptyId {
                type_name: type_name.to_string(),
            }
            .into());
        }

        let found = self
            .preflight(type_name, id, namespace.as_ref())
            .await?
            .filter(|raw| self.raw_in_namespace(raw, namespace.as_ref()));
        let Some(raw) = found else {
            debug!("Saved object not found");
            return Err(SavedObjectsError::not_found(type_name, id));
        };

        self.read_document(&raw, options.migration_version_compatibility)
    }
}
