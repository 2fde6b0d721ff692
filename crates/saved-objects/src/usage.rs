//! Usage counter notifications.
//!
//! The repository reports every successful mutating call to a
//! [`UsageCounter`]. Notifications are fire-and-forget: they are spawned on
//! the current tokio runtime, never awaited by the caller, and their failures
//! are only logged. Without a runtime the notification is dropped.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::error::BoxError;

/// One usage count increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounterEvent {
    /// Counter name, e.g. `savedObjects.create`.
    pub counter_name: String,
    /// Counter category, e.g. the saved object type.
    pub counter_type: String,
    /// Amount to add.
    pub increment_by: u64,
}

impl UsageCounterEvent {
    /// Creates an event for one operation on `type_name`.
    pub fn new(operation: &str, type_name: &str, increment_by: u64) -> Self {
        Self {
            counter_name: format!("savedObjects.{}", operation),
            counter_type: type_name.to_string(),
            increment_by,
        }
    }
}

/// Receives usage notifications.
#[async_trait]
pub trait UsageCounter: Send + Sync {
    /// Records an increment.
    async fn increment_counter(&self, event: UsageCounterEvent) -> Result<(), BoxError>;
}

/// Spawns `event` on the current runtime without waiting for it.
pub(crate) fn notify(counter: Option<&Arc<dyn UsageCounter>>, event: UsageCounterEvent) {
    let Some(counter) = counter else {
        return;
    };
    let Ok(handle) = Handle::try_current() else {
        tracing::debug!(counter = %event.counter_name, "No runtime; dropping usage notification");
        return;
    };
    let counter = Arc::clone(counter);
    handle.spawn(async move {
        let counter_name = event.counter_name.clone();
        if let Err(e) = counter.increment_counter(event).await {
            tracing::debug!(counter = %counter_name, error = %e, "Usage counter failed");
        }
    });
}
