//! Usage/meter event recorder (C7).
//!
//! A thin wrapper over [`Storage::append_meter_event`] that applies a "never block a
//! lifecycle transition on the billing collector" policy: failures are logged and
//! swallowed rather than propagated to the caller.

use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use crate::model::{MeterEvent, MeterEventType};
use crate::storage::Storage;

/// Records a `deployment.*` meter event, logging (not propagating) a storage failure.
pub async fn record_deployment_event(
    storage: &dyn Storage,
    user_id: Uuid,
    deployment_id: Uuid,
    event_type: MeterEventType,
    metadata: HashMap<String, String>,
) {
    let event = MeterEvent::deployment(user_id, event_type, deployment_id, metadata);
    if let Err(error) = storage.append_meter_event(event).await {
        warn!(
            %error,
            deployment_id = %deployment_id,
            event_type = event_type.as_str(),
            "failed to record meter event"
        );
    }
}

#[cfg(all(test, feature = "memory-storage"))]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn records_an_unreported_event() {
        let storage = MemoryStorage::new();
        let deployment_id = Uuid::new_v4();
        record_deployment_event(
            &storage,
            Uuid::new_v4(),
            deployment_id,
            MeterEventType::DeploymentStarted,
            HashMap::new(),
        )
        .await;

        let unreported = storage.list_unreported_meter_events().await.unwrap();
        assert_eq!(unreported.len(), 1);
        assert_eq!(unreported[0].resource_id, deployment_id);
        assert_eq!(unreported[0].event_type, MeterEventType::DeploymentStarted);
    }
}
