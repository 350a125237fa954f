use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use owo_colors::OwoColorize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::priority::PriorityAllocator;
use crate::settings::Settings;
use crate::template::Loader;

/// Shared state handed to every controller and event handler.
///
/// The cluster itself is the only shared mutable store; everything here is
/// either immutable after startup or an explicit synchronisation primitive.
pub struct Context {
    pub client: Client,
    pub settings: Settings,
    pub templates: Loader,
    pub priorities: PriorityAllocator,
    pub reporter: Reporter,
    pub shutdown: CancellationToken,
    pub locks: EventLocks,
}

impl Context {
    /// Publishes a warning event against the given object, logging rather
    /// than failing if the event cannot be recorded.
    pub async fn publish_warning(
        &self,
        reference: &ObjectReference,
        action: &str,
        reason: &str,
        message: &str,
    ) {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone());
        let event = Event {
            type_: EventType::Warning,
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = recorder.publish(&event, reference).await {
            eprintln!("{}", format!("failed to publish event: {e}").red());
        }
    }
}

/// Per-identity mutual exclusion so that events for the same benchmark are
/// processed serially while different benchmarks proceed in parallel.
#[derive(Clone, Default)]
pub struct EventLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl EventLocks {
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().await;
            map.entry(key.to_string()).or_default().clone()
        };
        entry.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn locks_serialise_the_same_key() {
        let locks = EventLocks::default();
        let guard = locks.lock("default/bench").await;
        // A different key is immediately available
        let _other = locks.lock("default/other").await;
        // The same key is not
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(20), locks.lock("default/bench"))
                .await
                .is_err()
        );
        drop(guard);
        let _reacquired = locks.lock("default/bench").await;
    }
}
