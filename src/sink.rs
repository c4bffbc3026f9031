//! Event-source contract: the inbound sink a watcher/gRPC feed drives. The
//! watcher itself is out of scope here — this is just the ingestion
//! surface, forwarding straight into the [`ChangeTracker`].

use crate::model::{Endpoint, EndpointKey, Service, ServiceKey};
use crate::tracker::ChangeTracker;

#[derive(Clone)]
pub struct EventSink {
    tracker: ChangeTracker,
}

impl EventSink {
    #[must_use]
    pub const fn new(tracker: ChangeTracker) -> Self {
        Self { tracker }
    }

    pub fn set_service(&self, service: Service) {
        self.tracker.set_service(service);
    }

    pub fn delete_service(&self, namespace: &str, name: &str) {
        self.tracker
            .delete_service(&ServiceKey::new(namespace, name));
    }

    pub fn set_endpoint(&self, namespace: &str, service: &str, key: &str, endpoint: Endpoint) {
        self.tracker.set_endpoint(
            ServiceKey::new(namespace, service),
            EndpointKey::new(key),
            Some(endpoint),
        );
    }

    pub fn delete_endpoint(&self, namespace: &str, service: &str, key: &str) {
        self.tracker.delete_endpoint(
            &ServiceKey::new(namespace, service),
            &EndpointKey::new(key),
        );
    }

    pub fn services_synced(&self) {
        self.tracker.mark_services_synced();
    }

    pub fn endpoints_synced(&self) {
        self.tracker.mark_endpoints_synced();
    }

    /// Advisory hint that a consistent batch ended. Idempotent; may
    /// collapse with other dirty signals.
    pub fn sync(&self) {
        self.tracker.sync_hint();
    }

    /// The tracker is already level-triggered, so there is nothing to
    /// reset.
    pub const fn reset(&self) {}
}
