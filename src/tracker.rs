//! Change tracker: the in-memory event-aggregation store. All mutation
//! serializes through one `parking_lot::Mutex`, never held across an
//! `.await`, so event ingestion stays cheap regardless of how many
//! producer tasks call into it concurrently.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::model::{Endpoint, EndpointKey, Service, ServiceEndpoints, ServiceKey, Snapshot};

#[derive(Default)]
struct Inner {
    services: BTreeMap<ServiceKey, Service>,
    endpoints: BTreeMap<ServiceKey, BTreeMap<EndpointKey, Endpoint>>,
    services_synced: bool,
    endpoints_synced: bool,
}

/// Handle shared between the event sink (writer) and the reconciler
/// (reader). Cloning is cheap — it's an `Arc` around the lock and the
/// dirty-flag notifier.
#[derive(Clone)]
pub struct ChangeTracker {
    inner: Arc<Mutex<Inner>>,
    dirty: Arc<Notify>,
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            dirty: Arc::new(Notify::new()),
        }
    }

    pub fn set_service(&self, service: Service) {
        let mut inner = self.inner.lock();
        inner.services.insert(service.key.clone(), service);
        drop(inner);
        self.dirty.notify_one();
    }

    /// Also removes every endpoint tracked under `(namespace, name)`.
    pub fn delete_service(&self, key: &ServiceKey) {
        let mut inner = self.inner.lock();
        inner.services.remove(key);
        inner.endpoints.remove(key);
        drop(inner);
        self.dirty.notify_one();
    }

    /// `endpoint = None` is treated as a delete, matching the sink
    /// contract's nil-endpoint convention.
    pub fn set_endpoint(&self, svc: ServiceKey, key: EndpointKey, endpoint: Option<Endpoint>) {
        let mut inner = self.inner.lock();
        let bucket = inner.endpoints.entry(svc).or_default();
        match endpoint {
            Some(ep) => {
                bucket.insert(key, ep);
            }
            None => {
                bucket.remove(&key);
            }
        }
        drop(inner);
        self.dirty.notify_one();
    }

    pub fn delete_endpoint(&self, svc: &ServiceKey, key: &EndpointKey) {
        let mut inner = self.inner.lock();
        if let Some(bucket) = inner.endpoints.get_mut(svc) {
            bucket.remove(key);
        }
        drop(inner);
        self.dirty.notify_one();
    }

    pub fn mark_services_synced(&self) {
        self.inner.lock().services_synced = true;
        self.dirty.notify_one();
    }

    pub fn mark_endpoints_synced(&self) {
        self.inner.lock().endpoints_synced = true;
        self.dirty.notify_one();
    }

    #[must_use]
    pub fn initialized(&self) -> bool {
        let inner = self.inner.lock();
        inner.services_synced && inner.endpoints_synced
    }

    /// Advisory batch-boundary hint; idempotent, so it simply rings the
    /// dirty bell again.
    pub fn sync_hint(&self) {
        self.dirty.notify_one();
    }

    /// Immutable view: for each tracked service, its current endpoint set.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        let services = inner
            .services
            .iter()
            .map(|(key, service)| {
                let endpoints = inner.endpoints.get(key).cloned().unwrap_or_default();
                (
                    key.clone(),
                    ServiceEndpoints {
                        service: service.clone(),
                        endpoints,
                    },
                )
            })
            .collect();
        Snapshot { services }
    }

    /// Waits until the next event is ingested. The reconciler races this
    /// against its resync timer and the cancellation signal.
    pub async fn dirty(&self) {
        self.dirty.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IpsByFamily, PortMapping, Protocol, Readiness, ServiceType};

    fn service(ns: &str, name: &str) -> Service {
        Service {
            key: ServiceKey::new(ns, name),
            r#type: ServiceType::ClusterIp,
            cluster_ips: IpsByFamily::default(),
            external_ips: IpsByFamily::default(),
            load_balancer_ips: IpsByFamily::default(),
            ports: vec![PortMapping {
                protocol: Protocol::Tcp,
                port: 80,
                target_port: 8080,
                node_port: None,
            }],
            internal_traffic_local: false,
            external_traffic_local: false,
            preserve_destination: false,
        }
    }

    fn endpoint(ip: &str) -> Endpoint {
        let mut ips = IpsByFamily::default();
        ips.push(ip.parse().unwrap());
        Endpoint {
            ips,
            is_local: false,
            readiness: Readiness {
                ready: true,
                serving: true,
                terminating: false,
            },
            node_hint: None,
            zone_hint: None,
        }
    }

    #[test]
    fn delete_service_removes_its_endpoints() {
        let tracker = ChangeTracker::new();
        let key = ServiceKey::new("default", "web");
        tracker.set_service(service("default", "web"));
        tracker.set_endpoint(key.clone(), EndpointKey::new("1.1.1.1"), Some(endpoint("1.1.1.1")));

        tracker.delete_service(&key);

        let snap = tracker.snapshot();
        assert!(snap.services.is_empty());
    }

    #[test]
    fn nil_endpoint_deletes() {
        let tracker = ChangeTracker::new();
        let key = ServiceKey::new("default", "web");
        tracker.set_service(service("default", "web"));
        let ep_key = EndpointKey::new("1.1.1.1");
        tracker.set_endpoint(key.clone(), ep_key.clone(), Some(endpoint("1.1.1.1")));
        tracker.set_endpoint(key.clone(), ep_key, None);

        let snap = tracker.snapshot();
        assert!(snap.services[&key].endpoints.is_empty());
    }

    #[test]
    fn initialized_requires_both_sync_gates() {
        let tracker = ChangeTracker::new();
        assert!(!tracker.initialized());
        tracker.mark_services_synced();
        assert!(!tracker.initialized());
        tracker.mark_endpoints_synced();
        assert!(tracker.initialized());
    }

    #[tokio::test]
    async fn set_service_wakes_a_waiter() {
        let tracker = ChangeTracker::new();
        let waiter = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.dirty().await }
        });
        tokio::task::yield_now().await;
        tracker.set_service(service("default", "web"));
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("dirty() should have resolved")
            .unwrap();
    }
}
