//! Property-based tests: commutativity of event order and retry
//! convergence, run against the public diff store and translator.

use std::collections::BTreeMap;
use std::net::IpAddr;

use proptest::prelude::*;
use winproxy_core::diffstore::DiffStore;
use winproxy_core::model::{
    Endpoint, EndpointKey, IpsByFamily, PortMapping, Protocol, Readiness, Service, ServiceKey,
    ServiceType,
};
use winproxy_core::translator::{translate, TranslateConfig};
use winproxy_core::tracker::ChangeTracker;

fn web_service() -> Service {
    let mut cluster_ips = IpsByFamily::default();
    cluster_ips.push("10.0.0.1".parse::<IpAddr>().unwrap());
    Service {
        key: ServiceKey::new("default", "web"),
        r#type: ServiceType::ClusterIp,
        cluster_ips,
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

fn translate_config() -> TranslateConfig {
    TranslateConfig {
        enable_dsr: false,
        source_vip: None,
    }
}

proptest! {
    /// Permuting the order four `set_endpoint` calls arrive in must not
    /// change the translated desired state.
    #[test]
    fn commutative_event_order_yields_identical_translation(priorities in prop::collection::vec(0u32..1000, 4)) {
        let backends = [
            ("1.1.1.1", "a"),
            ("1.1.1.2", "b"),
            ("1.1.1.3", "c"),
            ("1.1.1.4", "d"),
        ];
        let mut ordered: Vec<_> = backends.iter().zip(priorities).collect();
        ordered.sort_by_key(|(_, priority)| *priority);

        let tracker = ChangeTracker::new();
        tracker.set_service(web_service());
        for ((ip, key), _) in ordered {
            tracker.set_endpoint(
                ServiceKey::new("default", "web"),
                EndpointKey::new(*key),
                Some(endpoint(*ip)),
            );
        }

        let snapshot = tracker.snapshot();
        let translation = translate(&snapshot, &BTreeMap::new(), &translate_config());

        let mut keys: Vec<&str> = translation.remote_endpoints.keys().map(String::as_str).collect();
        keys.sort_unstable();
        prop_assert_eq!(keys, vec!["1.1.1.1", "1.1.1.2", "1.1.1.3", "1.1.1.4"]);
        prop_assert_eq!(translation.load_balancers.len(), 1);
        prop_assert_eq!(translation.load_balancers[0].endpoint_keys.len(), 4);
    }

    /// A create that fails `k` times before succeeding has the same net
    /// effect on the diff store as a single successful create.
    #[test]
    fn retry_then_success_converges_to_single_create(failures in 0usize..6) {
        let mut store: DiffStore<&str, i32> = DiffStore::new(|a, b| a == b);

        for _ in 0..failures {
            store.begin_cycle();
            store.set("a", 1);
            store.end_cycle();
            prop_assert_eq!(store.created(), vec!["a"]);
            // No commit() — simulates the apply failing this cycle.
        }

        store.begin_cycle();
        store.set("a", 1);
        store.end_cycle();
        prop_assert_eq!(store.created(), vec!["a"]);
        store.commit(&"a");

        store.begin_cycle();
        store.set("a", 1);
        store.end_cycle();
        prop_assert!(store.created().is_empty());
        prop_assert!(store.updated().is_empty());
    }
}
