//! Translator: expands each service's service×endpoint×IP-family×port
//! cross-product into desired HCN endpoint and load balancer records.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use crate::consts::{PROTOCOL_SCTP, PROTOCOL_TCP, PROTOCOL_UDP};
use crate::hcn::{Endpoint as HcnEndpoint, LoadBalancer, LoadBalancerFlags, PortMappingFlags};
use crate::model::{IpFamily, PortMapping, Protocol, Service, ServiceEndpoints, ServiceType, Snapshot};

/// Per-process configuration the translator needs; `enable_dsr` is
/// resolved once at startup from the gateway's `dsr_supported` probe
/// rather than re-checked per service.
#[derive(Debug, Clone, Copy)]
pub struct TranslateConfig {
    pub enable_dsr: bool,
    pub source_vip: Option<IpAddr>,
}

#[derive(Debug, Default)]
pub struct Translation {
    /// Remote backend endpoints that must exist in the kernel. Local
    /// endpoints never appear here even though they join a load
    /// balancer's `endpoint_keys`.
    pub remote_endpoints: BTreeMap<String, HcnEndpoint>,
    pub load_balancers: Vec<LoadBalancer>,
}

fn protocol_number(protocol: Protocol) -> Option<u32> {
    match protocol {
        Protocol::Tcp => Some(PROTOCOL_TCP),
        Protocol::Udp => Some(PROTOCOL_UDP),
        Protocol::Sctp => Some(PROTOCOL_SCTP),
        Protocol::Unknown => None,
    }
}

/// Resolves a backend IP to an [`HcnEndpoint`], following a fixed dedup
/// order: an already-known local endpoint wins, then an already-known
/// remote one, then a freshly synthesized remote endpoint is cached for
/// the rest of this translation pass.
fn get_or_synthesize_endpoint(
    ip: IpAddr,
    is_local: bool,
    local_endpoints: &BTreeMap<String, HcnEndpoint>,
    remote_cache: &mut BTreeMap<String, HcnEndpoint>,
) -> HcnEndpoint {
    let key = ip.to_string();
    if let Some(local) = local_endpoints.get(&key) {
        return local.clone();
    }
    if let Some(remote) = remote_cache.get(&key) {
        return remote.clone();
    }
    let mut synthesized = HcnEndpoint::remote(ip);
    synthesized.is_local = is_local;
    remote_cache.insert(key, synthesized.clone());
    synthesized
}

/// Collects the resolved backend endpoints for one `(port, family)` slice
/// of a service, in snapshot order.
fn backends_for(
    service_endpoints: &ServiceEndpoints,
    family: IpFamily,
    local_endpoints: &BTreeMap<String, HcnEndpoint>,
    remote_cache: &mut BTreeMap<String, HcnEndpoint>,
) -> Vec<HcnEndpoint> {
    let mut backends = Vec::new();
    for endpoint in service_endpoints.endpoints.values() {
        if !endpoint.readiness.ready {
            continue;
        }
        for ip in endpoint.ips.of(family) {
            let resolved =
                get_or_synthesize_endpoint(*ip, endpoint.is_local, local_endpoints, remote_cache);
            backends.push(resolved);
        }
    }
    backends
}

fn load_balancer_flags(config: &TranslateConfig) -> LoadBalancerFlags {
    if config.enable_dsr {
        LoadBalancerFlags::DSR
    } else {
        LoadBalancerFlags::NONE
    }
}

fn build_load_balancer(
    ip: Option<IpAddr>,
    backends: &[HcnEndpoint],
    port_mapping: &PortMapping,
    port: u16,
    extra_pmf: PortMappingFlags,
    config: &TranslateConfig,
) -> LoadBalancer {
    let pmf = PortMappingFlags::NONE | extra_pmf;
    LoadBalancer {
        id: None,
        ip,
        endpoint_keys: backends.iter().map(HcnEndpoint::key).collect::<BTreeSet<_>>(),
        endpoint_ids: Vec::new(),
        flags: load_balancer_flags(config),
        port_mapping_flags: pmf,
        source_vip: config.source_vip,
        protocol: protocol_number(port_mapping.protocol).unwrap_or(PROTOCOL_TCP),
        port,
        target_port: port_mapping.target_port,
    }
}

fn translate_service(
    service_endpoints: &ServiceEndpoints,
    local_endpoints: &BTreeMap<String, HcnEndpoint>,
    remote_cache: &mut BTreeMap<String, HcnEndpoint>,
    config: &TranslateConfig,
    out: &mut Translation,
) {
    let service: &Service = &service_endpoints.service;

    if service.external_traffic_local {
        // Read here but, matching the upstream behavior this was ported
        // from, never narrows the backend set to local endpoints.
        // Surfacing it as a warning rather than silently honoring or
        // silently dropping it.
        tracing::warn!(
            service = %format!("{}/{}", service.key.namespace, service.key.name),
            "external_traffic_local is set but has no effect on backend selection"
        );
    }

    for port_mapping in &service.ports {
        if protocol_number(port_mapping.protocol).is_none() {
            tracing::warn!(
                service = %format!("{}/{}", service.key.namespace, service.key.name),
                port = port_mapping.port,
                "unsupported protocol, skipping port"
            );
            continue;
        }

        for family in [IpFamily::V4] {
            // IPv6 is out of scope; the family loop stays explicit so
            // extending it later is a one-line change.
            let backends = backends_for(service_endpoints, family, local_endpoints, remote_cache);
            if backends.is_empty() {
                continue;
            }

            for remote in &backends {
                if !remote.is_local {
                    out.remote_endpoints.insert(remote.key(), remote.clone());
                }
            }

            for cluster_ip in service.cluster_ips.of(family) {
                let lb = build_load_balancer(
                    Some(*cluster_ip),
                    &backends,
                    port_mapping,
                    port_mapping.port,
                    preserve_dip_flags(service),
                    config,
                );
                out.load_balancers.push(lb);
            }

            for external_ip in service.external_ips.of(family) {
                let lb = build_load_balancer(
                    Some(*external_ip),
                    &backends,
                    port_mapping,
                    port_mapping.port,
                    preserve_dip_flags(service),
                    config,
                );
                out.load_balancers.push(lb);
            }

            for lb_ip in service.load_balancer_ips.of(family) {
                let lb = build_load_balancer(
                    Some(*lb_ip),
                    &backends,
                    port_mapping,
                    port_mapping.port,
                    preserve_dip_flags(service),
                    config,
                );
                out.load_balancers.push(lb);
            }

            if matches!(service.r#type, ServiceType::NodePort | ServiceType::LoadBalancer) {
                if let Some(node_port) = port_mapping.node_port {
                    let lb = build_load_balancer(
                        None,
                        &backends,
                        port_mapping,
                        node_port,
                        PortMappingFlags::LOCAL_ROUTED_VIP,
                        config,
                    );
                    out.load_balancers.push(lb);
                }
            }
        }
    }
}

fn preserve_dip_flags(service: &Service) -> PortMappingFlags {
    if service.preserve_destination {
        PortMappingFlags::PRESERVE_DIP
    } else {
        PortMappingFlags::NONE
    }
}

/// Translates a whole snapshot. `local_endpoints` is the reconciler's
/// kernel-observed local-endpoint cache, authoritative over anything the
/// event source reports as local; it is consulted, never mutated, here.
#[must_use]
pub fn translate(
    snapshot: &Snapshot,
    local_endpoints: &BTreeMap<String, HcnEndpoint>,
    config: &TranslateConfig,
) -> Translation {
    let mut out = Translation::default();
    let mut remote_cache = BTreeMap::new();
    for service_endpoints in snapshot.services.values() {
        translate_service(service_endpoints, local_endpoints, &mut remote_cache, config, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Endpoint, EndpointKey, IpsByFamily, Readiness, ServiceKey};

    fn cfg() -> TranslateConfig {
        TranslateConfig {
            enable_dsr: false,
            source_vip: None,
        }
    }

    fn endpoint(ip: &str, is_local: bool) -> Endpoint {
        let mut ips = IpsByFamily::default();
        ips.push(ip.parse().unwrap());
        Endpoint {
            ips,
            is_local,
            readiness: Readiness {
                ready: true,
                serving: true,
                terminating: false,
            },
            node_hint: None,
            zone_hint: None,
        }
    }

    fn cluster_ip_service(node_port: Option<u16>) -> Service {
        let mut cluster_ips = IpsByFamily::default();
        cluster_ips.push("10.0.0.1".parse().unwrap());
        Service {
            key: ServiceKey::new("default", "web"),
            r#type: if node_port.is_some() {
                ServiceType::NodePort
            } else {
                ServiceType::ClusterIp
            },
            cluster_ips,
            external_ips: IpsByFamily::default(),
            load_balancer_ips: IpsByFamily::default(),
            ports: vec![PortMapping {
                protocol: Protocol::Tcp,
                port: 80,
                target_port: 8080,
                node_port,
            }],
            internal_traffic_local: false,
            external_traffic_local: false,
            preserve_destination: false,
        }
    }

    fn snapshot_with(service: Service, endpoints: Vec<(&str, Endpoint)>) -> Snapshot {
        let mut map = BTreeMap::new();
        for (key, ep) in endpoints {
            map.insert(EndpointKey::new(key), ep);
        }
        let mut snap = Snapshot::default();
        snap.services.insert(
            service.key.clone(),
            ServiceEndpoints {
                service,
                endpoints: map,
            },
        );
        snap
    }

    #[test]
    fn cluster_ip_with_no_backends_emits_no_load_balancer() {
        let snap = snapshot_with(cluster_ip_service(None), vec![]);
        let t = translate(&snap, &BTreeMap::new(), &cfg());
        assert!(t.load_balancers.is_empty());
    }

    #[test]
    fn cluster_ip_emits_one_lb_with_deduped_backends() {
        let snap = snapshot_with(
            cluster_ip_service(None),
            vec![
                ("a", endpoint("1.1.1.1", false)),
                ("b", endpoint("1.1.1.1", false)), // same IP, different endpoint object
                ("c", endpoint("1.1.1.2", true)),
            ],
        );
        let t = translate(&snap, &BTreeMap::new(), &cfg());
        assert_eq!(t.load_balancers.len(), 1);
        let lb = &t.load_balancers[0];
        assert_eq!(lb.endpoint_keys.len(), 2);
        assert!(lb.endpoint_keys.contains("1.1.1.1"));
        assert!(lb.endpoint_keys.contains("1.1.1.2"));
        // Only the remote backend is desired as a kernel endpoint.
        assert_eq!(t.remote_endpoints.len(), 1);
        assert!(t.remote_endpoints.contains_key("1.1.1.1"));
    }

    #[test]
    fn node_port_adds_second_load_balancer_with_local_routed_vip() {
        let snap = snapshot_with(
            cluster_ip_service(Some(30080)),
            vec![("a", endpoint("1.1.1.1", false))],
        );
        let t = translate(&snap, &BTreeMap::new(), &cfg());
        assert_eq!(t.load_balancers.len(), 2);
        let node_port_lb = t.load_balancers.iter().find(|lb| lb.ip.is_none()).unwrap();
        assert_eq!(node_port_lb.port, 30080);
        assert!(node_port_lb.port_mapping_flags.contains(PortMappingFlags::LOCAL_ROUTED_VIP));
    }

    #[test]
    fn unknown_protocol_drops_only_that_port() {
        let mut service = cluster_ip_service(None);
        service.ports.push(PortMapping {
            protocol: Protocol::Unknown,
            port: 81,
            target_port: 8081,
            node_port: None,
        });
        let snap = snapshot_with(service, vec![("a", endpoint("1.1.1.1", false))]);
        let t = translate(&snap, &BTreeMap::new(), &cfg());
        assert_eq!(t.load_balancers.len(), 1);
        assert_eq!(t.load_balancers[0].port, 80);
    }

    #[test]
    fn enable_dsr_sets_lb_flag() {
        let snap = snapshot_with(cluster_ip_service(None), vec![("a", endpoint("1.1.1.1", false))]);
        let t = translate(
            &snap,
            &BTreeMap::new(),
            &TranslateConfig {
                enable_dsr: true,
                source_vip: None,
            },
        );
        assert!(t.load_balancers[0].flags.contains(LoadBalancerFlags::DSR));
    }
}
