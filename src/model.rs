//! Service/endpoint object model observed from the event source.
//!
//! These are the inputs to the translator; they are intentionally decoupled
//! from any upstream orchestrator's wire types since the event source
//! itself is out of scope here — only the sink contract is ours to own.

use std::collections::BTreeMap;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    #[must_use]
    pub const fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
    /// Anything else the event source hands us; rejected per-port at
    /// translation time rather than at ingestion.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceType {
    ClusterIp,
    NodePort,
    LoadBalancer,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortMapping {
    pub protocol: Protocol,
    pub port: u16,
    pub target_port: u16,
    pub node_port: Option<u16>,
}

/// Partitions a set of addresses by IP family, mirroring how
/// `cluster_ips`/`external_ips`/... are partitioned on `Service`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpsByFamily {
    pub v4: Vec<IpAddr>,
    pub v6: Vec<IpAddr>,
}

impl IpsByFamily {
    #[must_use]
    pub fn of(&self, family: IpFamily) -> &[IpAddr] {
        match family {
            IpFamily::V4 => &self.v4,
            IpFamily::V6 => &self.v6,
        }
    }

    pub fn push(&mut self, addr: IpAddr) {
        match IpFamily::of(&addr) {
            IpFamily::V4 => self.v4.push(addr),
            IpFamily::V6 => self.v6.push(addr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub namespace: String,
    pub name: String,
}

impl ServiceKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub key: ServiceKey,
    pub r#type: ServiceType,
    pub cluster_ips: IpsByFamily,
    pub external_ips: IpsByFamily,
    pub load_balancer_ips: IpsByFamily,
    pub ports: Vec<PortMapping>,
    pub internal_traffic_local: bool,
    pub external_traffic_local: bool,
    pub preserve_destination: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey(pub String);

impl EndpointKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub ready: bool,
    pub serving: bool,
    pub terminating: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub ips: IpsByFamily,
    pub is_local: bool,
    pub readiness: Readiness,
    pub node_hint: Option<String>,
    pub zone_hint: Option<String>,
}

/// An immutable view of one service and its currently known backends,
/// handed to the translator by [`crate::tracker::ChangeTracker::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    pub service: Service,
    pub endpoints: BTreeMap<EndpointKey, Endpoint>,
}

/// Full desired world-view as observed by the change tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub services: BTreeMap<ServiceKey, ServiceEndpoints>,
}
