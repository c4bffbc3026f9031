//! HCN object model: the desired kernel-level shapes the translator
//! produces and the diff store compares. `key`/`equal` here are the
//! contracts the diff store and the reconciler's id maps are built on.

pub mod gateway;
pub mod mac;

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

pub use gateway::{GatewayResult, HcnGateway};

/// Bitmask flags on a [`LoadBalancer`]. Plain `u32` newtype rather than a
/// `bitflags` dependency — the whole flag surface is two bits wide and the
/// kernel schema itself represents them as a bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct LoadBalancerFlags(pub u32);

impl LoadBalancerFlags {
    pub const NONE: Self = Self(0);
    pub const DSR: Self = Self(1 << 0);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for LoadBalancerFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for LoadBalancerFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct PortMappingFlags(pub u32);

impl PortMappingFlags {
    pub const NONE: Self = Self(0);
    pub const ILB: Self = Self(1 << 0);
    pub const LOCAL_ROUTED_VIP: Self = Self(1 << 1);
    pub const USE_MUX: Self = Self(1 << 2);
    pub const PRESERVE_DIP: Self = Self(1 << 3);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for PortMappingFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for PortMappingFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A desired or observed HostComputeEndpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Kernel-assigned identifier. `None` until a `create_endpoint` call
    /// succeeds; cleared again on confirmed delete.
    pub id: Option<String>,
    pub ip: IpAddr,
    pub is_local: bool,
    pub mac_address: String,
    pub provider_ip: Option<IpAddr>,
}

impl Endpoint {
    #[must_use]
    pub fn remote(ip: IpAddr) -> Self {
        Self {
            id: None,
            ip,
            is_local: false,
            mac_address: mac::derive_mac(ip),
            provider_ip: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> String {
        self.ip.to_string()
    }

    /// Compares every field but `id` — a freshly synthesized desired
    /// endpoint compares equal to its previously-applied, id-bearing
    /// counterpart.
    #[must_use]
    pub fn equal(&self, other: &Self) -> bool {
        self.is_local == other.is_local
            && self.key() == other.key()
            && self.mac_address == other.mac_address
            && self.provider_ip == other.provider_ip
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Endpoint key={} id={}>",
            self.key(),
            self.id.as_deref().unwrap_or("")
        )
    }
}

/// A desired or observed HostComputeLoadBalancer.
///
/// A load balancer holds endpoint *keys* (IPs), not endpoint values or a
/// value-level reference to them, to avoid a cyclic value dependency
/// between load balancers and endpoints. Kernel ids are resolved into
/// `endpoint_ids` only at the moment a gateway call is about to be made —
/// that's the only place this struct's endpoint identity and its kernel
/// identity need to agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancer {
    pub id: Option<String>,
    /// Frontend VIP. Empty for the NodePort load balancer.
    pub ip: Option<IpAddr>,
    /// Stable identity used for diffing: the backend endpoints' IPs.
    pub endpoint_keys: BTreeSet<String>,
    /// Kernel endpoint ids, resolved immediately before a create/update
    /// gateway call. Not part of `equal()` — two load balancers with the
    /// same backend set are equal regardless of whether ids happen to be
    /// resolved yet.
    pub endpoint_ids: Vec<String>,
    pub flags: LoadBalancerFlags,
    pub port_mapping_flags: PortMappingFlags,
    pub source_vip: Option<IpAddr>,
    pub protocol: u32,
    pub port: u16,
    pub target_port: u16,
}

impl LoadBalancer {
    /// `"<frontend-ip>:<port>/<protocol>"`, frontend-ip empty for NodePort.
    #[must_use]
    pub fn key(&self) -> String {
        let proto = match self.protocol {
            crate::consts::PROTOCOL_UDP => "UDP",
            crate::consts::PROTOCOL_SCTP => "SCTP",
            _ => "TCP",
        };
        let host = self.ip.map(|ip| ip.to_string()).unwrap_or_default();
        format!("{host}:{}/{proto}", self.port)
    }

    /// Set-equality on endpoint keys, so emission order never causes a
    /// spurious update.
    #[must_use]
    pub fn equal(&self, other: &Self) -> bool {
        self.endpoint_keys == other.endpoint_keys
            && self.flags == other.flags
            && self.port_mapping_flags == other.port_mapping_flags
            && self.key() == other.key()
    }
}

impl fmt::Display for LoadBalancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<LoadBalancer key={} endpoints={} id={}>",
            self.key(),
            self.endpoint_keys.len(),
            self.id.as_deref().unwrap_or("")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    Overlay,
    L2Bridge,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSubnetInfo {
    pub destination_prefix: String,
    pub isolation_id: u16,
    pub provider_address: String,
    pub dr_mac_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub name: String,
    pub id: String,
    pub r#type: NetworkType,
    pub remote_subnets: Vec<RemoteSubnetInfo>,
}

impl Network {
    #[must_use]
    pub const fn is_overlay(&self) -> bool {
        matches!(self.r#type, NetworkType::Overlay)
    }
}
