//! The kernel gateway contract. The concrete Windows binding is out of
//! scope for this crate — it would live in a downstream, Windows-only
//! crate that implements this trait against the real HCN API. This module
//! defines only the interface the reconciler programs against.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::hcn::{Endpoint, LoadBalancer, Network};

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Typed interface wrapping the kernel HCN API. `update_*` methods
/// default to delete-then-create because the kernel has no true update for
/// either object kind; the default impls below encode that so a binding
/// only has to implement create/delete/list and get the right semantics.
#[async_trait]
pub trait HcnGateway: Send + Sync {
    async fn get_network_by_name(&self, name: &str) -> GatewayResult<Network>;
    async fn get_network_by_id(&self, id: &str) -> GatewayResult<Network>;

    async fn create_endpoint(&self, network: &Network, endpoint: &mut Endpoint) -> GatewayResult<()>;
    async fn delete_endpoint(&self, network: &Network, endpoint: &mut Endpoint) -> GatewayResult<()>;
    async fn list_endpoints(&self) -> GatewayResult<Vec<Endpoint>>;

    async fn update_endpoint(&self, network: &Network, endpoint: &mut Endpoint) -> GatewayResult<()> {
        self.delete_endpoint(network, endpoint).await?;
        self.create_endpoint(network, endpoint).await
    }

    async fn create_load_balancer(&self, lb: &mut LoadBalancer) -> GatewayResult<()>;
    async fn delete_load_balancer(&self, lb: &mut LoadBalancer) -> GatewayResult<()>;
    async fn list_load_balancers(&self) -> GatewayResult<Vec<LoadBalancer>>;

    async fn update_load_balancer(&self, lb: &mut LoadBalancer) -> GatewayResult<()> {
        self.delete_load_balancer(lb).await?;
        self.create_load_balancer(lb).await
    }

    /// Whether the host's HCN build supports DSR load balancing. Probed
    /// once at `Reconciler` construction rather than per service. Default
    /// `true` so bindings that don't care can ignore it; a binding
    /// targeting an older HCN version overrides this.
    async fn dsr_supported(&self) -> bool {
        true
    }
}
