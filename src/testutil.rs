//! In-memory [`HcnGateway`] double. Public so both unit tests and
//! `tests/scenarios.rs` can drive the reconciler against it without
//! touching a real Windows host.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::GatewayError;
use crate::hcn::gateway::GatewayResult;
use crate::hcn::{Endpoint, HcnGateway, LoadBalancer, Network, NetworkType};

#[derive(Default)]
struct State {
    endpoints: HashMap<String, Endpoint>,
    load_balancers: HashMap<String, LoadBalancer>,
    next_id: u64,
    calls: Vec<String>,
    dsr_supported: bool,
}

#[derive(Clone)]
pub struct FakeGateway {
    state: Arc<Mutex<State>>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                dsr_supported: true,
                ..State::default()
            })),
        }
    }
}

impl FakeGateway {
    /// Every gateway call made so far, in order, as `"<method>:<key>"`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Preloads a kernel-observed local endpoint, as `list_endpoints` would
    /// return after the host's own vNIC is programmed.
    pub fn seed_local(&self, ip: &str, id: &str) {
        let mut state = self.state.lock();
        let mut endpoint = Endpoint::remote(ip.parse().unwrap());
        endpoint.is_local = true;
        endpoint.id = Some(id.to_string());
        state.endpoints.insert(endpoint.key(), endpoint);
    }

    /// Preloads a kernel-observed remote endpoint, as a restart would see
    /// it before the reconciler has rebuilt any in-memory state.
    pub fn seed_remote(&self, endpoint: Endpoint) {
        self.state.lock().endpoints.insert(endpoint.key(), endpoint);
    }

    pub fn seed_load_balancer(&self, lb: LoadBalancer) {
        self.state.lock().load_balancers.insert(lb.key(), lb);
    }

    pub fn set_dsr_supported(&self, supported: bool) {
        self.state.lock().dsr_supported = supported;
    }

    fn next_id(&self) -> String {
        let mut state = self.state.lock();
        state.next_id += 1;
        format!("id-{}", state.next_id)
    }
}

#[async_trait]
impl HcnGateway for FakeGateway {
    async fn get_network_by_name(&self, name: &str) -> GatewayResult<Network> {
        Ok(Network {
            name: name.to_string(),
            id: "net-1".to_string(),
            r#type: NetworkType::Overlay,
            remote_subnets: vec![],
        })
    }

    async fn get_network_by_id(&self, id: &str) -> GatewayResult<Network> {
        self.get_network_by_name(id).await
    }

    async fn create_endpoint(&self, _network: &Network, endpoint: &mut Endpoint) -> GatewayResult<()> {
        let id = self.next_id();
        endpoint.id = Some(id);
        let mut state = self.state.lock();
        state.calls.push(format!("create_endpoint:{}", endpoint.key()));
        state.endpoints.insert(endpoint.key(), endpoint.clone());
        Ok(())
    }

    async fn delete_endpoint(&self, _network: &Network, endpoint: &mut Endpoint) -> GatewayResult<()> {
        let mut state = self.state.lock();
        if let Some(existing) = state.endpoints.get(&endpoint.key()) {
            if existing.is_local {
                return Err(GatewayError::Refused("local endpoint".to_string()));
            }
        }
        state.calls.push(format!("delete_endpoint:{}", endpoint.key()));
        if state.endpoints.remove(&endpoint.key()).is_none() {
            return Err(GatewayError::NotFound);
        }
        Ok(())
    }

    async fn list_endpoints(&self) -> GatewayResult<Vec<Endpoint>> {
        Ok(self.state.lock().endpoints.values().cloned().collect())
    }

    async fn create_load_balancer(&self, lb: &mut LoadBalancer) -> GatewayResult<()> {
        let id = self.next_id();
        lb.id = Some(id);
        let mut state = self.state.lock();
        state.calls.push(format!("create_load_balancer:{}", lb.key()));
        state.load_balancers.insert(lb.key(), lb.clone());
        Ok(())
    }

    async fn delete_load_balancer(&self, lb: &mut LoadBalancer) -> GatewayResult<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("delete_load_balancer:{}", lb.key()));
        if state.load_balancers.remove(&lb.key()).is_none() {
            return Err(GatewayError::NotFound);
        }
        Ok(())
    }

    async fn list_load_balancers(&self) -> GatewayResult<Vec<LoadBalancer>> {
        Ok(self.state.lock().load_balancers.values().cloned().collect())
    }

    async fn dsr_supported(&self) -> bool {
        self.state.lock().dsr_supported
    }
}
