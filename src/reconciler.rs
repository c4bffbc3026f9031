//! The reconciler: the only component that mutates kernel state. Owns the
//! diff stores, the id maps, and the local-endpoint cache as plain fields —
//! there is exactly one `Reconciler` value per process and nothing outside
//! it reaches in.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::diffstore::DiffStore;
use crate::error::GatewayError;
use crate::hcn::{self, HcnGateway, LoadBalancer, Network};
use crate::translator::{translate, TranslateConfig};
use crate::tracker::ChangeTracker;

pub struct Reconciler {
    gateway: Arc<dyn HcnGateway>,
    tracker: ChangeTracker,
    network: Network,
    translate_config: TranslateConfig,
    sync_period: Duration,
    min_sync_period: Duration,

    ep_store: DiffStore<String, hcn::Endpoint>,
    lb_store: DiffStore<String, LoadBalancer>,
    endpoint_id_map: HashMap<String, String>,
    load_balancer_id_map: HashMap<String, String>,
    local_endpoints: BTreeMap<String, hcn::Endpoint>,
    last_sync: Option<Instant>,
}

impl Reconciler {
    /// Probes `dsr_supported` once and folds it into the effective DSR
    /// configuration before the loop ever runs.
    pub async fn new(
        gateway: Arc<dyn HcnGateway>,
        tracker: ChangeTracker,
        network: Network,
        mut translate_config: TranslateConfig,
        sync_period: Duration,
        min_sync_period: Duration,
    ) -> Self {
        if translate_config.enable_dsr && !gateway.dsr_supported().await {
            tracing::warn!("DSR requested but not supported by this host, disabling");
            translate_config.enable_dsr = false;
        }

        Self {
            gateway,
            tracker,
            network,
            translate_config,
            sync_period,
            min_sync_period,
            ep_store: DiffStore::new(hcn::Endpoint::equal),
            lb_store: DiffStore::new(LoadBalancer::equal),
            endpoint_id_map: HashMap::new(),
            load_balancer_id_map: HashMap::new(),
            local_endpoints: BTreeMap::new(),
            last_sync: None,
        }
    }

    /// Runs until `cancel` fires, finishing the in-flight cycle first.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            if !self.wait_for_trigger(&cancel).await {
                break;
            }
            if let Some(last) = self.last_sync {
                let elapsed = last.elapsed();
                if elapsed < self.min_sync_period {
                    tokio::time::sleep(self.min_sync_period - elapsed).await;
                }
            }
            self.run_once().await;
        }
        tracing::info!("reconciler stopped");
    }

    async fn wait_for_trigger(&self, cancel: &CancellationToken) -> bool {
        let remaining = match self.last_sync {
            Some(last) => self.sync_period.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        };
        tokio::select! {
            () = cancel.cancelled() => false,
            () = self.tracker.dirty() => true,
            () = tokio::time::sleep(remaining) => true,
        }
    }

    /// Runs a single cycle synchronously, without the trigger-wait loop.
    /// `run` uses this internally; tests drive cycles directly through it
    /// to avoid racing real timers.
    pub async fn run_once(&mut self) {
        self.run_cycle().await;
        self.last_sync = Some(Instant::now());
    }

    #[tracing::instrument(skip(self), fields(network = %self.network.id))]
    async fn run_cycle(&mut self) {
        let snapshot = self.tracker.snapshot();
        self.refresh_kernel_observations().await;

        let translation = translate(&snapshot, &self.local_endpoints, &self.translate_config);

        self.ep_store.begin_cycle();
        for (key, endpoint) in translation.remote_endpoints {
            self.ep_store.set(key, endpoint);
        }
        self.ep_store.end_cycle();

        self.lb_store.begin_cycle();
        for lb in translation.load_balancers {
            self.lb_store.set(lb.key(), lb);
        }
        self.lb_store.end_cycle();

        self.apply_plan().await;
    }

    /// Rebuilds `local_endpoints` from scratch (kernel-authoritative) and
    /// seeds `last_applied` for anything the kernel already holds — this is
    /// how the reconciler recovers across a restart without persisted state.
    async fn refresh_kernel_observations(&mut self) {
        match self.gateway.list_endpoints().await {
            Ok(endpoints) => {
                self.local_endpoints.clear();
                for endpoint in endpoints {
                    let key = endpoint.key();
                    if endpoint.is_local {
                        self.local_endpoints.insert(key, endpoint);
                        continue;
                    }
                    if let Some(id) = endpoint.id.clone() {
                        self.endpoint_id_map.insert(key.clone(), id);
                    }
                    self.ep_store.seed_last_applied(key, endpoint);
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to list endpoints from kernel"),
        }

        match self.gateway.list_load_balancers().await {
            Ok(load_balancers) => {
                for lb in load_balancers {
                    let key = lb.key();
                    if let Some(id) = lb.id.clone() {
                        self.load_balancer_id_map.insert(key.clone(), id);
                    }
                    self.lb_store.seed_last_applied(key, lb);
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to list load balancers from kernel"),
        }
    }

    /// Mandatory order: delete LBs, delete endpoints, upsert endpoints,
    /// upsert LBs. Never reordered, even under failures. An LB whose
    /// backend set changed keeps the same key and is classified as an
    /// update rather than a delete-then-create, so `delete_load_balancers`
    /// has to tear down the outgoing version of updated LBs too, not just
    /// the ones going away outright — otherwise the kernel would still
    /// reference an endpoint after `delete_endpoints` removes it.
    async fn apply_plan(&mut self) {
        let lb_pending_create = self.delete_load_balancers().await;
        self.delete_endpoints().await;
        self.upsert_endpoints().await;
        self.upsert_load_balancers(&lb_pending_create).await;
    }

    /// Deletes the outgoing version of every LB in `deleted()` or
    /// `updated()`, before any endpoint is deleted. `deleted()` entries are
    /// committed here since nothing will replace them; `updated()` entries
    /// are left uncommitted and returned so `upsert_load_balancers` knows
    /// to issue a plain create for them instead of delete-then-create.
    async fn delete_load_balancers(&mut self) -> HashSet<String> {
        let updated: HashSet<String> = self.lb_store.updated().into_iter().collect();
        let mut keys = self.lb_store.deleted();
        keys.extend(updated.iter().cloned());

        let mut pending_create = HashSet::new();
        for key in keys {
            let Some(mut lb) = self.lb_store.last_applied(&key).cloned() else {
                continue;
            };
            lb.id = self.load_balancer_id_map.get(&key).cloned();

            match self.gateway.delete_load_balancer(&mut lb).await {
                Ok(()) | Err(GatewayError::NotFound) => {
                    self.load_balancer_id_map.remove(&key);
                    if updated.contains(&key) {
                        pending_create.insert(key);
                    } else {
                        self.lb_store.commit(&key);
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, lb = %key, "failed to delete load balancer, retrying next cycle");
                }
            }
        }
        pending_create
    }

    async fn delete_endpoints(&mut self) {
        for key in self.ep_store.deleted() {
            let Some(mut endpoint) = self.ep_store.last_applied(&key).cloned() else {
                continue;
            };
            endpoint.id = self.endpoint_id_map.get(&key).cloned();

            match self.gateway.delete_endpoint(&self.network, &mut endpoint).await {
                Ok(()) | Err(GatewayError::NotFound) => {
                    self.endpoint_id_map.remove(&key);
                    self.ep_store.commit(&key);
                }
                Err(GatewayError::Refused(reason)) => {
                    tracing::debug!(endpoint = %key, reason, "kernel refused endpoint delete, treating as success");
                    self.endpoint_id_map.remove(&key);
                    self.ep_store.commit(&key);
                }
                Err(err) => {
                    tracing::warn!(error = %err, endpoint = %key, "failed to delete endpoint, retrying next cycle");
                }
            }
        }
    }

    async fn upsert_endpoints(&mut self) {
        let mut keys = self.ep_store.created();
        keys.extend(self.ep_store.updated());

        for key in keys {
            let Some(mut endpoint) = self.ep_store.desired(&key).cloned() else {
                continue;
            };
            let is_update = self.ep_store.last_applied(&key).is_some();

            let result = if is_update {
                endpoint.id = self.endpoint_id_map.get(&key).cloned();
                self.gateway.update_endpoint(&self.network, &mut endpoint).await
            } else {
                self.gateway.create_endpoint(&self.network, &mut endpoint).await
            };

            match result {
                Ok(()) => {
                    if let Some(id) = endpoint.id.clone() {
                        self.endpoint_id_map.insert(key.clone(), id);
                    }
                    self.ep_store.commit(&key);
                }
                Err(err) => {
                    tracing::warn!(error = %err, endpoint = %key, "failed to create/update endpoint, retrying next cycle");
                }
            }
        }
    }

    /// Resolves each LB's backend keys to kernel ids immediately before the
    /// call. A still-unresolved backend (its `create_endpoint` hasn't
    /// landed yet) skips the LB for this cycle. `lb_pending_create` holds
    /// the updated LBs whose outgoing version `delete_load_balancers`
    /// already tore down this cycle; an updated LB not in that set had its
    /// delete fail or get deferred, so it is skipped here too and retried
    /// whole, from the delete, next cycle.
    async fn upsert_load_balancers(&mut self, lb_pending_create: &HashSet<String>) {
        let mut keys = self.lb_store.created();
        keys.extend(self.lb_store.updated().into_iter().filter(|key| lb_pending_create.contains(key)));

        for key in keys {
            let Some(mut lb) = self.lb_store.desired(&key).cloned() else {
                continue;
            };

            let mut endpoint_ids = Vec::with_capacity(lb.endpoint_keys.len());
            let mut unresolved = false;
            for endpoint_key in &lb.endpoint_keys {
                if let Some(id) = self
                    .local_endpoints
                    .get(endpoint_key)
                    .and_then(|e| e.id.clone())
                    .or_else(|| self.endpoint_id_map.get(endpoint_key).cloned())
                {
                    endpoint_ids.push(id);
                } else {
                    unresolved = true;
                    break;
                }
            }
            if unresolved {
                tracing::debug!(lb = %key, "load balancer references an unresolved endpoint, retrying next cycle");
                continue;
            }
            lb.endpoint_ids = endpoint_ids;

            // The outgoing version of any updated LB was already deleted in
            // `delete_load_balancers`, so every LB reaching this point is a
            // plain create, never `update_load_balancer`'s delete-then-create.
            let result = self.gateway.create_load_balancer(&mut lb).await;

            match result {
                Ok(()) => {
                    if let Some(id) = lb.id.clone() {
                        self.load_balancer_id_map.insert(key.clone(), id);
                    }
                    self.lb_store.commit(&key);
                }
                Err(err) => {
                    tracing::warn!(error = %err, lb = %key, "failed to create/update load balancer, retrying next cycle");
                }
            }
        }
    }
}
