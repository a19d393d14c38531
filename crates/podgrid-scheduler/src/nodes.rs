//! Node registry - the set of container-engine hosts eligible for placement.
//!
//! Membership is a plain set of engine endpoint URIs. There is no per-node
//! metadata and no expiry: hosts come and go only through `register` and
//! `unregister`.

use podgrid_state::{KvStore, PodSpec, SharedStore, StateResult, keys};
use tracing::{debug, info};

use crate::placement;

/// Engine endpoint used when the fleet is empty.
pub const DEFAULT_ENGINE_HOST: &str = "tcp://localhost:2375";

/// Store-backed registry of engine hosts.
#[derive(Clone)]
pub struct NodeRegistry {
    store: SharedStore,
    default_host: String,
}

impl NodeRegistry {
    /// Open the registry with the stock default endpoint.
    pub async fn new(store: SharedStore) -> StateResult<Self> {
        Self::with_default_host(store, DEFAULT_ENGINE_HOST).await
    }

    /// Open the registry, seeding `default_host` if no node is registered yet.
    pub async fn with_default_host(
        store: SharedStore,
        default_host: impl Into<String>,
    ) -> StateResult<Self> {
        let registry = Self {
            store,
            default_host: default_host.into(),
        };
        if registry.list_hosts().await?.is_empty() {
            registry.store.set_add(keys::NODES, &registry.default_host).await?;
            info!(host = %registry.default_host, "seeded empty node registry");
        }
        Ok(registry)
    }

    /// Endpoint substituted when the registry is empty.
    pub fn default_host(&self) -> &str {
        &self.default_host
    }

    /// Current membership, sorted. May be empty.
    pub async fn list_hosts(&self) -> StateResult<Vec<String>> {
        self.store.set_members(keys::NODES).await
    }

    /// Current membership, or the default endpoint if none is registered.
    pub async fn effective_hosts(&self) -> StateResult<Vec<String>> {
        let hosts = self.list_hosts().await?;
        if hosts.is_empty() {
            debug!(default = %self.default_host, "node set empty, using default endpoint");
            return Ok(vec![self.default_host.clone()]);
        }
        Ok(hosts)
    }

    /// Add a host. Returns false if it was already registered.
    pub async fn register(&self, host: &str) -> StateResult<bool> {
        let added = self.store.set_add(keys::NODES, host).await?;
        if added {
            info!(%host, "node registered");
        }
        Ok(added)
    }

    /// Remove a host. Returns false if it was not registered.
    pub async fn unregister(&self, host: &str) -> StateResult<bool> {
        let removed = self.store.set_remove(keys::NODES, host).await?;
        if removed {
            info!(%host, "node unregistered");
        }
        Ok(removed)
    }

    /// Choose the host a pod should run on.
    pub async fn pick_host(&self, pod: &PodSpec) -> StateResult<String> {
        let hosts = self.list_hosts().await?;
        let host = placement::pick(pod, &hosts, &self.default_host).to_string();
        debug!(pod = %pod.name, %host, candidates = hosts.len(), "host picked");
        Ok(host)
    }
}
