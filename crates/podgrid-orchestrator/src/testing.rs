//! Shared fixture for orchestrator tests: in-memory store and fleet.

use std::sync::Arc;

use podgrid_discovery::Discovery;
use podgrid_engine::{EnginePool, MemoryFleet};
use podgrid_scheduler::NodeRegistry;
use podgrid_state::{EmbeddedStore, SharedStore};

use crate::Orchestrator;

pub const HOST_A: &str = "tcp://10.0.0.1:2375";
pub const HOST_B: &str = "tcp://10.0.0.2:2375";

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub fleet: MemoryFleet,
    pub store: SharedStore,
}

impl Harness {
    /// Registers exactly `hosts`. With no hosts the registry starts
    /// seeded with its default endpoint.
    pub async fn new(hosts: &[&str]) -> Self {
        let store: SharedStore = Arc::new(EmbeddedStore::open_in_memory().unwrap());
        let nodes = NodeRegistry::new(store.clone()).await.unwrap();
        if !hosts.is_empty() {
            nodes.unregister(nodes.default_host()).await.unwrap();
            for host in hosts {
                nodes.register(host).await.unwrap();
            }
        }

        let fleet = MemoryFleet::new();
        let engines = Arc::new(EnginePool::new(fleet.clone()).with_per_host_limit(4));
        let orchestrator = Orchestrator::new(nodes, Discovery::new(store.clone()), engines);
        Self {
            orchestrator,
            fleet,
            store,
        }
    }
}
