//! In-process engine fleet.
//!
//! Every host address maps to its own container table inside one shared
//! [`MemoryFleet`]. Tests reach into the fleet to inject failures and to
//! check what the orchestrator actually did on each host.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use podgrid_state::{Container, ContainerStatus, epoch_secs};
use serde_json::json;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::labels::{self, Observed};
use crate::provider::{CreateRequest, Created, EngineConnector, EngineProvider, InspectedContainer};

/// One container held by the in-memory fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    pub status: ContainerStatus,
    pub labels: HashMap<String, String>,
    pub created_at: i64,
    pub restarts: u32,
}

impl MemoryContainer {
    pub fn pod(&self) -> Option<&str> {
        self.labels.get(labels::POD).map(String::as_str)
    }

    fn observed(&self) -> Observed<'_> {
        Observed {
            id: &self.id,
            name: &self.name,
            image: &self.image,
            state: self.status.as_str(),
            command: "",
            created_at: self.created_at,
            labels: &self.labels,
        }
    }
}

#[derive(Debug, Default)]
struct FleetState {
    /// host -> id -> container
    hosts: BTreeMap<String, BTreeMap<String, MemoryContainer>>,
    unreachable: HashSet<String>,
    failing_pulls: HashSet<String>,
    failing_starts: bool,
    create_warnings: Vec<String>,
    failing_deletes: HashSet<String>,
    next_id: u64,
    connects: usize,
}

impl FleetState {
    fn check_reachable(&self, host: &str) -> EngineResult<()> {
        if self.unreachable.contains(host) {
            return Err(EngineError::Unreachable {
                host: host.to_string(),
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }

    fn host_mut(&mut self, host: &str) -> &mut BTreeMap<String, MemoryContainer> {
        self.hosts.entry(host.to_string()).or_default()
    }

    /// Resolve by id first, then by name.
    fn find_mut(&mut self, host: &str, id_or_name: &str) -> EngineResult<&mut MemoryContainer> {
        let containers = self.host_mut(host);
        let key = if containers.contains_key(id_or_name) {
            Some(id_or_name.to_string())
        } else {
            containers
                .values()
                .find(|c| c.name == id_or_name)
                .map(|c| c.id.clone())
        };
        key.and_then(|k| containers.get_mut(&k))
            .ok_or_else(|| EngineError::NotFound(id_or_name.to_string()))
    }

    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("mem-{:012x}", self.next_id)
    }
}

/// A fleet of in-memory engine hosts. Cloning shares the fleet.
#[derive(Debug, Clone, Default)]
pub struct MemoryFleet {
    state: Arc<Mutex<FleetState>>,
}

impl MemoryFleet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FleetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuse connections and calls to `host`.
    pub fn mark_unreachable(&self, host: &str) {
        self.lock().unreachable.insert(host.to_string());
    }

    pub fn mark_reachable(&self, host: &str) {
        self.lock().unreachable.remove(host);
    }

    /// Make pulls of `image` fail. Matched after reference normalisation,
    /// so `nginx` also covers `docker.io/nginx:latest`.
    pub fn fail_image_pulls(&self, image: &str) {
        self.lock()
            .failing_pulls
            .insert(labels::image_reference(image));
    }

    /// Make every start call fail.
    pub fn fail_starts(&self, fail: bool) {
        self.lock().failing_starts = fail;
    }

    /// Attach `warning` to every subsequent create.
    pub fn warn_on_create(&self, warning: &str) {
        self.lock().create_warnings.push(warning.to_string());
    }

    /// Make deletes on `host` fail.
    pub fn fail_deletes_on(&self, host: &str) {
        self.lock().failing_deletes.insert(host.to_string());
    }

    /// Place a running container on `host` directly, bypassing any
    /// registry. Returns its id.
    pub fn seed(
        &self,
        host: &str,
        name: &str,
        image: &str,
        container_labels: HashMap<String, String>,
    ) -> String {
        let mut state = self.lock();
        let id = state.allocate_id();
        let container = MemoryContainer {
            id: id.clone(),
            name: name.to_string(),
            image: image.to_string(),
            cmd: Vec::new(),
            status: ContainerStatus::Running,
            labels: container_labels,
            created_at: epoch_secs(),
            restarts: 0,
        };
        state.host_mut(host).insert(id.clone(), container);
        id
    }

    /// Seed a container labelled as belonging to `pod`.
    pub fn seed_pod_container(&self, host: &str, pod: &str, name: &str, port: u16) -> String {
        let labels = labels::for_pod(pod, port, labels::DEFAULT_CONTAINER_PORT, host);
        self.seed(host, name, "docker.io/library/nginx:latest", labels)
    }

    /// Drop a container behind the registry's back.
    pub fn forget(&self, id: &str) -> bool {
        self.lock()
            .hosts
            .values_mut()
            .any(|containers| containers.remove(id).is_some())
    }

    /// Every container in the fleet, as `(host, container)`.
    pub fn containers(&self) -> Vec<(String, MemoryContainer)> {
        self.lock()
            .hosts
            .iter()
            .flat_map(|(host, containers)| {
                containers.values().map(move |c| (host.clone(), c.clone()))
            })
            .collect()
    }

    pub fn containers_on(&self, host: &str) -> Vec<MemoryContainer> {
        self.lock()
            .hosts
            .get(host)
            .map(|containers| containers.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Option<MemoryContainer> {
        self.lock()
            .hosts
            .values()
            .find_map(|containers| containers.get(id).cloned())
    }

    pub fn restart_count(&self, id: &str) -> Option<u32> {
        self.get(id).map(|c| c.restarts)
    }

    /// Successful connects so far, across all hosts.
    pub fn connects(&self) -> usize {
        self.lock().connects
    }
}

#[async_trait]
impl EngineConnector for MemoryFleet {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self, host: &str) -> EngineResult<Box<dyn EngineProvider>> {
        let mut state = self.lock();
        state.check_reachable(host)?;
        state.connects += 1;
        state.host_mut(host);
        Ok(Box::new(MemoryEngine {
            host: host.to_string(),
            fleet: self.clone(),
        }))
    }
}

/// Provider for one host of a [`MemoryFleet`].
pub struct MemoryEngine {
    host: String,
    fleet: MemoryFleet,
}

impl MemoryEngine {
    fn state(&self) -> EngineResult<MutexGuard<'_, FleetState>> {
        let state = self.fleet.lock();
        state.check_reachable(&self.host)?;
        Ok(state)
    }
}

#[async_trait]
impl EngineProvider for MemoryEngine {
    fn host(&self) -> &str {
        &self.host
    }

    async fn list_containers(&self) -> EngineResult<Vec<Container>> {
        let state = self.state()?;
        Ok(state
            .hosts
            .get(&self.host)
            .map(|containers| {
                containers
                    .values()
                    .map(|c| {
                        let mut record = labels::to_container(c.observed(), &self.host);
                        record.command = c.cmd.join(" ");
                        record
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn inspect(&self, id: &str) -> EngineResult<InspectedContainer> {
        let mut state = self.state()?;
        let c = state.find_mut(&self.host, id)?.clone();
        let raw = json!({
            "Id": c.id,
            "Name": format!("/{}", c.name),
            "Config": { "Image": c.image, "Cmd": c.cmd, "Labels": c.labels },
            "State": { "Status": c.status.as_str() },
            "RestartCount": c.restarts,
        });
        Ok(InspectedContainer {
            id: c.id,
            name: c.name,
            image: c.image,
            status: c.status,
            command: c.cmd.join(" "),
            created_at: c.created_at,
            labels: c.labels,
            raw,
        })
    }

    async fn pull_image(&self, image: &str) -> EngineResult<()> {
        let state = self.state()?;
        if state.failing_pulls.contains(image) {
            return Err(EngineError::ImagePull {
                image: image.to_string(),
                reason: "manifest unknown".into(),
            });
        }
        Ok(())
    }

    async fn create_container(&self, request: &CreateRequest) -> EngineResult<Created> {
        let mut state = self.state()?;
        if state
            .host_mut(&self.host)
            .values()
            .any(|c| c.name == request.name)
        {
            return Err(EngineError::Create(format!(
                "container name {} is already in use",
                request.name
            )));
        }

        let id = state.allocate_id();
        let warnings = state.create_warnings.clone();
        let container = MemoryContainer {
            id: id.clone(),
            name: request.name.clone(),
            image: request.image.clone(),
            cmd: request.cmd.clone(),
            status: ContainerStatus::Created,
            labels: request.labels.clone(),
            created_at: epoch_secs(),
            restarts: 0,
        };
        state.host_mut(&self.host).insert(id.clone(), container);
        debug!(host = %self.host, id = %id, name = %request.name, "memory container created");
        Ok(Created { id, warnings })
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        let mut state = self.state()?;
        let failing = state.failing_starts;
        let container = state.find_mut(&self.host, id)?;
        if failing {
            container.status = ContainerStatus::Exited;
            return Err(EngineError::Start(format!("{id}: exec format error")));
        }
        container.status = ContainerStatus::Running;
        Ok(())
    }

    async fn delete(&self, id: &str) -> EngineResult<()> {
        let mut state = self.state()?;
        if state.failing_deletes.contains(&self.host) {
            return Err(EngineError::Remove(format!("{id}: device or resource busy")));
        }
        let key = state.find_mut(&self.host, id)?.id.clone();
        state.host_mut(&self.host).remove(&key);
        Ok(())
    }

    async fn restart(&self, id: &str) -> EngineResult<()> {
        let mut state = self.state()?;
        let container = state.find_mut(&self.host, id)?;
        container.restarts += 1;
        container.status = ContainerStatus::Running;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use podgrid_state::PodSpec;

    use super::*;

    const HOST: &str = "tcp://node-a:2375";

    async fn engine(fleet: &MemoryFleet) -> Box<dyn EngineProvider> {
        fleet.connect(HOST).await.unwrap()
    }

    #[tokio::test]
    async fn create_runs_the_container() {
        let fleet = MemoryFleet::new();
        let engine = engine(&fleet).await;

        let pod = PodSpec::new("web", "nginx").with_container_port("80");
        let c = engine.create(&pod, 50100).await.unwrap();

        assert_eq!(c.status, ContainerStatus::Running);
        assert_eq!(c.pod, "web");
        assert_eq!(c.host, HOST);
        assert_eq!(c.port, "50100");
        assert_eq!(c.container_port, "80");
        assert!(c.name.starts_with("web-"));

        let stored = fleet.get(&c.container_id).unwrap();
        assert_eq!(stored.status, ContainerStatus::Running);
        assert_eq!(stored.image, "docker.io/nginx:latest");
        assert_eq!(stored.pod(), Some("web"));
    }

    #[tokio::test]
    async fn create_records_the_failing_step() {
        let fleet = MemoryFleet::new();
        let engine = engine(&fleet).await;

        fleet.fail_image_pulls("broken");
        let failure = engine.create(&PodSpec::new("a", "broken"), 1).await.unwrap_err();
        assert_eq!(failure.container.status, ContainerStatus::ImagePullFailed);
        assert!(failure.container.container_id.is_empty());
        assert!(matches!(failure.error, EngineError::ImagePull { .. }));
        assert!(fleet.containers().is_empty());

        fleet.fail_starts(true);
        let failure = engine.create(&PodSpec::new("b", "nginx"), 2).await.unwrap_err();
        assert_eq!(failure.container.status, ContainerStatus::StartFailed);
        assert!(!failure.container.container_id.is_empty());
        assert_eq!(fleet.containers().len(), 1);

        let failure = engine.create(&PodSpec::new("", "nginx"), 3).await.unwrap_err();
        assert_eq!(failure.container.status, ContainerStatus::CreateFailed);
    }

    #[tokio::test]
    async fn warnings_still_start_the_container() {
        let fleet = MemoryFleet::new();
        fleet.warn_on_create("memory limit ignored");
        let engine = engine(&fleet).await;

        let c = engine.create(&PodSpec::new("web", "nginx"), 1).await.unwrap();
        assert_eq!(c.status, ContainerStatus::Warning);
        assert_eq!(
            fleet.get(&c.container_id).unwrap().status,
            ContainerStatus::Running
        );
    }

    #[tokio::test]
    async fn listing_rebuilds_records_from_labels() {
        let fleet = MemoryFleet::new();
        fleet.seed_pod_container(HOST, "api", "api-abc123", 50200);
        fleet.seed(HOST, "stray", "busybox", HashMap::new());
        let engine = engine(&fleet).await;

        let listed = engine.list_containers().await.unwrap();
        assert_eq!(listed.len(), 2);
        let api = listed.iter().find(|c| c.name == "api-abc123").unwrap();
        assert_eq!(api.pod, "api");
        assert_eq!(api.port, "50200");
        assert_eq!(api.host, HOST);
        assert!(listed.iter().any(|c| c.pod.is_empty()));
    }

    #[tokio::test]
    async fn lifecycle_calls_report_misses() {
        let fleet = MemoryFleet::new();
        let engine = engine(&fleet).await;
        let id = fleet.seed_pod_container(HOST, "web", "web-000001", 1);

        engine.restart(&id).await.unwrap();
        assert_eq!(fleet.restart_count(&id), Some(1));

        let inspected = engine.inspect("web-000001").await.unwrap();
        assert_eq!(inspected.id, id);
        assert_eq!(inspected.raw["State"]["Status"], "running");

        engine.delete(&id).await.unwrap();
        assert!(fleet.get(&id).is_none());
        assert!(engine.delete(&id).await.unwrap_err().is_not_found());
        assert!(engine.restart(&id).await.unwrap_err().is_not_found());
        assert!(engine.inspect(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn unreachable_hosts_refuse_work() {
        let fleet = MemoryFleet::new();
        let engine = engine(&fleet).await;
        fleet.mark_unreachable(HOST);

        assert!(matches!(
            engine.list_containers().await,
            Err(EngineError::Unreachable { .. })
        ));
        assert!(fleet.connect(HOST).await.is_err());

        fleet.mark_reachable(HOST);
        assert!(engine.list_containers().await.is_ok());
        assert_eq!(fleet.connects(), 1);
    }

    #[tokio::test]
    async fn hosts_are_isolated() {
        let fleet = MemoryFleet::new();
        let a = fleet.connect("tcp://a:2375").await.unwrap();
        let b = fleet.connect("tcp://b:2375").await.unwrap();
        let id = fleet.seed_pod_container("tcp://a:2375", "web", "web-1", 1);

        assert!(b.delete(&id).await.unwrap_err().is_not_found());
        assert_eq!(a.list_containers().await.unwrap().len(), 1);
        assert!(b.list_containers().await.unwrap().is_empty());
        assert_eq!(fleet.containers_on("tcp://a:2375").len(), 1);
    }
}
