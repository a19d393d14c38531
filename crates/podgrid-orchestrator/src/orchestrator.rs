//! Pod lifecycle: apply, remove, and single-container operations.

use std::sync::Arc;

use podgrid_discovery::Discovery;
use podgrid_engine::{EngineError, EnginePool, labels};
use podgrid_scheduler::NodeRegistry;
use podgrid_state::{Container, ContainerStatus, PodSpec, epoch_secs};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, OrchestratorResult};

/// Outcome of an apply. The container record is always present; `error`
/// is set when the engine failed part-way and `container.status` says
/// where.
#[derive(Debug)]
pub struct Applied {
    pub container: Container,
    pub error: Option<EngineError>,
}

impl Applied {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// What a pod removal did to each of its containers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    pub pod: String,
    /// Containers deleted from their host (or already gone).
    pub removed: Vec<String>,
    /// Containers whose engine delete failed. Their registry entries are
    /// dropped anyway.
    pub failed: Vec<String>,
}

/// Stateless coordinator over the node registry, discovery and engines.
///
/// Cheap to clone; clones share the store handle and the engine pool.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) nodes: NodeRegistry,
    pub(crate) discovery: Discovery,
    pub(crate) engines: Arc<EnginePool>,
}

impl Orchestrator {
    pub fn new(nodes: NodeRegistry, discovery: Discovery, engines: Arc<EnginePool>) -> Self {
        Self {
            nodes,
            discovery,
            engines,
        }
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    pub fn engines(&self) -> &EnginePool {
        &self.engines
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Registered hosts, or the default endpoint when none are.
    pub async fn list_nodes(&self) -> OrchestratorResult<Vec<String>> {
        Ok(self.nodes.effective_hosts().await?)
    }

    pub async fn register_node(&self, host: &str) -> OrchestratorResult<bool> {
        validate_node(host)?;
        Ok(self.nodes.register(host.trim()).await?)
    }

    pub async fn unregister_node(&self, host: &str) -> OrchestratorResult<bool> {
        validate_node(host)?;
        Ok(self.nodes.unregister(host.trim()).await?)
    }

    // ── Pods ───────────────────────────────────────────────────────

    pub async fn get_pod(&self, pod_name: &str) -> OrchestratorResult<PodSpec> {
        self.discovery
            .get_pod(pod_name)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("pod {pod_name}")))
    }

    /// Persist `pod`, place it and create its container.
    ///
    /// Engine failures do not fail the call: the partially-created record
    /// is registered with a failure status and returned alongside the
    /// engine error. Store failures before the engine is touched do fail
    /// it.
    pub async fn apply(&self, pod: PodSpec) -> OrchestratorResult<Applied> {
        validate_pod(&pod)?;
        self.discovery.register_pod(&pod).await?;
        let port = self.discovery.allocate_port(&pod.name).await;
        let host = self.nodes.pick_host(&pod).await?;
        info!(pod = %pod.name, image = %pod.image, %host, port, "applying pod");

        let (mut container, error) = match self.engines.acquire(&host).await {
            Ok(engine) => match engine.create(&pod, port).await {
                Ok(container) => (container, None),
                Err(failure) => (*failure.container, Some(failure.error)),
            },
            Err(e) => {
                warn!(pod = %pod.name, %host, error = %e, "engine host unavailable");
                (unplaced(&pod, port, &host), Some(e))
            }
        };

        // Failed creates have no engine id; the name stands in so the
        // record can still be indexed and found.
        if container.container_id.is_empty() {
            container.container_id = container.name.clone();
        }

        if let Err(e) = self.discovery.register(&container).await {
            warn!(
                pod = %pod.name,
                container = %container.name,
                error = %e,
                "applied container not recorded"
            );
        }

        match &error {
            None => info!(
                pod = %pod.name,
                container = %container.name,
                status = %container.status,
                "pod applied"
            ),
            Some(e) => warn!(
                pod = %pod.name,
                container = %container.name,
                status = %container.status,
                error = %e,
                "pod apply failed"
            ),
        }
        Ok(Applied { container, error })
    }

    /// Tear down every container of a pod and forget its spec.
    ///
    /// Each container is deleted on its host first, then unregistered.
    /// Individual delete failures are reported, not returned.
    pub async fn remove(&self, pod_name: &str) -> OrchestratorResult<RemovalReport> {
        self.discovery.unregister_pod(pod_name).await?;

        let mut containers = self.discovery.containers_by_pod(pod_name).await?;
        if containers.is_empty() {
            debug!(pod = %pod_name, "no registered containers, scanning fleet");
            self.reconcile().await?;
            containers = self.discovery.containers_by_pod(pod_name).await?;
        }
        if containers.is_empty() {
            return Err(OrchestratorError::NotFound(format!(
                "no containers found for pod {pod_name}"
            )));
        }

        let mut report = RemovalReport {
            pod: pod_name.to_string(),
            ..Default::default()
        };
        for container in containers {
            let label = if container.name.is_empty() {
                container.container_id.clone()
            } else {
                container.name.clone()
            };

            match self.delete_on_engine(&container).await {
                Ok(()) => report.removed.push(label),
                Err(e) => {
                    warn!(
                        pod = %pod_name,
                        container = %label,
                        error = %e,
                        "container delete failed"
                    );
                    report.failed.push(label);
                }
            }
            self.discovery.unregister(&container).await?;
        }

        info!(
            pod = %pod_name,
            removed = report.removed.len(),
            failed = report.failed.len(),
            "pod removed"
        );
        Ok(report)
    }

    /// Delete one container. The registry entry goes first, so a failed
    /// engine delete still leaves the registry showing the intent.
    pub async fn delete_container(&self, container_name: &str) -> OrchestratorResult<Container> {
        let container = self.resolve(container_name).await?;
        self.discovery.unregister(&container).await?;
        self.delete_on_engine(&container).await?;
        info!(container = %container_name, host = %container.host, "container deleted");
        Ok(container)
    }

    /// Restart one container in place. The registry is not touched.
    pub async fn restart_container(&self, container_name: &str) -> OrchestratorResult<Container> {
        let container = self.resolve(container_name).await?;
        let engine = self.engines.acquire(&container.host).await?;
        engine.restart(&container.container_id).await?;
        info!(container = %container_name, host = %container.host, "container restarted");
        Ok(container)
    }

    /// Replace a container with a fresh one from its pod's stored spec.
    pub async fn rebuild_container(&self, container_name: &str) -> OrchestratorResult<Applied> {
        let old = self.resolve(container_name).await?;
        let pod = self.get_pod(&old.pod).await?;

        if let Err(e) = self.delete_on_engine(&old).await {
            warn!(
                container = %container_name,
                error = %e,
                "old container not deleted, rebuilding anyway"
            );
        }
        self.discovery.unregister(&old).await?;

        info!(container = %container_name, pod = %pod.name, "rebuilding container");
        self.apply(pod).await
    }

    pub(crate) async fn resolve(&self, container_name: &str) -> OrchestratorResult<Container> {
        self.discovery
            .discover(container_name)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("container {container_name}")))
    }

    /// Stop and remove on the owning host. A container the engine no
    /// longer knows counts as deleted.
    async fn delete_on_engine(&self, container: &Container) -> OrchestratorResult<()> {
        if container.host.is_empty() {
            return Err(OrchestratorError::NotFound(format!(
                "container {} has no recorded host",
                container.container_id
            )));
        }
        let engine = self.engines.acquire(&container.host).await?;
        match engine.delete(&container.container_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(
                    id = %container.container_id,
                    host = %container.host,
                    "container already gone"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Record for an apply that never reached an engine.
fn unplaced(pod: &PodSpec, port: u16, host: &str) -> Container {
    let container_port = if pod.container_port.is_empty() {
        labels::DEFAULT_CONTAINER_PORT.to_string()
    } else {
        pod.container_port.clone()
    };
    Container {
        pod: pod.name.clone(),
        name: labels::container_name(&pod.name),
        image: pod.image.clone(),
        port: port.to_string(),
        command: pod.cmd.join(" "),
        container_port,
        status: ContainerStatus::CreateFailed,
        host: host.to_string(),
        created_at: epoch_secs(),
        ..Default::default()
    }
}

fn validate_pod(pod: &PodSpec) -> OrchestratorResult<()> {
    let name = pod.name.as_str();
    if name.is_empty() {
        return Err(OrchestratorError::InvalidPod("name is required".into()));
    }
    let valid_name = name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid_name {
        return Err(OrchestratorError::InvalidPod(format!(
            "name {name:?} must be alphanumeric with '-', '_' or '.'"
        )));
    }
    if pod.image.trim().is_empty() {
        return Err(OrchestratorError::InvalidPod(format!("pod {name} has no image")));
    }
    if !pod.container_port.is_empty() && pod.container_port.trim().parse::<u16>().is_err() {
        return Err(OrchestratorError::InvalidPod(format!(
            "container port {:?} is not a port number",
            pod.container_port
        )));
    }
    Ok(())
}

fn validate_node(host: &str) -> OrchestratorResult<()> {
    let host = host.trim();
    match host.split_once("://") {
        Some((scheme, rest)) if !scheme.is_empty() && !rest.is_empty() => Ok(()),
        _ => Err(OrchestratorError::InvalidNode(format!(
            "{host:?} is not an engine endpoint (e.g. tcp://10.0.0.5:2375)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use podgrid_discovery::EPHEMERAL_PORTS;

    use super::*;
    use crate::testing::{HOST_A, HOST_B, Harness};

    fn web() -> PodSpec {
        PodSpec::new("web", "nginx").with_container_port("80")
    }

    #[tokio::test]
    async fn apply_places_and_records_the_pod() {
        let h = Harness::new(&[HOST_A, HOST_B]).await;

        let applied = h.orchestrator.apply(web()).await.unwrap();
        assert!(applied.is_success());
        let c = applied.container;

        assert_eq!(c.pod, "web");
        assert_eq!(c.host, HOST_A, "lowest host wins placement");
        assert_eq!(c.status, ContainerStatus::Running);
        assert_eq!(c.container_port, "80");
        let port: u16 = c.port.parse().unwrap();
        assert!(EPHEMERAL_PORTS.contains(&port));

        assert_eq!(h.orchestrator.get_pod("web").await.unwrap(), web());
        let found = h.orchestrator.discovery().discover(&c.name).await.unwrap().unwrap();
        assert_eq!(found.container_id, c.container_id);
        assert_eq!(h.fleet.containers_on(HOST_A).len(), 1);
        assert!(h.fleet.containers_on(HOST_B).is_empty());
    }

    #[tokio::test]
    async fn reapply_reuses_the_pod_port() {
        let h = Harness::new(&[HOST_A]).await;
        let first = h.orchestrator.apply(web()).await.unwrap().container;
        let second = h.orchestrator.apply(web()).await.unwrap().container;
        assert_eq!(first.port, second.port);
        assert_ne!(first.container_id, second.container_id);
    }

    #[tokio::test]
    async fn failed_apply_is_still_recorded() {
        let h = Harness::new(&[HOST_A]).await;
        h.fleet.fail_image_pulls("nginx");

        let applied = h.orchestrator.apply(web()).await.unwrap();
        assert!(matches!(applied.error, Some(EngineError::ImagePull { .. })));
        let c = applied.container;
        assert_eq!(c.status, ContainerStatus::ImagePullFailed);
        assert_eq!(c.container_id, c.name);

        let found = h.orchestrator.discovery().discover(&c.name).await.unwrap().unwrap();
        assert_eq!(found.status, ContainerStatus::ImagePullFailed);
    }

    #[tokio::test]
    async fn apply_to_unreachable_host_records_create_failure() {
        let h = Harness::new(&[HOST_A]).await;
        h.fleet.mark_unreachable(HOST_A);

        let applied = h.orchestrator.apply(web()).await.unwrap();
        assert!(matches!(applied.error, Some(EngineError::Unreachable { .. })));
        assert_eq!(applied.container.status, ContainerStatus::CreateFailed);
        assert_eq!(applied.container.host, HOST_A);
        assert_eq!(
            h.orchestrator.discovery().containers_by_pod("web").await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn start_failure_and_warnings_are_distinguished() {
        let h = Harness::new(&[HOST_A]).await;
        h.fleet.warn_on_create("kernel does not support swap limit");
        let warned = h.orchestrator.apply(web()).await.unwrap();
        assert!(warned.is_success());
        assert_eq!(warned.container.status, ContainerStatus::Warning);

        h.fleet.fail_starts(true);
        let failed = h.orchestrator.apply(PodSpec::new("api", "nginx")).await.unwrap();
        assert_eq!(failed.container.status, ContainerStatus::StartFailed);
        assert!(matches!(failed.error, Some(EngineError::Start(_))));
    }

    #[tokio::test]
    async fn invalid_pods_are_rejected_before_any_write() {
        let h = Harness::new(&[HOST_A]).await;
        for pod in [
            PodSpec::new("", "nginx"),
            PodSpec::new("web", " "),
            PodSpec::new("we b", "nginx"),
            PodSpec::new("-web", "nginx"),
            PodSpec::new("web", "nginx").with_container_port("http"),
        ] {
            let err = h.orchestrator.apply(pod).await.unwrap_err();
            assert!(matches!(err, OrchestratorError::InvalidPod(_)), "{err}");
        }
        assert!(h.fleet.containers().is_empty());
        assert!(h.orchestrator.get_pod("web").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn remove_deletes_every_container_of_the_pod() {
        let h = Harness::new(&[HOST_A, HOST_B]).await;
        let first = h.orchestrator.apply(web()).await.unwrap().container;
        // Second replica lands on the other host once the first is gone.
        h.orchestrator.unregister_node(HOST_A).await.unwrap();
        let second = h.orchestrator.apply(web()).await.unwrap().container;
        assert_eq!(second.host, HOST_B);

        let report = h.orchestrator.remove("web").await.unwrap();
        assert_eq!(report.removed.len(), 2);
        assert!(report.failed.is_empty());

        assert!(h.fleet.containers().is_empty());
        assert!(h.orchestrator.discovery().containers_by_pod("web").await.unwrap().is_empty());
        assert!(h.orchestrator.discovery().discover(&first.name).await.unwrap().is_none());
        assert!(h.orchestrator.get_pod("web").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn remove_of_unknown_pod_is_not_found() {
        let h = Harness::new(&[HOST_A]).await;
        h.fleet.seed(HOST_A, "stray", "busybox", Default::default());

        let err = h.orchestrator.remove("ghost").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(h.fleet.containers().len(), 1);
    }

    #[tokio::test]
    async fn remove_finds_unregistered_containers_by_fleet_scan() {
        let h = Harness::new(&[HOST_A]).await;
        let id = h.fleet.seed_pod_container(HOST_A, "cache", "cache-00aa11", 50001);

        let report = h.orchestrator.remove("cache").await.unwrap();
        assert_eq!(report.removed, ["cache-00aa11"]);
        assert!(h.fleet.get(&id).is_none());
    }

    #[tokio::test]
    async fn remove_reports_failed_deletes_but_clears_registry() {
        // Remove acts first, then unregisters, even when the act fails.
        let h = Harness::new(&[HOST_A]).await;
        let c = h.orchestrator.apply(web()).await.unwrap().container;
        h.fleet.fail_deletes_on(HOST_A);

        let report = h.orchestrator.remove("web").await.unwrap();
        assert_eq!(report.failed, [c.name.clone()]);
        assert!(report.removed.is_empty());
        assert!(h.fleet.get(&c.container_id).is_some());
        assert!(h.orchestrator.discovery().discover(&c.name).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_container_unregisters_before_acting() {
        // DeleteContainer unregisters first: a failed engine delete still
        // leaves the registry without the entry.
        let h = Harness::new(&[HOST_A]).await;
        let c = h.orchestrator.apply(web()).await.unwrap().container;
        h.fleet.fail_deletes_on(HOST_A);

        let err = h.orchestrator.delete_container(&c.name).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Engine(EngineError::Remove(_))));
        assert!(h.orchestrator.discovery().discover(&c.name).await.unwrap().is_none());
        assert!(h.fleet.get(&c.container_id).is_some());
    }

    #[tokio::test]
    async fn delete_container_removes_it_everywhere() {
        let h = Harness::new(&[HOST_A]).await;
        let c = h.orchestrator.apply(web()).await.unwrap().container;

        let deleted = h.orchestrator.delete_container(&c.name).await.unwrap();
        assert_eq!(deleted.container_id, c.container_id);
        assert!(h.fleet.get(&c.container_id).is_none());
        assert!(h.orchestrator.discovery().containers_by_pod("web").await.unwrap().is_empty());

        let err = h.orchestrator.delete_container(&c.name).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn restart_leaves_registry_untouched() {
        let h = Harness::new(&[HOST_A]).await;
        let c = h.orchestrator.apply(web()).await.unwrap().container;

        h.orchestrator.restart_container(&c.name).await.unwrap();
        assert_eq!(h.fleet.restart_count(&c.container_id), Some(1));
        let found = h.orchestrator.discovery().discover(&c.name).await.unwrap().unwrap();
        assert_eq!(found, c);

        assert!(h.orchestrator.restart_container("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn rebuild_yields_a_new_identity_for_the_same_pod() {
        let h = Harness::new(&[HOST_A]).await;
        let old = h.orchestrator.apply(web()).await.unwrap().container;

        let rebuilt = h.orchestrator.rebuild_container(&old.name).await.unwrap();
        assert!(rebuilt.is_success());
        let new = rebuilt.container;
        assert_eq!(new.pod, "web");
        assert_ne!(new.container_id, old.container_id);
        assert_eq!(new.port, old.port);

        assert!(h.fleet.get(&old.container_id).is_none());
        assert!(h.orchestrator.discovery().discover(&old.name).await.unwrap().is_none());
        let members = h.orchestrator.discovery().containers_by_pod("web").await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].container_id, new.container_id);
    }

    #[tokio::test]
    async fn rebuild_needs_the_stored_pod() {
        let h = Harness::new(&[HOST_A]).await;
        let c = h.orchestrator.apply(web()).await.unwrap().container;
        h.orchestrator.discovery().unregister_pod("web").await.unwrap();

        let err = h.orchestrator.rebuild_container(&c.name).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(h.fleet.get(&c.container_id).is_some(), "nothing deleted");
    }

    #[tokio::test]
    async fn node_membership_round_trip() {
        let h = Harness::new(&[HOST_A]).await;
        assert!(h.orchestrator.register_node(HOST_B).await.unwrap());
        assert!(!h.orchestrator.register_node(HOST_B).await.unwrap());
        assert_eq!(h.orchestrator.list_nodes().await.unwrap(), [HOST_A, HOST_B]);

        assert!(h.orchestrator.unregister_node(HOST_A).await.unwrap());
        assert!(h.orchestrator.unregister_node(HOST_B).await.unwrap());
        assert_eq!(
            h.orchestrator.list_nodes().await.unwrap(),
            [h.orchestrator.nodes().default_host()]
        );

        for bad in ["", "localhost", "tcp://"] {
            let err = h.orchestrator.register_node(bad).await.unwrap_err();
            assert!(matches!(err, OrchestratorError::InvalidNode(_)));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_applies_share_one_port() {
        let h = Harness::new(&[HOST_A]).await;
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let orchestrator = h.orchestrator.clone();
                tokio::spawn(async move { orchestrator.apply(web()).await })
            })
            .collect();

        let mut ports = Vec::new();
        for task in tasks {
            let applied = task.await.unwrap().unwrap();
            assert!(applied.is_success());
            ports.push(applied.container.port);
        }
        ports.dedup();
        assert_eq!(ports.len(), 1);
        assert_eq!(h.fleet.containers_on(HOST_A).len(), 8);
    }
}
