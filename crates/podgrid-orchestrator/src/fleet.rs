//! Fleet-wide reads and reconciliation.

use futures_util::future::join_all;
use podgrid_state::{Container, epoch_secs};
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::orchestrator::Orchestrator;

impl Orchestrator {
    /// Query every host's engine directly and re-register every container
    /// that carries a pod label. Returns everything the engines reported.
    ///
    /// Unreachable hosts are logged and skipped. With no registered nodes
    /// the default endpoint is scanned.
    pub async fn reconcile(&self) -> OrchestratorResult<Vec<Container>> {
        let hosts = self.nodes.effective_hosts().await?;
        let scans = join_all(hosts.iter().map(|host| self.scan_host(host))).await;

        let mut all = Vec::new();
        let mut registered = 0usize;
        for containers in scans.into_iter().flatten() {
            for container in &containers {
                if container.pod.is_empty() {
                    continue;
                }
                match self.discovery.register(container).await {
                    Ok(()) => registered += 1,
                    Err(e) => {
                        warn!(
                            container = %container.name,
                            host = %container.host,
                            error = %e,
                            "reconcile could not register container"
                        );
                    }
                }
            }
            all.extend(containers);
        }

        info!(hosts = hosts.len(), found = all.len(), registered, "fleet reconciled");
        Ok(all)
    }

    /// Every container on every host. Also a reconciliation pass.
    pub async fn list_all_containers(&self) -> OrchestratorResult<Vec<Container>> {
        self.reconcile().await
    }

    async fn scan_host(&self, host: &str) -> Option<Vec<Container>> {
        let engine = match self.engines.acquire(host).await {
            Ok(engine) => engine,
            Err(e) => {
                warn!(%host, error = %e, "skipping host during fleet scan");
                return None;
            }
        };
        match engine.list_containers().await {
            Ok(containers) => {
                debug!(%host, count = containers.len(), "host scanned");
                Some(containers)
            }
            Err(e) => {
                warn!(%host, error = %e, "listing containers failed during fleet scan");
                None
            }
        }
    }

    /// Containers of `pod_name`, refreshed against their engines.
    ///
    /// Falls back to a fleet scan when the registry has nothing for the
    /// pod. Records the engine no longer knows are unregistered and left
    /// out. Records of applies that failed before the engine created
    /// anything are returned as stored. An empty result means the pod has
    /// no containers anywhere.
    pub async fn containers_by_pod(&self, pod_name: &str) -> OrchestratorResult<Vec<Container>> {
        let mut records = self.discovery.containers_by_pod(pod_name).await?;
        if records.is_empty() {
            debug!(pod = %pod_name, "registry empty for pod, scanning fleet");
            self.reconcile().await?;
            records = self.discovery.containers_by_pod(pod_name).await?;
        }

        let mut live = Vec::with_capacity(records.len());
        for mut record in records {
            if !record.is_placed() || !record.status.has_engine_container() {
                record.refresh_age(epoch_secs());
                live.push(record);
                continue;
            }

            let inspected = match self.engines.acquire(&record.host).await {
                Ok(engine) => engine.inspect(&record.container_id).await,
                Err(e) => Err(e),
            };
            match inspected {
                Ok(inspected) => {
                    inspected.apply_to(&mut record);
                    live.push(record);
                }
                Err(e) if e.is_not_found() => {
                    info!(
                        pod = %pod_name,
                        container = %record.name,
                        "container gone from engine, unregistering"
                    );
                    self.discovery.unregister(&record).await?;
                }
                Err(e) => {
                    warn!(
                        pod = %pod_name,
                        container = %record.name,
                        error = %e,
                        "live refresh failed, using stored record"
                    );
                    record.refresh_age(epoch_secs());
                    live.push(record);
                }
            }
        }
        Ok(live)
    }

    /// The engine's raw inspect document for a registered container.
    pub async fn inspect(&self, container_name: &str) -> OrchestratorResult<serde_json::Value> {
        let container = self.resolve(container_name).await?;
        if container.host.is_empty() {
            return Err(OrchestratorError::NotFound(format!(
                "container {container_name} has no recorded host"
            )));
        }
        let engine = self.engines.acquire(&container.host).await?;
        Ok(engine.inspect(&container.container_id).await?.raw)
    }
}
