//! Discovery: persistence for pod specs and container records.

use podgrid_state::{
    Container, KvStore, PodSpec, SharedStore, StateError, StateResult, WriteBatch, keys,
};
use tracing::{debug, info, warn};

use crate::ports;

/// Store-backed container/pod registry.
///
/// Cheap to clone; every clone shares the injected store handle.
#[derive(Clone)]
pub struct Discovery {
    store: SharedStore,
}

impl Discovery {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    // ── Pods ───────────────────────────────────────────────────────

    /// Persist a pod spec, replacing any previous spec with the same name.
    pub async fn register_pod(&self, pod: &PodSpec) -> StateResult<()> {
        let value = serde_json::to_string(pod).map_err(|e| StateError::Serialize(e.to_string()))?;
        self.store.set(&keys::pod_spec(&pod.name), &value).await?;
        debug!(pod = %pod.name, "pod spec stored");
        Ok(())
    }

    /// Delete a pod spec. Returns true if it existed.
    pub async fn unregister_pod(&self, pod_name: &str) -> StateResult<bool> {
        let existed = self.store.delete(&keys::pod_spec(pod_name)).await?;
        debug!(pod = %pod_name, existed, "pod spec deleted");
        Ok(existed)
    }

    pub async fn get_pod(&self, pod_name: &str) -> StateResult<Option<PodSpec>> {
        match self.store.get(&keys::pod_spec(pod_name)).await? {
            Some(raw) => {
                let pod = serde_json::from_str(&raw)
                    .map_err(|e| StateError::Deserialize(e.to_string()))?;
                Ok(Some(pod))
            }
            None => Ok(None),
        }
    }

    /// Host port for `pod_name`. Allocated once per pod name; later calls
    /// return the stored value. Never fails: a store outage yields
    /// [`FALLBACK_PORT`](crate::FALLBACK_PORT).
    pub async fn allocate_port(&self, pod_name: &str) -> u16 {
        ports::allocate(&self.store, pod_name).await
    }

    // ── Containers ─────────────────────────────────────────────────

    /// Record a container: name pointer, full record and pod membership,
    /// committed as one batch.
    pub async fn register(&self, container: &Container) -> StateResult<()> {
        if container.container_id.is_empty() {
            return Err(StateError::InvalidRecord(format!(
                "container {:?} has no id",
                container.name
            )));
        }
        let record = serde_json::to_string(container)
            .map_err(|e| StateError::Serialize(e.to_string()))?;

        let batch = WriteBatch::new()
            .set(keys::container_id(&container.name), &container.container_id)
            .set(keys::container_record(&container.container_id), record)
            .set_add(keys::pod_members(&container.pod), &container.container_id);

        if let Err(e) = self.store.commit(batch).await {
            warn!(container = %container.name, error = %e, "container registration failed");
            return Err(e);
        }
        debug!(
            container = %container.name,
            id = %container.container_id,
            pod = %container.pod,
            "container registered"
        );
        Ok(())
    }

    /// Remove a container's name pointer, record and pod membership as one
    /// batch.
    pub async fn unregister(&self, container: &Container) -> StateResult<()> {
        let batch = WriteBatch::new()
            .delete(keys::container_id(&container.name))
            .delete(keys::container_record(&container.container_id))
            .set_remove(keys::pod_members(&container.pod), &container.container_id);

        if let Err(e) = self.store.commit(batch).await {
            warn!(container = %container.name, error = %e, "container unregistration failed");
            return Err(e);
        }
        info!(container = %container.name, id = %container.container_id, "container unregistered");
        Ok(())
    }

    /// Resolve a container by display name.
    pub async fn discover(&self, container_name: &str) -> StateResult<Option<Container>> {
        let id = match self.store.get(&keys::container_id(container_name)).await? {
            Some(id) if !id.is_empty() => id,
            _ => {
                debug!(container = %container_name, "container not registered");
                return Ok(None);
            }
        };

        match self.store.get(&keys::container_record(&id)).await? {
            Some(raw) => {
                let container = serde_json::from_str(&raw)
                    .map_err(|e| StateError::Deserialize(e.to_string()))?;
                Ok(Some(container))
            }
            None => {
                warn!(container = %container_name, %id, "name points at a missing record");
                Ok(None)
            }
        }
    }

    /// Every container indexed under `pod_name`.
    ///
    /// Best-effort: a member whose record is missing or unreadable comes
    /// back as a placeholder carrying only its id and pod, instead of
    /// failing the whole listing.
    pub async fn containers_by_pod(&self, pod_name: &str) -> StateResult<Vec<Container>> {
        let ids = self.store.set_members(&keys::pod_members(pod_name)).await?;
        let mut containers = Vec::with_capacity(ids.len());
        for id in ids {
            containers.push(self.container_by_id(pod_name, id).await?);
        }
        Ok(containers)
    }

    async fn container_by_id(&self, pod_name: &str, id: String) -> StateResult<Container> {
        let placeholder = |id: String| Container {
            container_id: id,
            pod: pod_name.to_string(),
            ..Default::default()
        };

        match self.store.get(&keys::container_record(&id)).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(container) => Ok(container),
                Err(e) => {
                    warn!(pod = %pod_name, %id, error = %e, "corrupt container record");
                    Ok(placeholder(id))
                }
            },
            None => {
                warn!(pod = %pod_name, %id, "pod member has no record");
                Ok(placeholder(id))
            }
        }
    }
}
