//! The engine capability the orchestrator depends on.

use std::collections::HashMap;

use async_trait::async_trait;
use podgrid_state::{Container, ContainerStatus, PodSpec, epoch_secs};
use tracing::{debug, info, warn};

use crate::error::{CreateFailure, EngineError, EngineResult};
use crate::labels;

/// Everything a backend needs to create one container for a pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    /// Fully qualified image reference.
    pub image: String,
    pub cmd: Vec<String>,
    pub container_port: String,
    pub host_port: u16,
    pub labels: HashMap<String, String>,
}

impl CreateRequest {
    /// Build the request for `pod` on `host`, applying naming and image
    /// defaults.
    pub fn for_pod(pod: &PodSpec, host_port: u16, host: &str) -> EngineResult<Self> {
        if pod.name.trim().is_empty() {
            return Err(EngineError::InvalidSpec("pod name is empty".into()));
        }
        if pod.image.trim().is_empty() {
            return Err(EngineError::InvalidSpec(format!(
                "pod {} has no image",
                pod.name
            )));
        }

        let container_port = if pod.container_port.trim().is_empty() {
            labels::DEFAULT_CONTAINER_PORT.to_string()
        } else {
            pod.container_port.trim().to_string()
        };
        if container_port.parse::<u16>().is_err() {
            return Err(EngineError::InvalidSpec(format!(
                "container port {container_port:?} is not a port number"
            )));
        }

        Ok(Self {
            name: labels::container_name(&pod.name),
            image: labels::image_reference(&pod.image),
            cmd: pod.cmd.clone(),
            labels: labels::for_pod(&pod.name, host_port, &container_port, host),
            container_port,
            host_port,
        })
    }
}

/// Result of a successful engine create call.
#[derive(Debug, Clone, Default)]
pub struct Created {
    pub id: String,
    pub warnings: Vec<String>,
}

/// Live view of one container as the engine reports it.
#[derive(Debug, Clone)]
pub struct InspectedContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub command: String,
    /// Unix seconds, 0 when the engine did not say.
    pub created_at: i64,
    pub labels: HashMap<String, String>,
    /// The engine's own inspect document.
    pub raw: serde_json::Value,
}

impl InspectedContainer {
    /// Overlay live state onto a registry record.
    pub fn apply_to(&self, container: &mut Container) {
        container.status = self.status;
        if container.container_id.is_empty() {
            container.container_id = self.id.clone();
        }
        if self.created_at > 0 {
            container.created_at = self.created_at;
        }
        container.refresh_age(epoch_secs());
    }
}

/// Container operations against exactly one engine host.
#[async_trait]
pub trait EngineProvider: Send + Sync {
    /// Endpoint this provider talks to.
    fn host(&self) -> &str;

    /// Every container on the host, running or not, rebuilt from labels.
    async fn list_containers(&self) -> EngineResult<Vec<Container>>;

    async fn inspect(&self, id: &str) -> EngineResult<InspectedContainer>;

    async fn pull_image(&self, image: &str) -> EngineResult<()>;

    async fn create_container(&self, request: &CreateRequest) -> EngineResult<Created>;

    async fn start_container(&self, id: &str) -> EngineResult<()>;

    /// Stop, then remove.
    async fn delete(&self, id: &str) -> EngineResult<()>;

    async fn restart(&self, id: &str) -> EngineResult<()>;

    /// Pull, create and start a container for `pod`.
    ///
    /// On failure the returned [`CreateFailure`] still carries a record
    /// whose status says which step failed, so callers can persist it.
    async fn create(&self, pod: &PodSpec, host_port: u16) -> Result<Container, CreateFailure> {
        let mut container = Container {
            pod: pod.name.clone(),
            image: pod.image.clone(),
            port: host_port.to_string(),
            command: pod.cmd.join(" "),
            container_port: pod.container_port.clone(),
            status: ContainerStatus::Creating,
            host: self.host().to_string(),
            created_at: epoch_secs(),
            ..Default::default()
        };

        let request = match CreateRequest::for_pod(pod, host_port, self.host()) {
            Ok(request) => request,
            Err(e) => {
                container.status = ContainerStatus::CreateFailed;
                return Err(CreateFailure::new(container, e));
            }
        };
        container.name = request.name.clone();
        container.container_port = request.container_port.clone();

        if let Err(e) = self.pull_image(&request.image).await {
            warn!(pod = %pod.name, image = %request.image, error = %e, "image pull failed");
            container.status = ContainerStatus::ImagePullFailed;
            return Err(CreateFailure::new(container, e));
        }

        let created = match self.create_container(&request).await {
            Ok(created) => created,
            Err(e) => {
                warn!(pod = %pod.name, name = %request.name, error = %e, "container create failed");
                container.status = ContainerStatus::CreateFailed;
                return Err(CreateFailure::new(container, e));
            }
        };
        container.container_id = created.id.clone();
        debug!(pod = %pod.name, id = %created.id, "container created");

        if let Err(e) = self.start_container(&created.id).await {
            warn!(pod = %pod.name, id = %created.id, error = %e, "container start failed");
            container.status = ContainerStatus::StartFailed;
            return Err(CreateFailure::new(container, e));
        }

        container.status = if created.warnings.is_empty() {
            ContainerStatus::Running
        } else {
            warn!(
                pod = %pod.name,
                id = %created.id,
                warnings = ?created.warnings,
                "engine reported warnings"
            );
            ContainerStatus::Warning
        };
        container.refresh_age(epoch_secs());
        info!(pod = %pod.name, name = %container.name, host = %container.host, "container started");
        Ok(container)
    }
}

/// Opens providers for a host address.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    async fn connect(&self, host: &str) -> EngineResult<Box<dyn EngineProvider>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_applies_defaults() {
        let pod = PodSpec::new("web", "nginx");
        let req = CreateRequest::for_pod(&pod, 50000, "tcp://h:2375").unwrap();
        assert!(req.name.starts_with("web-"));
        assert_eq!(req.image, "docker.io/nginx:latest");
        assert_eq!(req.container_port, "8080");
        assert_eq!(req.labels[labels::POD], "web");
        assert_eq!(req.labels[labels::PORT], "50000");
        assert_eq!(req.labels[labels::CONTAINER_PORT], "8080");
        assert_eq!(req.labels[labels::HOST], "tcp://h:2375");
    }

    #[test]
    fn request_rejects_incomplete_pods() {
        let no_image = PodSpec::new("web", "");
        assert!(matches!(
            CreateRequest::for_pod(&no_image, 1, "h"),
            Err(EngineError::InvalidSpec(_))
        ));

        let bad_port = PodSpec::new("web", "nginx").with_container_port("http");
        assert!(matches!(
            CreateRequest::for_pod(&bad_port, 1, "h"),
            Err(EngineError::InvalidSpec(_))
        ));
    }

    #[test]
    fn inspect_overlays_status() {
        let inspected = InspectedContainer {
            id: "abc".into(),
            name: "web-1".into(),
            image: "nginx".into(),
            status: ContainerStatus::Exited,
            command: String::new(),
            created_at: epoch_secs() - 5,
            labels: HashMap::new(),
            raw: serde_json::Value::Null,
        };
        let mut record = Container {
            pod: "web".into(),
            status: ContainerStatus::Running,
            ..Default::default()
        };
        inspected.apply_to(&mut record);
        assert_eq!(record.status, ContainerStatus::Exited);
        assert_eq!(record.container_id, "abc");
        assert!(!record.age.is_empty());
    }
}
