//! Docker Engine backend.
//!
//! Talks to one daemon per host address over its HTTP API. `tcp://` and
//! `http://` addresses connect over TCP, `unix://` addresses over a local
//! socket.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum};
use futures_util::StreamExt;
use podgrid_state::{Container, ContainerStatus};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::labels::{self, Observed};
use crate::provider::{CreateRequest, Created, EngineConnector, EngineProvider, InspectedContainer};

/// Default bound on a single Docker API call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Seconds the daemon waits for a graceful stop before killing.
const STOP_GRACE_SECS: i64 = 10;

/// Opens [`DockerEngine`]s.
#[derive(Debug, Clone)]
pub struct DockerConnector {
    timeout: Duration,
}

impl DockerConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for DockerConnector {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl EngineConnector for DockerConnector {
    fn backend(&self) -> &'static str {
        "docker"
    }

    async fn connect(&self, host: &str) -> EngineResult<Box<dyn EngineProvider>> {
        Ok(Box::new(DockerEngine::connect(host, self.timeout)?))
    }
}

/// One Docker daemon.
pub struct DockerEngine {
    host: String,
    timeout: Duration,
    docker: Docker,
}

impl DockerEngine {
    pub fn connect(host: &str, timeout: Duration) -> EngineResult<Self> {
        let secs = timeout.as_secs().max(1);
        let docker = if let Some(path) = host.strip_prefix("unix://") {
            connect_unix(host, path, secs)?
        } else if host.starts_with("tcp://") || host.starts_with("http://") {
            Docker::connect_with_http(host, secs, bollard::API_DEFAULT_VERSION).map_err(|e| {
                EngineError::Endpoint {
                    host: host.to_string(),
                    reason: e.to_string(),
                }
            })?
        } else {
            return Err(EngineError::Endpoint {
                host: host.to_string(),
                reason: "expected a tcp://, http:// or unix:// address".into(),
            });
        };

        debug!(host = %host, "docker client ready");
        Ok(Self {
            host: host.to_string(),
            timeout,
            docker,
        })
    }

    /// Sort a daemon error into the engine taxonomy. `wrap` picks the
    /// variant for anything that is neither a miss nor a timeout.
    fn classify(
        &self,
        id: &str,
        err: BollardError,
        wrap: fn(String) -> EngineError,
    ) -> EngineError {
        match err {
            BollardError::DockerResponseServerError {
                status_code: 404, ..
            } => EngineError::NotFound(id.to_string()),
            BollardError::RequestTimeoutError => EngineError::Timeout(self.timeout),
            other => wrap(other.to_string()),
        }
    }
}

#[cfg(unix)]
fn connect_unix(host: &str, path: &str, secs: u64) -> EngineResult<Docker> {
    Docker::connect_with_unix(path, secs, bollard::API_DEFAULT_VERSION).map_err(|e| {
        EngineError::Endpoint {
            host: host.to_string(),
            reason: e.to_string(),
        }
    })
}

#[cfg(not(unix))]
fn connect_unix(host: &str, _path: &str, _secs: u64) -> EngineResult<Docker> {
    Err(EngineError::Endpoint {
        host: host.to_string(),
        reason: "unix sockets are not supported on this platform".into(),
    })
}

#[async_trait]
impl EngineProvider for DockerEngine {
    fn host(&self) -> &str {
        &self.host
    }

    async fn list_containers(&self) -> EngineResult<Vec<Container>> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| self.classify("", e, EngineError::List))?;

        let empty = HashMap::new();
        let containers = summaries
            .iter()
            .map(|s| {
                let name = s
                    .names
                    .as_ref()
                    .and_then(|names| names.first())
                    .map(String::as_str)
                    .unwrap_or_default();
                labels::to_container(
                    Observed {
                        id: s.id.as_deref().unwrap_or_default(),
                        name,
                        image: s.image.as_deref().unwrap_or_default(),
                        state: s.state.as_deref().unwrap_or_default(),
                        command: s.command.as_deref().unwrap_or_default(),
                        created_at: s.created.unwrap_or_default(),
                        labels: s.labels.as_ref().unwrap_or(&empty),
                    },
                    &self.host,
                )
            })
            .collect::<Vec<_>>();
        debug!(host = %self.host, count = containers.len(), "listed containers");
        Ok(containers)
    }

    async fn inspect(&self, id: &str) -> EngineResult<InspectedContainer> {
        let response = self
            .docker
            .inspect_container(id, None)
            .await
            .map_err(|e| self.classify(id, e, EngineError::Inspect))?;
        let raw = serde_json::to_value(&response)
            .map_err(|e| EngineError::Inspect(format!("{id}: {e}")))?;

        let config = response.config.as_ref();
        let status = response
            .state
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .map(|s| ContainerStatus::from_wire(&s.to_string()))
            .unwrap_or_default();

        Ok(InspectedContainer {
            id: response.id.clone().unwrap_or_else(|| id.to_string()),
            name: response
                .name
                .as_deref()
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image: config.and_then(|c| c.image.clone()).unwrap_or_default(),
            status,
            command: config
                .and_then(|c| c.cmd.as_ref())
                .map(|cmd| cmd.join(" "))
                .unwrap_or_default(),
            created_at: response.created.as_deref().map(created_secs).unwrap_or(0),
            labels: config.and_then(|c| c.labels.clone()).unwrap_or_default(),
            raw,
        })
    }

    async fn pull_image(&self, image: &str) -> EngineResult<()> {
        info!(host = %self.host, image = %image, "pulling image");
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            match progress {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(image = %image, status = %status, "pull progress");
                    }
                }
                Err(e) => {
                    return Err(EngineError::ImagePull {
                        image: image.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn create_container(&self, request: &CreateRequest) -> EngineResult<Created> {
        let port_key = format!("{}/tcp", request.container_port);
        let binding = PortBinding {
            host_ip: Some("0.0.0.0".to_string()),
            host_port: Some(request.host_port.to_string()),
        };

        let host_config = HostConfig {
            port_bindings: Some(HashMap::from([(port_key.clone(), Some(vec![binding]))])),
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::ON_FAILURE),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = Config {
            image: Some(request.image.clone()),
            labels: Some(request.labels.clone()),
            cmd: (!request.cmd.is_empty()).then(|| request.cmd.clone()),
            exposed_ports: Some(HashMap::from([(port_key, HashMap::new())])),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: request.name.as_str(),
            platform: None,
        };
        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| self.classify(&request.name, e, EngineError::Create))?;

        info!(host = %self.host, name = %request.name, id = %response.id, "created container");
        Ok(Created {
            id: response.id,
            warnings: response.warnings,
        })
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| self.classify(id, e, EngineError::Start))
    }

    async fn delete(&self, id: &str) -> EngineResult<()> {
        let stop = StopContainerOptions { t: STOP_GRACE_SECS };
        match self.docker.stop_container(id, Some(stop)).await {
            Ok(()) => {}
            // Already stopped.
            Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => {}
            Err(e) => return Err(self.classify(id, e, EngineError::Stop)),
        }

        let remove = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(remove))
            .await
            .map_err(|e| self.classify(id, e, EngineError::Remove))?;

        info!(host = %self.host, id = %id, "removed container");
        Ok(())
    }

    async fn restart(&self, id: &str) -> EngineResult<()> {
        self.docker
            .restart_container(id, None)
            .await
            .map_err(|e| self.classify(id, e, EngineError::Restart))?;
        info!(host = %self.host, id = %id, "restarted container");
        Ok(())
    }
}

/// Unix seconds from the RFC 3339 `Created` field of an inspect response.
/// Unparseable values yield 0, which leaves the stored time in place.
fn created_secs(created: &str) -> i64 {
    chrono::DateTime::parse_from_rfc3339(created)
        .map(|t| t.timestamp())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_time_parses_engine_timestamps() {
        assert_eq!(created_secs("2024-01-02T03:04:05Z"), 1_704_164_645);
        assert_eq!(created_secs("2024-01-02T03:04:05.123456789Z"), 1_704_164_645);
        assert_eq!(created_secs("2024-01-02T05:04:05+02:00"), 1_704_164_645);
        assert_eq!(created_secs(""), 0);
        assert_eq!(created_secs("yesterday"), 0);
    }

    #[test]
    fn rejects_unknown_schemes() {
        let err = DockerEngine::connect("ssh://box", DEFAULT_TIMEOUT).err().unwrap();
        assert!(matches!(err, EngineError::Endpoint { .. }));
    }

    #[test]
    fn tcp_clients_build_without_a_daemon() {
        let engine = DockerEngine::connect("tcp://127.0.0.1:2375", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(engine.host(), "tcp://127.0.0.1:2375");
    }

    #[test]
    fn daemon_misses_map_to_not_found() {
        let engine = DockerEngine::connect("tcp://127.0.0.1:2375", DEFAULT_TIMEOUT).unwrap();
        let miss = BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such container: abc".into(),
        };
        assert!(engine.classify("abc", miss, EngineError::Inspect).is_not_found());

        let conflict = BollardError::DockerResponseServerError {
            status_code: 409,
            message: "name in use".into(),
        };
        assert!(matches!(
            engine.classify("web-1", conflict, EngineError::Create),
            EngineError::Create(_)
        ));
    }
}
