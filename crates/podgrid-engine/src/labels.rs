//! Engine-side metadata conventions shared by every backend.

use std::collections::HashMap;

use podgrid_state::{Container, ContainerStatus, epoch_secs};
use uuid::Uuid;

/// Owning pod name.
pub const POD: &str = "pod";
/// Allocated host port.
pub const PORT: &str = "port";
/// Container-internal port.
pub const CONTAINER_PORT: &str = "containerPort";
/// Engine endpoint the container was created through.
pub const HOST: &str = "host";

/// Container port used when a pod does not name one.
pub const DEFAULT_CONTAINER_PORT: &str = "8080";

/// Labels stamped on every container created for a pod.
pub fn for_pod(
    pod: &str,
    host_port: u16,
    container_port: &str,
    host: &str,
) -> HashMap<String, String> {
    HashMap::from([
        (POD.to_string(), pod.to_string()),
        (PORT.to_string(), host_port.to_string()),
        (CONTAINER_PORT.to_string(), container_port.to_string()),
        (HOST.to_string(), host.to_string()),
    ])
}

/// Fresh display name: `<pod>-<6 hex chars>`.
pub fn container_name(pod: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{pod}-{}", &suffix[..6])
}

/// Fully qualified pull reference: registry defaults to `docker.io`, tag
/// to `latest`. Digests are left alone.
pub fn image_reference(image: &str) -> String {
    let image = image.trim();
    let (first, _) = image.split_once('/').unwrap_or(("", image));
    let has_registry = first.contains('.') || first.contains(':') || first == "localhost";
    let qualified = if has_registry {
        image.to_string()
    } else {
        format!("docker.io/{image}")
    };

    let last = qualified.rsplit('/').next().unwrap_or_default();
    if last.contains('@') || last.contains(':') {
        qualified
    } else {
        format!("{qualified}:latest")
    }
}

/// Engine-observed facts about one container, as reported by a listing.
pub struct Observed<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub image: &'a str,
    pub state: &'a str,
    pub command: &'a str,
    pub created_at: i64,
    pub labels: &'a HashMap<String, String>,
}

/// Rebuild a registry record from engine-side state alone.
pub fn to_container(observed: Observed<'_>, host: &str) -> Container {
    let label = |key: &str| observed.labels.get(key).cloned().unwrap_or_default();
    let mut container = Container {
        container_id: observed.id.to_string(),
        pod: label(POD),
        name: observed.name.trim_start_matches('/').to_string(),
        image: observed.image.to_string(),
        port: label(PORT),
        command: observed.command.to_string(),
        container_port: label(CONTAINER_PORT),
        status: ContainerStatus::from_wire(observed.state),
        host: host.to_string(),
        age: String::new(),
        created_at: observed.created_at,
    };
    container.refresh_age(epoch_secs());
    container
}
