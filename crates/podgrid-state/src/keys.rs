//! Store key schema.
//!
//! Every registry key is built here so the namespace stays in one place.

/// Set of registered engine host addresses.
pub const NODES: &str = "nodes";

/// `id.<containerName>` → container id.
pub fn container_id(container_name: &str) -> String {
    format!("id.{container_name}")
}

/// `json.<containerId>` → serialized `Container`.
pub fn container_record(container_id: &str) -> String {
    format!("json.{container_id}")
}

/// `c.<podName>` → set of container ids owned by the pod.
pub fn pod_members(pod_name: &str) -> String {
    format!("c.{pod_name}")
}

/// `pod.<podName>` → serialized `PodSpec`.
pub fn pod_spec(pod_name: &str) -> String {
    format!("pod.{pod_name}")
}

/// `port.<podName>` → allocated host port.
pub fn pod_port(pod_name: &str) -> String {
    format!("port.{pod_name}")
}
