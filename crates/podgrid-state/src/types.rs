//! Domain types persisted in the store.
//!
//! `PodSpec` is desired state, `Container` is observed state. Both are
//! stored as camelCase JSON so records written by older controllers stay
//! readable.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ── Pod ───────────────────────────────────────────────────────────

/// Desired state for a single-container workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Logical name, unique across the fleet.
    pub name: String,
    /// Image reference (`nginx`, `nginx:1.27`, `ghcr.io/org/app:tag`).
    pub image: String,
    /// Published port hint. Persisted, not used for allocation.
    #[serde(default, deserialize_with = "string_or_number")]
    pub service_port: String,
    /// Port the process listens on inside the container.
    #[serde(default, deserialize_with = "string_or_number")]
    pub container_port: String,
    /// Command override. Accepts a single string or a list.
    #[serde(default, deserialize_with = "string_or_list")]
    pub cmd: Vec<String>,
}

impl PodSpec {
    /// Convenience constructor used by tests and the CLI.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn with_container_port(mut self, port: impl Into<String>) -> Self {
        self.container_port = port.into();
        self
    }

    pub fn with_cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = cmd.into_iter().map(Into::into).collect();
        self
    }
}

// ── Container ─────────────────────────────────────────────────────

/// Observed runtime record of a container created for a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Container {
    /// Engine-assigned identifier.
    pub container_id: String,
    /// Owning pod name.
    pub pod: String,
    /// Display name (`<pod>-<suffix>`).
    pub name: String,
    pub image: String,
    /// Allocated host port.
    pub port: String,
    pub command: String,
    /// Container-internal port.
    pub container_port: String,
    pub status: ContainerStatus,
    /// Engine endpoint the container lives on.
    pub host: String,
    /// Human-readable age, derived from `created_at`.
    pub age: String,
    /// Unix timestamp (seconds) of creation.
    pub created_at: i64,
}

impl Container {
    /// Recompute `age` relative to `now` (unix seconds).
    pub fn refresh_age(&mut self, now: i64) {
        self.age = if self.created_at > 0 {
            format_age(now.saturating_sub(self.created_at))
        } else {
            String::new()
        };
    }

    /// Whether the record carries enough identity to act on.
    pub fn is_placed(&self) -> bool {
        !self.container_id.is_empty() && !self.host.is_empty()
    }
}

/// Lifecycle status of a container.
///
/// Apply outcomes and engine-observed states share one closed enum. The
/// wire strings are the ones older clients already match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContainerStatus {
    /// Created, start not yet confirmed.
    Creating,
    Running,
    /// Image pull failed; nothing was created.
    ImagePullFailed,
    /// The engine rejected the create call.
    CreateFailed,
    /// Created but failed to start.
    StartFailed,
    /// Started, but the engine reported warnings.
    Warning,
    Created,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    #[default]
    Unknown,
}

impl ContainerStatus {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "ContainerCreating",
            Self::Running => "running",
            Self::ImagePullFailed => "ImageCrash",
            Self::CreateFailed => "ContainerError",
            Self::StartFailed => "ContainerStartError",
            Self::Warning => "ContainerWarning",
            Self::Created => "created",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Unknown => "",
        }
    }

    /// Parse a wire string or an engine state string. Unrecognised
    /// values become `Unknown`.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "ContainerCreating" => Self::Creating,
            "running" => Self::Running,
            "ImageCrash" => Self::ImagePullFailed,
            "ContainerError" => Self::CreateFailed,
            "ContainerStartError" => Self::StartFailed,
            "ContainerWarning" => Self::Warning,
            "created" => Self::Created,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }

    /// True for the statuses an apply records when the engine failed.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ImagePullFailed | Self::CreateFailed | Self::StartFailed
        )
    }

    /// False when the apply failed before the engine created anything, so
    /// there is nothing on the host to inspect or remove.
    pub fn has_engine_container(&self) -> bool {
        !matches!(self, Self::ImagePullFailed | Self::CreateFailed)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ContainerStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ContainerStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Self::from_wire).unwrap_or_default())
    }
}

// ── Helpers ───────────────────────────────────────────────────────

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Format an elapsed number of seconds as `1h2m3s`.
pub fn format_age(secs: i64) -> String {
    let secs = secs.max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{s}s"),
        (0, _) => format!("{m}m{s}s"),
        _ => format!("{h}h{m}m{s}s"),
    }
}

fn string_or_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Cmd {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<Cmd>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Cmd::One(s)) if s.is_empty() => Vec::new(),
        Some(Cmd::One(s)) => vec![s],
        Some(Cmd::Many(v)) => v,
    })
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Text(String),
        Number(u64),
    }

    Ok(match Option::<Port>::deserialize(deserializer)? {
        None => String::new(),
        Some(Port::Text(s)) => s,
        Some(Port::Number(n)) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_spec_uses_camel_case_wire_names() {
        let pod = PodSpec::new("web", "nginx")
            .with_container_port("80")
            .with_cmd(["nginx", "-g", "daemon off;"]);
        let json = serde_json::to_value(&pod).unwrap();
        assert_eq!(json["containerPort"], "80");
        assert_eq!(json["servicePort"], "");
        assert_eq!(json["cmd"][0], "nginx");
    }

    #[test]
    fn pod_spec_accepts_loose_input() {
        let pod: PodSpec = serde_json::from_str(
            r#"{"name":"web","image":"nginx","containerPort":80,"cmd":"serve"}"#,
        )
        .unwrap();
        assert_eq!(pod.container_port, "80");
        assert_eq!(pod.cmd, vec!["serve".to_string()]);
        assert!(pod.service_port.is_empty());

        let pod: PodSpec =
            serde_json::from_str(r#"{"name":"web","image":"nginx","cmd":null}"#).unwrap();
        assert!(pod.cmd.is_empty());
    }

    #[test]
    fn status_wire_strings_are_stable() {
        let cases = [
            (ContainerStatus::Creating, "ContainerCreating"),
            (ContainerStatus::ImagePullFailed, "ImageCrash"),
            (ContainerStatus::CreateFailed, "ContainerError"),
            (ContainerStatus::StartFailed, "ContainerStartError"),
            (ContainerStatus::Warning, "ContainerWarning"),
            (ContainerStatus::Running, "running"),
            (ContainerStatus::Exited, "exited"),
        ];
        for (status, wire) in cases {
            assert_eq!(serde_json::to_value(status).unwrap(), wire);
            assert_eq!(ContainerStatus::from_wire(wire), status);
        }
    }

    #[test]
    fn unknown_status_strings_degrade_to_unknown() {
        let status: ContainerStatus = serde_json::from_str(r#""hibernating""#).unwrap();
        assert_eq!(status, ContainerStatus::Unknown);
        let status: ContainerStatus = serde_json::from_str("null").unwrap();
        assert_eq!(status, ContainerStatus::Unknown);
        assert_eq!(ContainerStatus::Unknown.to_string(), "");
    }

    #[test]
    fn container_tolerates_missing_fields() {
        let c: Container = serde_json::from_str(r#"{"containerId":"abc","pod":"web"}"#).unwrap();
        assert_eq!(c.container_id, "abc");
        assert_eq!(c.status, ContainerStatus::Unknown);
        assert!(!c.is_placed());
    }

    #[test]
    fn age_formatting() {
        assert_eq!(format_age(42), "42s");
        assert_eq!(format_age(125), "2m5s");
        assert_eq!(format_age(3 * 3600 + 61), "3h1m1s");
        assert_eq!(format_age(-5), "0s");

        let mut c = Container {
            created_at: 1_000,
            ..Default::default()
        };
        c.refresh_age(1_090);
        assert_eq!(c.age, "1m30s");
    }

    #[test]
    fn failure_statuses() {
        assert!(ContainerStatus::ImagePullFailed.is_failure());
        assert!(ContainerStatus::StartFailed.is_failure());
        assert!(!ContainerStatus::Warning.is_failure());
        assert!(!ContainerStatus::Running.is_failure());

        assert!(!ContainerStatus::ImagePullFailed.has_engine_container());
        assert!(!ContainerStatus::CreateFailed.has_engine_container());
        assert!(ContainerStatus::StartFailed.has_engine_container());
        assert!(ContainerStatus::Running.has_engine_container());
    }
}
