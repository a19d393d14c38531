//! podd configuration: CLI flags and environment over an optional TOML
//! file over built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Args, ValueEnum};
use podgrid_engine::DEFAULT_PER_HOST_LIMIT;
use podgrid_scheduler::DEFAULT_ENGINE_HOST;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 3232;
pub const DEFAULT_STORE: &str = "redb:///var/lib/podgrid/podgrid.redb";
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LOG_FILTER: &str = "info,podd=debug,podgrid=debug";

/// Which engine backend hosts are driven through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Docker,
    /// In-process fleet; nothing leaves the daemon.
    Memory,
}

/// Flags of `podd serve`.
#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    /// Port to listen on.
    #[arg(long, env = "PODD_PORT")]
    pub port: Option<u16>,

    /// Store URL: redis://host:port, redb:///path/file.redb, a bare path, or "memory".
    #[arg(long, env = "PODD_STORE")]
    pub store: Option<String>,

    /// Redis address; shorthand for --store redis://<host>.
    #[arg(long, env = "REDIS_HOST")]
    pub redis_host: Option<String>,

    /// Engine backend.
    #[arg(long, value_enum)]
    pub engine: Option<EngineKind>,

    /// Engine endpoint seeded into an empty node registry.
    #[arg(long)]
    pub default_node: Option<String>,

    /// Concurrent engine operations allowed per host (0 = unbounded).
    #[arg(long)]
    pub max_connections_per_host: Option<usize>,

    /// Per-call engine timeout in seconds.
    #[arg(long)]
    pub engine_timeout: Option<u64>,

    /// TOML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long)]
    pub log_json: bool,
}

/// Contents of the TOML config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub store: Option<String>,
    pub redis_host: Option<String>,
    pub engine: Option<EngineKind>,
    pub default_node: Option<String>,
    pub max_connections_per_host: Option<usize>,
    pub engine_timeout: Option<u64>,
    pub log_json: Option<bool>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Fully resolved daemon settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub port: u16,
    pub store_url: String,
    pub engine: EngineKind,
    pub default_node: String,
    pub max_connections_per_host: usize,
    pub engine_timeout: Duration,
    pub log_json: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            store_url: DEFAULT_STORE.to_string(),
            engine: EngineKind::default(),
            default_node: DEFAULT_ENGINE_HOST.to_string(),
            max_connections_per_host: DEFAULT_PER_HOST_LIMIT,
            engine_timeout: Duration::from_secs(DEFAULT_ENGINE_TIMEOUT_SECS),
            log_json: false,
        }
    }
}

impl DaemonConfig {
    /// Load the file named by `--config`, if any, and merge.
    pub fn load(args: &ServeArgs) -> anyhow::Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(args, &file))
    }

    /// CLI and environment win over the file; the file wins over defaults.
    pub fn merge(args: &ServeArgs, file: &FileConfig) -> Self {
        let defaults = Self::default();

        let store_url = args
            .store
            .clone()
            .or_else(|| args.redis_host.as_deref().map(redis_url))
            .or_else(|| file.store.clone())
            .or_else(|| file.redis_host.as_deref().map(redis_url))
            .unwrap_or(defaults.store_url);

        Self {
            port: args.port.or(file.port).unwrap_or(defaults.port),
            store_url,
            engine: args.engine.or(file.engine).unwrap_or(defaults.engine),
            default_node: args
                .default_node
                .clone()
                .or_else(|| file.default_node.clone())
                .unwrap_or(defaults.default_node),
            max_connections_per_host: args
                .max_connections_per_host
                .or(file.max_connections_per_host)
                .unwrap_or(defaults.max_connections_per_host),
            engine_timeout: args
                .engine_timeout
                .or(file.engine_timeout)
                .map(Duration::from_secs)
                .unwrap_or(defaults.engine_timeout),
            log_json: args.log_json || file.log_json.unwrap_or(defaults.log_json),
        }
    }
}

/// `host:port` → `redis://host:port`; full URLs pass through.
fn redis_url(host: &str) -> String {
    if host.contains("://") {
        host.to_string()
    } else {
        format!("redis://{host}")
    }
}
