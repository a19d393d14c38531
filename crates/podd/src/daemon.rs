//! Daemon assembly and the serve loop.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use podgrid_discovery::Discovery;
use podgrid_engine::{DockerConnector, EngineConnector, EnginePool, MemoryFleet};
use podgrid_orchestrator::Orchestrator;
use podgrid_scheduler::NodeRegistry;
use podgrid_state::{KvStore, SharedStore, open_url};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{DEFAULT_LOG_FILTER, DaemonConfig, EngineKind};

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Everything the HTTP server needs, plus the store handle to close at
/// shutdown.
pub struct Daemon {
    pub store: SharedStore,
    pub orchestrator: Orchestrator,
    pub router: Router,
}

impl Daemon {
    /// Open the store, seed the node registry and build the engine pool.
    pub async fn build(config: &DaemonConfig) -> anyhow::Result<Self> {
        let connector: Arc<dyn EngineConnector> = match config.engine {
            EngineKind::Docker => Arc::new(DockerConnector::new(config.engine_timeout)),
            EngineKind::Memory => Arc::new(MemoryFleet::new()),
        };
        Self::build_with_connector(config, connector).await
    }

    /// Like [`Daemon::build`], but drive hosts through `connector` instead of
    /// the one `config.engine` names.
    pub async fn build_with_connector(
        config: &DaemonConfig,
        connector: Arc<dyn EngineConnector>,
    ) -> anyhow::Result<Self> {
        ensure_store_dir(&config.store_url)?;
        let store = open_url(&config.store_url).await?;
        info!(backend = store.backend(), url = %config.store_url, "state store opened");

        let nodes =
            NodeRegistry::with_default_host(store.clone(), config.default_node.clone()).await?;
        info!(default = %nodes.default_host(), "node registry ready");

        let engines = EnginePool::from_shared(connector)
            .with_per_host_limit(config.max_connections_per_host);
        info!(
            backend = engines.backend(),
            per_host_limit = config.max_connections_per_host,
            "engine pool initialized"
        );

        let discovery = Discovery::new(store.clone());
        let orchestrator = Orchestrator::new(nodes, discovery, Arc::new(engines));
        let router = podgrid_api::build_router(orchestrator.clone());

        Ok(Self {
            store,
            orchestrator,
            router,
        })
    }

    /// Serve on `listener` until `shutdown` resolves, then close the store.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let server = axum::serve(listener, self.router).with_graceful_shutdown(shutdown);
        let served = server.await;

        match self.store.close().await {
            Ok(()) => info!("state store closed"),
            Err(e) => error!(error = %e, "closing state store failed"),
        }
        Ok(served?)
    }
}

/// `podd serve`.
pub async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!("podgrid daemon starting");
    let daemon = Daemon::build(&config).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "API server starting");

    daemon.serve(listener, shutdown_signal()).await?;
    info!("podgrid daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to listen for ctrl-c, shutting down"),
    }
}

/// Create the parent directory of an on-disk store.
fn ensure_store_dir(url: &str) -> anyhow::Result<()> {
    if url == "memory" || (url.contains("://") && !url.starts_with("redb://")) {
        return Ok(());
    }
    let path = Path::new(url.strip_prefix("redb://").unwrap_or(url));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
