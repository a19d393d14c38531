//! podgrid-api: REST API for podgrid.
//!
//! Thin axum handlers over the [`Orchestrator`]. Every JSON response uses
//! the `{"success", "data", "error"}` envelope.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/nodes` | List engine hosts |
//! | POST | `/nodes` | Register a host (`{"host": ...}`) |
//! | DELETE | `/nodes` | Unregister a host (`{"host": ...}`) |
//! | GET | `/containers` | Every container on every host (reconciles) |
//! | POST | `/apply` | Apply a pod spec |
//! | GET | `/pods/:podName` | Stored pod spec |
//! | DELETE | `/remove/:podName` | Remove a pod and all its containers |
//! | GET | `/containers/:podName` | Containers of a pod, refreshed live |
//! | GET | `/inspect/:containerName` | Raw engine inspect document |
//! | DELETE | `/container/:containerName` | Delete one container |
//! | GET | `/restart/:containerName` | Restart one container |
//! | GET | `/rebuild/:containerName` | Replace one container from its pod spec |
//! | POST | `/reconcile` | Re-register containers from a fleet scan |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use axum::Router;
use axum::routing::{delete, get, post};
use podgrid_orchestrator::Orchestrator;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Orchestrator,
}

/// Build the complete API router.
pub fn build_router(orchestrator: Orchestrator) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route(
            "/nodes",
            get(handlers::list_nodes)
                .post(handlers::register_node)
                .delete(handlers::unregister_node),
        )
        .route("/containers", get(handlers::list_containers))
        .route("/containers/{pod}", get(handlers::containers_by_pod))
        .route("/apply", post(handlers::apply))
        .route("/pods/{pod}", get(handlers::get_pod))
        .route("/remove/{pod}", delete(handlers::remove))
        .route("/inspect/{name}", get(handlers::inspect))
        .route("/container/{name}", delete(handlers::delete_container))
        .route("/restart/{name}", get(handlers::restart_container))
        .route("/rebuild/{name}", get(handlers::rebuild_container))
        .route("/reconcile", post(handlers::reconcile))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
