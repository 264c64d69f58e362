//! launchpad-api — REST API for Launchpad.
//!
//! Thin axum layer over the [`Orchestrator`]: every handler maps one HTTP
//! request to one lifecycle intent. Long-running intents (generate, build)
//! stream progress as server-sent events and finish with a `result` or
//! `error` event.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/apps` | List all apps |
//! | POST | `/api/v1/apps` | Create an app from a template |
//! | GET | `/api/v1/apps/{name}` | App status with live tags and drift |
//! | DELETE | `/api/v1/apps/{name}` | Tear down an app |
//! | GET | `/api/v1/apps/{name}/logs?env=&tail=` | Follow pod logs (SSE) |
//! | POST | `/api/v1/apps/{name}/generate` | Generate code (SSE) |
//! | POST | `/api/v1/apps/{name}/build` | Build and deploy a preview (SSE) |
//! | POST | `/api/v1/apps/{name}/publish` | Promote preview to production |
//! | POST | `/api/v1/apps/{name}/rollback` | Point production at an older image |
//! | POST | `/api/v1/apps/{name}/resync` | Re-apply desired state |
//! | GET | `/healthz` | Liveness probe |

pub mod handlers;
pub mod response;
pub mod stream;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use launchpad_orchestrator::Orchestrator;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Build the complete API router.
pub fn build_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    let api_routes = Router::new()
        .route("/apps", get(handlers::list_apps).post(handlers::create_app))
        .route("/apps/{name}", get(handlers::get_app).delete(handlers::delete_app))
        .route("/apps/{name}/logs", get(handlers::logs))
        .route("/apps/{name}/generate", post(handlers::generate))
        .route("/apps/{name}/build", post(handlers::build_preview))
        .route("/apps/{name}/publish", post(handlers::publish))
        .route("/apps/{name}/rollback", post(handlers::rollback))
        .route("/apps/{name}/resync", post(handlers::resync))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}
