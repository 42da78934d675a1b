//! Router construction.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Router};

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        // Workspaces
        .route("/workspaces", post(handlers::workspaces::create_workspace))
        .route("/workspaces/:id", get(handlers::workspaces::get_workspace))
        .route(
            "/workspaces/:id/ontologies",
            get(handlers::ontologies::list_ontologies)
                .post(handlers::ontologies::create_ontology),
        )
        // Ontologies
        .route(
            "/ontologies/:id",
            get(handlers::ontologies::get_ontology)
                .delete(handlers::ontologies::deactivate_ontology),
        )
        .route(
            "/ontologies/:id/versions",
            get(handlers::versions::list_versions).post(handlers::versions::create_version),
        )
        .route(
            "/ontologies/:id/versions/latest",
            get(handlers::versions::latest_version),
        )
        .route(
            "/ontologies/:id/versions/:number",
            get(handlers::versions::get_version),
        )
        .route("/ontologies/:id/diff", get(handlers::versions::diff_versions))
        // Pipeline tasks
        .route("/versions/:id/evaluate", post(handlers::versions::evaluate))
        .route("/versions/:id/compile", post(handlers::versions::compile))
        .route("/versions/:id/deploy", post(handlers::versions::deploy))
        .route("/ontologies/:id/drift", post(handlers::drift::detect_drift))
        .route(
            "/ontologies/:id/drift/events",
            get(handlers::drift::list_drift_events),
        )
        .route(
            "/drift/events/:id/resolve",
            post(handlers::drift::resolve_drift_event),
        )
        .route(
            "/drift/events/:id/ignore",
            post(handlers::drift::ignore_drift_event),
        )
        .route(
            "/ontologies/:id/regression",
            post(handlers::drift::run_regression),
        )
        // Artifacts & tasks
        .route("/bundles/:hash", get(handlers::versions::get_bundle))
        .route("/tasks", get(handlers::tasks::list_tasks))
        .route("/tasks/:id", get(handlers::tasks::get_task))
        .route("/tasks/:id/cancel", post(handlers::tasks::cancel_task))
        .layer(Extension(state))
}
