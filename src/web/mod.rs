//! HTTP JSON API.

use crate::config::Settings;
use crate::store::Store;
use axum::Router;
use axum::routing::{delete, get, post, put};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod applications;
mod extract;
mod projects;
mod users;

#[derive(Clone, Debug)]
pub struct AppState {
    pub store: Store,
    pub default_limit: u32,
    pub max_limit: u32,
}

impl AppState {
    pub fn new(store: Store, settings: &Settings) -> AppState {
        AppState {
            store,
            default_limit: settings.default_limit,
            max_limit: settings.max_limit,
        }
    }
}

/// Body of successful requests which have nothing else to return.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub message: &'static str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/auth/register", post(users::register))
        .route("/api/auth/login", post(users::login))
        .route(
            "/api/users/profile",
            get(users::profile).put(users::update_profile),
        )
        .route("/api/users/departments", get(users::departments))
        .route("/api/users/skills", get(users::skills))
        .route(
            "/api/projects",
            get(projects::list).post(projects::create),
        )
        .route(
            "/api/projects/professor/my-projects",
            get(projects::mine),
        )
        .route(
            "/api/projects/:id",
            get(projects::show)
                .put(projects::update)
                .delete(projects::remove),
        )
        .route("/api/projects/:id/capacity", get(projects::capacity))
        .route("/api/applications", post(applications::submit))
        .route(
            "/api/applications/student/my-applications",
            get(applications::for_student),
        )
        .route(
            "/api/applications/professor/my-project-applications",
            get(applications::for_professor),
        )
        .route("/api/applications/:id/status", put(applications::decide))
        .route("/api/applications/:id", delete(applications::withdraw))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
