//! Certy API - HTTP service
//!
//! Upload a record spreadsheet, start a background batch that renders and
//! mails certificates, poll its status, and extract names from images.

pub mod error;
pub mod handlers;
pub mod jobs;
pub mod state;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{extract, health, tasks};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(title = "Auto-Certy API", description = "Automated certificate generator and mailer"),
    paths(
        health::root,
        health::health_check,
        tasks::upload_files,
        tasks::process_certificates,
        tasks::get_status,
        tasks::list_tasks,
        tasks::cleanup_task,
        tasks::download_archive,
        extract::extract_names,
    ),
    components(schemas(
        error::ApiError,
        health::BannerResponse,
        health::HealthResponse,
        tasks::UploadResponse,
        tasks::ProcessRequest,
        tasks::ProcessResponse,
        tasks::StatusResponse,
        tasks::TaskSummary,
        tasks::TaskListResponse,
        tasks::MessageResponse,
        extract::ExtractNamesResponse,
    )),
    tags(
        (name = "health", description = "Service status"),
        (name = "tasks", description = "Certificate batches"),
        (name = "extraction", description = "Name extraction from images")
    )
)]
pub struct ApiDoc;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);
    let body_limit = state.config.server.max_body_size;

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/upload-files", post(tasks::upload_files))
        .route("/process-certificates", post(tasks::process_certificates))
        .route("/status/:task_id", get(tasks::get_status))
        .route("/tasks", get(tasks::list_tasks))
        .route("/cleanup/:task_id", delete(tasks::cleanup_task))
        .route("/certificates/:task_id/archive", get(tasks::download_archive))
        .route("/extract-names", post(extract::extract_names))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Router over [`AppState::for_testing`]
pub fn create_router_for_testing() -> Router {
    create_router(Arc::new(AppState::for_testing()))
}
