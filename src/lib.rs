pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::storage::StorageService;
use crate::services::thumbnail_service::ThumbnailService;
use crate::services::video_service::VideoIngestService;
use crate::services::video_store::VideoStore;
use axum::{
    Router,
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::videos::create_video,
        api::handlers::videos::list_videos,
        api::handlers::videos::get_video,
        api::handlers::videos::upload_video,
        api::handlers::thumbnails::upload_thumbnail,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::videos::CreateVideoRequest,
            api::handlers::videos::VideoResponse,
            api::handlers::videos::VideoUploadForm,
            api::handlers::thumbnails::ThumbnailUploadForm,
        )
    ),
    tags(
        (name = "system", description = "Health endpoints"),
        (name = "videos", description = "Video metadata and ingest endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn VideoStore>,
    pub storage: Arc<dyn StorageService>,
    pub ingest: Arc<VideoIngestService>,
    pub thumbnails: Arc<ThumbnailService>,
    pub config: AppConfig,
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

pub fn create_app(state: AppState) -> Router {
    // Multipart framing adds a little on top of the file itself.
    let multipart_overhead = 10 * 1024 * 1024;
    let video_body_limit = usize::try_from(state.config.max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(multipart_overhead);
    let thumbnail_body_limit = usize::try_from(state.config.max_thumbnail_size)
        .unwrap_or(usize::MAX)
        .saturating_add(multipart_overhead);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/api/videos",
            get(api::handlers::videos::list_videos)
                .post(api::handlers::videos::create_video)
                .layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::auth::auth_middleware,
                )),
        )
        .route(
            "/api/videos/:video_id",
            get(api::handlers::videos::get_video).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .route(
            "/api/video_upload/:video_id",
            post(api::handlers::videos::upload_video)
                .layer(axum::extract::DefaultBodyLimit::max(video_body_limit))
                .layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::auth::auth_middleware,
                )),
        )
        .route(
            "/api/thumbnail_upload/:video_id",
            post(api::handlers::thumbnails::upload_thumbnail)
                .layer(axum::extract::DefaultBodyLimit::max(thumbnail_body_limit))
                .layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::auth::auth_middleware,
                )),
        )
        .nest_service("/assets", ServeDir::new(state.config.assets_root.clone()))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
