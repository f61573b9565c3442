use axum::{
    Json, Router,
    handler::HandlerWithoutStateExt,
    middleware,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use bazaar_types::api::HealthResponse;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::resolve_caller;
use crate::storage::IMAGE_BUCKET;
use crate::{listings, messages, upload};

/// Builds the full HTTP surface. Transport layers (CORS, tracing, body limit)
/// are added by the binary.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/listings", get(listings::list_listings).post(listings::create_listing))
        .route(
            "/listings/",
            get(listings::missing_id)
                .put(listings::missing_id)
                .delete(listings::missing_id),
        )
        .route(
            "/listings/{id}",
            get(listings::get_listing)
                .put(listings::update_listing)
                .delete(listings::delete_listing),
        )
        .route("/messages", get(messages::get_messages).post(messages::send_message))
        .route("/upload", post(upload::upload_images))
        .layer(middleware::from_fn_with_state(state.clone(), resolve_caller))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health))
        .nest_service(
            &format!("/storage/{IMAGE_BUCKET}"),
            ServeDir::new(state.blobs.dir()).not_found_service(not_found.into_service()),
        )
        .merge(api)
        .fallback(not_found)
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Not found.".into())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}
