//! Routes and response mapping.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::{info, warn};

use crate::application::ImagePipeline;
use crate::domain::errors::ProxyError;

/// Every successful proxy response is immutable for a day on both browsers
/// and shared caches.
const CACHE_CONTROL_IMMUTABLE: &str = "public, max-age=86400, s-maxage=86400, immutable";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<ImagePipeline>,
}

/// Builds the service router.
#[must_use]
pub fn router(pipeline: Arc<ImagePipeline>) -> Router {
    Router::new()
        .route("/image/{*path}", get(serve_image))
        .route("/health", get(health))
        .with_state(AppState { pipeline })
}

async fn health() -> &'static str {
    "ok"
}

async fn serve_image(State(state): State<AppState>, uri: Uri) -> Response {
    // The cache key is the URI exactly as requested, query string included.
    let request_uri = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());

    match state.pipeline.handle(&request_uri).await {
        Ok(response) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, response.content_type),
                (header::CACHE_CONTROL, CACHE_CONTROL_IMMUTABLE.to_string()),
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()),
                (header::ACCESS_CONTROL_ALLOW_METHODS, "GET".to_string()),
            ],
            response.bytes,
        )
            .into_response(),
        Err(error) => {
            if error.is_client_error() {
                info!(uri = %request_uri, error = %error, "request rejected");
            } else {
                warn!(uri = %request_uri, error = %error, "request failed");
            }
            (
                status_for(&error),
                [
                    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
                    (header::ACCESS_CONTROL_ALLOW_METHODS, "GET"),
                ],
                error.to_string(),
            )
                .into_response()
        }
    }
}

fn status_for(error: &ProxyError) -> StatusCode {
    match error {
        ProxyError::BadInput(_) => StatusCode::BAD_REQUEST,
        ProxyError::Forbidden => StatusCode::FORBIDDEN,
        ProxyError::Upstream(code) => {
            StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        ProxyError::Io(_) | ProxyError::Transform(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
