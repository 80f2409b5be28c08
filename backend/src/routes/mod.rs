mod docs;
mod health;
pub mod upload;

use aide::axum::{
    routing::{get, post},
    ApiRouter,
};

/// Creates the router with all handler routes
pub fn handler() -> ApiRouter {
    ApiRouter::new()
        .merge(docs::handler())
        .api_route("/health", get(health::handler))
        .api_route(
            "/upload/presigned-url",
            post(upload::create_presigned_upload_url),
        )
        .api_route(
            "/upload/presigned-download-url",
            post(upload::create_presigned_download_url),
        )
        .api_route("/upload/status", get(upload::get_upload_status))
}
