use std::sync::Arc;
use std::time::Duration;

use aide::openapi::OpenApi;
use axum::{Extension, Router};
use datadog_tracing::axum::{shutdown_signal, OtelAxumLayer, OtelInResponseLayer};
use object_gateway::ObjectGateway;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;

use crate::routes;
use crate::{types::Environment, upload::UploadIssuer};

/// Per-request timeout; signing is local, so only credential refreshes come close
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds the application router with its dependencies attached
pub fn router(
    environment: Environment,
    issuer: Arc<UploadIssuer>,
    input_gateway: Arc<dyn ObjectGateway>,
) -> Router {
    let mut openapi = OpenApi::default();

    routes::handler()
        .finish_api(&mut openapi)
        .layer(Extension(openapi))
        .layer(Extension(environment))
        .layer(Extension(issuer))
        .layer(Extension(input_gateway))
}

/// Starts the server with the given environment and dependencies
///
/// # Errors
///
/// Returns an error if the port is misconfigured or the server fails to bind
pub async fn start(
    environment: Environment,
    issuer: Arc<UploadIssuer>,
    input_gateway: Arc<dyn ObjectGateway>,
) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], environment.port()?));

    let router = router(environment, issuer, input_gateway)
        // Include trace context as header into the response
        .layer(OtelInResponseLayer)
        // Start OpenTelemetry trace on incoming request
        .layer(OtelAxumLayer::default())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Upload backend started on http://{addr}");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(anyhow::Error::from)
}
