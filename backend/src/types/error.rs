//! Universal error handling for the API

use aide::OperationOutput;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use object_gateway::GatewayError;
use schemars::JsonSchema;
use serde::Serialize;

use crate::signing::SigningError;
use crate::types::ConfigurationError;
use crate::upload::{PolicyError, UploadError};

/// API error response envelope
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    /// Whether the client should retry the request
    pub allow_retry: bool,
    /// Error details
    error: ErrorBody,
}

/// Error body containing code and message
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    /// Machine-readable error code
    pub code: &'static str,
    /// Human-readable error message
    pub message: String,
}

/// Application error type that wraps the API error response
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    inner: ApiErrorResponse,
}

impl AppError {
    /// Create a new application error
    #[must_use]
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        retry: bool,
    ) -> Self {
        Self {
            status,
            inner: ApiErrorResponse {
                allow_retry: retry,
                error: ErrorBody {
                    code,
                    message: message.into(),
                },
            },
        }
    }

    /// HTTP status of the error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.inner.error.code
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.status.as_u16() {
            400..=499 => tracing::warn!(
                "Client error: {} - {}",
                self.inner.error.code,
                self.inner.error.message
            ),
            500..=599 => tracing::error!(
                "Server error: {} - {}",
                self.inner.error.code,
                self.inner.error.message
            ),
            _ => {}
        }

        (self.status, Json(self.inner)).into_response()
    }
}

impl From<PolicyError> for AppError {
    fn from(err: PolicyError) -> Self {
        let code = match &err {
            PolicyError::OutOfRange { .. } => "out_of_range",
            PolicyError::ContentTypeMismatch { .. } => "content_type_mismatch",
            PolicyError::InvalidPath { .. } => "invalid_path",
        };
        Self::new(StatusCode::BAD_REQUEST, code, err.to_string(), false)
    }
}

impl From<SigningError> for AppError {
    fn from(err: SigningError) -> Self {
        // The same window would be refused again; a shorter one may succeed
        let retry = !matches!(err, SigningError::WindowExceedsIdentity { .. });
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "signing_error",
            format!("Failed to generate signed URL: {err}"),
            retry,
        )
    }
}

impl From<ConfigurationError> for AppError {
    fn from(err: ConfigurationError) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "configuration_error",
            err.to_string(),
            false,
        )
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Policy(e) => e.into(),
            UploadError::Signing(e) => e.into(),
            UploadError::Configuration(e) => e.into(),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match &err {
            GatewayError::NotFound(key) => Self::new(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Object not found: {key}"),
                false,
            ),
            GatewayError::PermissionDenied(key) => Self::new(
                StatusCode::FORBIDDEN,
                "permission_denied",
                format!("Access denied to object: {key}"),
                false,
            ),
            GatewayError::UpstreamError(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "upstream_error",
                err.to_string(),
                true,
            ),
            GatewayError::S3Error(_) | GatewayError::BodyError(_) => Self::new(
                StatusCode::BAD_GATEWAY,
                "storage_error",
                err.to_string(),
                true,
            ),
        }
    }
}

impl OperationOutput for AppError {
    type Inner = ApiErrorResponse;

    fn operation_response(
        ctx: &mut aide::generate::GenContext,
        operation: &mut aide::openapi::Operation,
    ) -> Option<aide::openapi::Response> {
        Json::<ApiErrorResponse>::operation_response(ctx, operation)
    }
}
