//! Custom extractors for request validation

use aide::operation::OperationInput;
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    Json,
};
use schemars::JsonSchema;
use validator::Validate;

use crate::types::error::AppError;
use crate::upload::PolicyError;

/// JSON extractor that also enforces the payload's `validator` limits
///
/// Malformed bodies are reported as `invalid_json`; limit violations go through
/// [`PolicyError`] so they carry the same codes as any other policy rejection.
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: serde::de::DeserializeOwned + Validate + JsonSchema,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(payload) = Json::<T>::from_request(req, state)
            .await
            .map_err(|err| match err {
                JsonRejection::MissingJsonContentType(_) => AppError::new(
                    StatusCode::BAD_REQUEST,
                    "invalid_content_type",
                    "Missing Content-Type: application/json header",
                    false,
                ),
                other => AppError::new(
                    StatusCode::BAD_REQUEST,
                    "invalid_json",
                    other.body_text(),
                    false,
                ),
            })?;

        payload
            .validate()
            .map_err(|errors| AppError::from(PolicyError::from(errors)))?;

        Ok(Self(payload))
    }
}

impl<T> OperationInput for ValidatedJson<T>
where
    T: JsonSchema,
{
    fn operation_input(
        ctx: &mut aide::generate::GenContext,
        operation: &mut aide::openapi::Operation,
    ) {
        Json::<T>::operation_input(ctx, operation);
    }
}
