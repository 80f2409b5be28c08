use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response, Router};
use chrono::{Duration, Utc};
use object_gateway::{InMemoryObjectGateway, ObjectGateway};
use tower::ServiceExt;
use upload_backend::{
    server,
    signing::{CredentialDelegator, DelegationError, SigningIdentity, StoreEndpoint, UrlSigner},
    types::{ConfigurationError, Environment},
    upload::UploadIssuer,
};

pub const INPUT_BUCKET: &str = "media-input";
pub const OUTPUT_BUCKET: &str = "media-output";
pub const TEST_REGION: &str = "us-east-1";

/// Setup test environment variables with all the required configuration
pub fn setup_test_env() {
    dotenvy::from_path(".env.example").ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init()
        .ok();
}

/// Delegator handing out test identities, counting how often it is asked
///
/// Without a fixed lifetime it behaves like STS with a long role ceiling: sessions
/// last an hour or as long as requested, whichever is longer.
pub struct StaticDelegator {
    calls: AtomicUsize,
    fixed_lifetime: Option<Duration>,
}

impl StaticDelegator {
    pub fn sized_to_request() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fixed_lifetime: None,
        }
    }

    pub fn with_fixed_lifetime(lifetime: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fixed_lifetime: Some(lifetime),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialDelegator for StaticDelegator {
    async fn acquire_signing_identity_for(
        &self,
        min_lifetime: Duration,
    ) -> Result<SigningIdentity, DelegationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lifetime = self
            .fixed_lifetime
            .unwrap_or_else(|| min_lifetime.max(Duration::hours(1)));

        Ok(SigningIdentity::new(
            "arn:aws:iam::000000000000:role/upload-url-signer-development",
            "ASIATESTKEY",
            "test-secret",
            Some("test-session-token".to_string()),
            Utc::now() + lifetime,
        ))
    }
}

/// Delegator for a process without ambient credentials
pub struct MissingIdentityDelegator;

#[async_trait]
impl CredentialDelegator for MissingIdentityDelegator {
    async fn acquire_signing_identity_for(
        &self,
        _min_lifetime: Duration,
    ) -> Result<SigningIdentity, DelegationError> {
        Err(ConfigurationError("No ambient AWS credentials provider is configured".to_string()).into())
    }
}

/// Router wired to in-memory collaborators
pub struct TestSetup {
    pub router: Router,
    pub delegator: Arc<StaticDelegator>,
    pub input_gateway: Arc<InMemoryObjectGateway>,
}

impl TestSetup {
    pub fn new() -> Self {
        Self::with_delegator(StaticDelegator::sized_to_request())
    }

    pub fn with_identity_lifetime(lifetime: Duration) -> Self {
        Self::with_delegator(StaticDelegator::with_fixed_lifetime(lifetime))
    }

    fn with_delegator(delegator: StaticDelegator) -> Self {
        let delegator = Arc::new(delegator);
        let input_gateway = Arc::new(InMemoryObjectGateway::new(INPUT_BUCKET));
        let router = build_router(delegator.clone(), input_gateway.clone());

        Self {
            router,
            delegator,
            input_gateway,
        }
    }

    pub fn without_ambient_identity() -> Self {
        let input_gateway = Arc::new(InMemoryObjectGateway::new(INPUT_BUCKET));
        let router = build_router(Arc::new(MissingIdentityDelegator), input_gateway.clone());

        Self {
            router,
            delegator: Arc::new(StaticDelegator::sized_to_request()),
            input_gateway,
        }
    }

    pub async fn send_post_request(
        &self,
        route: &str,
        payload: serde_json::Value,
    ) -> Result<Response, Box<dyn std::error::Error>> {
        let request = Request::builder()
            .uri(route)
            .method("POST")
            .header("Content-Type", "application/json")
            .body(Body::from(payload.to_string()))?;

        let response = self.router.clone().oneshot(request).await?;
        Ok(response)
    }

    pub async fn send_raw_post_request(
        &self,
        route: &str,
        body: &'static str,
    ) -> Result<Response, Box<dyn std::error::Error>> {
        let request = Request::builder()
            .uri(route)
            .method("POST")
            .header("Content-Type", "application/json")
            .body(Body::from(body))?;

        let response = self.router.clone().oneshot(request).await?;
        Ok(response)
    }

    pub async fn send_get_request(
        &self,
        route: &str,
    ) -> Result<Response, Box<dyn std::error::Error>> {
        let request = Request::builder()
            .uri(route)
            .method("GET")
            .body(Body::empty())?;
        let response = self.router.clone().oneshot(request).await?;
        Ok(response)
    }

    /// Decodes the signed policy document of an upload response
    pub fn decode_policy(&self, body: &serde_json::Value) -> serde_json::Value {
        use base64::Engine;

        let encoded = body["upload_instructions"]["fields"]["policy"]
            .as_str()
            .expect("response carries a policy field");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .expect("policy is base64");
        serde_json::from_slice(&decoded).expect("policy is JSON")
    }

    pub async fn parse_response_body(
        &self,
        response: Response,
    ) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
        use http_body_util::BodyExt;

        let body = response.into_body().collect().await?.to_bytes();
        let json = serde_json::from_slice(&body)?;
        Ok(json)
    }
}

fn build_router(
    delegator: Arc<dyn CredentialDelegator>,
    input_gateway: Arc<InMemoryObjectGateway>,
) -> Router {
    setup_test_env();

    let endpoint = StoreEndpoint::aws(TEST_REGION.to_string());
    let issuer = Arc::new(UploadIssuer::new(
        delegator,
        UrlSigner::new(INPUT_BUCKET.to_string(), endpoint.clone()),
        Some(UrlSigner::new(OUTPUT_BUCKET.to_string(), endpoint)),
    ));
    let gateway: Arc<dyn ObjectGateway> = input_gateway;

    server::router(Environment::Development, issuer, gateway)
}
