use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use chrono::Duration;
use object_gateway::{ObjectGateway, S3ObjectGateway};
use tracing_subscriber::{filter::LevelFilter, fmt, EnvFilter};

use upload_backend::{
    server,
    signing::{
        signing_session_policy, CachedDelegator, StsCredentialDelegator, TargetPrincipal,
        UrlSigner, DEFAULT_REFRESH_MARGIN_MINUTES,
    },
    types::{Environment, StorageSettings},
    upload::UploadIssuer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let environment = Environment::from_env();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(environment.tracing_level()).into())
        .from_env_lossy();

    // JSON logs for staging/production (Datadog), human-readable in development
    match environment {
        Environment::Production | Environment::Staging => {
            fmt().json().with_env_filter(filter).init();
        }
        Environment::Development => {
            fmt().with_env_filter(filter).init();
        }
    }

    let settings = StorageSettings::from_env(&environment)?;
    let aws_config = environment.aws_config().await;
    let endpoint = environment.store_endpoint(&aws_config)?;

    let target = settings.signer_role_arn.clone().map_or_else(
        || TargetPrincipal::DerivedFromAccount {
            role_name: settings.signer_role_name.clone(),
        },
        TargetPrincipal::Explicit,
    );
    let session_policy =
        signing_session_policy(&settings.input_bucket, settings.output_bucket.as_deref());

    let sts_delegator = StsCredentialDelegator::new(&aws_config, target, session_policy)
        .with_max_session(Duration::minutes(settings.signer_max_session_minutes));
    let delegator = Arc::new(CachedDelegator::new(
        Arc::new(sts_delegator),
        Duration::minutes(DEFAULT_REFRESH_MARGIN_MINUTES),
    ));

    let issuer = Arc::new(UploadIssuer::new(
        delegator,
        UrlSigner::new(settings.input_bucket.clone(), endpoint.clone()),
        settings
            .output_bucket
            .clone()
            .map(|bucket| UrlSigner::new(bucket, endpoint.clone())),
    ));

    let s3_client = Arc::new(S3Client::from_conf(environment.s3_client_config(&aws_config)));
    let input_gateway: Arc<dyn ObjectGateway> =
        Arc::new(S3ObjectGateway::new(s3_client, settings.input_bucket));

    tracing::info!(
        environment = environment.stage(),
        output_bucket = ?settings.output_bucket,
        max_session_minutes = settings.signer_max_session_minutes,
        "Storage configured"
    );

    server::start(environment, issuer, input_gateway).await
}
