//! Environment configuration for different deployment stages

use std::env;
use std::time::Duration;

use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion, SdkConfig};
use thiserror::Error;
use tracing::Level;

use crate::signing::StoreEndpoint;

/// Region used when neither the environment nor the SDK profile provides one
const DEFAULT_REGION: &str = "us-east-1";

/// LocalStack edge endpoint used in development
const LOCALSTACK_ENDPOINT: &str = "http://localhost:4566";

/// Longest session the signing role is assumed to allow (the IAM ceiling)
const DEFAULT_SIGNER_MAX_SESSION_MINUTES: i64 = 720;

/// Missing or malformed mandatory configuration
#[derive(Error, Debug)]
#[error("Configuration error: {0}")]
pub struct ConfigurationError(pub String);

/// Application environment configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Production environment
    Production,
    /// Staging environment
    Staging,
    /// Development environment (uses `LocalStack`)
    Development,
}

impl Environment {
    /// Creates an Environment from the `APP_ENV` environment variable
    ///
    /// # Panics
    ///
    /// Panics if `APP_ENV` contains an invalid value
    #[must_use]
    pub fn from_env() -> Self {
        let env = env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .trim()
            .to_lowercase();

        match env.as_str() {
            "production" => Self::Production,
            "staging" => Self::Staging,
            "development" => Self::Development,
            _ => panic!("Invalid environment: {env}"),
        }
    }

    /// Lowercase stage name, used in derived resource names
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Development => "development",
        }
    }

    /// Whether to show API docs
    #[must_use]
    pub const fn show_api_docs(&self) -> bool {
        matches!(self, Self::Development | Self::Staging)
    }

    /// Returns the endpoint URL to use for AWS services
    #[must_use]
    pub const fn override_aws_endpoint_url(&self) -> Option<&str> {
        match self {
            // Regular AWS endpoints for production and staging
            Self::Production | Self::Staging => None,
            // LocalStack endpoint for development
            Self::Development => Some(LOCALSTACK_ENDPOINT),
        }
    }

    /// AWS configuration with retry and timeout settings
    pub async fn aws_config(&self) -> SdkConfig {
        let retry_config = RetryConfig::standard()
            .with_max_attempts(3)
            .with_initial_backoff(Duration::from_millis(50));

        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(30))
            .build();

        let mut config_builder = aws_config::load_defaults(BehaviorVersion::latest())
            .await
            .to_builder()
            .retry_config(retry_config)
            .timeout_config(timeout_config);

        if let Some(endpoint_url) = self.override_aws_endpoint_url() {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }

        config_builder.build()
    }

    /// AWS S3 service configuration
    #[must_use]
    pub fn s3_client_config(&self, aws_config: &SdkConfig) -> aws_sdk_s3::Config {
        let s3_config: aws_sdk_s3::Config = aws_config.into();
        let mut builder = s3_config.to_builder();

        // Override "force path style" to true for compatibility with LocalStack
        // https://github.com/awslabs/aws-sdk-rust/discussions/874
        if matches!(self, Self::Development) {
            builder.set_force_path_style(Some(true));
        }

        builder.build()
    }

    /// Where signed URLs point: region, optional endpoint and addressing style
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the endpoint override is not a valid URL
    pub fn store_endpoint(&self, aws_config: &SdkConfig) -> Result<StoreEndpoint, ConfigurationError> {
        let region = aws_config
            .region()
            .map_or_else(|| DEFAULT_REGION.to_string(), ToString::to_string);

        match self.override_aws_endpoint_url() {
            Some(endpoint_url) => StoreEndpoint::path_style(region, endpoint_url),
            None => Ok(StoreEndpoint::aws(region)),
        }
    }

    /// Port the HTTP server binds to
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if `PORT` is set but is not a valid port number
    pub fn port(&self) -> Result<u16, ConfigurationError> {
        env::var("PORT").map_or(Ok(8080), |port| {
            port.parse()
                .map_err(|_| ConfigurationError(format!("PORT is not a valid port: {port}")))
        })
    }

    /// Default tracing level, overridable with `TRACING_LEVEL`
    #[must_use]
    pub fn tracing_level(&self) -> Level {
        env::var("TRACING_LEVEL")
            .ok()
            .and_then(|val| val.parse::<Level>().ok())
            .unwrap_or(match self {
                Self::Production | Self::Staging => Level::INFO,
                Self::Development => Level::DEBUG,
            })
    }
}

/// Buckets and signing principal configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    /// Bucket receiving direct uploads
    pub input_bucket: String,
    /// Bucket receiving processing results
    pub output_bucket: Option<String>,
    /// Explicit role to impersonate for signing
    pub signer_role_arn: Option<String>,
    /// Role name used when the signing role is derived from the account id
    pub signer_role_name: String,
    /// `MaxSessionDuration` of the signing role, in minutes
    pub signer_max_session_minutes: i64,
}

impl StorageSettings {
    /// Reads storage settings from the process environment
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if `S3_INPUT_BUCKET` is missing or empty, or if
    /// `UPLOAD_SIGNER_MAX_SESSION_MINUTES` is not a positive number
    pub fn from_env(environment: &Environment) -> Result<Self, ConfigurationError> {
        let input_bucket = non_empty_var("S3_INPUT_BUCKET").ok_or_else(|| {
            ConfigurationError("S3_INPUT_BUCKET environment variable is required".to_string())
        })?;

        let signer_max_session_minutes = match non_empty_var("UPLOAD_SIGNER_MAX_SESSION_MINUTES") {
            None => DEFAULT_SIGNER_MAX_SESSION_MINUTES,
            Some(value) => value.parse().ok().filter(|minutes| *minutes > 0).ok_or_else(|| {
                ConfigurationError(format!(
                    "UPLOAD_SIGNER_MAX_SESSION_MINUTES must be a positive number of minutes: {value}"
                ))
            })?,
        };

        Ok(Self {
            input_bucket,
            output_bucket: non_empty_var("S3_OUTPUT_BUCKET"),
            signer_role_arn: non_empty_var("UPLOAD_SIGNER_ROLE_ARN"),
            signer_role_name: non_empty_var("UPLOAD_SIGNER_ROLE_NAME")
                .unwrap_or_else(|| format!("upload-url-signer-{}", environment.stage())),
            signer_max_session_minutes,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
