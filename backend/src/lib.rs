//! Upload backend: issues signed URLs for direct-to-store media uploads

#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs, dead_code)]

/// Post-upload processing of stored objects
pub mod analysis;

/// HTTP routes
pub mod routes;

/// Server bootstrap
pub mod server;

/// Delegated credentials and URL signing
pub mod signing;

/// Shared types: configuration, errors, extractors
pub mod types;

/// Upload policy, path allocation and issuance
pub mod upload;
