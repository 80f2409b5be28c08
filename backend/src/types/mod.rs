mod environment;
mod error;
mod extractors;

pub use environment::{ConfigurationError, Environment, StorageSettings};
pub use error::{AppError, ApiErrorResponse};
pub use extractors::ValidatedJson;
