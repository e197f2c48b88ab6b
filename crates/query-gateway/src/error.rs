//! Gateway construction errors.
//!
//! Failures of an individual query are reported as
//! [`QueryError`](shared_messaging::QueryError) through the returned future or
//! stream; these errors prevent a gateway from being built at all.

use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// `build()` was called without a query bus.
    #[error("query bus must be provided")]
    MissingQueryBus,

    /// The supplied configuration failed validation.
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}
