//! # Error Types
//!
//! Errors observed by callers through the futures and streams the gateway
//! returns. Every variant is cloneable so a single failure can be fanned out to
//! several consumers.

use crate::result::HandlerFailure;
use thiserror::Error;

/// Failure to convert a raw payload into the caller's expected type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// The payload does not deserialize into the expected type.
    #[error("Cannot convert payload to {expected}: {reason}")]
    Incompatible { expected: String, reason: String },

    /// A null payload reached a response type that has no empty form.
    #[error("Null payload cannot be converted to {expected}")]
    NullPayload { expected: String },
}

impl ConversionError {
    pub(crate) fn incompatible(expected: &str, err: &serde_json::Error) -> Self {
        Self::Incompatible {
            expected: expected.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Errors surfaced by query dispatch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// No handler can answer the query with the requested response type.
    #[error("No handler for query '{query_name}' returning {response_type}")]
    NoHandler {
        query_name: String,
        response_type: String,
    },

    /// The handler produced an exceptional result.
    #[error("Query handler failed: {0}")]
    Handler(HandlerFailure),

    /// A dispatch or result interceptor rejected the message.
    #[error("Interceptor rejected message: {0}")]
    Interceptor(String),

    /// The result could not be converted to the expected response type.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Every result was filtered out as null and the response type has no
    /// empty form.
    #[error("Query '{query_name}' produced no result")]
    EmptyResult { query_name: String },

    /// The query bus could not accept the message.
    #[error("Query bus unavailable: {0}")]
    BusUnavailable(String),

    /// The initial result of a subscription was already taken or can no
    /// longer be produced.
    #[error("Subscription initial result is no longer available")]
    SubscriptionClosed,

    /// The query payload could not be serialized into a message.
    #[error("Failed to serialize query payload: {0}")]
    Serialization(String),
}

impl QueryError {
    /// Short label used for metrics and structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoHandler { .. } => "no_handler",
            Self::Handler(_) => "handler",
            Self::Interceptor(_) => "interceptor",
            Self::Conversion(_) => "conversion",
            Self::EmptyResult { .. } => "empty_result",
            Self::BusUnavailable(_) => "bus_unavailable",
            Self::SubscriptionClosed => "subscription_closed",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Shorthand for an interceptor rejection.
    pub fn interceptor(reason: impl Into<String>) -> Self {
        Self::Interceptor(reason.into())
    }
}

impl From<HandlerFailure> for QueryError {
    fn from(failure: HandlerFailure) -> Self {
        Self::Handler(failure)
    }
}
