//! # Result Messages
//!
//! A result carries either a payload or an exceptional outcome, never both.

use crate::message::{GenericMessage, MessageId, MetaData};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Exceptional outcome reported by a query handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerFailure {
    /// Error category (for example the handler's error type name).
    pub error_type: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl HandlerFailure {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Build a failure from any error, using its type name as category.
    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        Self::new(std::any::type_name::<E>(), err.to_string())
    }
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error_type, self.message)
    }
}

impl std::error::Error for HandlerFailure {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    Payload(Value),
    Exceptional(HandlerFailure),
}

/// Result of handling a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    id: MessageId,
    metadata: MetaData,
    outcome: Outcome,
}

impl ResultMessage {
    /// Successful result carrying `payload` (which may be `null`).
    #[must_use]
    pub fn success(payload: Value) -> Self {
        Self {
            id: MessageId::new(),
            metadata: MetaData::new(),
            outcome: Outcome::Payload(payload),
        }
    }

    /// Exceptional result.
    #[must_use]
    pub fn exceptional(failure: HandlerFailure) -> Self {
        Self {
            id: MessageId::new(),
            metadata: MetaData::new(),
            outcome: Outcome::Exceptional(failure),
        }
    }

    /// Build from a handler outcome.
    #[must_use]
    pub fn from_outcome(outcome: Result<Value, HandlerFailure>) -> Self {
        match outcome {
            Ok(payload) => Self::success(payload),
            Err(failure) => Self::exceptional(failure),
        }
    }

    /// Reuse the payload of an existing message as a result.
    #[must_use]
    pub fn from_message(message: &GenericMessage) -> Self {
        Self {
            id: message.id(),
            metadata: message.metadata().clone(),
            outcome: Outcome::Payload(message.payload().clone()),
        }
    }

    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    #[must_use]
    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    /// True iff this result carries a failure instead of a payload.
    #[must_use]
    pub fn is_exceptional(&self) -> bool {
        matches!(self.outcome, Outcome::Exceptional(_))
    }

    /// The payload, absent for exceptional results.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Payload(payload) => Some(payload),
            Outcome::Exceptional(_) => None,
        }
    }

    /// The failure, absent for successful results.
    #[must_use]
    pub fn exception_result(&self) -> Option<&HandlerFailure> {
        match &self.outcome {
            Outcome::Payload(_) => None,
            Outcome::Exceptional(failure) => Some(failure),
        }
    }

    /// Whether the payload is present and `null`.
    #[must_use]
    pub fn has_null_payload(&self) -> bool {
        matches!(self.outcome, Outcome::Payload(Value::Null))
    }

    /// Consume into the handler outcome.
    pub fn into_outcome(self) -> Result<Value, HandlerFailure> {
        match self.outcome {
            Outcome::Payload(payload) => Ok(payload),
            Outcome::Exceptional(failure) => Err(failure),
        }
    }

    /// Copy with metadata replaced.
    #[must_use]
    pub fn with_metadata(&self, metadata: MetaData) -> Self {
        Self {
            id: self.id,
            metadata,
            outcome: self.outcome.clone(),
        }
    }

    /// Copy with metadata merged.
    #[must_use]
    pub fn and_metadata(&self, metadata: &MetaData) -> Self {
        Self {
            id: self.id,
            metadata: self.metadata.merged_with(metadata),
            outcome: self.outcome.clone(),
        }
    }

    /// Copy with a successful payload, replacing any previous outcome.
    #[must_use]
    pub fn with_payload(&self, payload: Value) -> Self {
        Self {
            id: self.id,
            metadata: self.metadata.clone(),
            outcome: Outcome::Payload(payload),
        }
    }
}
