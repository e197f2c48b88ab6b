//! # Query Messages
//!
//! A query is a message plus a query name and the response shape the caller
//! expects. Subscription queries additionally describe the shape of each
//! incremental update.

use crate::errors::QueryError;
use crate::message::{GenericMessage, MessageId, MetaData};
use crate::response_types::ResponseShape;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default query name for a payload of type `Q`.
#[must_use]
pub fn query_name_of<Q: ?Sized>() -> String {
    std::any::type_name::<Q>().to_string()
}

/// Immutable query envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMessage {
    message: GenericMessage,
    query_name: String,
    response_type: ResponseShape,
}

impl QueryMessage {
    /// Build a query from an existing message.
    pub fn new(
        message: GenericMessage,
        query_name: impl Into<String>,
        response_type: ResponseShape,
    ) -> Self {
        Self {
            message,
            query_name: query_name.into(),
            response_type,
        }
    }

    /// Build a query from a typed payload, named after the payload's type.
    pub fn from_payload<Q: Serialize>(
        payload: &Q,
        response_type: ResponseShape,
    ) -> Result<Self, QueryError> {
        Self::named(query_name_of::<Q>(), payload, response_type)
    }

    /// Build a named query from a typed payload.
    pub fn named<Q: Serialize>(
        query_name: impl Into<String>,
        payload: &Q,
        response_type: ResponseShape,
    ) -> Result<Self, QueryError> {
        let message = GenericMessage::from_payload(payload)
            .map_err(|e| QueryError::Serialization(e.to_string()))?;
        Ok(Self::new(message, query_name, response_type))
    }

    #[must_use]
    pub fn id(&self) -> MessageId {
        self.message.id()
    }

    #[must_use]
    pub fn payload(&self) -> &Value {
        self.message.payload()
    }

    #[must_use]
    pub fn metadata(&self) -> &MetaData {
        self.message.metadata()
    }

    #[must_use]
    pub fn message(&self) -> &GenericMessage {
        &self.message
    }

    #[must_use]
    pub fn query_name(&self) -> &str {
        &self.query_name
    }

    #[must_use]
    pub fn response_type(&self) -> &ResponseShape {
        &self.response_type
    }

    #[must_use]
    pub fn with_metadata(&self, metadata: MetaData) -> Self {
        self.with_message(self.message.with_metadata(metadata))
    }

    #[must_use]
    pub fn and_metadata(&self, metadata: &MetaData) -> Self {
        self.with_message(self.message.and_metadata(metadata))
    }

    #[must_use]
    pub fn with_payload(&self, payload: Value) -> Self {
        self.with_message(self.message.with_payload(payload))
    }

    fn with_message(&self, message: GenericMessage) -> Self {
        Self {
            message,
            query_name: self.query_name.clone(),
            response_type: self.response_type.clone(),
        }
    }
}

/// Query expecting an initial result followed by a stream of updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionQueryMessage {
    query: QueryMessage,
    update_response_type: ResponseShape,
}

impl SubscriptionQueryMessage {
    /// `query.response_type()` describes the initial result.
    #[must_use]
    pub fn new(query: QueryMessage, update_response_type: ResponseShape) -> Self {
        Self {
            query,
            update_response_type,
        }
    }

    /// The initial-result query.
    #[must_use]
    pub fn query(&self) -> &QueryMessage {
        &self.query
    }

    #[must_use]
    pub fn id(&self) -> MessageId {
        self.query.id()
    }

    #[must_use]
    pub fn query_name(&self) -> &str {
        self.query.query_name()
    }

    #[must_use]
    pub fn update_response_type(&self) -> &ResponseShape {
        &self.update_response_type
    }

    /// Same update shape over a different (for example intercepted) query.
    #[must_use]
    pub fn with_query(&self, query: QueryMessage) -> Self {
        Self {
            query,
            update_response_type: self.update_response_type.clone(),
        }
    }

    #[must_use]
    pub fn with_metadata(&self, metadata: MetaData) -> Self {
        self.with_query(self.query.with_metadata(metadata))
    }

    #[must_use]
    pub fn and_metadata(&self, metadata: &MetaData) -> Self {
        self.with_query(self.query.and_metadata(metadata))
    }

    /// Split into the initial query and the update shape.
    #[must_use]
    pub fn into_parts(self) -> (QueryMessage, ResponseShape) {
        (self.query, self.update_response_type)
    }
}
