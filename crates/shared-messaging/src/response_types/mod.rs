//! # Response Types
//!
//! Matchers/converters between the response a caller expects and the shape a
//! handler declares.
//!
//! ## Variants
//!
//! | Variant | Output | Matches (after unwrapping `Future`/`Optional`) |
//! |---------|--------|------------------------------------------------|
//! | instance | `R` | an assignable type |
//! | optional instance | `Option<R>` | an assignable type |
//! | multiple instances | `Vec<R>` | an array/collection of assignable elements |
//! | paged | `Page<R>` | a page, or anything multiple instances matches |
//!
//! `matches` must be evaluated before `convert`: converting a value produced
//! by a handler whose declared shape does not match is unspecified.
//!
//! ```rust,ignore
//! let response_type = ResponseTypes::instance_of::<Widget>();
//! assert!(response_type.matches(&TypeShape::future(TypeShape::of::<Widget>())));
//! let widget = response_type.convert(raw_value)?;
//! ```

mod instance;
mod multiple;
mod optional;
mod paged;
mod shape;

pub use instance::InstanceResponseType;
pub use multiple::MultipleInstancesResponseType;
pub use optional::OptionalResponseType;
pub use paged::{Page, PagedResponseType};
pub use shape::{TypeDescriptor, TypeShape};

use crate::errors::ConversionError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Closed, serializable description of an expected response.
///
/// Carried inside query messages so buses can select handlers without knowing
/// the caller's Rust type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "expected", rename_all = "snake_case")]
pub enum ResponseShape {
    /// Exactly one object.
    Instance(TypeDescriptor),
    /// Zero or one object.
    OptionalInstance(TypeDescriptor),
    /// A collection of objects.
    MultipleInstances(TypeDescriptor),
    /// One page of objects.
    Paged(TypeDescriptor),
}

impl ResponseShape {
    /// The element/instance type the caller expects.
    #[must_use]
    pub fn expected_type(&self) -> &TypeDescriptor {
        match self {
            Self::Instance(expected)
            | Self::OptionalInstance(expected)
            | Self::MultipleInstances(expected)
            | Self::Paged(expected) => expected,
        }
    }

    /// Whether a handler declaring `declared` can answer this response shape.
    #[must_use]
    pub fn matches(&self, declared: &TypeShape) -> bool {
        match self {
            Self::Instance(expected) | Self::OptionalInstance(expected) => {
                instance::matches_instance(expected, declared)
            }
            Self::MultipleInstances(expected) => multiple::matches_multiple(expected, declared),
            Self::Paged(expected) => paged::matches_paged(expected, declared),
        }
    }

    /// Shape of the payload carried by result messages for this response.
    #[must_use]
    pub fn response_message_payload_type(&self) -> TypeShape {
        match self {
            Self::Instance(expected) | Self::OptionalInstance(expected) => {
                TypeShape::Named(expected.clone())
            }
            Self::MultipleInstances(expected) => {
                TypeShape::collection(TypeShape::Named(expected.clone()))
            }
            Self::Paged(expected) => TypeShape::page(TypeShape::Named(expected.clone())),
        }
    }
}

impl fmt::Display for ResponseShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(e) => write!(f, "instance of {}", e.name()),
            Self::OptionalInstance(e) => write!(f, "optional instance of {}", e.name()),
            Self::MultipleInstances(e) => write!(f, "multiple instances of {}", e.name()),
            Self::Paged(e) => write!(f, "page of {}", e.name()),
        }
    }
}

/// Typed matcher/converter for an expected response.
pub trait ResponseType: fmt::Debug + Send + Sync + 'static {
    /// Value handed to the caller.
    type Output: Send + 'static;

    /// The untyped shape carried by query messages.
    fn shape(&self) -> &ResponseShape;

    /// Convert a raw handler payload into the caller's type.
    fn convert(&self, raw: Value) -> Result<Self::Output, ConversionError>;

    /// Whether a handler declaring `declared` can answer this response type.
    fn matches(&self, declared: &TypeShape) -> bool {
        self.shape().matches(declared)
    }

    fn response_message_payload_type(&self) -> TypeShape {
        self.shape().response_message_payload_type()
    }

    /// Shape to put on the wire in place of this one. `convert` must accept
    /// payloads shaped after the substitute.
    fn for_serialization(&self) -> ResponseShape {
        self.shape().clone()
    }

    /// Value delivered when every result was filtered out as null. `None`
    /// means the response type has no empty form.
    fn absent(&self) -> Option<Self::Output> {
        None
    }
}

/// Factory for the built-in response types.
pub struct ResponseTypes;

impl ResponseTypes {
    /// Exactly one `R`.
    #[must_use]
    pub fn instance_of<R: DeserializeOwned + Send + 'static>() -> InstanceResponseType<R> {
        InstanceResponseType::new()
    }

    /// Zero or one `R`.
    #[must_use]
    pub fn optional_instance_of<R: DeserializeOwned + Send + 'static>() -> OptionalResponseType<R>
    {
        OptionalResponseType::new()
    }

    /// A collection of `R`.
    #[must_use]
    pub fn multiple_instances_of<R: DeserializeOwned + Send + 'static>(
    ) -> MultipleInstancesResponseType<R> {
        MultipleInstancesResponseType::new()
    }

    /// One page of `R`.
    #[must_use]
    pub fn paged_instances_of<R: DeserializeOwned + Send + 'static>() -> PagedResponseType<R> {
        PagedResponseType::new()
    }
}

pub(crate) fn deserialize<R: DeserializeOwned>(
    raw: Value,
    expected: &TypeDescriptor,
) -> Result<R, ConversionError> {
    serde_json::from_value(raw).map_err(|e| ConversionError::incompatible(expected.name(), &e))
}
