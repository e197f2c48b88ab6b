//! Optional-instance response type.

use super::{deserialize, instance, ResponseShape, ResponseType, TypeDescriptor, TypeShape};
use crate::errors::ConversionError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

/// Expects zero or one `R`.
///
/// Serializes as a plain instance shape; `convert` maps `null` to `None` so
/// results produced for the substitute shape are still accepted.
pub struct OptionalResponseType<R> {
    shape: ResponseShape,
    _marker: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned + Send + 'static> OptionalResponseType<R> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_descriptor(TypeDescriptor::of::<R>())
    }

    #[must_use]
    pub fn with_descriptor(descriptor: TypeDescriptor) -> Self {
        Self {
            shape: ResponseShape::OptionalInstance(descriptor),
            _marker: PhantomData,
        }
    }
}

impl<R: DeserializeOwned + Send + 'static> Default for OptionalResponseType<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for OptionalResponseType<R> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            _marker: PhantomData,
        }
    }
}

impl<R> fmt::Debug for OptionalResponseType<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OptionalResponseType{{{}}}", self.shape.expected_type().name())
    }
}

impl<R: DeserializeOwned + Send + 'static> ResponseType for OptionalResponseType<R> {
    type Output = Option<R>;

    fn shape(&self) -> &ResponseShape {
        &self.shape
    }

    fn matches(&self, declared: &TypeShape) -> bool {
        instance::matches_instance(self.shape.expected_type(), declared)
    }

    fn convert(&self, raw: Value) -> Result<Option<R>, ConversionError> {
        if raw.is_null() {
            return Ok(None);
        }
        deserialize(raw, self.shape.expected_type()).map(Some)
    }

    fn for_serialization(&self) -> ResponseShape {
        ResponseShape::Instance(self.shape.expected_type().clone())
    }

    fn absent(&self) -> Option<Option<R>> {
        Some(None)
    }
}
