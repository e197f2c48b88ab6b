//! Multiple-instances response type.

use super::{deserialize, ResponseShape, ResponseType, TypeDescriptor, TypeShape};
use crate::errors::ConversionError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

/// Multiple-instance matching: after unwrapping, the declared type must be an
/// array or collection of assignable elements, or a raw collection.
pub(super) fn matches_multiple(expected: &TypeDescriptor, declared: &TypeShape) -> bool {
    match declared.unwrap_wrappers() {
        TypeShape::Array(element) | TypeShape::Collection(element) => {
            element.is_assignable_to(expected)
        }
        TypeShape::RawCollection => true,
        _ => false,
    }
}

/// Expects a collection of `R`.
///
/// A handler returning a bare instance is accepted and converted into a
/// one-element vector.
pub struct MultipleInstancesResponseType<R> {
    shape: ResponseShape,
    _marker: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned + Send + 'static> MultipleInstancesResponseType<R> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_descriptor(TypeDescriptor::of::<R>())
    }

    #[must_use]
    pub fn with_descriptor(descriptor: TypeDescriptor) -> Self {
        Self {
            shape: ResponseShape::MultipleInstances(descriptor),
            _marker: PhantomData,
        }
    }
}

impl<R: DeserializeOwned + Send + 'static> Default for MultipleInstancesResponseType<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for MultipleInstancesResponseType<R> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            _marker: PhantomData,
        }
    }
}

impl<R> fmt::Debug for MultipleInstancesResponseType<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MultipleInstancesResponseType{{{}}}",
            self.shape.expected_type().name()
        )
    }
}

pub(super) fn convert_elements<R: DeserializeOwned>(
    raw: Value,
    expected: &TypeDescriptor,
) -> Result<Vec<R>, ConversionError> {
    match raw {
        Value::Array(items) => items
            .into_iter()
            .map(|item| deserialize(item, expected))
            .collect(),
        Value::Null => Ok(Vec::new()),
        scalar => Ok(vec![deserialize(scalar, expected)?]),
    }
}

impl<R: DeserializeOwned + Send + 'static> ResponseType for MultipleInstancesResponseType<R> {
    type Output = Vec<R>;

    fn shape(&self) -> &ResponseShape {
        &self.shape
    }

    fn convert(&self, raw: Value) -> Result<Vec<R>, ConversionError> {
        convert_elements(raw, self.shape.expected_type())
    }

    fn absent(&self) -> Option<Vec<R>> {
        Some(Vec::new())
    }
}
