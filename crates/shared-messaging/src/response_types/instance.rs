//! Single-instance response type.

use super::{deserialize, ResponseShape, ResponseType, TypeDescriptor, TypeShape};
use crate::errors::ConversionError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

/// Instance matching: strip `Future`/`Optional` layers, then accept the
/// declared type if it is generically or raw assignable to `expected`.
pub(super) fn matches_instance(expected: &TypeDescriptor, declared: &TypeShape) -> bool {
    declared.unwrap_wrappers().is_assignable_to(expected)
}

/// Expects exactly one `R`.
pub struct InstanceResponseType<R> {
    shape: ResponseShape,
    _marker: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned + Send + 'static> InstanceResponseType<R> {
    /// Expect `R`, named after its Rust type.
    #[must_use]
    pub fn new() -> Self {
        Self::with_descriptor(TypeDescriptor::of::<R>())
    }

    /// Expect `R`, matched against handlers by `descriptor`.
    #[must_use]
    pub fn with_descriptor(descriptor: TypeDescriptor) -> Self {
        Self {
            shape: ResponseShape::Instance(descriptor),
            _marker: PhantomData,
        }
    }
}

impl<R: DeserializeOwned + Send + 'static> Default for InstanceResponseType<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for InstanceResponseType<R> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            _marker: PhantomData,
        }
    }
}

impl<R> fmt::Debug for InstanceResponseType<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceResponseType{{{}}}", self.shape.expected_type().name())
    }
}

impl<R: DeserializeOwned + Send + 'static> ResponseType for InstanceResponseType<R> {
    type Output = R;

    fn shape(&self) -> &ResponseShape {
        &self.shape
    }

    fn convert(&self, raw: Value) -> Result<R, ConversionError> {
        deserialize(raw, self.shape.expected_type())
    }
}
