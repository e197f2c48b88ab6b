//! Paged response type.

use super::multiple::{convert_elements, matches_multiple};
use super::{deserialize, ResponseShape, ResponseType, TypeDescriptor, TypeShape};
use crate::errors::ConversionError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

pub(super) fn matches_paged(expected: &TypeDescriptor, declared: &TypeShape) -> bool {
    match declared.unwrap_wrappers() {
        TypeShape::Page(element) => element.is_assignable_to(expected),
        TypeShape::RawPage => true,
        _ => matches_multiple(expected, declared),
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<R> {
    /// Items on this page.
    pub items: Vec<R>,
    /// Zero-based page index.
    #[serde(default)]
    pub page: u64,
    /// Requested page size.
    #[serde(default)]
    pub size: u64,
    /// Total number of items across all pages.
    #[serde(default)]
    pub total: u64,
}

impl<R> Page<R> {
    /// A page holding every item of an unpaged result.
    #[must_use]
    pub fn single(items: Vec<R>) -> Self {
        let len = items.len() as u64;
        Self {
            items,
            page: 0,
            size: len,
            total: len,
        }
    }
}

/// Expects one page of `R`.
pub struct PagedResponseType<R> {
    shape: ResponseShape,
    _marker: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned + Send + 'static> PagedResponseType<R> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_descriptor(TypeDescriptor::of::<R>())
    }

    #[must_use]
    pub fn with_descriptor(descriptor: TypeDescriptor) -> Self {
        Self {
            shape: ResponseShape::Paged(descriptor),
            _marker: PhantomData,
        }
    }
}

impl<R: DeserializeOwned + Send + 'static> Default for PagedResponseType<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for PagedResponseType<R> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            _marker: PhantomData,
        }
    }
}

impl<R> fmt::Debug for PagedResponseType<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PagedResponseType{{{}}}", self.shape.expected_type().name())
    }
}

impl<R: DeserializeOwned + Send + 'static> ResponseType for PagedResponseType<R> {
    type Output = Page<R>;

    fn shape(&self) -> &ResponseShape {
        &self.shape
    }

    fn convert(&self, raw: Value) -> Result<Page<R>, ConversionError> {
        let expected = self.shape.expected_type();
        if raw.is_object() && raw.get("items").is_some() {
            return deserialize(raw, expected);
        }
        convert_elements(raw, expected).map(Page::single)
    }

    fn absent(&self) -> Option<Page<R>> {
        Some(Page::single(Vec::new()))
    }
}
