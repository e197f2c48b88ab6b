//! Declared handler return shapes.
//!
//! Handlers describe what they return with a [`TypeShape`] instead of relying
//! on runtime reflection. Wrappers (`Future`, `Optional`) and containers
//! (`Collection`, `Array`, `Page`) nest explicitly, so matching is a walk over
//! a small closed tree.

use serde::{Deserialize, Serialize};

/// Name of a concrete type plus the names it is assignable to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDescriptor {
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    assignable_to: Vec<String>,
}

impl TypeDescriptor {
    /// Name of the descriptor every type is assignable to.
    pub const ANY: &'static str = "*";

    /// Descriptor for a named type.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assignable_to: Vec::new(),
        }
    }

    /// Descriptor for a Rust type, named by `std::any::type_name`.
    #[must_use]
    pub fn of<T: ?Sized>() -> Self {
        Self::named(std::any::type_name::<T>())
    }

    /// Descriptor accepting any value.
    #[must_use]
    pub fn any() -> Self {
        Self::named(Self::ANY)
    }

    /// Declare that this type is also assignable to `supertype`.
    #[must_use]
    pub fn with_supertype(mut self, supertype: impl Into<String>) -> Self {
        self.assignable_to.push(supertype.into());
        self
    }

    /// Declare that this type is also assignable to the Rust type `S`.
    #[must_use]
    pub fn assignable_as<S: ?Sized>(self) -> Self {
        self.with_supertype(std::any::type_name::<S>())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a value of this type can be used where `expected` is wanted.
    #[must_use]
    pub fn is_assignable_to(&self, expected: &TypeDescriptor) -> bool {
        expected.name == Self::ANY
            || self.name == expected.name
            || self.assignable_to.iter().any(|s| *s == expected.name)
    }
}

/// Declared return shape of a query handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum TypeShape {
    /// Handler returns nothing.
    Unit,
    /// A concrete, non-generic type.
    Named(TypeDescriptor),
    /// Asynchronous result wrapper.
    Future(Box<TypeShape>),
    /// Optional wrapper.
    Optional(Box<TypeShape>),
    /// Parameterized collection (list, set, ...).
    Collection(Box<TypeShape>),
    /// Fixed element-type array.
    Array(Box<TypeShape>),
    /// One page of a paged result.
    Page(Box<TypeShape>),
    /// Bounded wildcard or type variable; assignable through any bound.
    Bounded(Vec<TypeShape>),
    /// Collection declared without an element type.
    RawCollection,
    /// Page declared without an element type.
    RawPage,
}

impl TypeShape {
    #[must_use]
    pub fn of<T: ?Sized>() -> Self {
        Self::Named(TypeDescriptor::of::<T>())
    }

    #[must_use]
    pub fn named(descriptor: TypeDescriptor) -> Self {
        Self::Named(descriptor)
    }

    #[must_use]
    pub fn future(inner: TypeShape) -> Self {
        Self::Future(Box::new(inner))
    }

    #[must_use]
    pub fn optional(inner: TypeShape) -> Self {
        Self::Optional(Box::new(inner))
    }

    #[must_use]
    pub fn collection(inner: TypeShape) -> Self {
        Self::Collection(Box::new(inner))
    }

    #[must_use]
    pub fn array(inner: TypeShape) -> Self {
        Self::Array(Box::new(inner))
    }

    #[must_use]
    pub fn page(inner: TypeShape) -> Self {
        Self::Page(Box::new(inner))
    }

    #[must_use]
    pub fn bounded(bounds: Vec<TypeShape>) -> Self {
        Self::Bounded(bounds)
    }

    /// Strip every `Future` / `Optional` layer.
    #[must_use]
    pub fn unwrap_wrappers(&self) -> &TypeShape {
        let mut current = self;
        while let Self::Future(inner) | Self::Optional(inner) = current {
            current = inner;
        }
        current
    }

    /// Raw assignability: a concrete type assignable to `expected`,
    /// ignoring any type parameters.
    #[must_use]
    pub fn is_raw_assignable_to(&self, expected: &TypeDescriptor) -> bool {
        match self {
            Self::Named(descriptor) => descriptor.is_assignable_to(expected),
            _ => false,
        }
    }

    /// Generic assignability: a bounded wildcard or type variable whose
    /// bounds make it assignable to `expected`.
    #[must_use]
    pub fn is_generic_assignable_to(&self, expected: &TypeDescriptor) -> bool {
        match self {
            Self::Bounded(bounds) => bounds
                .iter()
                .any(|b| b.is_raw_assignable_to(expected) || b.is_generic_assignable_to(expected)),
            _ => false,
        }
    }

    /// Either assignability tier holds.
    #[must_use]
    pub fn is_assignable_to(&self, expected: &TypeDescriptor) -> bool {
        self.is_generic_assignable_to(expected) || self.is_raw_assignable_to(expected)
    }
}
