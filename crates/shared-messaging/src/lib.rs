//! # Shared Messaging - Query Envelopes and Interceptors
//!
//! Building blocks shared by the query gateway and every query bus:
//!
//! - **Messages:** immutable [`GenericMessage`], [`QueryMessage`],
//!   [`SubscriptionQueryMessage`] and [`ResultMessage`] envelopes
//! - **Response types:** matchers/converters between what a caller expects and
//!   what a handler declares ([`ResponseTypes`])
//! - **Interceptors:** dispatch and result chains with cancellable
//!   registrations
//!
//! ## Message Flow
//!
//! ```text
//! ┌──────────┐  QueryMessage   ┌─────────────────┐   QueryMessage   ┌─────────┐
//! │  Caller  │ ──────────────► │ dispatch chain  │ ───────────────► │   Bus   │
//! │          │                 └─────────────────┘                  │         │
//! │          │  typed output   ┌─────────────────┐  ResultMessage*  │         │
//! │          │ ◄────────────── │  result chain   │ ◄─────────────── │         │
//! └──────────┘                 └─────────────────┘                  └─────────┘
//! ```
//!
//! Payloads travel as `serde_json::Value`; `Value::Null` is the null payload.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod errors;
pub mod interceptors;
pub mod message;
pub mod query;
pub mod registration;
pub mod response_types;
pub mod result;

// Re-export main types
pub use errors::{ConversionError, QueryError};
pub use interceptors::{
    dispatch_interceptor_fn, result_interceptor_fn, DispatchInterceptor,
    DispatchInterceptorChain, ResultInterceptor, ResultInterceptorChain, ResultStream,
};
pub use message::{GenericMessage, MessageId, MetaData};
pub use query::{query_name_of, QueryMessage, SubscriptionQueryMessage};
pub use registration::{FnRegistration, Registration};
pub use response_types::{
    InstanceResponseType, MultipleInstancesResponseType, OptionalResponseType, Page,
    PagedResponseType, ResponseShape, ResponseType, ResponseTypes, TypeDescriptor, TypeShape,
};
pub use result::{HandlerFailure, ResultMessage};
