//! # Interceptor Chains
//!
//! Runtime-registered pipelines applied around query dispatch.
//!
//! ```text
//!  query ──► [dispatch 1] ──► [dispatch 2] ──► bus
//!                                                │
//!  caller ◄── [result 2] ◄── [result 1] ◄── exceptional check ◄── results
//! ```
//!
//! Both chains read their interceptors from a copy-on-write registry, so a
//! query in flight is never affected by concurrent (un)registration.

mod dispatch;
mod registry;
mod result;

pub use dispatch::{
    dispatch_interceptor_fn, DispatchInterceptor, DispatchInterceptorChain, FnDispatchInterceptor,
};
pub use registry::{InterceptorRegistry, InterceptorSnapshot};
pub use result::{
    fail_exceptional, result_interceptor_fn, FnResultInterceptor, ResultInterceptor,
    ResultInterceptorChain, ResultStream,
};
