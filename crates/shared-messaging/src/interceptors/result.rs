//! Result-side interceptors.
//!
//! Operate on the stream of results a query produces, with the originating
//! query as read-only context.

use super::registry::InterceptorRegistry;
use crate::errors::QueryError;
use crate::query::QueryMessage;
use crate::registration::FnRegistration;
use crate::result::ResultMessage;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;

/// Stream of results as produced by a bus and consumed by interceptors.
pub type ResultStream = BoxStream<'static, Result<ResultMessage, QueryError>>;

/// Transforms the result stream of a query.
///
/// Implementations may map, filter or append results but must not dispatch
/// new queries.
pub trait ResultInterceptor: Send + Sync {
    fn intercept(&self, query: &QueryMessage, results: ResultStream) -> ResultStream;
}

/// Result interceptor backed by a closure.
pub struct FnResultInterceptor<F> {
    f: F,
}

/// Wrap a closure as a [`ResultInterceptor`].
pub fn result_interceptor_fn<F>(f: F) -> FnResultInterceptor<F>
where
    F: Fn(&QueryMessage, ResultStream) -> ResultStream + Send + Sync,
{
    FnResultInterceptor { f }
}

impl<F> ResultInterceptor for FnResultInterceptor<F>
where
    F: Fn(&QueryMessage, ResultStream) -> ResultStream + Send + Sync,
{
    fn intercept(&self, query: &QueryMessage, results: ResultStream) -> ResultStream {
        (self.f)(query, results)
    }
}

/// Turn every exceptional result into a failure item.
pub fn fail_exceptional(results: ResultStream) -> ResultStream {
    results
        .map(|item| {
            item.and_then(|result| match result.exception_result() {
                Some(failure) => Err(QueryError::Handler(failure.clone())),
                None => Ok(result),
            })
        })
        .boxed()
}

/// Ordered chain of result interceptors.
pub struct ResultInterceptorChain {
    registry: InterceptorRegistry<dyn ResultInterceptor>,
}

impl ResultInterceptorChain {
    #[must_use]
    pub fn new() -> Self {
        Self::with_interceptors(Vec::new())
    }

    #[must_use]
    pub fn with_interceptors(interceptors: Vec<Arc<dyn ResultInterceptor>>) -> Self {
        Self {
            registry: InterceptorRegistry::with_interceptors("result", interceptors),
        }
    }

    pub fn register(&self, interceptor: Arc<dyn ResultInterceptor>) -> FnRegistration {
        self.registry.register(interceptor)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Convert exceptional results into failures, then fold the current
    /// interceptors over the stream. Each stage wraps the previous stage's
    /// stream, so the order of items is preserved.
    pub fn intercept(&self, query: &QueryMessage, results: ResultStream) -> ResultStream {
        self.registry
            .snapshot()
            .iter()
            .fold(fail_exceptional(results), |stream, interceptor| {
                interceptor.intercept(query, stream)
            })
    }
}

impl Default for ResultInterceptorChain {
    fn default() -> Self {
        Self::new()
    }
}
