//! Dispatch-side interceptors.
//!
//! Applied to a query before it reaches the bus, in registration order, each
//! stage receiving the previous stage's output.

use super::registry::InterceptorRegistry;
use crate::errors::QueryError;
use crate::query::QueryMessage;
use crate::registration::FnRegistration;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Transforms (or rejects) a query before dispatch.
#[async_trait]
pub trait DispatchInterceptor: Send + Sync {
    /// Return the message to hand to the next stage, or fail to abort the
    /// dispatch.
    async fn intercept(&self, message: QueryMessage) -> Result<QueryMessage, QueryError>;
}

/// Dispatch interceptor backed by an async closure.
pub struct FnDispatchInterceptor<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure as a [`DispatchInterceptor`].
pub fn dispatch_interceptor_fn<F, Fut>(f: F) -> FnDispatchInterceptor<F, Fut>
where
    F: Fn(QueryMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<QueryMessage, QueryError>> + Send,
{
    FnDispatchInterceptor {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> DispatchInterceptor for FnDispatchInterceptor<F, Fut>
where
    F: Fn(QueryMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<QueryMessage, QueryError>> + Send,
{
    async fn intercept(&self, message: QueryMessage) -> Result<QueryMessage, QueryError> {
        (self.f)(message).await
    }
}

/// Ordered chain of dispatch interceptors.
pub struct DispatchInterceptorChain {
    registry: InterceptorRegistry<dyn DispatchInterceptor>,
}

impl DispatchInterceptorChain {
    #[must_use]
    pub fn new() -> Self {
        Self::with_interceptors(Vec::new())
    }

    #[must_use]
    pub fn with_interceptors(interceptors: Vec<Arc<dyn DispatchInterceptor>>) -> Self {
        Self {
            registry: InterceptorRegistry::with_interceptors("dispatch", interceptors),
        }
    }

    pub fn register(&self, interceptor: Arc<dyn DispatchInterceptor>) -> FnRegistration {
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

    /// Left fold of the current interceptors over `message`.
    ///
    /// Stages run strictly one after another; the first failure aborts the
    /// fold and no later stage is invoked.
    pub async fn intercept(&self, message: QueryMessage) -> Result<QueryMessage, QueryError> {
        let snapshot = self.registry.snapshot();
        let mut current = message;
        for (stage, interceptor) in snapshot.iter().enumerate() {
            current = match interceptor.intercept(current).await {
                Ok(next) => next,
                Err(e) => {
                    debug!(stage, error = %e, "Dispatch interceptor aborted query");
                    return Err(e);
                }
            };
        }
        Ok(current)
    }
}

impl Default for DispatchInterceptorChain {
    fn default() -> Self {
        Self::new()
    }
}
