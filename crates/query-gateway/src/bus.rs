//! # Query Bus Interface
//!
//! The transport that locates and invokes query handlers. The gateway only
//! ever talks to a bus through this trait.

use async_trait::async_trait;
use futures::future::BoxFuture;
use shared_messaging::{
    QueryError, QueryMessage, Registration, ResultMessage, ResultStream, SubscriptionQueryMessage,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Dispatches queries to handlers.
#[async_trait]
pub trait QueryBus: Send + Sync {
    /// Dispatch to exactly one handler.
    ///
    /// An exceptional outcome of the handler is returned as an exceptional
    /// `ResultMessage`, not as an `Err`.
    async fn query(&self, query: QueryMessage) -> Result<ResultMessage, QueryError>;

    /// Dispatch to every matching handler, yielding results as they arrive.
    ///
    /// The stream ends when all handlers answered or `timeout` elapsed,
    /// whichever comes first. Reaching the deadline is not an error.
    fn scatter_gather(&self, query: QueryMessage, timeout: Duration) -> ResultStream;

    /// Open a subscription: an initial result plus a stream of updates.
    ///
    /// At most `update_buffer_size` updates are buffered for a slow consumer;
    /// what happens beyond that is up to the bus.
    async fn subscription_query(
        &self,
        query: SubscriptionQueryMessage,
        update_buffer_size: usize,
    ) -> Result<BusSubscription, QueryError>;
}

/// Raw subscription handed back by a bus.
pub struct BusSubscription {
    /// Result of the initial query.
    pub initial_result: BoxFuture<'static, Result<ResultMessage, QueryError>>,
    /// Updates emitted for the subscription, in emission order.
    pub updates: ResultStream,
    /// Cancelling releases every bus-side resource of the subscription.
    pub registration: Arc<dyn Registration>,
}

impl fmt::Debug for BusSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusSubscription").finish_non_exhaustive()
    }
}
