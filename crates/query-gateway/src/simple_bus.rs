//! # In-Process Query Bus
//!
//! Reference [`QueryBus`] for tests and embedded deployments. Handlers are
//! registered per query name with a declared return shape; a query is routed
//! to the handlers whose shape its response type matches.
//!
//! Subscription updates are pushed through a [`QueryUpdateEmitter`]. Each
//! subscription has a bounded buffer; when it is full the newest update is
//! dropped and a warning is logged. A failure ending a subscription bypasses
//! the buffer and is delivered after the updates already buffered.

use crate::bus::{BusSubscription, QueryBus};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::{self, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use shared_messaging::{
    FnRegistration, HandlerFailure, QueryError, QueryMessage, ResultMessage, ResultStream,
    SubscriptionQueryMessage, TypeShape,
};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Handles queries of one name.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// Shape of the values this handler returns.
    fn declared_type(&self) -> &TypeShape;

    /// Answer a query. `Ok(Value::Null)` means "no result".
    async fn handle(&self, query: QueryMessage) -> Result<Value, HandlerFailure>;
}

/// Query handler backed by an async closure.
pub struct FnQueryHandler<F, Fut> {
    declared: TypeShape,
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure as a [`QueryHandler`] returning `declared`.
pub fn handler_fn<F, Fut>(declared: TypeShape, f: F) -> FnQueryHandler<F, Fut>
where
    F: Fn(QueryMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerFailure>> + Send,
{
    FnQueryHandler {
        declared,
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> QueryHandler for FnQueryHandler<F, Fut>
where
    F: Fn(QueryMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerFailure>> + Send,
{
    fn declared_type(&self) -> &TypeShape {
        &self.declared
    }

    async fn handle(&self, query: QueryMessage) -> Result<Value, HandlerFailure> {
        (self.f)(query).await
    }
}

struct HandlerEntry {
    id: u64,
    handler: Arc<dyn QueryHandler>,
}

struct ActiveSubscription {
    query: SubscriptionQueryMessage,
    sender: mpsc::Sender<Result<ResultMessage, QueryError>>,
    /// Final item of the update stream, sent when the subscription fails.
    terminal: oneshot::Sender<ResultMessage>,
}

struct BusInner {
    /// Handlers by query name, in registration order.
    handlers: DashMap<String, Vec<HandlerEntry>>,
    /// Open subscriptions by id.
    subscriptions: DashMap<u64, ActiveSubscription>,
    next_id: AtomicU64,
}

impl BusInner {
    fn candidates(&self, query: &QueryMessage) -> Vec<Arc<dyn QueryHandler>> {
        self.handlers
            .get(query.query_name())
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| query.response_type().matches(e.handler.declared_type()))
                    .map(|e| e.handler.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn remove_handler(&self, query_name: &str, id: u64) -> bool {
        let removed = self
            .handlers
            .get_mut(query_name)
            .map(|mut entries| {
                let before = entries.len();
                entries.retain(|e| e.id != id);
                entries.len() != before
            })
            .unwrap_or(false);
        self.handlers.remove_if(query_name, |_, entries| entries.is_empty());
        if removed {
            debug!(query_name, "Query handler unsubscribed");
        }
        removed
    }

    fn matching_subscriptions<F>(&self, filter: F) -> Vec<u64>
    where
        F: Fn(&SubscriptionQueryMessage) -> bool,
    {
        self.subscriptions
            .iter()
            .filter(|entry| filter(&entry.value().query))
            .map(|entry| *entry.key())
            .collect()
    }
}

fn no_handler(query: &QueryMessage) -> QueryError {
    QueryError::NoHandler {
        query_name: query.query_name().to_string(),
        response_type: query.response_type().to_string(),
    }
}

/// In-memory query bus.
///
/// Cheap to clone; clones share handlers and subscriptions.
#[derive(Clone)]
pub struct SimpleQueryBus {
    inner: Arc<BusInner>,
}

impl SimpleQueryBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                handlers: DashMap::new(),
                subscriptions: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register `handler` for queries named `query_name`.
    pub fn subscribe(
        &self,
        query_name: impl Into<String>,
        handler: Arc<dyn QueryHandler>,
    ) -> FnRegistration {
        let query_name = query_name.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        debug!(
            query_name = %query_name,
            declared = ?handler.declared_type(),
            "Query handler subscribed"
        );
        self.inner
            .handlers
            .entry(query_name.clone())
            .or_default()
            .push(HandlerEntry { id, handler });

        let inner: Weak<BusInner> = Arc::downgrade(&self.inner);
        FnRegistration::new(move || {
            inner
                .upgrade()
                .is_some_and(|inner| inner.remove_handler(&query_name, id))
        })
    }

    /// Emitter pushing updates to the subscriptions of this bus.
    #[must_use]
    pub fn emitter(&self) -> QueryUpdateEmitter {
        QueryUpdateEmitter {
            inner: self.inner.clone(),
        }
    }

    /// Number of subscriptions not yet completed or cancelled.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.inner.subscriptions.len()
    }
}

impl Default for SimpleQueryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryBus for SimpleQueryBus {
    async fn query(&self, query: QueryMessage) -> Result<ResultMessage, QueryError> {
        let handler = self
            .inner
            .candidates(&query)
            .into_iter()
            .next()
            .ok_or_else(|| no_handler(&query))?;

        debug!(query_name = query.query_name(), message_id = %query.id(), "Handling query");
        Ok(ResultMessage::from_outcome(handler.handle(query).await))
    }

    fn scatter_gather(&self, query: QueryMessage, timeout: Duration) -> ResultStream {
        let candidates = self.inner.candidates(&query);
        debug!(
            query_name = query.query_name(),
            handlers = candidates.len(),
            "Scattering query"
        );

        let pending: FuturesUnordered<_> = candidates
            .into_iter()
            .map(|handler| {
                let query = query.clone();
                async move { Ok::<_, QueryError>(ResultMessage::from_outcome(handler.handle(query).await)) }
            })
            .collect();

        pending.take_until(tokio::time::sleep(timeout)).boxed()
    }

    async fn subscription_query(
        &self,
        query: SubscriptionQueryMessage,
        update_buffer_size: usize,
    ) -> Result<BusSubscription, QueryError> {
        let handler = self
            .inner
            .candidates(query.query())
            .into_iter()
            .next()
            .ok_or_else(|| no_handler(query.query()))?;

        let (sender, receiver) = mpsc::channel(update_buffer_size.max(1));
        let (terminal, terminal_receiver) = oneshot::channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscriptions.insert(
            id,
            ActiveSubscription {
                query: query.clone(),
                sender,
                terminal,
            },
        );
        debug!(
            query_name = query.query_name(),
            subscription_id = id,
            update_buffer_size,
            "Subscription opened"
        );

        let initial_query = query.query().clone();
        let initial_result =
            async move { Ok::<_, QueryError>(ResultMessage::from_outcome(handler.handle(initial_query).await)) }
                .boxed();

        let inner = Arc::downgrade(&self.inner);
        let registration = FnRegistration::new(move || {
            let removed = inner
                .upgrade()
                .is_some_and(|inner| inner.subscriptions.remove(&id).is_some());
            if removed {
                debug!(subscription_id = id, "Subscription released");
            }
            removed
        });

        Ok(BusSubscription {
            initial_result,
            updates: ReceiverStream::new(receiver)
                .chain(
                    terminal_receiver
                        .into_stream()
                        .filter_map(|failure| future::ready(failure.ok().map(Ok))),
                )
                .boxed(),
            registration: Arc::new(registration),
        })
    }
}

/// Pushes updates to open subscriptions selected by a filter.
#[derive(Clone)]
pub struct QueryUpdateEmitter {
    inner: Arc<BusInner>,
}

impl QueryUpdateEmitter {
    /// Send `update` to every subscription accepted by `filter`.
    ///
    /// Returns the number of subscriptions that buffered the update.
    pub fn emit<F>(&self, filter: F, update: Value) -> usize
    where
        F: Fn(&SubscriptionQueryMessage) -> bool,
    {
        let mut delivered = 0;
        for id in self.inner.matching_subscriptions(filter) {
            if self.send(id, Ok(ResultMessage::success(update.clone()))) {
                delivered += 1;
            }
        }
        delivered
    }

    /// [`emit`](Self::emit) to every subscription of `query_name`.
    pub fn emit_to(&self, query_name: &str, update: Value) -> usize {
        self.emit(|query| query.query_name() == query_name, update)
    }

    /// End the update streams of every subscription accepted by `filter`.
    pub fn complete<F>(&self, filter: F) -> usize
    where
        F: Fn(&SubscriptionQueryMessage) -> bool,
    {
        let ids = self.inner.matching_subscriptions(filter);
        for id in &ids {
            // dropping the sender ends the stream once buffered updates are read
            self.inner.subscriptions.remove(id);
        }
        debug!(completed = ids.len(), "Subscriptions completed");
        ids.len()
    }

    /// Fail the update streams of every subscription accepted by `filter`.
    pub fn complete_exceptionally<F>(&self, filter: F, failure: HandlerFailure) -> usize
    where
        F: Fn(&SubscriptionQueryMessage) -> bool,
    {
        let mut failed = 0;
        for id in self.inner.matching_subscriptions(filter) {
            if let Some((_, subscription)) = self.inner.subscriptions.remove(&id) {
                // a gone subscriber has nothing left to fail
                let _ = subscription
                    .terminal
                    .send(ResultMessage::exceptional(failure.clone()));
                failed += 1;
            }
        }
        debug!(failed, error = %failure, "Subscriptions completed exceptionally");
        failed
    }

    fn send(&self, id: u64, update: Result<ResultMessage, QueryError>) -> bool {
        let Some(subscription) = self.inner.subscriptions.get(&id) else {
            return false;
        };

        match subscription.sender.try_send(update) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    query_name = subscription.query.query_name(),
                    subscription_id = id,
                    "Update buffer full, update dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                drop(subscription);
                self.inner.subscriptions.remove(&id);
                debug!(subscription_id = id, "Subscriber gone, subscription removed");
                false
            }
        }
    }
}
