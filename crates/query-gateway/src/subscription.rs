//! # Subscription Query Results
//!
//! A subscription delivers an initial result followed by a live stream of
//! updates until it is cancelled, the update stream completes, or it fails.
//!
//! ## Lifecycle
//!
//! ```text
//!            cancel()            ┌───────────┐
//!        ┌─────────────────────► │ Cancelled │
//!        │                       └───────────┘
//!  ┌────────┐  updates end       ┌───────────┐
//!  │ Active │ ─────────────────► │ Completed │
//!  └────────┘                    └───────────┘
//!        │   update failed       ┌───────────┐
//!        └─────────────────────► │  Failed   │
//!                                └───────────┘
//! ```
//!
//! Only the first transition out of `Active` takes effect. Every terminal
//! transition releases the bus registration exactly once; `Cancelled`
//! additionally aborts the update stream so buffered updates are discarded.

use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, AbortHandle, Abortable, BoxStream, Stream, StreamExt};
use gateway_telemetry::ACTIVE_SUBSCRIPTIONS;
use shared_messaging::{QueryError, Registration};
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

/// State of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscriptionState {
    Active = 0,
    Cancelled = 1,
    Completed = 2,
    Failed = 3,
}

impl SubscriptionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Active,
            1 => Self::Cancelled,
            2 => Self::Completed,
            _ => Self::Failed,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::Active
    }
}

struct HandleInner {
    state: AtomicU8,
    registration: Arc<dyn Registration>,
    abort: AbortHandle,
    query_name: String,
}

impl HandleInner {
    fn finish(&self, to: SubscriptionState) -> bool {
        if self
            .state
            .compare_exchange(
                SubscriptionState::Active as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        if to == SubscriptionState::Cancelled {
            self.abort.abort();
        }
        let released = self.registration.cancel();
        ACTIVE_SUBSCRIPTIONS.dec();

        debug!(
            query_name = %self.query_name,
            state = ?to,
            released,
            "Subscription closed"
        );
        true
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        // Nobody can observe the subscription anymore
        self.finish(SubscriptionState::Cancelled);
    }
}

/// Shared control handle of one subscription.
///
/// Cloning is cheap; every clone controls the same subscription. When the
/// last clone is dropped while still active, the subscription is cancelled.
#[derive(Clone)]
pub struct SubscriptionHandle {
    inner: Arc<HandleInner>,
}

impl SubscriptionHandle {
    fn new(query_name: String, registration: Arc<dyn Registration>, abort: AbortHandle) -> Self {
        ACTIVE_SUBSCRIPTIONS.inc();
        Self {
            inner: Arc::new(HandleInner {
                state: AtomicU8::new(SubscriptionState::Active as u8),
                registration,
                abort,
                query_name,
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == SubscriptionState::Active
    }

    #[must_use]
    pub fn query_name(&self) -> &str {
        &self.inner.query_name
    }

    /// Stop delivering updates and release the bus registration.
    ///
    /// Returns `true` only for the call that actually cancelled.
    pub fn cancel(&self) -> bool {
        self.inner.finish(SubscriptionState::Cancelled)
    }

    fn complete(&self) -> bool {
        self.inner.finish(SubscriptionState::Completed)
    }

    fn fail(&self) -> bool {
        self.inner.finish(SubscriptionState::Failed)
    }
}

impl Registration for SubscriptionHandle {
    fn cancel(&self) -> bool {
        SubscriptionHandle::cancel(self)
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("query_name", &self.inner.query_name)
            .field("state", &self.state())
            .finish()
    }
}

/// Converted update stream of a subscription.
///
/// Ends when the subscription is cancelled (without yielding anything that was
/// still buffered), when the bus completes it, or right after the first
/// failure.
pub struct Updates<U> {
    inner: Abortable<BoxStream<'static, Result<U, QueryError>>>,
    handle: SubscriptionHandle,
    done: bool,
}

impl<U> Updates<U> {
    #[must_use]
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }
}

impl<U> Stream for Updates<U> {
    type Item = Result<U, QueryError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(update))) => Poll::Ready(Some(Ok(update))),
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                this.handle.fail();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                // no-op when the stream ended because it was cancelled
                this.handle.complete();
                Poll::Ready(None)
            }
        }
    }
}

/// Stream wrapper that cancels a subscription exactly once when the stream
/// completes, fails, or is dropped. Stops after the first failure.
struct CancelOnTerminate<S> {
    inner: S,
    handle: Option<SubscriptionHandle>,
}

impl<S> CancelOnTerminate<S> {
    fn new(inner: S, handle: SubscriptionHandle) -> Self {
        Self {
            inner,
            handle: Some(handle),
        }
    }

    fn terminate(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}

impl<S, T> Stream for CancelOnTerminate<S>
where
    S: Stream<Item = Result<T, QueryError>> + Unpin,
{
    type Item = Result<T, QueryError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.handle.is_none() {
            return Poll::Ready(None);
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(item))) => Poll::Ready(Some(Ok(item))),
            Poll::Ready(Some(Err(e))) => {
                this.terminate();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.terminate();
                Poll::Ready(None)
            }
        }
    }
}

impl<S> Drop for CancelOnTerminate<S> {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Converted initial results, null payloads already filtered out, plus the
/// value used when none remain.
struct InitialResult<I> {
    results: BoxStream<'static, Result<I, QueryError>>,
    absent: Box<dyn FnOnce() -> Result<I, QueryError> + Send>,
}

impl<I: Send + 'static> InitialResult<I> {
    async fn resolve(self) -> Result<I, QueryError> {
        let Self { mut results, absent } = self;
        match results.next().await {
            Some(result) => result,
            None => absent(),
        }
    }
}

/// Initial result plus live updates of a subscription query.
pub struct SubscriptionQueryResult<I, U> {
    initial_result: Option<InitialResult<I>>,
    updates: Updates<U>,
    handle: SubscriptionHandle,
}

impl<I, U> SubscriptionQueryResult<I, U>
where
    I: Send + 'static,
    U: Send + 'static,
{
    /// Wrap converted initial/update pipelines. `registration` is released on
    /// the first terminal transition.
    pub fn new(
        query_name: impl Into<String>,
        initial_result: BoxFuture<'static, Result<I, QueryError>>,
        updates: BoxStream<'static, Result<U, QueryError>>,
        registration: Arc<dyn Registration>,
    ) -> Self {
        Self::from_results(
            query_name,
            initial_result.into_stream().boxed(),
            || Err(QueryError::SubscriptionClosed),
            updates,
            registration,
        )
    }

    /// Like [`new`](Self::new), with the initial result given as a filtered
    /// stream. The first item is the initial result; when the stream is
    /// empty `initial_result()` resolves to `absent()` and the combined
    /// streams start directly with the updates.
    pub fn from_results<A>(
        query_name: impl Into<String>,
        initial_results: BoxStream<'static, Result<I, QueryError>>,
        absent: A,
        updates: BoxStream<'static, Result<U, QueryError>>,
        registration: Arc<dyn Registration>,
    ) -> Self
    where
        A: FnOnce() -> Result<I, QueryError> + Send + 'static,
    {
        let (abort, abort_registration) = AbortHandle::new_pair();
        let handle = SubscriptionHandle::new(query_name.into(), registration, abort);
        Self {
            initial_result: Some(InitialResult {
                results: initial_results,
                absent: Box::new(absent),
            }),
            updates: Updates {
                inner: Abortable::new(updates, abort_registration),
                handle: handle.clone(),
                done: false,
            },
            handle,
        }
    }

    /// Await the initial result. It can be taken once; later calls fail with
    /// [`QueryError::SubscriptionClosed`].
    pub async fn initial_result(&mut self) -> Result<I, QueryError> {
        match self.initial_result.take() {
            Some(initial) => initial.resolve().await,
            None => Err(QueryError::SubscriptionClosed),
        }
    }

    /// The update stream, to be polled in place.
    pub fn updates(&mut self) -> &mut Updates<U> {
        &mut self.updates
    }

    #[must_use]
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.handle.state()
    }

    /// See [`SubscriptionHandle::cancel`].
    pub fn cancel(&self) -> bool {
        self.handle.cancel()
    }

    /// Split into the initial result, the updates and the control handle.
    pub fn into_parts(
        self,
    ) -> (
        BoxFuture<'static, Result<I, QueryError>>,
        Updates<U>,
        SubscriptionHandle,
    ) {
        let initial = match self.initial_result {
            Some(initial) => initial.resolve().boxed(),
            None => future::ready(Err(QueryError::SubscriptionClosed)).boxed(),
        };
        (initial, self.updates, self.handle)
    }

    /// Single stream of the initial result expanded by `expand`, followed by
    /// the updates.
    ///
    /// Nothing from the updates is yielded before the whole expansion of the
    /// initial result. A null initial result contributes nothing. The
    /// subscription is cancelled once when the stream ends, fails or is
    /// dropped.
    pub fn into_stream_with<F, S>(self, expand: F) -> BoxStream<'static, Result<U, QueryError>>
    where
        F: FnOnce(I) -> S + Send + 'static,
        S: Stream<Item = U> + Send + 'static,
    {
        let results = match self.initial_result {
            Some(initial) => initial.results,
            None => stream::empty().boxed(),
        };
        let (updates, handle) = (self.updates, self.handle);

        let head = results
            .into_future()
            .map(move |(first, _rest)| match first {
                Some(Ok(initial)) => expand(initial).map(Ok::<U, QueryError>).boxed(),
                Some(Err(e)) => stream::once(future::ready(Err(e))).boxed(),
                None => stream::empty().boxed(),
            })
            .flatten_stream();

        CancelOnTerminate::new(head.chain(updates).boxed(), handle).boxed()
    }

    /// Updates only; the initial result is ignored. Cancels on termination.
    pub fn into_updates(self) -> BoxStream<'static, Result<U, QueryError>> {
        let (_initial, updates, handle) = self.into_parts();
        CancelOnTerminate::new(updates, handle).boxed()
    }
}

impl<T: Send + 'static> SubscriptionQueryResult<T, T> {
    /// Initial result followed by the updates.
    pub fn into_stream(self) -> BoxStream<'static, Result<T, QueryError>> {
        self.into_stream_with(|initial| stream::once(future::ready(initial)))
    }
}

impl<T: Send + 'static> SubscriptionQueryResult<Vec<T>, T> {
    /// Items of the initial collection followed by the updates.
    pub fn into_stream_many(self) -> BoxStream<'static, Result<T, QueryError>> {
        self.into_stream_with(stream::iter)
    }
}

impl<I, U> fmt::Debug for SubscriptionQueryResult<I, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionQueryResult")
            .field("handle", &self.handle)
            .field("initial_taken", &self.initial_result.is_none())
            .finish()
    }
}
