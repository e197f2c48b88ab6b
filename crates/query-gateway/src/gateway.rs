//! # Default Query Gateway
//!
//! Builds query messages, runs them through the dispatch interceptors, hands
//! them to the [`QueryBus`] and turns the raw results into typed values.
//!
//! ## Pipeline
//!
//! ```text
//! build message ─► dispatch chain ─► bus ─► exceptional check ─► result chain
//!                                                                    │
//!            caller ◄── convert ◄── drop null payloads ◄─────────────┘
//! ```
//!
//! Every returned future and stream is lazy: nothing reaches the bus and no
//! interceptor snapshot is taken until it is first polled.

use crate::bus::{BusSubscription, QueryBus};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::subscription::SubscriptionQueryResult;
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use gateway_telemetry::{
    log_query_event, metric_inc, HistogramTimer, INTERCEPTOR_REGISTRATIONS, QUERIES_DISPATCHED,
    QUERY_FAILURES, SCATTER_GATHER_RESPONSES,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use shared_messaging::{
    query_name_of, DispatchInterceptor, DispatchInterceptorChain, FnRegistration, QueryError,
    QueryMessage, ResponseShape, ResponseType, ResponseTypes, ResultInterceptor,
    ResultInterceptorChain, ResultStream, SubscriptionQueryMessage,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const MODE_SINGLE: &str = "single";
const MODE_SCATTER_GATHER: &str = "scatter_gather";
const MODE_SUBSCRIPTION: &str = "subscription";

/// Stream of converted results.
pub type QueryStream<T> = BoxStream<'static, Result<T, QueryError>>;

/// Result of a query that resolves once.
pub type QueryFuture<T> = BoxFuture<'static, Result<T, QueryError>>;

struct GatewayInner {
    bus: Arc<dyn QueryBus>,
    dispatch: DispatchInterceptorChain,
    results: ResultInterceptorChain,
    config: GatewayConfig,
}

/// Query gateway backed by a [`QueryBus`].
///
/// Cheap to clone; clones share the bus and interceptor registries.
#[derive(Clone)]
pub struct DefaultQueryGateway {
    inner: Arc<GatewayInner>,
}

impl DefaultQueryGateway {
    #[must_use]
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Register an interceptor applied to every query dispatched after this
    /// call.
    pub fn register_dispatch_interceptor(
        &self,
        interceptor: Arc<dyn DispatchInterceptor>,
    ) -> FnRegistration {
        INTERCEPTOR_REGISTRATIONS.with_label_values(&["dispatch"]).inc();
        self.inner.dispatch.register(interceptor)
    }

    /// Register an interceptor applied to the results of every query
    /// dispatched after this call.
    pub fn register_result_interceptor(
        &self,
        interceptor: Arc<dyn ResultInterceptor>,
    ) -> FnRegistration {
        INTERCEPTOR_REGISTRATIONS.with_label_values(&["result"]).inc();
        self.inner.results.register(interceptor)
    }

    // =========================================================================
    // SINGLE QUERY
    // =========================================================================

    /// Query named after `Q`, expecting exactly one `R`.
    pub fn query_as<R, Q>(&self, query: &Q) -> QueryFuture<R>
    where
        R: DeserializeOwned + Send + 'static,
        Q: Serialize,
    {
        self.query(query, ResponseTypes::instance_of::<R>())
    }

    /// Query named after `Q`.
    pub fn query<Q, R>(&self, query: &Q, response_type: R) -> QueryFuture<R::Output>
    where
        Q: Serialize,
        R: ResponseType,
    {
        self.query_named(query_name_of::<Q>(), query, response_type)
    }

    pub fn query_named<Q, R>(
        &self,
        query_name: impl Into<String>,
        query: &Q,
        response_type: R,
    ) -> QueryFuture<R::Output>
    where
        Q: Serialize,
        R: ResponseType,
    {
        match QueryMessage::named(query_name, query, response_type.for_serialization()) {
            Ok(message) => self.query_message(message, response_type),
            Err(e) => future::ready(Err(e)).boxed(),
        }
    }

    /// Dispatch a pre-built query message to exactly one handler.
    pub fn query_message<R: ResponseType>(
        &self,
        message: QueryMessage,
        response_type: R,
    ) -> QueryFuture<R::Output> {
        let inner = self.inner.clone();
        async move {
            let _timer = HistogramTimer::query(MODE_SINGLE);
            let query_name = message.query_name().to_string();
            let result = inner.single(message, response_type).await;
            if let Err(e) = &result {
                record_failure(MODE_SINGLE, &query_name, e);
            }
            result
        }
        .boxed()
    }

    /// Dispatch each query after the previous one resolved, yielding the raw
    /// payloads in order.
    pub fn query_stream<S>(&self, queries: S) -> QueryStream<Value>
    where
        S: Stream<Item = QueryMessage> + Send + 'static,
    {
        let gateway = self.clone();
        queries
            .then(move |query| {
                let response_type = RawResponseType::new(query.response_type().clone());
                gateway.query_message(query, response_type)
            })
            .boxed()
    }

    // =========================================================================
    // SCATTER-GATHER
    // =========================================================================

    /// Scatter-gather with the configured default timeout.
    pub fn scatter_gather<Q, R>(&self, query: &Q, response_type: R) -> QueryStream<R::Output>
    where
        Q: Serialize,
        R: ResponseType,
    {
        let timeout = self.inner.config.default_scatter_gather_timeout;
        self.scatter_gather_named(query_name_of::<Q>(), query, response_type, timeout)
    }

    pub fn scatter_gather_with_timeout<Q, R>(
        &self,
        query: &Q,
        response_type: R,
        timeout: Duration,
    ) -> QueryStream<R::Output>
    where
        Q: Serialize,
        R: ResponseType,
    {
        self.scatter_gather_named(query_name_of::<Q>(), query, response_type, timeout)
    }

    pub fn scatter_gather_named<Q, R>(
        &self,
        query_name: impl Into<String>,
        query: &Q,
        response_type: R,
        timeout: Duration,
    ) -> QueryStream<R::Output>
    where
        Q: Serialize,
        R: ResponseType,
    {
        match QueryMessage::named(query_name, query, response_type.for_serialization()) {
            Ok(message) => self.scatter_gather_message(message, response_type, timeout),
            Err(e) => stream::once(future::ready(Err(e))).boxed(),
        }
    }

    /// Dispatch to every matching handler and stream the results received
    /// before `timeout`. Reaching the deadline ends the stream normally.
    pub fn scatter_gather_message<R: ResponseType>(
        &self,
        message: QueryMessage,
        response_type: R,
        timeout: Duration,
    ) -> QueryStream<R::Output> {
        let inner = self.inner.clone();
        let query_name = message.query_name().to_string();
        async move {
            let query = match inner.dispatch.intercept(message).await {
                Ok(query) => query,
                Err(e) => return stream::once(future::ready(Err(e))).boxed(),
            };

            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            log_query_event!(
                debug,
                MODE_SCATTER_GATHER,
                query.query_name(),
                "Dispatching query",
                message_id = %query.id(),
                timeout_ms
            );
            metric_inc!(QUERIES_DISPATCHED, &[MODE_SCATTER_GATHER]);

            let raw = inner
                .bus
                .scatter_gather(query.clone(), timeout)
                .inspect(|_| metric_inc!(SCATTER_GATHER_RESPONSES))
                .boxed();
            convert_results(inner.results.intercept(&query, raw), Arc::new(response_type))
        }
        .flatten_stream()
        .inspect(move |item| {
            if let Err(e) = item {
                record_failure(MODE_SCATTER_GATHER, &query_name, e);
            }
        })
        .boxed()
    }

    /// Scatter-gather each query in turn, concatenating the raw payloads.
    pub fn scatter_gather_stream<S>(&self, queries: S, timeout: Duration) -> QueryStream<Value>
    where
        S: Stream<Item = QueryMessage> + Send + 'static,
    {
        let gateway = self.clone();
        queries
            .map(move |query| {
                let response_type = RawResponseType::new(query.response_type().clone());
                gateway.scatter_gather_message(query, response_type, timeout)
            })
            .flatten()
            .boxed()
    }

    // =========================================================================
    // SUBSCRIPTION QUERY
    // =========================================================================

    /// Subscription query with the configured default update buffer size.
    pub fn subscription_query<Q, I, U>(
        &self,
        query: &Q,
        initial_type: I,
        update_type: U,
    ) -> QueryFuture<SubscriptionQueryResult<I::Output, U::Output>>
    where
        Q: Serialize,
        I: ResponseType,
        U: ResponseType,
    {
        let buffer = self.inner.config.default_update_buffer_size;
        self.subscription_query_named(query_name_of::<Q>(), query, initial_type, update_type, buffer)
    }

    pub fn subscription_query_named<Q, I, U>(
        &self,
        query_name: impl Into<String>,
        query: &Q,
        initial_type: I,
        update_type: U,
        update_buffer_size: usize,
    ) -> QueryFuture<SubscriptionQueryResult<I::Output, U::Output>>
    where
        Q: Serialize,
        I: ResponseType,
        U: ResponseType,
    {
        match QueryMessage::named(query_name, query, initial_type.for_serialization()) {
            Ok(message) => {
                let message = SubscriptionQueryMessage::new(message, update_type.for_serialization());
                self.subscription_query_message(message, initial_type, update_type, update_buffer_size)
            }
            Err(e) => future::ready(Err(e)).boxed(),
        }
    }

    /// Open a subscription. Requested buffer sizes are clamped to
    /// `1..=max_update_buffer_size`.
    pub fn subscription_query_message<I, U>(
        &self,
        message: SubscriptionQueryMessage,
        initial_type: I,
        update_type: U,
        update_buffer_size: usize,
    ) -> QueryFuture<SubscriptionQueryResult<I::Output, U::Output>>
    where
        I: ResponseType,
        U: ResponseType,
    {
        let inner = self.inner.clone();
        async move {
            let query_name = message.query_name().to_string();
            let result = inner
                .subscribe(message, initial_type, update_type, update_buffer_size)
                .await;
            if let Err(e) = &result {
                record_failure(MODE_SUBSCRIPTION, &query_name, e);
            }
            result
        }
        .boxed()
    }

    /// Open each subscription after the previous one was established.
    pub fn subscription_query_all<S>(
        &self,
        queries: S,
        update_buffer_size: usize,
    ) -> QueryStream<SubscriptionQueryResult<Value, Value>>
    where
        S: Stream<Item = SubscriptionQueryMessage> + Send + 'static,
    {
        let gateway = self.clone();
        queries
            .then(move |message| {
                let initial_type = RawResponseType::new(message.query().response_type().clone());
                let update_type = RawResponseType::new(message.update_response_type().clone());
                gateway.subscription_query_message(message, initial_type, update_type, update_buffer_size)
            })
            .boxed()
    }

    /// Initial result followed by every update, for queries whose initial
    /// result and updates share one response type. Cancels the subscription
    /// when the stream terminates.
    pub fn subscription_query_stream<Q, R>(&self, query: &Q, response_type: R) -> QueryStream<R::Output>
    where
        Q: Serialize,
        R: ResponseType + Clone,
    {
        self.subscription_query(query, response_type.clone(), response_type)
            .map(|result| match result {
                Ok(subscription) => subscription.into_stream(),
                Err(e) => stream::once(future::ready(Err(e))).boxed(),
            })
            .flatten_stream()
            .boxed()
    }

    /// Items of an initial collection of `R` followed by single-`R` updates.
    pub fn subscription_query_many<Q, R>(&self, query: &Q) -> QueryStream<R>
    where
        Q: Serialize,
        R: DeserializeOwned + Send + 'static,
    {
        self.subscription_query(
            query,
            ResponseTypes::multiple_instances_of::<R>(),
            ResponseTypes::instance_of::<R>(),
        )
        .map(|result| match result {
            Ok(subscription) => subscription.into_stream_many(),
            Err(e) => stream::once(future::ready(Err(e))).boxed(),
        })
        .flatten_stream()
        .boxed()
    }

    /// Updates only; the initial result is discarded. Cancels the
    /// subscription when the stream terminates.
    pub fn query_updates<Q, U>(&self, query: &Q, update_type: U) -> QueryStream<U::Output>
    where
        Q: Serialize,
        U: ResponseType + Clone,
    {
        self.subscription_query(query, update_type.clone(), update_type)
            .map(|result| match result {
                Ok(subscription) => subscription.into_updates(),
                Err(e) => stream::once(future::ready(Err(e))).boxed(),
            })
            .flatten_stream()
            .boxed()
    }
}

impl fmt::Debug for DefaultQueryGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultQueryGateway")
            .field("dispatch_interceptors", &self.inner.dispatch.len())
            .field("result_interceptors", &self.inner.results.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl GatewayInner {
    async fn single<R: ResponseType>(
        &self,
        message: QueryMessage,
        response_type: R,
    ) -> Result<R::Output, QueryError> {
        let query = self.dispatch.intercept(message).await?;

        log_query_event!(
            debug,
            MODE_SINGLE,
            query.query_name(),
            "Dispatching query",
            message_id = %query.id(),
            response_type = %query.response_type()
        );
        metric_inc!(QUERIES_DISPATCHED, &[MODE_SINGLE]);

        let bus = self.bus.clone();
        let dispatched = query.clone();
        let raw = stream::once(async move { bus.query(dispatched).await }).boxed();

        first_or_absent(
            self.results.intercept(&query, raw),
            Arc::new(response_type),
            query.query_name(),
        )
        .await
    }

    async fn subscribe<I, U>(
        &self,
        message: SubscriptionQueryMessage,
        initial_type: I,
        update_type: U,
        update_buffer_size: usize,
    ) -> Result<SubscriptionQueryResult<I::Output, U::Output>, QueryError>
    where
        I: ResponseType,
        U: ResponseType,
    {
        let buffer = self.config.clamp_update_buffer_size(update_buffer_size);

        // interceptors see the plain query; the update type is re-attached after
        let query = self.dispatch.intercept(message.query().clone()).await?;
        let message = message.with_query(query);

        log_query_event!(
            debug,
            MODE_SUBSCRIPTION,
            message.query_name(),
            "Dispatching query",
            message_id = %message.id(),
            update_buffer_size = buffer
        );
        metric_inc!(QUERIES_DISPATCHED, &[MODE_SUBSCRIPTION]);

        let BusSubscription {
            initial_result,
            updates,
            registration,
        } = self.bus.subscription_query(message.clone(), buffer).await?;

        let query = message.query();
        let initial_type = Arc::new(initial_type);
        let initial = convert_results(
            self.results
                .intercept(query, initial_result.into_stream().boxed()),
            initial_type.clone(),
        );
        let query_name = query.query_name().to_string();
        let absent = move || initial_type.absent().ok_or(QueryError::EmptyResult { query_name });
        let updates = convert_results(self.results.intercept(query, updates), Arc::new(update_type));

        Ok(SubscriptionQueryResult::from_results(
            query.query_name(),
            initial,
            absent,
            updates,
            registration,
        ))
    }
}

/// Drop null payloads and convert the rest.
fn convert_results<R: ResponseType>(
    results: ResultStream,
    response_type: Arc<R>,
) -> QueryStream<R::Output> {
    results
        .filter(|item| future::ready(!matches!(item, Ok(result) if result.has_null_payload())))
        .map(move |item| -> Result<R::Output, QueryError> {
            let payload = item?.into_outcome()?;
            Ok(response_type.convert(payload)?)
        })
        .boxed()
}

/// First converted result, or the response type's empty form when every
/// result was null.
fn first_or_absent<R: ResponseType>(
    results: ResultStream,
    response_type: Arc<R>,
    query_name: &str,
) -> impl std::future::Future<Output = Result<R::Output, QueryError>> + Send + 'static {
    let query_name = query_name.to_string();
    let mut converted = convert_results(results, response_type.clone());
    async move {
        match converted.next().await {
            Some(result) => result,
            None => response_type
                .absent()
                .ok_or(QueryError::EmptyResult { query_name }),
        }
    }
}

fn record_failure(mode: &'static str, query_name: &str, error: &QueryError) {
    QUERY_FAILURES
        .with_label_values(&[mode, error.kind()])
        .inc();
    log_query_event!(warn, mode, query_name, "Query failed", kind = error.kind(), error = %error);
}

/// Response type for pre-built messages: keeps the payload as raw JSON.
#[derive(Debug, Clone)]
struct RawResponseType {
    shape: ResponseShape,
}

impl RawResponseType {
    fn new(shape: ResponseShape) -> Self {
        Self { shape }
    }
}

impl ResponseType for RawResponseType {
    type Output = Value;

    fn shape(&self) -> &ResponseShape {
        &self.shape
    }

    fn convert(&self, raw: Value) -> Result<Value, shared_messaging::ConversionError> {
        Ok(raw)
    }

    fn absent(&self) -> Option<Value> {
        match self.shape {
            ResponseShape::Instance(_) => None,
            ResponseShape::OptionalInstance(_) => Some(Value::Null),
            ResponseShape::MultipleInstances(_) => Some(Value::Array(Vec::new())),
            ResponseShape::Paged(_) => Some(json!({ "items": [], "page": 0, "size": 0, "total": 0 })),
        }
    }
}

/// Builder for [`DefaultQueryGateway`].
#[derive(Default)]
pub struct GatewayBuilder {
    bus: Option<Arc<dyn QueryBus>>,
    dispatch_interceptors: Vec<Arc<dyn DispatchInterceptor>>,
    result_interceptors: Vec<Arc<dyn ResultInterceptor>>,
    config: Option<GatewayConfig>,
}

impl GatewayBuilder {
    /// The bus queries are dispatched on. Required.
    #[must_use]
    pub fn query_bus(mut self, bus: Arc<dyn QueryBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Append a dispatch interceptor; interceptors run in the order added.
    #[must_use]
    pub fn dispatch_interceptor(mut self, interceptor: Arc<dyn DispatchInterceptor>) -> Self {
        self.dispatch_interceptors.push(interceptor);
        self
    }

    #[must_use]
    pub fn dispatch_interceptors(
        mut self,
        interceptors: impl IntoIterator<Item = Arc<dyn DispatchInterceptor>>,
    ) -> Self {
        self.dispatch_interceptors.extend(interceptors);
        self
    }

    /// Append a result interceptor; interceptors run in the order added.
    #[must_use]
    pub fn result_interceptor(mut self, interceptor: Arc<dyn ResultInterceptor>) -> Self {
        self.result_interceptors.push(interceptor);
        self
    }

    #[must_use]
    pub fn result_interceptors(
        mut self,
        interceptors: impl IntoIterator<Item = Arc<dyn ResultInterceptor>>,
    ) -> Self {
        self.result_interceptors.extend(interceptors);
        self
    }

    /// Defaults for buffer sizes and timeouts. `GatewayConfig::default()`
    /// when not set.
    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<DefaultQueryGateway, GatewayError> {
        let bus = self.bus.ok_or(GatewayError::MissingQueryBus)?;
        let config = self.config.unwrap_or_default();
        config.validate()?;

        if let Err(e) = gateway_telemetry::register_metrics() {
            warn!(error = %e, "Gateway metrics not registered");
        }

        Ok(DefaultQueryGateway {
            inner: Arc::new(GatewayInner {
                bus,
                dispatch: DispatchInterceptorChain::with_interceptors(self.dispatch_interceptors),
                results: ResultInterceptorChain::with_interceptors(self.result_interceptors),
                config,
            }),
        })
    }
}
