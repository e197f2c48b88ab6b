//! # Interceptor Flows
//!
//! Dispatch interceptors rewrite or reject outgoing queries; result
//! interceptors reshape the result stream before conversion. Both apply to
//! every dispatch mode.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::*;
    use futures::{StreamExt, TryStreamExt};
    use parking_lot::Mutex;
    use query_gateway::{handler_fn, DefaultQueryGateway, SimpleQueryBus};
    use serde_json::{json, Value};
    use shared_messaging::{
        dispatch_interceptor_fn, result_interceptor_fn, DispatchInterceptor, HandlerFailure,
        MetaData, QueryError, QueryMessage, Registration, ResponseTypes, ResultInterceptor,
        ResultStream, TypeShape,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    type Trace = Arc<Mutex<Vec<&'static str>>>;

    fn recording(trace: &Trace, stage: &'static str) -> Arc<dyn DispatchInterceptor> {
        let trace = trace.clone();
        Arc::new(dispatch_interceptor_fn(move |query: QueryMessage| {
            trace.lock().push(stage);
            async move { Ok::<_, QueryError>(query) }
        }))
    }

    fn tagging(key: &'static str, value: &'static str) -> Arc<dyn DispatchInterceptor> {
        Arc::new(dispatch_interceptor_fn(move |query: QueryMessage| async move {
            Ok::<_, QueryError>(query.and_metadata(&MetaData::with(key, value)))
        }))
    }

    fn rejecting(reason: &'static str) -> Arc<dyn DispatchInterceptor> {
        Arc::new(dispatch_interceptor_fn(move |_query: QueryMessage| async move {
            Err::<QueryMessage, _>(QueryError::interceptor(reason))
        }))
    }

    fn uppercasing() -> Arc<dyn ResultInterceptor> {
        Arc::new(result_interceptor_fn(|_query: &QueryMessage, results: ResultStream| {
            results
                .map_ok(|result| match result.payload().and_then(Value::as_str) {
                    Some(text) => result.with_payload(json!(text.to_uppercase())),
                    None => result,
                })
                .boxed()
        }))
    }

    /// Handler echoing the `tenant` metadata entry it received.
    fn tenant_echo() -> Arc<dyn query_gateway::QueryHandler> {
        Arc::new(handler_fn(TypeShape::of::<String>(), |query: QueryMessage| async move {
            Ok::<_, HandlerFailure>(json!(query.metadata().get("tenant").unwrap_or("none")))
        }))
    }

    #[tokio::test]
    async fn test_dispatch_interceptors_run_once_in_order() {
        let trace: Trace = Arc::default();
        let bus = SimpleQueryBus::new();
        let _handler = bus.subscribe(find_widget(), named_widget("gear"));
        let gateway = DefaultQueryGateway::builder()
            .query_bus(Arc::new(bus.clone()))
            .dispatch_interceptor(recording(&trace, "first"))
            .dispatch_interceptor(recording(&trace, "second"))
            .build()
            .unwrap();
        let _third = gateway.register_dispatch_interceptor(recording(&trace, "third"));

        gateway.query_as::<Widget, _>(&FindWidget { id: 1 }).await.unwrap();
        assert_eq!(*trace.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_rejection_short_circuits_dispatch() {
        let trace: Trace = Arc::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let bus = SimpleQueryBus::new();
        let _handler = bus.subscribe(
            "labels",
            Arc::new(handler_fn(TypeShape::of::<String>(), move |_query: QueryMessage| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, HandlerFailure>(json!("reached")) }
            })),
        );
        let gateway = DefaultQueryGateway::builder()
            .query_bus(Arc::new(bus.clone()))
            .dispatch_interceptor(recording(&trace, "before"))
            .dispatch_interceptor(rejecting("tenant missing"))
            .dispatch_interceptor(recording(&trace, "after"))
            .build()
            .unwrap();

        let err = gateway
            .query_named("labels", &(), ResponseTypes::instance_of::<String>())
            .await
            .unwrap_err();
        assert_eq!(err, QueryError::Interceptor("tenant missing".into()));

        let gathered: Vec<_> = gateway
            .scatter_gather_named(
                "labels",
                &(),
                ResponseTypes::instance_of::<String>(),
                Duration::from_secs(1),
            )
            .collect()
            .await;
        assert_eq!(gathered.len(), 1);
        assert_eq!(gathered[0].as_ref().unwrap_err().kind(), "interceptor");

        let subscription = gateway
            .subscription_query_named(
                "labels",
                &(),
                ResponseTypes::instance_of::<String>(),
                ResponseTypes::instance_of::<String>(),
                4,
            )
            .await;
        assert!(subscription.is_err());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(*trace.lock(), vec!["before", "before", "before"]);
        assert_eq!(bus.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_metadata_reaches_every_mode() {
        let bus = SimpleQueryBus::new();
        let _handler = bus.subscribe("tenant", tenant_echo());
        let gateway = gateway(&bus);
        let _tag = gateway.register_dispatch_interceptor(tagging("tenant", "acme"));

        let single = gateway
            .query_named("tenant", &(), ResponseTypes::instance_of::<String>())
            .await
            .unwrap();
        assert_eq!(single, "acme");

        let gathered: Vec<String> = gateway
            .scatter_gather_named(
                "tenant",
                &(),
                ResponseTypes::instance_of::<String>(),
                Duration::from_secs(1),
            )
            .try_collect()
            .await
            .unwrap();
        assert_eq!(gathered, vec!["acme"]);

        let mut subscription = gateway
            .subscription_query_named(
                "tenant",
                &(),
                ResponseTypes::instance_of::<String>(),
                ResponseTypes::instance_of::<String>(),
                4,
            )
            .await
            .unwrap();
        assert_eq!(subscription.initial_result().await.unwrap(), "acme");

        // the bus filter sees the intercepted query
        let emitted = bus
            .emitter()
            .emit(|query| query.query().metadata().get("tenant") == Some("acme"), json!("u"));
        assert_eq!(emitted, 1);
    }

    #[tokio::test]
    async fn test_cancelled_interceptor_no_longer_applies() {
        let bus = SimpleQueryBus::new();
        let _handler = bus.subscribe("tenant", tenant_echo());
        let gateway = gateway(&bus);
        let tag = gateway.register_dispatch_interceptor(tagging("tenant", "acme"));

        // registered before the first poll, so it applies
        let pending = gateway.query_named("tenant", &(), ResponseTypes::instance_of::<String>());
        assert_eq!(pending.await.unwrap(), "acme");

        assert!(tag.cancel());
        assert!(!tag.cancel());
        let untagged = gateway
            .query_named("tenant", &(), ResponseTypes::instance_of::<String>())
            .await
            .unwrap();
        assert_eq!(untagged, "none");
    }

    #[tokio::test]
    async fn test_result_interceptor_reshapes_all_modes() {
        let bus = SimpleQueryBus::new();
        let _handler = bus.subscribe("labels", answering(TypeShape::of::<String>(), json!("quiet")));
        let gateway = DefaultQueryGateway::builder()
            .query_bus(Arc::new(bus.clone()))
            .result_interceptor(uppercasing())
            .build()
            .unwrap();

        let single = gateway
            .query_named("labels", &(), ResponseTypes::instance_of::<String>())
            .await
            .unwrap();
        assert_eq!(single, "QUIET");

        let mut subscription = gateway
            .subscription_query_named(
                "labels",
                &(),
                ResponseTypes::instance_of::<String>(),
                ResponseTypes::instance_of::<String>(),
                4,
            )
            .await
            .unwrap();
        assert_eq!(subscription.initial_result().await.unwrap(), "QUIET");

        bus.emitter().emit_to("labels", json!("loud"));
        let update = subscription.updates().next().await.unwrap().unwrap();
        assert_eq!(update, "LOUD");
    }

    #[tokio::test]
    async fn test_result_interceptors_never_see_failures_as_data() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let spy: Arc<dyn ResultInterceptor> =
            Arc::new(result_interceptor_fn(move |_query: &QueryMessage, results: ResultStream| {
                let counter = counter.clone();
                results
                    .inspect_ok(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                    .boxed()
            }));

        let bus = SimpleQueryBus::new();
        let _broken = bus.subscribe("labels", failing(TypeShape::of::<String>(), "Broken"));
        let gateway = gateway(&bus);
        let _spy = gateway.register_result_interceptor(spy);

        let err = gateway
            .query_named("labels", &(), ResponseTypes::optional_instance_of::<String>())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "handler");
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
