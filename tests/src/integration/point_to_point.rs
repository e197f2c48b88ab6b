//! # Point-to-Point Query Flows
//!
//! One query, one handler, one converted value.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::*;
    use async_trait::async_trait;
    use futures::stream::{self, StreamExt};
    use query_gateway::{
        handler_fn, BusSubscription, DefaultQueryGateway, QueryBus, SimpleQueryBus,
    };
    use serde_json::{json, Value};
    use shared_messaging::{
        HandlerFailure, QueryError, QueryMessage, ResponseShape, ResponseTypes, ResultMessage,
        ResultStream, SubscriptionQueryMessage, TypeDescriptor, TypeShape,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    /// Bus that refuses every message.
    struct UnavailableBus;

    #[async_trait]
    impl QueryBus for UnavailableBus {
        async fn query(&self, _query: QueryMessage) -> Result<ResultMessage, QueryError> {
            Err(QueryError::BusUnavailable("connection refused".into()))
        }

        fn scatter_gather(&self, _query: QueryMessage, _timeout: Duration) -> ResultStream {
            stream::once(async { Err(QueryError::BusUnavailable("connection refused".into())) })
                .boxed()
        }

        async fn subscription_query(
            &self,
            _query: SubscriptionQueryMessage,
            _update_buffer_size: usize,
        ) -> Result<BusSubscription, QueryError> {
            Err(QueryError::BusUnavailable("connection refused".into()))
        }
    }

    // =========================================================================
    // TYPED RESULTS
    // =========================================================================

    #[tokio::test]
    async fn test_query_returns_converted_instance() {
        let bus = SimpleQueryBus::new();
        let _handler = bus.subscribe(find_widget(), named_widget("gear"));
        let gateway = gateway(&bus);

        let widget: Widget = gateway.query_as(&FindWidget { id: 7 }).await.unwrap();
        assert_eq!(widget, Widget::new(7, "gear"));
    }

    #[tokio::test]
    async fn test_handler_failure_is_never_seen_as_data() {
        let bus = SimpleQueryBus::new();
        let _handler = bus.subscribe(find_widget(), failing(widget_shape(), "WidgetLocked"));
        let gateway = gateway(&bus);

        let err = gateway
            .query(&FindWidget { id: 1 }, ResponseTypes::instance_of::<Widget>())
            .await
            .unwrap_err();
        match err {
            QueryError::Handler(failure) => assert_eq!(failure.error_type, "WidgetLocked"),
            other => panic!("expected handler failure, got {other:?}"),
        }

        // optional response types must not turn a failure into "no value"
        let err = gateway
            .query(&FindWidget { id: 1 }, ResponseTypes::optional_instance_of::<Widget>())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "handler");
    }

    #[tokio::test]
    async fn test_no_matching_handler() {
        let bus = SimpleQueryBus::new();
        let _list = bus.subscribe(
            find_widget(),
            answering(TypeShape::collection(widget_shape()), json!([])),
        );
        let gateway = gateway(&bus);

        let err = gateway.query_as::<Widget, _>(&FindWidget { id: 1 }).await.unwrap_err();
        assert!(matches!(err, QueryError::NoHandler { .. }));
    }

    #[tokio::test]
    async fn test_unconvertible_payload_fails_conversion() {
        let bus = SimpleQueryBus::new();
        let _handler = bus.subscribe(find_widget(), answering(widget_shape(), json!("not a widget")));
        let gateway = gateway(&bus);

        let err = gateway.query_as::<Widget, _>(&FindWidget { id: 1 }).await.unwrap_err();
        assert_eq!(err.kind(), "conversion");
    }

    #[tokio::test]
    async fn test_bus_errors_propagate() {
        let gateway = DefaultQueryGateway::builder()
            .query_bus(Arc::new(UnavailableBus))
            .build()
            .unwrap();

        let err = gateway.query_as::<Widget, _>(&FindWidget { id: 1 }).await.unwrap_err();
        assert_eq!(err, QueryError::BusUnavailable("connection refused".into()));

        let items: Vec<_> = gateway
            .scatter_gather(&FindWidget { id: 1 }, ResponseTypes::instance_of::<Widget>())
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    // =========================================================================
    // NULL RESULTS
    // =========================================================================

    #[tokio::test]
    async fn test_null_result_per_response_type() {
        let bus = SimpleQueryBus::new();
        let _one = bus.subscribe(find_widget(), answering(widget_shape(), Value::Null));
        let _many = bus.subscribe(
            find_widget(),
            answering(TypeShape::collection(widget_shape()), Value::Null),
        );
        let gateway = gateway(&bus);
        let query = FindWidget { id: 4 };

        let err = gateway
            .query(&query, ResponseTypes::instance_of::<Widget>())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::EmptyResult { .. }));

        let optional = gateway
            .query(&query, ResponseTypes::optional_instance_of::<Widget>())
            .await
            .unwrap();
        assert_eq!(optional, None);

        let many = gateway
            .query(&query, ResponseTypes::multiple_instances_of::<Widget>())
            .await
            .unwrap();
        assert!(many.is_empty());
    }

    // =========================================================================
    // MATCH THEN CONVERT
    // =========================================================================

    #[tokio::test]
    async fn test_handler_selected_by_shape_before_conversion() {
        let bus = SimpleQueryBus::new();
        let _list = bus.subscribe(
            find_widget(),
            answering(
                TypeShape::collection(widget_shape()),
                json!([Widget::new(1, "a").to_json(), Widget::new(2, "b").to_json()]),
            ),
        );
        let _single = bus.subscribe(
            find_widget(),
            answering(
                TypeShape::future(TypeShape::optional(widget_shape())),
                Widget::new(3, "c").to_json(),
            ),
        );
        let gateway = gateway(&bus);
        let query = FindWidget { id: 0 };

        // nested wrappers around a widget still answer an instance query
        let one: Widget = gateway.query_as(&query).await.unwrap();
        assert_eq!(one.name, "c");

        let many = gateway
            .query(&query, ResponseTypes::multiple_instances_of::<Widget>())
            .await
            .unwrap();
        assert_eq!(many, vec![Widget::new(1, "a"), Widget::new(2, "b")]);
    }

    #[tokio::test]
    async fn test_subtype_handler_answers_supertype_query() {
        let bus = SimpleQueryBus::new();
        let declared = TypeShape::named(TypeDescriptor::named("Gear").with_supertype("Part"));
        let _handler = bus.subscribe("parts", answering(declared, json!({"id": 9, "name": "gear"})));
        let gateway = gateway(&bus);

        let message = QueryMessage::named(
            "parts",
            &json!({}),
            ResponseShape::Instance(TypeDescriptor::named("Part")),
        )
        .unwrap();
        let raw: Value = gateway
            .query_message(
                message,
                shared_messaging::InstanceResponseType::<Value>::with_descriptor(
                    TypeDescriptor::named("Part"),
                ),
            )
            .await
            .unwrap();
        assert_eq!(raw["name"], "gear");
    }

    // =========================================================================
    // LAZINESS AND ORDERING
    // =========================================================================

    #[tokio::test]
    async fn test_nothing_dispatched_until_polled() {
        let bus = SimpleQueryBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _handler = bus.subscribe(
            find_widget(),
            Arc::new(handler_fn(widget_shape(), move |_query: QueryMessage| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, HandlerFailure>(Widget::new(1, "lazy").to_json()) }
            })),
        );
        let gateway = gateway(&bus);

        let pending = gateway.query_as::<Widget, _>(&FindWidget { id: 1 });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        drop(pending);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        gateway.query_as::<Widget, _>(&FindWidget { id: 1 }).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_query_stream_keeps_input_order() {
        let bus = SimpleQueryBus::new();
        let _slow = bus.subscribe(
            "slow",
            delayed(widget_shape(), Duration::from_millis(30), json!("slow")),
        );
        let _fast = bus.subscribe("fast", answering(widget_shape(), json!("fast")));
        let gateway = gateway(&bus);

        let instance = || ResponseShape::Instance(TypeDescriptor::of::<Widget>());
        let queries = vec![
            QueryMessage::named("slow", &(), instance()).unwrap(),
            QueryMessage::named("fast", &(), instance()).unwrap(),
        ];

        let results: Vec<Value> = gateway
            .query_stream(stream::iter(queries))
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(results, vec![json!("slow"), json!("fast")]);
    }

    #[tokio::test]
    async fn test_dispatch_recorded_in_metrics() {
        let bus = SimpleQueryBus::new();
        let _handler = bus.subscribe(find_widget(), named_widget("gear"));
        let gateway = gateway(&bus);

        gateway.query_as::<Widget, _>(&FindWidget { id: 2 }).await.unwrap();

        let text = gateway_telemetry::gather_text().unwrap();
        assert!(text.contains("qg_queries_dispatched_total{mode=\"single\"}"));
    }
}
