//! # Scatter-Gather Flows
//!
//! One query fanned out to every matching handler, collected until the
//! deadline.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::*;
    use futures::stream::{self, StreamExt};
    use query_gateway::SimpleQueryBus;
    use serde_json::{json, Value};
    use shared_messaging::{QueryMessage, ResponseShape, ResponseTypes, TypeDescriptor, TypeShape};
    use std::time::{Duration, Instant};

    const GENEROUS: Duration = Duration::from_secs(2);

    fn label_shape() -> TypeShape {
        TypeShape::of::<String>()
    }

    #[tokio::test]
    async fn test_collects_every_matching_handler() {
        let bus = SimpleQueryBus::new();
        let _a = bus.subscribe(find_widget(), named_widget("a"));
        let _b = bus.subscribe(find_widget(), named_widget("b"));
        let _c = bus.subscribe(find_widget(), named_widget("c"));
        let _list = bus.subscribe(
            find_widget(),
            answering(TypeShape::collection(widget_shape()), json!([])),
        );
        let gateway = gateway(&bus);

        let mut names: Vec<String> = gateway
            .scatter_gather_with_timeout(
                &FindWidget { id: 5 },
                ResponseTypes::instance_of::<Widget>(),
                GENEROUS,
            )
            .map(|item| item.unwrap().name)
            .collect()
            .await;
        names.sort();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_deadline_ends_stream_with_partial_results() {
        let bus = SimpleQueryBus::new();
        let _now = bus.subscribe("labels", answering(label_shape(), json!("now")));
        let _soon = bus.subscribe(
            "labels",
            delayed(label_shape(), Duration::from_millis(10), json!("soon")),
        );
        let _late = bus.subscribe(
            "labels",
            delayed(label_shape(), Duration::from_secs(5), json!("late")),
        );
        let gateway = gateway(&bus);

        let started = Instant::now();
        let mut labels: Vec<String> = gateway
            .scatter_gather_named(
                "labels",
                &(),
                ResponseTypes::instance_of::<String>(),
                Duration::from_millis(200),
            )
            .map(|item| item.unwrap())
            .collect()
            .await;
        labels.sort();

        assert_eq!(labels, vec!["now", "soon"]);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_null_results_are_skipped() {
        let bus = SimpleQueryBus::new();
        let _first = bus.subscribe("labels", answering(label_shape(), Value::Null));
        let _second = bus.subscribe(
            "labels",
            delayed(label_shape(), Duration::from_millis(5), json!("a")),
        );
        let _third = bus.subscribe(
            "labels",
            delayed(label_shape(), Duration::from_millis(10), Value::Null),
        );
        let gateway = gateway(&bus);

        let labels: Vec<String> = gateway
            .scatter_gather_named("labels", &(), ResponseTypes::instance_of::<String>(), GENEROUS)
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(labels, vec!["a"]);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_end_stream() {
        let bus = SimpleQueryBus::new();
        let _broken = bus.subscribe("labels", failing(label_shape(), "Broken"));
        let _ok = bus.subscribe(
            "labels",
            delayed(label_shape(), Duration::from_millis(20), json!("ok")),
        );
        let gateway = gateway(&bus);

        let items: Vec<_> = gateway
            .scatter_gather_named("labels", &(), ResponseTypes::instance_of::<String>(), GENEROUS)
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items.iter().filter(|item| item.is_err()).count(), 1);
        assert!(items.iter().any(|item| item.as_deref() == Ok("ok")));
    }

    #[tokio::test]
    async fn test_no_handlers_yields_empty_stream() {
        let bus = SimpleQueryBus::new();
        let gateway = gateway(&bus);

        let items: Vec<_> = gateway
            .scatter_gather_with_timeout(
                &FindWidget { id: 1 },
                ResponseTypes::instance_of::<Widget>(),
                GENEROUS,
            )
            .collect()
            .await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_stream_of_queries_concatenates_results() {
        let bus = SimpleQueryBus::new();
        let _first = bus.subscribe("first", answering(label_shape(), json!("one")));
        let _second = bus.subscribe("second", answering(label_shape(), json!("two")));
        let _second_too = bus.subscribe("second", answering(label_shape(), json!("two")));
        let gateway = gateway(&bus);

        let shape = || ResponseShape::Instance(TypeDescriptor::of::<String>());
        let queries = vec![
            QueryMessage::named("first", &(), shape()).unwrap(),
            QueryMessage::named("second", &(), shape()).unwrap(),
        ];

        let results: Vec<Value> = gateway
            .scatter_gather_stream(stream::iter(queries), GENEROUS)
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(results, vec![json!("one"), json!("two"), json!("two")]);
    }
}
