//! Integration tests for the invocation lifecycle.
//!
//! These tests drive handlers through the public API only and check the
//! outcome seen by the runtime, the extensions that ran, and the events
//! observed by listeners.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use aws_lambda_lifecycle_sdk::{
    extension_fn, handler_fn, Extension, HandlerError, InvocationContext, Lifecycle,
    LifecycleConfig, LifecycleError, LifecycleEvent, LifecycleHandler,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
struct Order {
    id: String,
    quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Receipt {
    order_id: String,
    accepted: bool,
}

type Journal = Arc<Mutex<Vec<String>>>;

fn order(quantity: u32) -> Order {
    Order {
        id: "o-1".to_string(),
        quantity,
    }
}

fn context() -> InvocationContext {
    InvocationContext::new("orders", "req-1")
}

fn note<V: Sync + ?Sized + 'static>(journal: &Journal, label: &'static str) -> impl Extension<V> {
    let journal = Arc::clone(journal);
    extension_fn(move |_value: &V, _ctx| {
        journal.lock().unwrap().push(label.to_string());
        Box::pin(async { Ok(()) })
    })
}

/// Builds an order handler that rejects empty orders as an expected failure
/// and fails unexpectedly on oversized ones.
fn order_handler(journal: &Journal, config: LifecycleConfig) -> LifecycleHandler<Order, Receipt> {
    let handler = Lifecycle::builder()
        .on_initialize(note::<Order>(journal, "initialize"))
        .on_persist(note::<Receipt>(journal, "persist"))
        .on_flush(note::<Receipt>(journal, "flush"))
        .on_handle_error(note::<HandlerError<Receipt>>(journal, "handleError"))
        .with_config(config)
        .build()
        .wrap(handler_fn(|order: Order, _ctx| async move {
            match order.quantity {
                0 => Err(HandlerError::expected(
                    "empty order",
                    Receipt {
                        order_id: order.id,
                        accepted: false,
                    },
                )),
                1..=100 => Ok(Receipt {
                    order_id: order.id,
                    accepted: true,
                }),
                _ => Err(HandlerError::unexpected("inventory service unavailable")),
            }
        }));

    let events = Arc::clone(journal);
    handler
        .subscribe(move |event| events.lock().unwrap().push(format!("event:{}", event.kind())))
        .forget();
    handler
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

#[tokio::test]
async fn test_successful_invocation_runs_persist_and_flush() {
    let journal: Journal = Arc::default();
    let handler = order_handler(&journal, LifecycleConfig::default());

    let receipt = handler.invoke(order(3), &context()).await.unwrap();

    assert!(receipt.accepted);
    assert_eq!(
        entries(&journal),
        vec![
            "initialize",
            "event:called",
            "persist",
            "event:persisted",
            "flush",
            "event:succeeded",
            "event:finished",
        ]
    );
}

#[tokio::test]
async fn test_expected_failure_completes_with_its_response() {
    let journal: Journal = Arc::default();
    let handler = order_handler(&journal, LifecycleConfig::default());

    let receipt = handler.invoke(order(0), &context()).await.unwrap();

    assert_eq!(
        receipt,
        Receipt {
            order_id: "o-1".to_string(),
            accepted: false,
        }
    );
    assert_eq!(
        entries(&journal),
        vec![
            "initialize",
            "event:called",
            "handleError",
            "event:error",
            "event:finished",
        ]
    );
}

#[tokio::test]
async fn test_unexpected_failure_is_returned_to_the_runtime() {
    let journal: Journal = Arc::default();
    let handler = order_handler(&journal, LifecycleConfig::default());

    let err = handler.invoke(order(500), &context()).await.unwrap_err();

    assert!(matches!(err, LifecycleError::Handler { .. }));
    assert_eq!(err.to_string(), "Handler error: inventory service unavailable");
    let journal = entries(&journal);
    assert!(!journal.contains(&"persist".to_string()));
    assert!(!journal.contains(&"flush".to_string()));
    assert!(journal.contains(&"handleError".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_notifies_without_aborting_the_handler() {
    let timeouts = Arc::new(Mutex::new(Vec::new()));
    let handler = Lifecycle::<u32, u32>::builder()
        .build()
        .wrap(handler_fn(|input: u32, _ctx| async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok(input + 1)
        }));
    let sink = Arc::clone(&timeouts);
    let _subscription = handler.subscribe(move |event| {
        if let LifecycleEvent::TimeOut { context } = event {
            sink.lock().unwrap().push(context.request_id.clone());
        }
    });
    let context = context().with_remaining_time(Duration::from_secs(2));

    let output = handler.invoke(41, &context).await.unwrap();

    assert_eq!(output, 42);
    assert_eq!(*timeouts.lock().unwrap(), vec!["req-1"]);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_after_completion_is_never_observed() {
    let journal: Journal = Arc::default();
    let handler = order_handler(&journal, LifecycleConfig::default());
    let context = context().with_remaining_time(Duration::from_secs(2));

    handler.invoke(order(1), &context).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(!entries(&journal).contains(&"event:timeOut".to_string()));
}

/// Builds a handler that takes one second and counts timeout events.
fn one_second_handler(
    config: LifecycleConfig,
    timeouts: &Arc<Mutex<u32>>,
) -> LifecycleHandler<u32, u32> {
    let handler = Lifecycle::builder()
        .with_config(config)
        .build()
        .wrap(handler_fn(|input: u32, _ctx| async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(input)
        }));
    let sink = Arc::clone(timeouts);
    handler
        .subscribe(move |event| {
            if let LifecycleEvent::TimeOut { .. } = event {
                *sink.lock().unwrap() += 1;
            }
        })
        .forget();
    handler
}

#[tokio::test(start_paused = true)]
async fn test_safety_margin_moves_the_deadline() {
    // Default margin: the deadline is 1.5s away, after the handler settles.
    let timeouts = Arc::default();
    let handler = one_second_handler(LifecycleConfig::default(), &timeouts);
    let ctx = context().with_remaining_time(Duration::from_secs(2));
    handler.invoke(1, &ctx).await.unwrap();
    assert_eq!(*timeouts.lock().unwrap(), 0);

    // A 1.5s margin moves the deadline to 0.5s, while the handler still runs.
    let timeouts = Arc::default();
    let config = LifecycleConfig::default().with_safety_margin(Duration::from_millis(1500));
    let handler = one_second_handler(config, &timeouts);
    let ctx = context().with_remaining_time(Duration::from_secs(2));
    handler.invoke(1, &ctx).await.unwrap();
    assert_eq!(*timeouts.lock().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_inside_the_margin_never_arms() {
    let timeouts = Arc::default();
    let handler = one_second_handler(LifecycleConfig::default(), &timeouts);
    let context = context().with_remaining_time(Duration::from_millis(400));

    handler.invoke(1, &context).await.unwrap();

    assert_eq!(*timeouts.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_panicking_listener_does_not_change_the_outcome() {
    let journal: Journal = Arc::default();
    let handler = order_handler(&journal, LifecycleConfig::default());
    let _subscription = handler.subscribe(|event| {
        if matches!(event, LifecycleEvent::Error { .. }) {
            panic!("listener bug");
        }
    });

    let receipt = handler.invoke(order(0), &context()).await.unwrap();

    assert!(!receipt.accepted);
    assert!(entries(&journal).contains(&"event:finished".to_string()));
}
