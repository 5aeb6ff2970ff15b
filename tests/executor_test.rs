mod common;

use std::sync::Arc;

use common::{configured, MockExchange, OrderBehavior};
use dcabot::config::UnconfiguredTickPolicy;
use dcabot::execution::{ExecutorConfig, PurchaseExecutor, TickOutcome};
use dcabot::models::{AttemptStatus, BotConfiguration};
use dcabot::persistence::MemoryGateway;

fn executor(
    exchange: Arc<MockExchange>,
    persistence: Arc<MemoryGateway>,
    policy: UnconfiguredTickPolicy,
) -> PurchaseExecutor {
    PurchaseExecutor::new(
        exchange,
        persistence,
        ExecutorConfig {
            unconfigured_tick: policy,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_insufficient_balance_records_failure_without_order() {
    let exchange = MockExchange::new(5.0, 30000.0);
    let persistence = Arc::new(MemoryGateway::with_configuration(configured(20.0, 1.0)));

    executor(exchange.clone(), persistence.clone(), UnconfiguredTickPolicy::Skip)
        .execute_tick()
        .await;

    let attempts = persistence.attempts().await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, AttemptStatus::Failed);
    assert_eq!(attempts[0].failure_reason.as_deref(), Some("insufficient balance"));
    assert_eq!(attempts[0].requested_amount, 20.0);
    assert_eq!(attempts[0].filled_quantity, 0.0);
    assert!(attempts[0].order_id.is_none());
    assert_eq!(exchange.order_calls(), 0);
}

#[tokio::test]
async fn test_successful_purchase() {
    let exchange = MockExchange::new(100.0, 30000.0);
    let persistence = Arc::new(MemoryGateway::with_configuration(configured(15.0, 1.0)));

    let outcome = executor(exchange.clone(), persistence.clone(), UnconfiguredTickPolicy::Skip)
        .execute_tick()
        .await;
    assert!(matches!(outcome, TickOutcome::Completed(ref a) if a.is_success()));

    let attempts = persistence.attempts().await;
    assert_eq!(attempts.len(), 1);
    let attempt = &attempts[0];
    assert_eq!(attempt.status, AttemptStatus::Success);
    assert!((attempt.filled_quantity - 0.0005).abs() < 1e-12);
    assert_eq!(attempt.fill_price, 30000.0);
    assert_eq!(attempt.order_id.as_deref(), Some("mock-1"));
    assert!(attempt.failure_reason.is_none());
    assert_eq!(exchange.order_calls(), 1);
}

#[tokio::test]
async fn test_order_rejection_recorded() {
    let exchange = MockExchange::new(100.0, 30000.0);
    exchange.set_order_behavior(OrderBehavior::Reject {
        code: -1013,
        msg: "Filter failure: NOTIONAL".to_string(),
    });
    let persistence = Arc::new(MemoryGateway::with_configuration(configured(15.0, 1.0)));

    executor(exchange, persistence.clone(), UnconfiguredTickPolicy::Skip)
        .execute_tick()
        .await;

    let attempts = persistence.attempts().await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, AttemptStatus::Failed);
    assert_eq!(
        attempts[0].failure_reason.as_deref(),
        Some("Order rejected (-1013): Filter failure: NOTIONAL")
    );
    assert_eq!(attempts[0].filled_quantity, 0.0);
}

#[tokio::test]
async fn test_transport_failure_recorded() {
    let exchange = MockExchange::new(100.0, 30000.0);
    exchange.set_order_behavior(OrderBehavior::Unreachable);
    let persistence = Arc::new(MemoryGateway::with_configuration(configured(15.0, 1.0)));

    executor(exchange, persistence.clone(), UnconfiguredTickPolicy::Skip)
        .execute_tick()
        .await;

    let attempts = persistence.attempts().await;
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0]
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("connection reset by peer"));
}

#[tokio::test]
async fn test_unconfigured_tick_skips_by_default() {
    let exchange = MockExchange::new(100.0, 30000.0);
    let persistence = Arc::new(MemoryGateway::new());

    let outcome = executor(exchange.clone(), persistence.clone(), UnconfiguredTickPolicy::Skip)
        .execute_tick()
        .await;

    assert!(matches!(outcome, TickOutcome::Skipped(_)));
    assert!(persistence.attempts().await.is_empty());
    assert_eq!(exchange.balance_calls(), 0);
}

#[tokio::test]
async fn test_unconfigured_tick_can_record_failure() {
    let exchange = MockExchange::new(100.0, 30000.0);
    let persistence = Arc::new(MemoryGateway::with_configuration(BotConfiguration {
        purchase_amount: Some(25.0),
        ..Default::default()
    }));

    executor(exchange.clone(), persistence.clone(), UnconfiguredTickPolicy::RecordFailure)
        .execute_tick()
        .await;

    let attempts = persistence.attempts().await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, AttemptStatus::Failed);
    assert_eq!(attempts[0].requested_amount, 25.0);
    assert_eq!(
        attempts[0].failure_reason.as_deref(),
        Some("purchase settings not configured")
    );
    assert_eq!(exchange.order_calls(), 0);
}
