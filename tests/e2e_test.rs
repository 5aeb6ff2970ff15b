mod common;

use std::sync::Arc;

use common::{configured, controller_with, wait_for_attempts, MockExchange};
use dcabot::models::AttemptStatus;
use dcabot::persistence::MemoryGateway;
use dcabot::report;

#[tokio::test(start_paused = true)]
async fn test_e2e_workflow() {
    // Initialize logging
    let _ = tracing_subscriber::fmt::try_init();

    // 1. Configure: 20 USDT every 30 seconds, 100 USDT available
    let exchange = MockExchange::new(100.0, 40000.0);
    let persistence = Arc::new(MemoryGateway::with_configuration(configured(20.0, 0.5)));
    let controller = controller_with(persistence.clone(), exchange.clone());

    // 2. Start
    let response = controller.start().await.unwrap();
    assert!(response.success);
    assert!(controller.is_running().await);

    // 3. One tick
    assert!(wait_for_attempts(&persistence, 1, 31).await);
    let history = persistence.attempts().await;
    assert_eq!(history.len(), 1);

    let attempt = &history[0];
    assert_eq!(attempt.status, AttemptStatus::Success);
    assert!(attempt.filled_quantity > 0.0);
    assert!(attempt.order_id.is_some());
    assert!(attempt.failure_reason.is_none());
    assert_eq!(attempt.requested_amount, 20.0);

    // 4. Export
    let mut csv = Vec::new();
    report::write_csv(&history, &mut csv).unwrap();
    let csv = String::from_utf8(csv).unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.contains(",success,mock-1,"));

    // 5. Stop
    let response = controller.stop().await;
    assert!(response.success);
    assert!(!controller.is_running().await);
}
