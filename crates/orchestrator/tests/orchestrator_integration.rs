//! Order lifecycle tests: command path and event path wired through the
//! in-memory bus, as the service runs them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{ORDER_CREATED, ORDER_FAILED, ORDER_READY, OrderId};
use domain::{Order, OrderCreatedEvent, OrderOutcomeEvent, OrderStatus};
use message_bus::{
    InMemoryMessageBus, MessageBus, RedeliveryPolicy, RunningSubscriptions, SubscriptionRegistry,
};
use orchestrator::{
    Notification, OrchestratorError, OrderCommandService, OrderEventOrchestrator, ServiceError,
    Timeouts, Transition,
};
use order_store::{InMemoryOrderStore, OrderStore, Result as StoreResult};

struct TestHarness {
    service: OrderCommandService<InMemoryOrderStore, InMemoryMessageBus>,
    orchestrator: Arc<OrderEventOrchestrator<InMemoryOrderStore>>,
    store: InMemoryOrderStore,
    bus: InMemoryMessageBus,
}

impl TestHarness {
    fn new() -> Self {
        let store = InMemoryOrderStore::new();
        let bus = InMemoryMessageBus::with_policy(RedeliveryPolicy {
            max_deliveries: 100,
            delay: Duration::from_millis(5),
        });

        Self {
            service: OrderCommandService::new(store.clone(), bus.clone()),
            orchestrator: Arc::new(OrderEventOrchestrator::new(store.clone())),
            store,
            bus,
        }
    }

    async fn start_listeners(&self) -> RunningSubscriptions {
        let mut registry = SubscriptionRegistry::new("order-service").with_concurrency(2);
        self.orchestrator.register(&mut registry).unwrap();
        registry.start(&self.bus).await.unwrap()
    }

    async fn create(&self, toppings: &[&str]) -> Order {
        self.service
            .create_order(toppings.iter().map(|s| s.to_string()).collect())
            .await
            .unwrap()
            .order
    }

    async fn publish(&self, topic: &str, event: &OrderOutcomeEvent) {
        self.bus
            .publish(topic, Some(event.id.as_str()), event.to_json().unwrap())
            .await
            .unwrap();
    }

    async fn load(&self, id: &OrderId) -> Order {
        self.store.find_by_id(id).await.unwrap().unwrap()
    }

    /// Polls the store until the order leaves PREPARING.
    async fn wait_settled(&self, id: &OrderId) -> Order {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let order = self.load(id).await;
                if order.status() != OrderStatus::Preparing {
                    return order;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("order was not settled in time")
    }
}

mod create_order {
    use super::*;

    #[tokio::test]
    async fn new_order_is_preparing_with_canonical_toppings() {
        let harness = TestHarness::new();

        let order = harness.create(&["Zucchini", "Rice", "Avocado"]).await;

        assert_eq!(order.status(), OrderStatus::Preparing);
        assert_eq!(order.version(), 1);
        assert_eq!(order.failure_reason(), None);
        assert_eq!(order.toppings().canonical_text(), "Avocado, Rice, Zucchini");
        assert_eq!(harness.load(order.id()).await, order);
    }

    #[tokio::test]
    async fn exactly_one_created_event_is_published() {
        let harness = TestHarness::new();

        let order = harness.create(&["Cheese", "Banana"]).await;

        let published = harness.bus.published(ORDER_CREATED).await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].key.as_deref(), Some(order.id().as_str()));
        let event = OrderCreatedEvent::from_json(&published[0].payload).unwrap();
        assert_eq!(event.order.id(), order.id());
        assert_eq!(event.order.status(), OrderStatus::Preparing);
    }

    #[tokio::test]
    async fn duplicate_toppings_collapse() {
        let harness = TestHarness::new();

        let order = harness.create(&["Rice", "Rice", "Avocado"]).await;

        assert_eq!(order.toppings().len(), 2);
    }

    #[tokio::test]
    async fn empty_and_blank_toppings_are_rejected() {
        let harness = TestHarness::new();

        for toppings in [vec![], vec!["".to_string(), "".to_string()]] {
            let result = harness.service.create_order(toppings).await;
            assert!(matches!(result, Err(ServiceError::Validation(_))));
        }

        assert_eq!(harness.store.order_count().await, 0);
        assert!(harness.bus.published(ORDER_CREATED).await.is_empty());
    }

    #[tokio::test]
    async fn unpublished_order_is_still_persisted() {
        let harness = TestHarness::new();
        harness.bus.set_fail_on_publish(true);

        let created = harness
            .service
            .create_order(vec!["Cheese".to_string()])
            .await
            .unwrap();

        assert!(matches!(created.notification, Notification::Degraded(_)));
        assert_eq!(harness.load(created.order.id()).await, created.order);
    }

    #[tokio::test]
    async fn list_returns_every_order_with_its_status() {
        let harness = TestHarness::new();
        let first = harness.create(&["Cheese"]).await;
        let second = harness.create(&["Banana"]).await;
        harness
            .orchestrator
            .apply_ready(&OrderOutcomeEvent::ready(second.id().clone()))
            .await
            .unwrap();

        let orders = harness.service.list_orders().await.unwrap();

        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id(), first.id());
        assert_eq!(orders[0].status(), OrderStatus::Preparing);
        assert_eq!(orders[1].id(), second.id());
        assert_eq!(orders[1].status(), OrderStatus::Ready);
    }
}

mod outcomes {
    use super::*;

    #[tokio::test]
    async fn ready_event_settles_order() {
        let harness = TestHarness::new();
        let running = harness.start_listeners().await;
        let order = harness.create(&["Cheese"]).await;

        harness
            .publish(ORDER_READY, &OrderOutcomeEvent::ready(order.id().clone()))
            .await;

        let settled = harness.wait_settled(order.id()).await;
        assert_eq!(settled.status(), OrderStatus::Ready);
        assert_eq!(settled.version(), 2);
        assert!(settled.updated_at().is_some());
        running.shutdown().await;
    }

    #[tokio::test]
    async fn redelivered_ready_event_is_a_no_op() {
        let harness = TestHarness::new();
        let order = harness.create(&["Cheese"]).await;
        let event = OrderOutcomeEvent::ready(order.id().clone());

        let first = harness.orchestrator.apply_ready(&event).await.unwrap();
        let settled = harness.load(order.id()).await;
        let second = harness.orchestrator.apply_ready(&event).await.unwrap();

        assert_eq!(first, Transition::Applied);
        assert_eq!(second, Transition::Discarded);
        assert_eq!(harness.load(order.id()).await, settled);
    }

    #[tokio::test]
    async fn failed_event_records_reason() {
        let harness = TestHarness::new();
        let running = harness.start_listeners().await;
        let order = harness.create(&["Tomatoes"]).await;

        let event = OrderOutcomeEvent::failed(
            order.id().clone(),
            Some("Insufficient stock of \"Tomatoes\"".to_string()),
        );
        harness.publish(ORDER_FAILED, &event).await;

        let settled = harness.wait_settled(order.id()).await;
        assert_eq!(settled.status(), OrderStatus::Failed);
        assert_eq!(
            settled.failure_reason(),
            Some("Insufficient stock of \"Tomatoes\"")
        );
        running.shutdown().await;
    }

    #[tokio::test]
    async fn failed_event_without_reason_uses_default() {
        let harness = TestHarness::new();
        let order = harness.create(&["Cheese"]).await;

        harness
            .orchestrator
            .apply_failed(&OrderOutcomeEvent::failed(order.id().clone(), None))
            .await
            .unwrap();

        assert_eq!(
            harness.load(order.id()).await.failure_reason(),
            Some("unknown reason")
        );
    }

    #[tokio::test]
    async fn first_outcome_wins() {
        let harness = TestHarness::new();
        let order = harness.create(&["Cheese"]).await;

        harness
            .orchestrator
            .apply_ready(&OrderOutcomeEvent::ready(order.id().clone()))
            .await
            .unwrap();
        let late = harness
            .orchestrator
            .apply_failed(&OrderOutcomeEvent::failed(
                order.id().clone(),
                Some("too late".to_string()),
            ))
            .await
            .unwrap();

        assert_eq!(late, Transition::Discarded);
        let loaded = harness.load(order.id()).await;
        assert_eq!(loaded.status(), OrderStatus::Ready);
        assert_eq!(loaded.failure_reason(), None);
        assert_eq!(loaded.version(), 2);
    }

    #[tokio::test]
    async fn concurrent_conflicting_outcomes_settle_once() {
        let harness = TestHarness::new();
        let running = harness.start_listeners().await;
        let order = harness.create(&["Cheese"]).await;

        for i in 0..10 {
            if i % 2 == 0 {
                harness
                    .publish(ORDER_READY, &OrderOutcomeEvent::ready(order.id().clone()))
                    .await;
            } else {
                harness
                    .publish(
                        ORDER_FAILED,
                        &OrderOutcomeEvent::failed(order.id().clone(), None),
                    )
                    .await;
            }
        }

        let settled = harness.wait_settled(order.id()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let after = harness.load(order.id()).await;
        assert_eq!(after, settled);
        assert_eq!(after.version(), 2);
        running.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_order_is_ignored() {
        let harness = TestHarness::new();
        let running = harness.start_listeners().await;
        let known = harness.create(&["Cheese"]).await;

        harness
            .publish(ORDER_READY, &OrderOutcomeEvent::ready(OrderId::from("404")))
            .await;
        harness
            .publish(ORDER_READY, &OrderOutcomeEvent::ready(known.id().clone()))
            .await;

        harness.wait_settled(known.id()).await;
        assert!(
            harness
                .store
                .find_by_id(&OrderId::from("404"))
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(harness.store.order_count().await, 1);
        running.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_event_does_not_block_the_topic() {
        let harness = TestHarness::new();
        let running = harness.start_listeners().await;
        let order = harness.create(&["Cheese"]).await;

        harness
            .bus
            .publish(ORDER_READY, None, b"{\"id\":".to_vec())
            .await
            .unwrap();
        harness
            .publish(ORDER_READY, &OrderOutcomeEvent::ready(order.id().clone()))
            .await;

        assert_eq!(
            harness.wait_settled(order.id()).await.status(),
            OrderStatus::Ready
        );
        running.shutdown().await;
    }

    #[tokio::test]
    async fn outcome_is_applied_once_the_store_recovers() {
        let harness = TestHarness::new();
        let running = harness.start_listeners().await;
        let order = harness.create(&["Cheese"]).await;

        harness.store.set_unavailable(true);
        harness
            .publish(ORDER_READY, &OrderOutcomeEvent::ready(order.id().clone()))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        harness.store.set_unavailable(false);

        let settled = harness.wait_settled(order.id()).await;
        assert_eq!(settled.status(), OrderStatus::Ready);
        assert_eq!(settled.version(), 2);
        running.shutdown().await;
    }

    #[tokio::test]
    async fn events_published_before_start_are_consumed() {
        let harness = TestHarness::new();
        let order = harness.create(&["Cheese"]).await;
        harness
            .publish(ORDER_READY, &OrderOutcomeEvent::ready(order.id().clone()))
            .await;

        let running = harness.start_listeners().await;

        assert_eq!(
            harness.wait_settled(order.id()).await.status(),
            OrderStatus::Ready
        );
        running.shutdown().await;
    }
}

mod timeouts {
    use std::sync::OnceLock;

    use message_bus::{MessageId, Result as BusResult, Subscription};
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

    use super::*;

    static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

    fn get_metrics_handle() -> PrometheusHandle {
        METRICS_HANDLE
            .get_or_init(|| {
                PrometheusBuilder::new()
                    .install_recorder()
                    .expect("failed to install Prometheus recorder")
            })
            .clone()
    }

    fn counter_value(handle: &PrometheusHandle, name: &str) -> f64 {
        handle
            .render()
            .lines()
            .filter_map(|line| line.strip_prefix(name)?.strip_prefix(' '))
            .filter_map(|value| value.trim().parse::<f64>().ok())
            .sum()
    }

    /// Bus whose publishes never finish in time.
    #[derive(Clone)]
    struct StalledBus;

    #[async_trait]
    impl MessageBus for StalledBus {
        async fn publish(
            &self,
            _topic: &str,
            _key: Option<&str>,
            _payload: Vec<u8>,
        ) -> BusResult<MessageId> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(MessageId::new())
        }

        async fn subscribe(&self, topic: &str, group: &str) -> BusResult<Box<dyn Subscription>> {
            InMemoryMessageBus::new().subscribe(topic, group).await
        }
    }

    /// Store whose calls never finish in time.
    #[derive(Clone)]
    struct StalledStore;

    #[async_trait]
    impl OrderStore for StalledStore {
        async fn save(&self, order: Order) -> StoreResult<Order> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(order)
        }

        async fn find_by_id(&self, _id: &OrderId) -> StoreResult<Option<Order>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }

        async fn find_all(&self) -> StoreResult<Vec<Order>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }

        async fn compare_and_set_status(
            &self,
            _id: &OrderId,
            _expected: OrderStatus,
            _next: OrderStatus,
            _failure_reason: Option<String>,
        ) -> StoreResult<bool> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(false)
        }
    }

    #[tokio::test]
    async fn stalled_store_times_out_on_create() {
        let bus = InMemoryMessageBus::new();
        let service = OrderCommandService::with_timeouts(
            StalledStore,
            bus.clone(),
            Timeouts {
                store: Duration::from_millis(20),
                publish: Duration::from_millis(20),
            },
        );

        let result = service.create_order(vec!["Cheese".to_string()]).await;

        assert!(matches!(result, Err(ServiceError::Timeout { .. })));
        assert!(bus.published(ORDER_CREATED).await.is_empty());
    }

    #[tokio::test]
    async fn stalled_bus_degrades_create_but_keeps_order() {
        let metrics = get_metrics_handle();
        let degraded_before = counter_value(&metrics, "order_notifications_degraded_total");

        let store = InMemoryOrderStore::new();
        let service = OrderCommandService::with_timeouts(
            store.clone(),
            StalledBus,
            Timeouts {
                store: Duration::from_millis(50),
                publish: Duration::from_millis(20),
            },
        );

        let created = service
            .create_order(vec!["Cheese".to_string()])
            .await
            .unwrap();

        match &created.notification {
            Notification::Degraded(reason) => assert!(
                reason.contains("timed out"),
                "unexpected reason: {reason}"
            ),
            other => panic!("expected a degraded notification, got {other:?}"),
        }
        assert_eq!(created.order.version(), 1);

        let stored = store.find_by_id(created.order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Preparing);
        assert_eq!(stored.version(), 1);

        let degraded_after = counter_value(&metrics, "order_notifications_degraded_total");
        assert!(
            degraded_after > degraded_before,
            "degraded counter did not move: {degraded_before} -> {degraded_after}"
        );
    }

    #[tokio::test]
    async fn stalled_store_times_out_on_outcome() {
        let events =
            OrderEventOrchestrator::with_store_timeout(StalledStore, Duration::from_millis(20));

        let result = events
            .apply_ready(&OrderOutcomeEvent::ready(OrderId::from("1")))
            .await;

        assert!(matches!(result, Err(OrchestratorError::Timeout { .. })));
    }
}
