//! Tests for the channel: consume, drain, ack, restore, and queue operations.

use super::*;
use crate::error::ServiceError;
use crate::providers::InMemoryQueueService;
use crate::service::QueueAttributes;
use async_trait::async_trait;
use serde_json::json;

async fn open_channel() -> (Arc<InMemoryQueueService>, Channel) {
    let service = Arc::new(InMemoryQueueService::new());
    let channel = Channel::open(service.clone(), TransportConfig::default())
        .await
        .unwrap();
    (service, channel)
}

fn envelope(body: serde_json::Value, queue: &str) -> Envelope {
    Envelope::new(body).with_routing("", queue)
}

/// Delegates to the in-memory service but fails every receive
struct BrokenReceiveService {
    inner: InMemoryQueueService,
}

#[async_trait]
impl QueueService for BrokenReceiveService {
    async fn list_queues(&self) -> Result<Vec<String>, ServiceError> {
        self.inner.list_queues().await
    }

    async fn create_queue(
        &self,
        name: &str,
        visibility_timeout: u32,
    ) -> Result<String, ServiceError> {
        self.inner.create_queue(name, visibility_timeout).await
    }

    async fn delete_queue(&self, queue: &QueueHandle) -> Result<(), ServiceError> {
        self.inner.delete_queue(queue).await
    }

    async fn send_message(&self, queue: &QueueHandle, body: &str) -> Result<String, ServiceError> {
        self.inner.send_message(queue, body).await
    }

    async fn receive_messages(
        &self,
        _queue: &QueueHandle,
        _max_messages: u32,
        _wait_seconds: u32,
    ) -> Result<Vec<RawMessage>, ServiceError> {
        Err(ServiceError::ConnectionFailed {
            message: "injected receive failure".to_string(),
        })
    }

    async fn delete_message(
        &self,
        queue: &QueueHandle,
        receipt_handle: &str,
    ) -> Result<(), ServiceError> {
        self.inner.delete_message(queue, receipt_handle).await
    }

    async fn queue_attributes(&self, queue: &QueueHandle) -> Result<QueueAttributes, ServiceError> {
        self.inner.queue_attributes(queue).await
    }

    async fn clear_queue(&self, queue: &QueueHandle) -> Result<(), ServiceError> {
        self.inner.clear_queue(queue).await
    }
}

// ============================================================================
// Exchange Semantics
// ============================================================================

#[tokio::test]
async fn test_fanout_is_not_supported() {
    let (_, mut channel) = open_channel().await;
    assert!(!channel.supports_fanout());
    assert!(matches!(
        channel.exchange_declare("events", "fanout"),
        Err(ChannelError::FanoutUnsupported)
    ));
    assert!(channel.exchange_declare("tasks", "direct").is_ok());
}

// ============================================================================
// Put and Get
// ============================================================================

#[tokio::test]
async fn test_put_then_get_round_trips_the_payload() {
    let (_, mut channel) = open_channel().await;

    channel
        .put("orders", &envelope(json!({"x": 1}), "orders"))
        .await
        .unwrap();

    let received = channel.get("orders").await.unwrap();
    assert_eq!(received.body, json!({"x": 1}));
    assert_eq!(received.properties.delivery_info.routing_key, "orders");
    assert!(received.properties.delivery_info.delivery_tag.is_some());
}

#[tokio::test]
async fn test_get_on_empty_queue_reports_empty() {
    let (_, mut channel) = open_channel().await;
    channel.new_queue("orders").await.unwrap();

    let result = channel.get("orders").await;
    assert!(matches!(result, Err(ChannelError::Empty)));
}

#[tokio::test]
async fn test_punctuated_queue_names_work_end_to_end() {
    let (_, mut channel) = open_channel().await;

    let handle = channel.new_queue("orders.high@eu").await.unwrap();
    assert_eq!(handle.name(), "orders-high-eu");

    channel
        .put("orders.high@eu", &envelope(json!("payload"), "orders.high@eu"))
        .await
        .unwrap();
    let received = channel.get("orders.high@eu").await.unwrap();
    assert_eq!(received.body, json!("payload"));
}

// ============================================================================
// Drain Loop
// ============================================================================

#[tokio::test]
async fn test_drain_without_consumers_is_empty() {
    let (_, mut channel) = open_channel().await;
    let result = channel.drain_events(None).await;
    assert!(matches!(result, Err(ChannelError::Empty)));
}

#[tokio::test]
async fn test_drain_delivers_in_fifo_order() {
    let (_, mut channel) = open_channel().await;
    channel.basic_consume("orders", false, "tag-1").await.unwrap();

    for i in 0..3 {
        channel
            .put("orders", &envelope(json!({"seq": i}), "orders"))
            .await
            .unwrap();
    }

    for i in 0..3 {
        let received = channel.drain_events(None).await.unwrap();
        assert_eq!(received.body, json!({"seq": i}));
    }
}

#[tokio::test]
async fn test_drain_buffers_the_bulk_surplus() {
    let (service, mut channel) = open_channel().await;
    channel.basic_consume("orders", false, "tag-1").await.unwrap();

    for i in 0..5 {
        channel
            .put("orders", &envelope(json!({"seq": i}), "orders"))
            .await
            .unwrap();
    }

    channel.drain_events(None).await.unwrap();
    assert_eq!(channel.buffered(), 4, "surplus messages are held locally");

    // The whole batch is already in flight remotely
    let handle = channel.new_queue("orders").await.unwrap();
    let attributes = service.queue_attributes(&handle).await.unwrap();
    assert_eq!(attributes.active_messages, 0);
    assert_eq!(attributes.inactive_messages, 5);

    for i in 1..5 {
        let received = channel.drain_events(None).await.unwrap();
        assert_eq!(received.body, json!({"seq": i}));
    }
    assert_eq!(channel.buffered(), 0);
}

#[tokio::test]
async fn test_drain_rotates_fairly_across_queues() {
    let (_, mut channel) = open_channel().await;
    // Insertion order is beta-first; rotation order is sorted.
    channel.basic_consume("beta", false, "tag-b").await.unwrap();
    channel.basic_consume("alpha", false, "tag-a").await.unwrap();

    channel
        .put("alpha", &envelope(json!("from-alpha"), "alpha"))
        .await
        .unwrap();
    channel
        .put("beta", &envelope(json!("from-beta"), "beta"))
        .await
        .unwrap();

    let first = channel.drain_events(None).await.unwrap();
    let second = channel.drain_events(None).await.unwrap();

    assert_eq!(first.body, json!("from-alpha"));
    assert_eq!(second.body, json!("from-beta"));
}

#[tokio::test]
async fn test_drain_skips_empty_queues_in_the_rotation() {
    let (_, mut channel) = open_channel().await;
    channel.basic_consume("alpha", false, "tag-a").await.unwrap();
    channel.basic_consume("beta", false, "tag-b").await.unwrap();

    // Only the queue later in the rotation has a message
    channel
        .put("beta", &envelope(json!("only"), "beta"))
        .await
        .unwrap();

    let received = channel.drain_events(None).await.unwrap();
    assert_eq!(received.body, json!("only"));
}

#[tokio::test]
async fn test_drain_with_timeout_on_empty_queues_is_empty() {
    let (_, mut channel) = open_channel().await;
    channel.basic_consume("orders", false, "tag-1").await.unwrap();

    let result = channel
        .drain_events(Some(Duration::from_millis(50)))
        .await;
    assert!(matches!(result, Err(ChannelError::Empty)));
}

#[tokio::test]
async fn test_drain_propagates_service_failures() {
    let service = Arc::new(BrokenReceiveService {
        inner: InMemoryQueueService::new(),
    });
    let mut channel = Channel::open(service, TransportConfig::default())
        .await
        .unwrap();
    channel.basic_consume("orders", false, "tag-1").await.unwrap();

    let result = channel.drain_events(None).await;
    match result {
        Err(ChannelError::Service(ServiceError::ConnectionFailed { .. })) => {}
        other => panic!("expected the receive failure to surface, got {:?}", other),
    }
}

#[tokio::test]
async fn test_drain_propagates_malformed_bodies() {
    let (service, mut channel) = open_channel().await;
    channel.basic_consume("orders", false, "tag-1").await.unwrap();
    let handle = channel.new_queue("orders").await.unwrap();

    // A body that never went through the wire codec
    service.send_message(&handle, "{not json").await.unwrap();

    let result = channel.drain_events(None).await;
    match result {
        Err(ChannelError::Serialization(_)) => {}
        other => panic!("expected the decode failure to surface, got {:?}", other),
    }
}

#[tokio::test]
async fn test_noack_batch_is_not_settled_before_every_body_decodes() {
    let (service, mut channel) = open_channel().await;
    channel.basic_consume("orders", true, "tag-1").await.unwrap();
    let handle = channel.new_queue("orders").await.unwrap();

    channel
        .put("orders", &envelope(json!({"x": 1}), "orders"))
        .await
        .unwrap();
    service.send_message(&handle, "{not json").await.unwrap();

    let result = channel.drain_events(None).await;
    assert!(matches!(result, Err(ChannelError::Serialization(_))));

    // Neither message was deleted: the valid head of the batch is still
    // held by the service instead of being settled and then dropped.
    let attributes = service.queue_attributes(&handle).await.unwrap();
    assert_eq!(
        attributes.active_messages + attributes.inactive_messages,
        2
    );
}

// ============================================================================
// Acknowledgment
// ============================================================================

#[tokio::test]
async fn test_ack_settles_with_the_remote_service() {
    let (service, mut channel) = open_channel().await;
    channel.basic_consume("orders", false, "tag-1").await.unwrap();
    channel
        .put("orders", &envelope(json!({"x": 1}), "orders"))
        .await
        .unwrap();

    let received = channel.drain_events(None).await.unwrap();
    let tag = received.properties.delivery_info.delivery_tag.unwrap();
    assert_eq!(channel.unacked(), 1);

    let handle = channel.new_queue("orders").await.unwrap();
    let before = service.queue_attributes(&handle).await.unwrap();
    assert_eq!(before.inactive_messages, 1, "in flight until acked");

    channel.basic_ack(tag).await.unwrap();

    assert_eq!(channel.unacked(), 0);
    let after = service.queue_attributes(&handle).await.unwrap();
    assert_eq!(after.active_messages, 0);
    assert_eq!(after.inactive_messages, 0);
}

#[tokio::test]
async fn test_double_ack_is_harmless() {
    let (_, mut channel) = open_channel().await;
    channel.basic_consume("orders", false, "tag-1").await.unwrap();
    channel
        .put("orders", &envelope(json!({"x": 1}), "orders"))
        .await
        .unwrap();

    let received = channel.drain_events(None).await.unwrap();
    let tag = received.properties.delivery_info.delivery_tag.unwrap();

    channel.basic_ack(tag).await.unwrap();
    channel.basic_ack(tag).await.unwrap();
}

#[tokio::test]
async fn test_noack_consume_settles_at_delivery() {
    let (service, mut channel) = open_channel().await;
    channel.basic_consume("orders", true, "tag-1").await.unwrap();
    channel
        .put("orders", &envelope(json!({"x": 1}), "orders"))
        .await
        .unwrap();

    let received = channel.drain_events(None).await.unwrap();
    let tag = received.properties.delivery_info.delivery_tag.unwrap();

    assert!(
        received.properties.delivery_info.remote.is_none(),
        "no receipt is carried for a no-ack delivery"
    );
    assert_eq!(channel.unacked(), 0);

    let handle = channel.new_queue("orders").await.unwrap();
    let attributes = service.queue_attributes(&handle).await.unwrap();
    assert_eq!(attributes.active_messages, 0);
    assert_eq!(attributes.inactive_messages, 0, "settled at decode time");

    // Acking anyway is plain bookkeeping
    channel.basic_ack(tag).await.unwrap();
}

// ============================================================================
// QoS
// ============================================================================

#[tokio::test]
async fn test_prefetch_window_gates_the_drain_loop() {
    let (_, mut channel) = open_channel().await;
    channel.basic_qos(1);
    channel.basic_consume("orders", false, "tag-1").await.unwrap();
    for i in 0..2 {
        channel
            .put("orders", &envelope(json!({"seq": i}), "orders"))
            .await
            .unwrap();
    }

    let first = channel.drain_events(None).await.unwrap();
    assert_eq!(first.body, json!({"seq": 0}));

    // The single slot is occupied until the ack lands
    let blocked = channel.drain_events(None).await;
    assert!(matches!(blocked, Err(ChannelError::Empty)));

    let tag = first.properties.delivery_info.delivery_tag.unwrap();
    channel.basic_ack(tag).await.unwrap();

    let second = channel.drain_events(None).await.unwrap();
    assert_eq!(second.body, json!({"seq": 1}));
}

// ============================================================================
// Restore
// ============================================================================

#[tokio::test]
async fn test_restore_strips_channel_local_state() {
    let (_, mut channel) = open_channel().await;
    channel.basic_consume("orders", false, "tag-1").await.unwrap();
    channel
        .put("orders", &envelope(json!({"x": 1}), "orders"))
        .await
        .unwrap();

    let received = channel.drain_events(None).await.unwrap();
    assert!(received.properties.delivery_info.remote.is_some());

    let restored = channel.restore_envelope(received);
    assert!(restored.properties.delivery_info.remote.is_none());
    assert!(restored.properties.delivery_info.delivery_tag.is_none());
    assert_eq!(restored.body, json!({"x": 1}), "the payload survives");
}

// ============================================================================
// Consumer Lifecycle
// ============================================================================

#[tokio::test]
async fn test_cancel_removes_queue_from_rotation() {
    let (_, mut channel) = open_channel().await;
    channel.basic_consume("orders", false, "tag-1").await.unwrap();
    channel
        .put("orders", &envelope(json!({"x": 1}), "orders"))
        .await
        .unwrap();

    channel.basic_cancel("tag-1");

    assert!(!channel.has_consumers());
    let result = channel.drain_events(None).await;
    assert!(matches!(result, Err(ChannelError::Empty)));
}

#[tokio::test]
async fn test_cancel_clears_noack_registration() {
    let (_, mut channel) = open_channel().await;
    channel.basic_consume("orders", true, "tag-1").await.unwrap();
    channel.basic_cancel("tag-1");

    // A later ack-mode consumer on the same queue carries receipts again
    channel.basic_consume("orders", false, "tag-2").await.unwrap();
    channel
        .put("orders", &envelope(json!({"x": 1}), "orders"))
        .await
        .unwrap();

    let received = channel.drain_events(None).await.unwrap();
    assert!(received.properties.delivery_info.remote.is_some());
}

#[tokio::test]
async fn test_cancel_of_unknown_tag_is_a_noop() {
    let (_, mut channel) = open_channel().await;
    channel.basic_cancel("never-registered");
    assert!(!channel.has_consumers());
}

// ============================================================================
// Queue Operations
// ============================================================================

#[tokio::test]
async fn test_size_reflects_active_messages() {
    let (_, mut channel) = open_channel().await;
    assert_eq!(channel.size("orders").await.unwrap(), 0);

    channel
        .put("orders", &envelope(json!({"x": 1}), "orders"))
        .await
        .unwrap();
    assert_eq!(channel.size("orders").await.unwrap(), 1);
}

#[tokio::test]
async fn test_purge_empties_the_queue_and_reports_the_count() {
    let (_, mut channel) = open_channel().await;
    for i in 0..5 {
        channel
            .put("orders", &envelope(json!({"seq": i}), "orders"))
            .await
            .unwrap();
    }

    let purged = channel.purge("orders").await.unwrap();
    assert_eq!(purged, 5);
    assert_eq!(channel.size("orders").await.unwrap(), 0);
}

#[tokio::test]
async fn test_purge_of_empty_queue_reports_zero() {
    let (_, mut channel) = open_channel().await;
    channel.new_queue("orders").await.unwrap();
    assert_eq!(channel.purge("orders").await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_queue_forgets_the_handle() {
    let (service, mut channel) = open_channel().await;
    channel.new_queue("orders").await.unwrap();
    channel.delete_queue("orders").await.unwrap();

    let urls = service.list_queues().await.unwrap();
    assert!(urls.is_empty());
}
