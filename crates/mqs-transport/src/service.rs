//! The remote queue service boundary.
//!
//! The channel never talks HTTP directly; it goes through [`QueueService`],
//! an injected collaborator whose lifecycle is owned by the caller. The
//! production implementation is [`crate::providers::HttpQueueService`]; tests
//! and development use [`crate::providers::InMemoryQueueService`].

use crate::cache::QueueHandle;
use crate::error::ServiceError;
use async_trait::async_trait;

/// A message as returned by the remote service, before decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub message_id: String,
    /// Opaque token used to delete this exact received message
    pub receipt_handle: String,
    /// UTF-8 JSON text
    pub body: String,
}

/// Queue attributes as reported by the remote service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueAttributes {
    /// Messages visible and available for receive
    pub active_messages: u64,
    /// Messages received but not yet deleted (within visibility timeout)
    pub inactive_messages: u64,
    pub visibility_timeout: u32,
}

/// Operations offered by the remote managed queue service
#[async_trait]
pub trait QueueService: Send + Sync {
    /// List all queue URLs known to the remote account
    async fn list_queues(&self) -> Result<Vec<String>, ServiceError>;

    /// Create a queue with the given visibility timeout, returning its URL.
    ///
    /// Creating a queue that already exists with a different visibility
    /// timeout fails with [`ServiceError::QueueConflict`].
    async fn create_queue(
        &self,
        name: &str,
        visibility_timeout: u32,
    ) -> Result<String, ServiceError>;

    /// Delete a queue and all of its messages
    async fn delete_queue(&self, queue: &QueueHandle) -> Result<(), ServiceError>;

    /// Send one message body, returning the remote message id
    async fn send_message(&self, queue: &QueueHandle, body: &str) -> Result<String, ServiceError>;

    /// Receive up to `max_messages` in one call. An empty vec means no
    /// message was available; the `Empty` mapping happens in the channel.
    async fn receive_messages(
        &self,
        queue: &QueueHandle,
        max_messages: u32,
        wait_seconds: u32,
    ) -> Result<Vec<RawMessage>, ServiceError>;

    /// Delete one received message by its receipt handle
    async fn delete_message(
        &self,
        queue: &QueueHandle,
        receipt_handle: &str,
    ) -> Result<(), ServiceError>;

    /// Report queue attributes (active message count among them)
    async fn queue_attributes(&self, queue: &QueueHandle) -> Result<QueueAttributes, ServiceError>;

    /// Drop all messages currently in the queue
    async fn clear_queue(&self, queue: &QueueHandle) -> Result<(), ServiceError>;
}
