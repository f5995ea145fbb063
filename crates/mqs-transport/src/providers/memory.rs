//! In-memory queue service implementation for testing and development.
//!
//! This module provides a fully functional in-memory rendition of the remote
//! queue service:
//! - Per-queue FIFO ordering
//! - Visibility timeouts: received-but-undeleted messages become invisible
//!   and return to the front of the queue once the timeout lapses
//! - Attribute counting (active vs. in-flight messages)
//!
//! Intended for unit testing of transport consumers, development, and as a
//! reference for the HTTP provider's semantics.

use crate::cache::QueueHandle;
use crate::error::ServiceError;
use crate::service::{QueueAttributes, QueueService, RawMessage};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

#[derive(Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
}

struct InFlightMessage {
    message: StoredMessage,
    invisible_until: DateTime<Utc>,
}

struct MemoryQueue {
    url: String,
    visibility_timeout: u32,
    /// Visible messages in FIFO order
    messages: VecDeque<StoredMessage>,
    /// Received but not yet deleted, keyed by receipt handle
    in_flight: HashMap<String, InFlightMessage>,
}

impl MemoryQueue {
    fn new(name: &str, visibility_timeout: u32) -> Self {
        Self {
            url: format!("memory://queues/{}", name),
            visibility_timeout,
            messages: VecDeque::new(),
            in_flight: HashMap::new(),
        }
    }

    /// Return messages whose visibility timeout has lapsed to the front of
    /// the queue, preserving their eligibility for redelivery.
    fn reap_expired(&mut self) {
        let now = Utc::now();
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, m)| m.invisible_until <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        for receipt in expired {
            if let Some(in_flight) = self.in_flight.remove(&receipt) {
                self.messages.push_front(in_flight.message);
            }
        }
    }
}

// ============================================================================
// InMemoryQueueService
// ============================================================================

/// In-memory queue service implementation
pub struct InMemoryQueueService {
    queues: Mutex<HashMap<String, MemoryQueue>>,
}

impl InMemoryQueueService {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }

    async fn with_queue<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut MemoryQueue) -> Result<T, ServiceError> + Send,
    ) -> Result<T, ServiceError> {
        let mut queues = self.queues.lock().await;
        let queue = queues
            .get_mut(name)
            .ok_or_else(|| ServiceError::QueueNotFound {
                queue_name: name.to_string(),
            })?;
        f(queue)
    }
}

impl Default for InMemoryQueueService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueService for InMemoryQueueService {
    async fn list_queues(&self) -> Result<Vec<String>, ServiceError> {
        let queues = self.queues.lock().await;
        let mut urls: Vec<String> = queues.values().map(|q| q.url.clone()).collect();
        urls.sort();
        Ok(urls)
    }

    async fn create_queue(
        &self,
        name: &str,
        visibility_timeout: u32,
    ) -> Result<String, ServiceError> {
        let mut queues = self.queues.lock().await;
        if let Some(existing) = queues.get(name) {
            // Re-creation is idempotent only when the attributes match.
            if existing.visibility_timeout != visibility_timeout {
                return Err(ServiceError::QueueConflict {
                    queue_name: name.to_string(),
                });
            }
            return Ok(existing.url.clone());
        }
        let queue = MemoryQueue::new(name, visibility_timeout);
        let url = queue.url.clone();
        queues.insert(name.to_string(), queue);
        Ok(url)
    }

    async fn delete_queue(&self, queue: &QueueHandle) -> Result<(), ServiceError> {
        let mut queues = self.queues.lock().await;
        queues
            .remove(queue.name())
            .map(|_| ())
            .ok_or_else(|| ServiceError::QueueNotFound {
                queue_name: queue.name().to_string(),
            })
    }

    async fn send_message(&self, queue: &QueueHandle, body: &str) -> Result<String, ServiceError> {
        self.with_queue(queue.name(), |q| {
            let message_id = uuid::Uuid::new_v4().to_string();
            q.messages.push_back(StoredMessage {
                message_id: message_id.clone(),
                body: body.to_string(),
            });
            Ok(message_id)
        })
        .await
    }

    async fn receive_messages(
        &self,
        queue: &QueueHandle,
        max_messages: u32,
        _wait_seconds: u32,
    ) -> Result<Vec<RawMessage>, ServiceError> {
        // The long-poll hint is ignored; an empty result returns immediately.
        self.with_queue(queue.name(), |q| {
            q.reap_expired();
            let mut received = Vec::new();
            while received.len() < max_messages as usize {
                let Some(message) = q.messages.pop_front() else {
                    break;
                };
                let receipt_handle = uuid::Uuid::new_v4().to_string();
                let invisible_until =
                    Utc::now() + Duration::seconds(i64::from(q.visibility_timeout));
                received.push(RawMessage {
                    message_id: message.message_id.clone(),
                    receipt_handle: receipt_handle.clone(),
                    body: message.body.clone(),
                });
                q.in_flight
                    .insert(receipt_handle, InFlightMessage { message, invisible_until });
            }
            Ok(received)
        })
        .await
    }

    async fn delete_message(
        &self,
        queue: &QueueHandle,
        receipt_handle: &str,
    ) -> Result<(), ServiceError> {
        self.with_queue(queue.name(), |q| {
            q.reap_expired();
            q.in_flight
                .remove(receipt_handle)
                .map(|_| ())
                .ok_or_else(|| ServiceError::MessageNotFound {
                    receipt: receipt_handle.to_string(),
                })
        })
        .await
    }

    async fn queue_attributes(&self, queue: &QueueHandle) -> Result<QueueAttributes, ServiceError> {
        self.with_queue(queue.name(), |q| {
            q.reap_expired();
            Ok(QueueAttributes {
                active_messages: q.messages.len() as u64,
                inactive_messages: q.in_flight.len() as u64,
                visibility_timeout: q.visibility_timeout,
            })
        })
        .await
    }

    async fn clear_queue(&self, queue: &QueueHandle) -> Result<(), ServiceError> {
        self.with_queue(queue.name(), |q| {
            q.messages.clear();
            q.in_flight.clear();
            Ok(())
        })
        .await
    }
}
