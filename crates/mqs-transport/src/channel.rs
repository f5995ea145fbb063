//! The channel: bulk fetch, drain loop, acknowledgment and restore paths.
//!
//! A channel maps the abstract multi-queue consumption model (consume, drain
//! one event, ack) onto repeated polling of a remote service that has no
//! push primitive. Surplus messages from each bulk fetch are buffered
//! locally so the caller keeps a simple one-event-at-a-time contract while
//! network round-trips are amortized against the remote batch-receive limit.
//!
//! A channel is a single logical consumption path: operations are invoked
//! cooperatively by the owning client's event loop, one poll in flight at a
//! time, so the channel holds no internal locking beyond the queue handle
//! cache.

use crate::cache::{QueueHandle, QueueHandleCache};
use crate::config::TransportConfig;
use crate::envelope::{Envelope, RemoteDelivery};
use crate::error::ChannelError;
use crate::qos::QosTracker;
use crate::scheduling::FairCycle;
use crate::service::{QueueService, RawMessage};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// The remote bulk receive supports at most 10 messages per call.
pub const MAX_BULK_MESSAGES: u32 = 10;

/// The remote service is slow to reflect just-sent messages in its counts,
/// so purge re-reads the count a bounded number of times.
const PURGE_ATTEMPTS: u32 = 10;

/// A virtual channel over the remote queue service
pub struct Channel {
    service: Arc<dyn QueueService>,
    config: TransportConfig,
    queues: QueueHandleCache,
    noack_queues: HashSet<String>,
    /// consumer tag -> logical queue name
    consumers: HashMap<String, String>,
    /// Decoded envelopes fetched but not yet handed to the caller (FIFO)
    buffer: VecDeque<Envelope>,
    cycle: FairCycle,
    qos: QosTracker,
}

impl Channel {
    /// Open a channel against an injected queue service.
    ///
    /// Pre-populates the queue handle cache from a single list-queues call
    /// so queues that already exist remotely are never re-created with
    /// conflicting attributes.
    pub async fn open(
        service: Arc<dyn QueueService>,
        config: TransportConfig,
    ) -> Result<Self, ChannelError> {
        let queues =
            QueueHandleCache::new(config.queue_name_prefix.clone(), config.visibility_timeout);
        queues.prepopulate(service.as_ref()).await?;
        info!(region = %config.region, "channel opened");
        Ok(Self {
            service,
            config,
            queues,
            noack_queues: HashSet::new(),
            consumers: HashMap::new(),
            buffer: VecDeque::new(),
            cycle: FairCycle::new(),
            qos: QosTracker::new(),
        })
    }

    /// This transport cannot express broadcast semantics
    pub fn supports_fanout(&self) -> bool {
        false
    }

    /// Declare an exchange. Fanout exchanges are rejected up front rather
    /// than silently misrouting.
    pub fn exchange_declare(&mut self, exchange: &str, kind: &str) -> Result<(), ChannelError> {
        if kind == "fanout" {
            return Err(ChannelError::FanoutUnsupported);
        }
        debug!(exchange, kind, "exchange declared");
        Ok(())
    }

    // ========================================================================
    // Consumer registration
    // ========================================================================

    /// Register a consumer on a queue and add it to the poll rotation
    pub async fn basic_consume(
        &mut self,
        queue: &str,
        no_ack: bool,
        consumer_tag: &str,
    ) -> Result<(), ChannelError> {
        self.queues.resolve(self.service.as_ref(), queue).await?;
        if no_ack {
            self.noack_queues.insert(queue.to_string());
        }
        self.consumers
            .insert(consumer_tag.to_string(), queue.to_string());
        self.reset_cycle();
        info!(queue, consumer_tag, no_ack, "consumer registered");
        Ok(())
    }

    /// Cancel a consumer, removing its queue from the rotation and from the
    /// no-ack set.
    ///
    /// Messages already buffered for the queue stay buffered and are
    /// delivered if later drained; discarding them is caller policy.
    pub fn basic_cancel(&mut self, consumer_tag: &str) {
        if let Some(queue) = self.consumers.remove(consumer_tag) {
            self.noack_queues.remove(&queue);
            self.reset_cycle();
            info!(consumer_tag, queue = %queue, "consumer cancelled");
        }
    }

    /// Set the prefetch window; zero means unlimited
    pub fn basic_qos(&mut self, prefetch_count: u32) {
        self.qos.set_prefetch(prefetch_count);
    }

    fn reset_cycle(&mut self) {
        self.cycle.reset(self.consumers.values().cloned());
    }

    // ========================================================================
    // Drain loop
    // ========================================================================

    /// Return a single payload message from one of the consumed queues.
    ///
    /// Serves from the local buffer first; only when the buffer is empty is
    /// the fair cycle asked to poll the next queue. Fails with
    /// [`ChannelError::Empty`] when no consumer is registered, when the QoS
    /// window has no free slot, or when a full rotation found no message.
    /// Remote service failures and malformed bodies propagate to the caller.
    pub async fn drain_events(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Envelope, ChannelError> {
        if self.consumers.is_empty() || !self.qos.can_consume() {
            return Err(ChannelError::Empty);
        }
        if let Some(envelope) = self.buffer.pop_front() {
            return Ok(self.deliver(envelope));
        }
        let (messages, queue) = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.poll_cycle()).await {
                Ok(polled) => polled?,
                Err(_) => return Err(ChannelError::Empty),
            },
            None => self.poll_cycle().await?,
        };
        debug!(queue = %queue, count = messages.len(), "bulk fetch buffered");
        self.buffer.extend(messages);
        match self.buffer.pop_front() {
            Some(envelope) => Ok(self.deliver(envelope)),
            None => Err(ChannelError::Empty),
        }
    }

    /// One full rotation of the fair cycle: each active queue is polled at
    /// most once; the first non-empty poll wins.
    async fn poll_cycle(&mut self) -> Result<(Vec<Envelope>, String), ChannelError> {
        for _ in 0..self.cycle.len() {
            let Some(queue) = self.cycle.advance() else {
                break;
            };
            match self.get_bulk(&queue).await {
                Ok(messages) => return Ok((messages, queue)),
                Err(ChannelError::Empty) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(ChannelError::Empty)
    }

    /// Fetch a QoS-approved batch of messages from one queue.
    ///
    /// Slot availability is always checked before the remote receive call is
    /// issued; a receive the QoS layer has not pre-approved could overflow
    /// the unacked window.
    pub async fn get_bulk(&mut self, queue: &str) -> Result<Vec<Envelope>, ChannelError> {
        let slots = self.qos.estimate(MAX_BULK_MESSAGES);
        if slots == 0 {
            return Err(ChannelError::Empty);
        }
        let handle = self.queues.resolve(self.service.as_ref(), queue).await?;
        let raw = self
            .service
            .receive_messages(&handle, slots, self.config.wait_time_seconds)
            .await?;
        if raw.is_empty() {
            return Err(ChannelError::Empty);
        }
        self.decode_batch(raw, queue, &handle).await
    }

    /// Retrieve a single message off a queue; fallback path when bulk
    /// semantics are unnecessary.
    pub async fn get(&mut self, queue: &str) -> Result<Envelope, ChannelError> {
        let handle = self.queues.resolve(self.service.as_ref(), queue).await?;
        let raw = self
            .service
            .receive_messages(&handle, 1, self.config.wait_time_seconds)
            .await?;
        if raw.is_empty() {
            return Err(ChannelError::Empty);
        }
        let mut decoded = self.decode_batch(raw, queue, &handle).await?;
        match decoded.pop() {
            Some(envelope) => Ok(self.deliver(envelope)),
            None => Err(ChannelError::Empty),
        }
    }

    /// Decode a batch of raw remote messages into envelopes.
    ///
    /// Every body is parsed before any message is settled, so a malformed
    /// body later in the batch cannot strand earlier no-ack messages that
    /// would otherwise already be deleted remotely. Messages from no-ack
    /// queues are then deleted from the remote service and carry no
    /// remote-delivery metadata; all others capture the exact receipt handle
    /// and queue handle for the later ack.
    async fn decode_batch(
        &self,
        raw: Vec<RawMessage>,
        queue: &str,
        handle: &QueueHandle,
    ) -> Result<Vec<Envelope>, ChannelError> {
        let mut decoded = Vec::with_capacity(raw.len());
        for message in &raw {
            decoded.push(Envelope::from_wire(&message.body)?);
        }
        if self.noack_queues.contains(queue) {
            // No ack will ever arrive; settle with the service now.
            for message in &raw {
                self.service
                    .delete_message(handle, &message.receipt_handle)
                    .await?;
            }
        } else {
            for (envelope, message) in decoded.iter_mut().zip(raw) {
                envelope.properties.delivery_info.remote = Some(RemoteDelivery {
                    queue: handle.clone(),
                    receipt_handle: message.receipt_handle,
                });
            }
        }
        Ok(decoded)
    }

    /// Stamp a delivery tag and register ack-tracked messages against the
    /// prefetch window.
    fn deliver(&mut self, mut envelope: Envelope) -> Envelope {
        let tag = self.qos.next_delivery_tag();
        envelope.properties.delivery_info.delivery_tag = Some(tag);
        if envelope.properties.delivery_info.remote.is_some() {
            self.qos.track(tag, envelope.properties.delivery_info.clone());
        }
        envelope
    }

    // ========================================================================
    // Acknowledgment and restore
    // ========================================================================

    /// Acknowledge one delivery.
    ///
    /// For ack-tracked deliveries this issues exactly one remote delete for
    /// the receipt handle captured at decode time, then settles the tag. A
    /// tag with no tracked delivery (a no-ack message settled at decode
    /// time) needs only the bookkeeping, which is a no-op.
    pub async fn basic_ack(&mut self, delivery_tag: u64) -> Result<(), ChannelError> {
        let Some(info) = self.qos.get(delivery_tag).cloned() else {
            debug!(delivery_tag, "ack for untracked delivery tag");
            return Ok(());
        };
        if let Some(remote) = info.remote {
            self.service
                .delete_message(&remote.queue, &remote.receipt_handle)
                .await?;
        }
        self.qos.ack(delivery_tag);
        Ok(())
    }

    /// Strip channel-local delivery fields before an envelope is requeued.
    ///
    /// The remote handle is not serializable and must not leak into the
    /// generic requeue mechanism; the stale delivery tag goes with it.
    pub fn restore_envelope(&self, mut envelope: Envelope) -> Envelope {
        envelope.properties.delivery_info.remote = None;
        envelope.properties.delivery_info.delivery_tag = None;
        envelope
    }

    // ========================================================================
    // Queue operations
    // ========================================================================

    /// Put a message onto a queue
    pub async fn put(&mut self, queue: &str, envelope: &Envelope) -> Result<String, ChannelError> {
        let handle = self.queues.resolve(self.service.as_ref(), queue).await?;
        let body = envelope.to_wire()?;
        let message_id = self.service.send_message(&handle, &body).await?;
        debug!(queue, message_id = %message_id, "message sent");
        Ok(message_id)
    }

    /// Ensure a queue exists, returning its handle
    pub async fn new_queue(&mut self, queue: &str) -> Result<QueueHandle, ChannelError> {
        Ok(self.queues.resolve(self.service.as_ref(), queue).await?)
    }

    /// Delete a queue and evict its cached handle
    pub async fn delete_queue(&mut self, queue: &str) -> Result<(), ChannelError> {
        Ok(self.queues.delete(self.service.as_ref(), queue).await?)
    }

    /// Number of active messages in a queue as reported by the service
    pub async fn size(&mut self, queue: &str) -> Result<u64, ChannelError> {
        let handle = self.queues.resolve(self.service.as_ref(), queue).await?;
        let attributes = self.service.queue_attributes(&handle).await?;
        debug!(queue, active = attributes.active_messages, "queue size");
        Ok(attributes.active_messages)
    }

    /// Delete all current messages in a queue, returning the approximate
    /// number purged.
    pub async fn purge(&mut self, queue: &str) -> Result<u64, ChannelError> {
        let handle = self.queues.resolve(self.service.as_ref(), queue).await?;
        let mut purged = 0;
        for _ in 0..PURGE_ATTEMPTS {
            let active = self
                .service
                .queue_attributes(&handle)
                .await?
                .active_messages;
            if active == 0 {
                break;
            }
            purged += active;
            self.service.clear_queue(&handle).await?;
        }
        Ok(purged)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn has_consumers(&self) -> bool {
        !self.consumers.is_empty()
    }

    /// Envelopes fetched but not yet handed to the caller
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Deliveries handed out and not yet acked
    pub fn unacked(&self) -> usize {
        self.qos.unacked()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
