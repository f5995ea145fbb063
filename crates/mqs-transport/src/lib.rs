//! # MQS Transport
//!
//! Transport adapter that lets a generic messaging client (channels, queues,
//! consume, ack) operate against a remote managed queue service reachable
//! only through a simple HTTP request/response API.
//!
//! This library provides:
//! - A virtual [`channel::Channel`] mapping multi-queue consumption onto
//!   repeated polling with local buffering of prefetched messages
//! - Fair round-robin scheduling across consumed queues
//! - A QoS window bounding how many unacked messages may be in flight
//! - A queue handle cache amortizing create-queue calls
//! - Pluggable service providers (HTTP, in-memory)
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for channel and service operations
//! - [`envelope`] - Envelope structures and the wire codec
//! - [`channel`] - The drain loop, bulk fetch, ack and restore paths
//! - [`cache`] - Queue handle cache and remote-name translation
//! - [`qos`] - Prefetch-window tracking and slot estimation
//! - [`scheduling`] - Fair cycle rotation over consumed queues
//! - [`service`] - The remote queue service boundary
//! - [`providers`] - Service implementations

// Module declarations
pub mod cache;
pub mod channel;
pub mod config;
pub mod envelope;
pub mod error;
pub mod providers;
pub mod qos;
pub mod scheduling;
pub mod service;

// Re-export commonly used types at crate root for convenience
pub use cache::{remote_queue_name, QueueHandle, QueueHandleCache};
pub use channel::{Channel, MAX_BULK_MESSAGES};
pub use config::{HttpServiceConfig, TransportConfig};
pub use envelope::{DeliveryInfo, Envelope, Properties, RemoteDelivery};
pub use error::{ChannelError, SerializationError, ServiceError};
pub use providers::{HttpQueueService, InMemoryQueueService};
pub use qos::QosTracker;
pub use scheduling::FairCycle;
pub use service::{QueueAttributes, QueueService, RawMessage};
