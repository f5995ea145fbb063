//! Common test utilities for mqs-transport integration tests
//!
//! This module provides:
//! - A shared in-memory service plus an open channel over it
//! - Envelope builders for test payloads
//! - Tracing initialization for test diagnostics

use mqs_transport::{Channel, Envelope, InMemoryQueueService, TransportConfig};
use std::sync::Arc;

/// Initialize tracing once for the whole test binary
#[allow(dead_code)]
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "mqs_transport=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Open a channel over a fresh in-memory service, returning both
#[allow(dead_code)]
pub async fn open_test_channel() -> (Arc<InMemoryQueueService>, Channel) {
    open_test_channel_with(TransportConfig::default()).await
}

/// Open a channel with explicit transport settings
#[allow(dead_code)]
pub async fn open_test_channel_with(
    config: TransportConfig,
) -> (Arc<InMemoryQueueService>, Channel) {
    init_tracing();
    let service = Arc::new(InMemoryQueueService::new());
    let channel = Channel::open(service.clone(), config)
        .await
        .expect("channel opens against an empty in-memory service");
    (service, channel)
}

/// A second channel over the same service, as a separate producer or consumer
#[allow(dead_code)]
pub async fn open_peer_channel(service: &Arc<InMemoryQueueService>) -> Channel {
    Channel::open(service.clone(), TransportConfig::default())
        .await
        .expect("peer channel opens")
}

/// A payload envelope routed to `queue`
#[allow(dead_code)]
pub fn payload(queue: &str, body: serde_json::Value) -> Envelope {
    Envelope::new(body).with_routing("", queue)
}
