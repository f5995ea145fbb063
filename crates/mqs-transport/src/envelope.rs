//! Envelope types and the wire codec.
//!
//! An [`Envelope`] is the structured unit of data moving through the
//! transport: an arbitrary JSON body plus delivery metadata. On the wire an
//! envelope is a single UTF-8 JSON document; the remote-delivery fields
//! captured at decode time are channel-local and never serialized.

use crate::cache::QueueHandle;
use crate::error::SerializationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The structured unit of data moving through the transport
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub body: Value,
    #[serde(default)]
    pub properties: Properties,
}

impl Envelope {
    /// Create an envelope around a JSON body
    pub fn new(body: Value) -> Self {
        Self {
            body,
            properties: Properties::default(),
        }
    }

    /// Set exchange and routing key on the delivery info
    pub fn with_routing(mut self, exchange: &str, routing_key: &str) -> Self {
        self.properties.delivery_info.exchange = exchange.to_string();
        self.properties.delivery_info.routing_key = routing_key.to_string();
        self
    }

    /// Serialize the envelope to its wire representation.
    ///
    /// Channel-local delivery fields (`remote`, `delivery_tag`) are skipped
    /// by serde and never reach the wire.
    pub fn to_wire(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an envelope from its wire representation
    pub fn from_wire(raw: &str) -> Result<Self, SerializationError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Envelope properties carried alongside the body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    #[serde(default)]
    pub delivery_info: DeliveryInfo,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, Value>,
}

/// Delivery metadata for one envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub routing_key: String,
    /// Assigned by the channel when the envelope is handed to the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_tag: Option<u64>,
    /// Remote handle captured at decode time so a later ack can delete the
    /// exact remote message. Never serialized.
    #[serde(skip)]
    pub remote: Option<RemoteDelivery>,
}

/// The remote message identity behind an undelivered ack
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDelivery {
    pub queue: QueueHandle,
    pub receipt_handle: String,
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
