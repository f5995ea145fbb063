//! Queue service implementations.
//!
//! - [`HttpQueueService`] - the real MQS REST API over signed HTTP requests
//! - [`InMemoryQueueService`] - full in-memory implementation for tests and
//!   development

pub mod http;
pub mod memory;

pub use http::HttpQueueService;
pub use memory::InMemoryQueueService;
