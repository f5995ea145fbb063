//! Queue handle cache and remote-name translation.
//!
//! The cache maps a logical queue name to a lazily-created remote handle so
//! that at most one create-queue call is made per distinct logical name for
//! the lifetime of a channel. It is pre-populated from a list-queues call at
//! channel construction: queues that already exist remotely must not be
//! re-created, because the remote service rejects creation with a visibility
//! timeout that conflicts with the existing configuration.

use crate::error::ServiceError;
use crate::service::QueueService;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Handle to one remote queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    name: String,
    url: String,
    visibility_timeout: u32,
}

impl QueueHandle {
    pub fn new(name: String, url: String, visibility_timeout: u32) -> Self {
        Self {
            name,
            url,
            visibility_timeout,
        }
    }

    /// Remote-legal queue name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remote queue URL
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn visibility_timeout(&self) -> u32 {
        self.visibility_timeout
    }
}

/// Translate a logical queue name into a remote-legal one.
///
/// `.` and `@` map to `-`, every other character outside
/// `[A-Za-z0-9-_]` maps to `_`, and the configured prefix is prepended.
pub fn remote_queue_name(prefix: &str, logical: &str) -> String {
    let mut name = String::with_capacity(prefix.len() + logical.len());
    name.push_str(prefix);
    for c in logical.chars() {
        name.push(match c {
            '.' | '@' => '-',
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => c,
            _ => '_',
        });
    }
    name
}

/// Per-channel cache of remote queue handles, keyed by remote name
pub struct QueueHandleCache {
    entries: Mutex<HashMap<String, QueueHandle>>,
    prefix: String,
    visibility_timeout: u32,
}

impl QueueHandleCache {
    pub fn new(prefix: String, visibility_timeout: u32) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            prefix,
            visibility_timeout,
        }
    }

    /// Seed the cache from the remote queue listing.
    ///
    /// Handles created here carry the configured visibility timeout; the
    /// remote value is authoritative but is not re-fetched per queue.
    pub async fn prepopulate(&self, service: &dyn QueueService) -> Result<(), ServiceError> {
        let urls = service.list_queues().await?;
        let mut entries = self.entries.lock().await;
        for url in urls {
            let name = url.rsplit('/').next().unwrap_or(&url).to_string();
            entries.insert(
                name.clone(),
                QueueHandle::new(name, url, self.visibility_timeout),
            );
        }
        debug!(queues = entries.len(), "queue handle cache prepopulated");
        Ok(())
    }

    /// Resolve a logical name to a remote handle, creating the remote queue
    /// on first reference.
    ///
    /// The cache lock is held across the create call so concurrent lookups
    /// for the same name cannot race-create duplicate queues.
    pub async fn resolve(
        &self,
        service: &dyn QueueService,
        logical: &str,
    ) -> Result<QueueHandle, ServiceError> {
        let remote = remote_queue_name(&self.prefix, logical);
        let mut entries = self.entries.lock().await;
        if let Some(handle) = entries.get(&remote) {
            debug!(queue = %remote, "queue handle cache hit");
            return Ok(handle.clone());
        }
        debug!(queue = %remote, "queue handle cache miss, creating remote queue");
        let url = service.create_queue(&remote, self.visibility_timeout).await?;
        let handle = QueueHandle::new(remote.clone(), url, self.visibility_timeout);
        entries.insert(remote, handle.clone());
        Ok(handle)
    }

    /// Delete the remote queue and drop the cache entry.
    ///
    /// The entry is evicted before the remote call, so a failed delete never
    /// leaves a permanently stale handle behind; the error still surfaces.
    pub async fn delete(
        &self,
        service: &dyn QueueService,
        logical: &str,
    ) -> Result<(), ServiceError> {
        let remote = remote_queue_name(&self.prefix, logical);
        let handle = {
            let mut entries = self.entries.lock().await;
            entries.remove(&remote)
        };
        // The cache mirrors the remote account, so an uncached name has no
        // remote queue to delete.
        let Some(handle) = handle else {
            return Ok(());
        };
        if let Err(err) = service.delete_queue(&handle).await {
            warn!(queue = %remote, error = %err, "remote queue delete failed; cache entry evicted anyway");
            return Err(err);
        }
        Ok(())
    }

    /// Whether a logical name currently has a cached handle
    pub async fn contains(&self, logical: &str) -> bool {
        let remote = remote_queue_name(&self.prefix, logical);
        self.entries.lock().await.contains_key(&remote)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
