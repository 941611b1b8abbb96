//! Admission control for store round trips.

use super::{Reply, Store, StoreCommand};
use crate::error::StoreError;
use crate::value::Arg;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

/// Wraps a store so that at most `max_concurrent` round trips are in flight at once,
/// across every loader sharing it.
pub struct LimitedStore {
    inner: Arc<dyn Store>,
    permits: Semaphore,
    acquire_timeout: Option<Duration>,
}

impl LimitedStore {
    pub fn new(inner: Arc<dyn Store>, max_concurrent: usize) -> Self {
        Self {
            inner,
            permits: Semaphore::new(max_concurrent.max(1)),
            acquire_timeout: None,
        }
    }

    /// Fail a round trip with `StoreError::Saturated` if no slot frees up in time.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl Store for LimitedStore {
    async fn execute(&self, batch: &[StoreCommand]) -> Result<Vec<Reply>, StoreError> {
        let acquire = self.permits.acquire();
        let permit = match self.acquire_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, acquire).await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(
                        store = self.inner.name(),
                        timeout_ms = timeout.as_millis() as u64,
                        "No round trip slot available"
                    );
                    return Err(StoreError::Saturated(timeout.as_millis() as u64));
                }
            },
            None => acquire.await,
        }
        .map_err(|_| StoreError::Connection("store closed".to_string()))?;

        let replies = self.inner.execute(batch).await;
        drop(permit);
        replies
    }

    fn command_keys(&self, name: &str, args: &[Arg]) -> Vec<String> {
        self.inner.command_keys(name, args)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
