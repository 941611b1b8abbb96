//! Store boundary
//!
//! The engine talks to the key-value store only through [`Store`]: one `execute`
//! call is one network round trip carrying a whole batch of commands.

pub mod limit;
pub mod memory;
pub mod redis;

pub use limit::LimitedStore;
pub use memory::MemoryStore;
pub use self::redis::RedisStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;
use crate::value::{Arg, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Reply to a single command within a batch.
pub type Reply = Result<Value, StoreError>;

/// One command as sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreCommand {
    pub name: String,
    pub args: Vec<Arg>,
}

impl StoreCommand {
    pub fn new(name: &str, args: Vec<Arg>) -> Self {
        Self {
            name: name.to_string(),
            args,
        }
    }
}

impl std::fmt::Display for StoreCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Store client interface
///
/// `execute` returns one reply per command, in submission order. An `Err` from
/// `execute` itself means the round trip failed as a whole.
#[async_trait]
pub trait Store: Send + Sync {
    async fn execute(&self, batch: &[StoreCommand]) -> Result<Vec<Reply>, StoreError>;

    /// Keys touched by a command, for diagnostics.
    fn command_keys(&self, name: &str, args: &[Arg]) -> Vec<String> {
        crate::pipeline::command_keys(name, args)
    }

    fn name(&self) -> &str;
}

/// Build the store described by `config`, wrapped in a [`LimitedStore`] when a
/// concurrency limit is set.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
    let store: Arc<dyn Store> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Redis => Arc::new(RedisStore::connect(&config.url).await?),
    };
    info!(store = store.name(), "Store ready");

    let Some(max) = config.max_concurrent_round_trips else {
        return Ok(store);
    };
    let mut limited = LimitedStore::new(store, max);
    if let Some(ms) = config.acquire_timeout_ms {
        limited = limited.with_acquire_timeout(Duration::from_millis(ms));
    }
    Ok(Arc::new(limited))
}
