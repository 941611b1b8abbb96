//! kvdoc: batched document loading over a key-value store
//!
//! Documents describe how they load, save and delete themselves by enqueueing store
//! commands and child operations on a [`Loader`]. The loader walks the resulting
//! operation tree, batches every command issued during a traversal step into one
//! pipeline round trip, runs result callbacks, then post-processes each operation
//! once its commands are back and reports completion bottom-up.

pub mod cli;
pub mod command;
pub mod command_queue;
pub mod config;
pub mod document;
pub mod error;
pub mod latch;
pub mod loader;
pub mod logging;
pub mod model;
pub mod operation;
pub mod pipeline;
pub mod runner;
pub mod store;
pub mod traversal;
pub mod value;

pub use command::Command;
pub use config::{ConfigLoader, KvdocConfig};
pub use document::{Document, Documents};
pub use error::{DocumentError, HookResult, KvdocError, LoaderError, StoreError};
pub use loader::{Loader, LoaderStats};
pub use model::{HookTable, Model, StringField};
pub use operation::{Action, HookContext, OperationId, OperationSpec, TraverseOptions};
pub use store::{LimitedStore, MemoryStore, RedisStore, Store};
pub use value::{Arg, Value};
