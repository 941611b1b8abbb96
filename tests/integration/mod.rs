//! Integration tests for the loader, models and store wrappers.

pub mod support;

mod atomic_batches;
mod attribution;
mod batching;
mod models;
mod tree_completion;
