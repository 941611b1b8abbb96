//! Error types for the kvdoc document loader.

use crate::operation::{Action, OperationId};
use thiserror::Error;

/// Store boundary errors (transport, protocol, command replies)
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Command {command} failed: {message}")]
    Command { command: String, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Store saturated: no round trip slot within {0} ms")]
    Saturated(u64),

    #[error("Round trip failed: {0}")]
    RoundTrip(String),
}

impl StoreError {
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Command {
            command: command.into(),
            message: message.into(),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::RoundTrip(err.to_string())
        }
    }
}

/// Errors raised by document hooks and command result callbacks
#[derive(Debug, Clone, Error)]
pub enum DocumentError {
    #[error("Missing required property: {0}")]
    MissingProperty(String),

    #[error("Unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: String, reply: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Message(String),
}

impl DocumentError {
    pub fn msg(message: impl std::fmt::Display) -> Self {
        DocumentError::Message(message.to_string())
    }
}

/// Result type returned by document hooks and command callbacks.
pub type HookResult = Result<(), DocumentError>;

/// Errors collected for one document of a `load`/`save`/`delete` call
#[derive(Debug, Clone)]
pub struct DocumentFailure {
    pub document_type: &'static str,
    pub action: Action,
    pub errors: Vec<DocumentError>,
}

impl std::fmt::Display for DocumentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(
            f,
            "{} {} failed: {}",
            self.action,
            self.document_type,
            messages.join("; ")
        )
    }
}

/// Loader errors surfaced to the caller of `load`/`save`/`delete`
#[derive(Debug, Clone, Error)]
pub enum LoaderError {
    #[error("Errors occurred during document operation: {}", summarize(.0))]
    Documents(Vec<DocumentFailure>),

    #[error("Loader shut down before the operation completed")]
    Interrupted,

    #[error("Post-processing already complete for {0}")]
    PostProcessAlreadyComplete(OperationId),
}

impl LoaderError {
    /// Every per-document error, flattened in document order.
    pub fn errors(&self) -> Vec<&DocumentError> {
        match self {
            LoaderError::Documents(failures) => {
                failures.iter().flat_map(|f| f.errors.iter()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn summarize(failures: &[DocumentFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Crate-level setup errors (configuration, logging, store connection)
#[derive(Debug, Error)]
pub enum KvdocError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Output error: {0}")]
    Output(String),
}

impl From<config::ConfigError> for KvdocError {
    fn from(err: config::ConfigError) -> Self {
        KvdocError::Config(err.to_string())
    }
}
