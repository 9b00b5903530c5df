pub mod http;

use crate::record::{Ack, Record};
use async_trait::async_trait;
use thiserror::Error;

pub use self::http::HttpDispatcher;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("could not set up dispatcher: {0}")]
    Setup(String),

    #[error("dispatcher not set up")]
    NotReady,

    #[error("no records given")]
    EmptyBatch,

    #[error("could not encode record: {0}")]
    Encode(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Capability for delivering batches to the remote indexing endpoint.
///
/// `send` must be safe to retry on failure (at-least-once): the router
/// resends the identical batch after a delivery error. Partial-item
/// failures inside a batch are summarized as `has_error` on the whole
/// batch's ack.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Initialize the dispatcher, e.g. establish the remote connection.
    async fn setup(&mut self) -> Result<(), DispatchError>;

    /// Deliver one non-empty batch and return its acknowledgement, keyed
    /// by the last record.
    async fn send(&self, batch: &[Record]) -> Result<Ack, DispatchError>;
}
