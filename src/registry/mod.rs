pub mod duckdb;

use async_trait::async_trait;
use thiserror::Error;

pub use self::duckdb::DuckDbRegistry;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("could not open registry: {0}")]
    Open(String),

    #[error("no stored offset for {0}")]
    NotFound(String),

    #[error("could not read registry: {0}")]
    Get(String),

    #[error("could not update registry: {0}")]
    Update(String),
}

/// Durable mapping from source identifier to the last fully-acknowledged
/// byte offset, surviving process restarts.
///
/// Safe to call concurrently from multiple tailers, each touching a
/// disjoint key; the backing store serializes writers internally.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// Returns the stored offset for the source, or
    /// [`RegistryError::NotFound`] if no entry exists or it cannot be
    /// parsed as a non-negative integer. Callers treat that as "start
    /// from zero".
    async fn get_offset(&self, source: &str) -> Result<u64, RegistryError>;

    /// Creates or replaces the entry for the source as a single atomic
    /// unit of work.
    async fn update_offset(&self, source: &str, offset: u64) -> Result<(), RegistryError>;
}
