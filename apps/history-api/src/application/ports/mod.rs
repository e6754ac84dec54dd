//! Port Interfaces
//!
//! Contracts between the history service and its storage backends.
//!
//! ## Driven Ports (Outbound)
//!
//! - `CandleRepository`: resolves a series lookup to a candle window
//! - `ObjectStore`: byte-stream access to stored JSON documents

use std::io::Read;
use std::num::NonZeroUsize;

use async_trait::async_trait;

use crate::domain::candle::{CoinListing, SeriesLookup, SeriesWindow, Timeframe};
use crate::error::HistoryError;

// =============================================================================
// Candle Repository
// =============================================================================

/// A backend able to answer history queries.
///
/// Exactly one implementation is configured per deployment.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CandleRepository: Send + Sync {
    /// Tag written into the `source` field of every record.
    fn source(&self) -> &'static str;

    /// Window size used when the caller gives none; `None` means unlimited.
    fn default_limit(&self, timeframe: Timeframe) -> Option<NonZeroUsize>;

    /// Fetch the most recent `limit` candles of a series.
    async fn fetch(
        &self,
        lookup: &SeriesLookup,
        timeframe: Timeframe,
        limit: Option<NonZeroUsize>,
    ) -> Result<SeriesWindow, HistoryError>;

    /// List every symbol the backend holds.
    async fn list_coins(&self) -> Result<Vec<CoinListing>, HistoryError>;
}

// =============================================================================
// Object Store
// =============================================================================

/// Blocking byte stream over one stored object.
///
/// Dropping the reader releases the underlying file handle or connection.
pub type ObjectReader = Box<dyn Read + Send>;

/// Object store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No object under the key.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The store could not be reached or answered with an error.
    #[error("object store request failed: {0}")]
    Transport(String),

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Keyed access to JSON documents.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Source tag for records served from this store.
    fn name(&self) -> &'static str;

    /// Keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Open an object for streaming reads.
    async fn open(&self, key: &str) -> Result<ObjectReader, StoreError>;
}
