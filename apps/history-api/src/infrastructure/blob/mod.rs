//! Blob-Store Candle Repository
//!
//! Serves history from JSON documents held in an [`ObjectStore`]. Every
//! timeframe goes through the streaming extractor on the blocking pool, so a
//! request never holds more than `limit` candles of a document in memory.
//!
//! Identifier lookups (`zap_id`, `external_id`) have no index: candidate
//! documents are probed one at a time until an envelope matches.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::application::ports::{CandleRepository, ObjectStore, StoreError};
use crate::domain::candle::{CoinListing, SeriesLookup, SeriesWindow, Timeframe};
use crate::domain::extractor::{self, ExtractError, SeriesHeader, WindowExtractor};
use crate::error::HistoryError;
use crate::infrastructure::metrics;

/// Window size of `1m` requests without a `limit`.
const MINUTE_DEFAULT_LIMIT: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(limit) => limit,
    None => panic!("default limit must be non-zero"),
};

// =============================================================================
// Document Layout
// =============================================================================

/// How documents are keyed in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentLayout {
    /// `<symbol>.json`, one document with every timeframe.
    PerSymbol,
    /// `<timeframe>/<symbol>.json`, one document per timeframe.
    PerTimeframe,
}

impl DocumentLayout {
    /// Parse a layout name (`per-symbol`, `per-timeframe`).
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "per-symbol" => Some(Self::PerSymbol),
            "per-timeframe" => Some(Self::PerTimeframe),
            _ => None,
        }
    }

    /// Document key holding `symbol`'s `timeframe` series.
    #[must_use]
    pub fn key(self, symbol: &str, timeframe: Timeframe) -> String {
        let symbol = symbol.to_lowercase();
        match self {
            Self::PerSymbol => format!("{symbol}.json"),
            Self::PerTimeframe => format!("{timeframe}/{symbol}.json"),
        }
    }

    /// Listing prefix of the documents that may hold `timeframe`.
    #[must_use]
    pub fn scan_prefix(self, timeframe: Timeframe) -> String {
        match self {
            Self::PerSymbol => String::new(),
            Self::PerTimeframe => format!("{timeframe}/"),
        }
    }

    /// Whether `key` is a series document under this layout.
    #[must_use]
    pub fn is_document(self, key: &str) -> bool {
        match (self, split_key(key)) {
            (Self::PerSymbol, Some((None, _))) => true,
            (Self::PerTimeframe, Some((Some(dir), _))) => dir.parse::<Timeframe>().is_ok(),
            _ => false,
        }
    }
}

/// Split a key into its directory (if any) and file stem.
///
/// Returns `None` for keys that are not `.json` documents.
#[must_use]
pub fn split_key(key: &str) -> Option<(Option<&str>, &str)> {
    let stem = key.strip_suffix(".json")?;
    let (dir, stem) = match stem.rsplit_once('/') {
        Some((dir, stem)) => (Some(dir), stem),
        None => (None, stem),
    };
    (!stem.is_empty()).then_some((dir, stem))
}

// =============================================================================
// Repository
// =============================================================================

/// Candle repository over a blob store.
#[derive(Clone)]
pub struct BlobCandleRepository {
    store: Arc<dyn ObjectStore>,
    layout: DocumentLayout,
}

impl BlobCandleRepository {
    /// Repository over `store` with the given key layout.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, layout: DocumentLayout) -> Self {
        Self { store, layout }
    }

    /// Key layout in use.
    #[must_use]
    pub const fn layout(&self) -> DocumentLayout {
        self.layout
    }

    async fn probe(&self, key: &str) -> Result<SeriesHeader, ProbeError> {
        let reader = self.store.open(key).await.map_err(ProbeError::Store)?;
        tokio::task::spawn_blocking(move || extractor::probe(reader))
            .await
            .map_err(|e| ProbeError::Store(StoreError::Transport(e.to_string())))?
            .map_err(ProbeError::Extract)
    }

    /// Find the document whose envelope matches `lookup`.
    async fn scan(&self, lookup: &SeriesLookup, timeframe: Timeframe) -> Result<String, HistoryError> {
        let keys = self.store.list(&self.layout.scan_prefix(timeframe)).await?;
        let mut scanned = 0_u64;

        let found = 'scan: {
            for key in keys.iter().filter(|key| self.layout.is_document(key)) {
                scanned += 1;
                match self.probe(key).await {
                    Ok(header) if lookup.matches(&header.symbol, &header.envelope) => {
                        break 'scan Some(key.clone());
                    }
                    Ok(_) => {}
                    Err(ProbeError::Extract(err @ ExtractError::Transport(_))) => {
                        return Err(HistoryError::from_extract(err, lookup, timeframe));
                    }
                    Err(ProbeError::Extract(err)) => {
                        tracing::warn!(key = %key, error = %err, "Skipping undecodable document");
                    }
                    Err(ProbeError::Store(StoreError::NotFound(_))) => {}
                    Err(ProbeError::Store(err)) => return Err(err.into()),
                }
            }
            None
        };

        metrics::record_documents_scanned(self.store.name(), scanned);
        tracing::debug!(%lookup, scanned, found = found.is_some(), "Identifier scan finished");

        found.ok_or_else(|| HistoryError::NotFound(format!("No {timeframe} data for {lookup}")))
    }

    async fn extract(
        &self,
        key: &str,
        lookup: &SeriesLookup,
        timeframe: Timeframe,
        limit: Option<NonZeroUsize>,
    ) -> Result<SeriesWindow, HistoryError> {
        let reader = self.store.open(key).await.map_err(|err| match err {
            StoreError::NotFound(_) => {
                HistoryError::NotFound(format!("No {timeframe} data for {lookup}"))
            }
            other => other.into(),
        })?;

        let extractor = WindowExtractor::new(timeframe, limit);
        let started = Instant::now();
        let extraction = tokio::task::spawn_blocking(move || extractor.extract(reader))
            .await?
            .map_err(|err| HistoryError::from_extract(err, lookup, timeframe))?;
        metrics::record_extraction(timeframe, started.elapsed());

        tracing::debug!(
            key,
            timeframe = %timeframe,
            total_available = extraction.total_available,
            returned = extraction.candles.len(),
            peak_buffered = extraction.peak_buffered,
            "Document extracted"
        );

        Ok(SeriesWindow {
            symbol: extraction.symbol,
            envelope: extraction.envelope,
            candles: extraction.candles,
            total_available: Some(extraction.total_available),
        })
    }

    /// One listing key per symbol: the `1d` document when present, otherwise
    /// the first key found for that symbol.
    fn listing_keys(&self, keys: &[String]) -> Vec<String> {
        let mut by_symbol: BTreeMap<&str, &String> = BTreeMap::new();
        for key in keys.iter().filter(|key| self.layout.is_document(key)) {
            let Some((dir, stem)) = split_key(key) else {
                continue;
            };
            let preferred = dir == Some(Timeframe::OneDay.as_str());
            by_symbol
                .entry(stem)
                .and_modify(|current| {
                    if preferred {
                        *current = key;
                    }
                })
                .or_insert(key);
        }
        by_symbol.into_values().cloned().collect()
    }
}

impl std::fmt::Debug for BlobCandleRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobCandleRepository")
            .field("store", &self.store.name())
            .field("layout", &self.layout)
            .finish()
    }
}

#[async_trait]
impl CandleRepository for BlobCandleRepository {
    fn source(&self) -> &'static str {
        self.store.name()
    }

    fn default_limit(&self, timeframe: Timeframe) -> Option<NonZeroUsize> {
        match timeframe {
            Timeframe::OneMinute => Some(MINUTE_DEFAULT_LIMIT),
            Timeframe::OneHour | Timeframe::OneDay => None,
        }
    }

    async fn fetch(
        &self,
        lookup: &SeriesLookup,
        timeframe: Timeframe,
        limit: Option<NonZeroUsize>,
    ) -> Result<SeriesWindow, HistoryError> {
        let key = match lookup {
            SeriesLookup::Symbol(symbol) => self.layout.key(symbol, timeframe),
            SeriesLookup::ExternalId(_) | SeriesLookup::ZapId(_) => {
                self.scan(lookup, timeframe).await?
            }
        };
        self.extract(&key, lookup, timeframe, limit).await
    }

    async fn list_coins(&self) -> Result<Vec<CoinListing>, HistoryError> {
        let keys = self.store.list("").await?;
        let mut coins = Vec::new();

        for key in self.listing_keys(&keys) {
            match self.probe(&key).await {
                Ok(header) => coins.push(CoinListing {
                    symbol: header.symbol,
                    envelope: header.envelope,
                }),
                Err(ProbeError::Store(StoreError::NotFound(_))) => {}
                Err(ProbeError::Store(err)) => return Err(err.into()),
                Err(ProbeError::Extract(err)) => {
                    tracing::warn!(key = %key, error = %err, "Skipping undecodable document");
                }
            }
        }

        Ok(coins)
    }
}

enum ProbeError {
    Store(StoreError),
    Extract(ExtractError),
}
