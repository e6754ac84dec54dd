//! History Service
//!
//! Backend-agnostic request handling: parse the timeframe and limit, fetch a
//! window from the repository, format records.

use std::num::{IntErrorKind, NonZeroUsize};
use std::sync::Arc;

use crate::application::dto::{CandleRecord, CoinSummary, HistoryMetadata, HistoryResponse};
use crate::application::ports::CandleRepository;
use crate::domain::candle::{SeriesLookup, SeriesWindow, Timeframe};
use crate::error::HistoryError;

/// Window size requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedLimit {
    /// No usable `limit` parameter; the backend default applies.
    Default,
    /// A positive `limit` parameter.
    Explicit(NonZeroUsize),
}

/// Parse the raw `limit` query value.
///
/// Absent or non-integer values fall back to the default. Integers `<= 0`
/// are rejected, however large their magnitude. Positive integers beyond
/// `usize` saturate to `usize::MAX`.
pub fn parse_limit(raw: Option<&str>) -> Result<RequestedLimit, HistoryError> {
    let Some(raw) = raw.map(str::trim) else {
        return Ok(RequestedLimit::Default);
    };

    let non_positive = || {
        HistoryError::Validation(format!("limit must be a positive integer, got {raw}"))
    };

    let value = match raw.parse::<i64>() {
        Ok(value) => value,
        Err(err) => {
            return match err.kind() {
                IntErrorKind::PosOverflow => Ok(RequestedLimit::Explicit(NonZeroUsize::MAX)),
                IntErrorKind::NegOverflow => Err(non_positive()),
                _ => Ok(RequestedLimit::Default),
            };
        }
    };

    if value <= 0 {
        return Err(non_positive());
    }

    // Values beyond the address space are as good as unlimited.
    let size = usize::try_from(value).unwrap_or(usize::MAX);
    Ok(NonZeroUsize::new(size).map_or(RequestedLimit::Default, RequestedLimit::Explicit))
}

/// Serves history queries against one backend.
#[derive(Clone)]
pub struct HistoryService {
    repository: Arc<dyn CandleRepository>,
}

impl HistoryService {
    /// Wrap a configured backend.
    #[must_use]
    pub fn new(repository: Arc<dyn CandleRepository>) -> Self {
        Self { repository }
    }

    /// Source tag of the configured backend.
    #[must_use]
    pub fn source(&self) -> &'static str {
        self.repository.source()
    }

    /// History for a symbol, with response metadata.
    pub async fn history(
        &self,
        symbol: &str,
        timeframe: &str,
        raw_limit: Option<&str>,
    ) -> Result<HistoryResponse, HistoryError> {
        let timeframe: Timeframe = timeframe.parse()?;
        let limit = match parse_limit(raw_limit)? {
            RequestedLimit::Explicit(limit) => Some(limit),
            RequestedLimit::Default => self.repository.default_limit(timeframe),
        };
        let lookup = SeriesLookup::symbol(symbol);

        let window = self.repository.fetch(&lookup, timeframe, limit).await?;
        let data = self.format(&window);

        tracing::debug!(
            symbol = %window.symbol,
            timeframe = %timeframe,
            returned = data.len(),
            total_available = ?window.total_available,
            "History served"
        );

        Ok(HistoryResponse {
            metadata: HistoryMetadata {
                symbol: symbol.to_uppercase(),
                timeframe,
                total_available: window.total_available,
                returned_count: data.len(),
                limit_applied: limit.map(NonZeroUsize::get),
            },
            data,
        })
    }

    /// History for an identifier lookup, as bare records.
    ///
    /// Without a `limit` the whole series is returned.
    pub async fn history_by_id(
        &self,
        lookup: SeriesLookup,
        timeframe: &str,
        raw_limit: Option<&str>,
    ) -> Result<Vec<CandleRecord>, HistoryError> {
        let timeframe: Timeframe = timeframe.parse()?;
        let limit = match parse_limit(raw_limit)? {
            RequestedLimit::Explicit(limit) => Some(limit),
            RequestedLimit::Default => None,
        };

        let window = self.repository.fetch(&lookup, timeframe, limit).await?;
        Ok(self.format(&window))
    }

    /// Every symbol the backend holds.
    pub async fn coins(&self) -> Result<Vec<CoinSummary>, HistoryError> {
        let source = self.repository.source();
        let listings = self.repository.list_coins().await?;
        Ok(listings
            .iter()
            .map(|listing| CoinSummary::new(listing, source))
            .collect())
    }

    fn format(&self, window: &SeriesWindow) -> Vec<CandleRecord> {
        let source = self.repository.source();
        let records: Vec<CandleRecord> = window
            .candles
            .iter()
            .map(|candle| CandleRecord::new(candle, &window.envelope, source))
            .collect();
        metrics::counter!("history_records_returned_total", "source" => source)
            .increment(records.len() as u64);
        records
    }
}

impl std::fmt::Debug for HistoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryService")
            .field("source", &self.repository.source())
            .finish()
    }
}
