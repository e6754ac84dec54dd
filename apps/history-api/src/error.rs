//! Service error taxonomy.
//!
//! | Variant | HTTP | Raised when |
//! |---------|------|-------------|
//! | `Validation` | 400 | unknown timeframe, non-positive limit |
//! | `NotFound` | 404 | no document, row or identifier match |
//! | `Decode` | 500 | malformed source document |
//! | `Transport` | 500 | backend unreachable or stream failure |
//! | `Internal` | 500 | anything else |
//!
//! Nothing is retried. The message of the underlying failure is kept so it
//! can be returned to the (trusted) caller.

use thiserror::Error;

use crate::application::ports::StoreError;
use crate::domain::candle::{InvalidTimeframe, SeriesLookup, Timeframe};
use crate::domain::extractor::ExtractError;

/// Errors surfaced by the history service.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Request parameters are invalid.
    #[error("{0}")]
    Validation(String),

    /// No data matches the request.
    #[error("{0}")]
    NotFound(String),

    /// Source data could not be decoded.
    #[error("{0}")]
    Decode(String),

    /// The backend could not be reached or failed mid-read.
    #[error("{0}")]
    Transport(String),

    /// Unexpected failure.
    #[error("{0}")]
    Internal(String),
}

impl HistoryError {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Decode(_) => "decode",
            Self::Transport(_) => "transport",
            Self::Internal(_) => "internal",
        }
    }

    /// Map an extraction failure for `lookup`, naming the series in not-found messages.
    #[must_use]
    pub fn from_extract(err: ExtractError, lookup: &SeriesLookup, timeframe: Timeframe) -> Self {
        match err {
            ExtractError::SeriesNotFound(_) | ExtractError::EmptyDocument => {
                Self::NotFound(format!("No {timeframe} data for {lookup}"))
            }
            ExtractError::Decode(_) => Self::Decode(err.to_string()),
            ExtractError::Transport(_) => Self::Transport(err.to_string()),
            ExtractError::SinkClosed => Self::Internal(err.to_string()),
        }
    }
}

impl From<InvalidTimeframe> for HistoryError {
    fn from(err: InvalidTimeframe) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<StoreError> for HistoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound(err.to_string()),
            StoreError::Transport(_) | StoreError::Io(_) => Self::Transport(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for HistoryError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("extraction task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_series() {
        let err = HistoryError::from_extract(
            ExtractError::SeriesNotFound(Timeframe::OneHour),
            &SeriesLookup::symbol("btc"),
            Timeframe::OneHour,
        );
        assert_eq!(err.kind(), "not_found");
        assert_eq!(err.to_string(), "No 1h data for symbol BTC");
    }

    #[test]
    fn invalid_timeframe_is_validation() {
        let err = HistoryError::from(InvalidTimeframe("2w".to_string()));
        assert_eq!(err.kind(), "validation");
        assert_eq!(err.to_string(), "Invalid timeframe: 2w");
    }

    #[test]
    fn store_errors_map_by_kind() {
        let missing = HistoryError::from(StoreError::NotFound("1m/btc.json".to_string()));
        assert_eq!(missing.kind(), "not_found");

        let down = HistoryError::from(StoreError::Transport("connection refused".to_string()));
        assert_eq!(down.kind(), "transport");
        assert!(down.to_string().contains("connection refused"));
    }
}
