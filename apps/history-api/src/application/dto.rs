//! Wire records.
//!
//! Field names and shapes are part of the public API; consumers read them
//! positionally by name, so they do not follow Rust naming for the domain.

use serde::{Deserialize, Serialize};

use crate::domain::candle::{Candle, CoinListing, Envelope, Timeframe, VolumeStats};

/// One candle as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleRecord {
    /// Internal symbol identifier.
    pub zap_id: Option<i64>,
    /// Unix seconds.
    pub timestamp: i64,
    /// Opening price.
    pub price_open: f64,
    /// Closing price.
    pub price_close: f64,
    /// Highest price.
    pub price_high: f64,
    /// Lowest price.
    pub price_low: f64,
    /// Traded volume.
    pub volume: f64,
    /// Always null; kept for client compatibility.
    pub market_cap: Option<f64>,
    /// Backend that answered.
    pub source: String,
    /// Best trading pair on an external venue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl CandleRecord {
    /// Format one candle with its series envelope.
    #[must_use]
    pub fn new(candle: &Candle, envelope: &Envelope, source: &str) -> Self {
        Self {
            zap_id: envelope.zap_id,
            timestamp: candle.timestamp.timestamp(),
            price_open: candle.price_open,
            price_close: candle.price_close,
            price_high: candle.price_high,
            price_low: candle.price_low,
            volume: candle.volume,
            market_cap: None,
            source: source.to_string(),
            source_id: envelope.best_pair().map(str::to_string),
        }
    }
}

/// Metadata block of a history response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMetadata {
    /// Upper-cased symbol.
    pub symbol: String,
    /// Requested timeframe.
    pub timeframe: Timeframe,
    /// Candles the backend saw, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_available: Option<usize>,
    /// Number of records in `data`.
    pub returned_count: usize,
    /// Window size used; null when unlimited.
    pub limit_applied: Option<usize>,
}

/// Response of `GET /api/v1/history/{symbol}/{timeframe}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Candle records in backend order: document order for blobs, newest first for rows.
    pub data: Vec<CandleRecord>,
    /// Request summary.
    pub metadata: HistoryMetadata,
}

/// One entry of `GET /api/v1/coins`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinSummary {
    /// Trading symbol.
    pub symbol: String,
    /// Display name, falling back to the symbol.
    pub name: String,
    /// Internal symbol identifier.
    pub zap_id: Option<i64>,
    /// External provider identifier.
    pub external_id: Option<String>,
    /// Backend that answered.
    pub source: String,
    /// Best trading pair on an external venue.
    pub source_id: Option<String>,
    /// Rolling volume statistics.
    pub volume: VolumeStats,
}

impl CoinSummary {
    /// Format a backend listing.
    #[must_use]
    pub fn new(listing: &CoinListing, source: &str) -> Self {
        let envelope = &listing.envelope;
        Self {
            symbol: listing.symbol.clone(),
            name: envelope
                .name
                .clone()
                .unwrap_or_else(|| listing.symbol.clone()),
            zap_id: envelope.zap_id,
            external_id: envelope.external_id.clone(),
            source: source.to_string(),
            source_id: envelope.best_pair().map(str::to_string),
            volume: envelope.volume_stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use serde_json::json;

    fn candle() -> Candle {
        Candle {
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            price_open: 1.0,
            price_close: 2.0,
            price_high: 3.0,
            price_low: 0.5,
            volume: 100.0,
        }
    }

    #[test]
    fn record_wire_shape() {
        let envelope = Envelope {
            zap_id: Some(7),
            metadata: json!({ "exchange_listings": { "best_pair": "BTC/USDT" } }),
            ..Envelope::default()
        };
        let record = CandleRecord::new(&candle(), &envelope, "r2");

        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "zap_id": 7,
                "timestamp": 1_700_000_000,
                "price_open": 1.0,
                "price_close": 2.0,
                "price_high": 3.0,
                "price_low": 0.5,
                "volume": 100.0,
                "market_cap": null,
                "source": "r2",
                "source_id": "BTC/USDT"
            })
        );
    }

    #[test]
    fn record_omits_missing_source_id() {
        let record = CandleRecord::new(&candle(), &Envelope::default(), "sqlite");
        let value = serde_json::to_value(&record).unwrap();

        assert!(value.get("source_id").is_none());
        assert_eq!(value["zap_id"], json!(null));
    }

    #[test]
    fn metadata_omits_unknown_total() {
        let metadata = HistoryMetadata {
            symbol: "BTC".to_string(),
            timeframe: Timeframe::OneDay,
            total_available: None,
            returned_count: 3,
            limit_applied: None,
        };

        assert_eq!(
            serde_json::to_value(&metadata).unwrap(),
            json!({ "symbol": "BTC", "timeframe": "1d", "returned_count": 3, "limit_applied": null })
        );
    }

    #[test]
    fn coin_summary_falls_back_to_symbol_name() {
        let listing = CoinListing {
            symbol: "ETH".to_string(),
            envelope: Envelope {
                zap_id: Some(2),
                metadata: json!({ "volume_stats": { "last_7d": 12 } }),
                ..Envelope::default()
            },
        };
        let summary = CoinSummary::new(&listing, "local");

        assert_eq!(summary.name, "ETH");
        assert_eq!(summary.volume.last_7d, json!(12));
        assert_eq!(summary.source, "local");
    }
}
