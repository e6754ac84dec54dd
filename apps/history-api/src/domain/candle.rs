//! Candle Types
//!
//! One parameterized candle type tagged by [`Timeframe`] instead of one
//! structure per granularity. The [`Envelope`] carries the per-symbol
//! metadata that is attached to every record in a response.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Timeframe
// =============================================================================

/// Candle granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    /// One-minute bars.
    #[serde(rename = "1m")]
    OneMinute,
    /// One-hour bars.
    #[serde(rename = "1h")]
    OneHour,
    /// One-day bars.
    #[serde(rename = "1d")]
    OneDay,
}

impl Timeframe {
    /// All supported timeframes, smallest first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::OneMinute, Self::OneHour, Self::OneDay]
    }

    /// Wire and document key for this timeframe.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::OneHour => "1h",
            Self::OneDay => "1d",
        }
    }

    /// Row-store table holding this timeframe.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::OneMinute => "price_data_1m",
            Self::OneHour => "price_data_1h",
            Self::OneDay => "price_data_1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = InvalidTimeframe;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Self::OneMinute),
            "1h" => Ok(Self::OneHour),
            "1d" => Ok(Self::OneDay),
            other => Err(InvalidTimeframe(other.to_string())),
        }
    }
}

/// Returned when a timeframe string is not one of `1m`, `1h`, `1d`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid timeframe: {0}")]
pub struct InvalidTimeframe(pub String);

// =============================================================================
// Candle
// =============================================================================

/// One OHLCV observation.
///
/// The `low <= open/close <= high` relation is expected of upstream data but
/// never checked here.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    /// Bucket start, second precision.
    pub timestamp: DateTime<Utc>,
    /// Opening price.
    pub price_open: f64,
    /// Closing price.
    pub price_close: f64,
    /// Highest price in the bucket.
    pub price_high: f64,
    /// Lowest price in the bucket.
    pub price_low: f64,
    /// Traded volume.
    pub volume: f64,
}

// =============================================================================
// Envelope
// =============================================================================

/// Per-symbol metadata stored alongside a series.
///
/// `metadata` is an opaque tree that is only ever read for enrichment and is
/// otherwise carried verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Internal numeric symbol identifier.
    pub zap_id: Option<i64>,
    /// Identifier assigned by an external data provider.
    pub external_id: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Free-form metadata tree.
    pub metadata: Value,
}

impl Envelope {
    /// Best trading pair on an external venue, if listed.
    #[must_use]
    pub fn best_pair(&self) -> Option<&str> {
        self.metadata
            .pointer("/exchange_listings/best_pair")
            .and_then(Value::as_str)
    }

    /// Rolling volume statistics, `null` where the document has none.
    #[must_use]
    pub fn volume_stats(&self) -> VolumeStats {
        let stat = |key: &str| {
            self.metadata
                .get("volume_stats")
                .and_then(|stats| stats.get(key))
                .cloned()
                .unwrap_or(Value::Null)
        };

        VolumeStats {
            last_24h: stat("last_24h"),
            last_7d: stat("last_7d"),
            last_30d: stat("last_30d"),
        }
    }
}

/// Rolling volume figures passed through from document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeStats {
    /// Volume over the last 24 hours.
    pub last_24h: Value,
    /// Volume over the last 7 days.
    pub last_7d: Value,
    /// Volume over the last 30 days.
    pub last_30d: Value,
}

impl Default for VolumeStats {
    fn default() -> Self {
        Self {
            last_24h: Value::Null,
            last_7d: Value::Null,
            last_30d: Value::Null,
        }
    }
}

// =============================================================================
// Lookup
// =============================================================================

/// How a caller addresses a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesLookup {
    /// Trading symbol, upper-cased.
    Symbol(String),
    /// External provider identifier.
    ExternalId(String),
    /// Internal numeric identifier.
    ZapId(i64),
}

impl SeriesLookup {
    /// Lookup by symbol; symbols are matched upper-case.
    #[must_use]
    pub fn symbol(symbol: &str) -> Self {
        Self::Symbol(symbol.to_uppercase())
    }

    /// Whether a decoded document belongs to this lookup.
    #[must_use]
    pub fn matches(&self, symbol: &str, envelope: &Envelope) -> bool {
        match self {
            Self::Symbol(wanted) => symbol.eq_ignore_ascii_case(wanted),
            Self::ExternalId(wanted) => envelope.external_id.as_deref() == Some(wanted.as_str()),
            Self::ZapId(wanted) => envelope.zap_id == Some(*wanted),
        }
    }
}

impl fmt::Display for SeriesLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbol(symbol) => write!(f, "symbol {symbol}"),
            Self::ExternalId(id) => write!(f, "external_id {id}"),
            Self::ZapId(id) => write!(f, "zap_id {id}"),
        }
    }
}

// =============================================================================
// Series Window
// =============================================================================

/// A symbol known to a backend, with whatever envelope it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct CoinListing {
    /// Trading symbol.
    pub symbol: String,
    /// Envelope of the symbol's series.
    pub envelope: Envelope,
}

/// The slice of a series returned by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesWindow {
    /// Symbol the series belongs to.
    pub symbol: String,
    /// Envelope attached to every record.
    pub envelope: Envelope,
    /// Candles in backend order: document order for blobs, newest first for rows.
    pub candles: Vec<Candle>,
    /// Number of candles the backend saw, when it knows.
    pub total_available: Option<usize>,
}
