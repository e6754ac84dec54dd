//! SQLite Row Store
//!
//! One table per timeframe (`price_data_1m`, `price_data_1h`,
//! `price_data_1d`), timestamps stored as `YYYY-MM-DD HH:MM:SS.ffffff` text so
//! that lexical order is chronological order.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use turso::{Builder, Connection, Database, Value};

use crate::application::ports::CandleRepository;
use crate::domain::candle::{Candle, CoinListing, Envelope, SeriesLookup, SeriesWindow, Timeframe};
use crate::domain::coerce;
use crate::error::HistoryError;

/// Window size of requests without a `limit`, for every timeframe.
const DEFAULT_LIMIT: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(limit) => limit,
    None => panic!("default limit must be non-zero"),
};

const SELECT_COLUMNS: &str =
    "symbol, timestamp, price_open, price_close, price_high, price_low, volume, zap_id";

impl From<turso::Error> for HistoryError {
    fn from(err: turso::Error) -> Self {
        Self::Transport(format!("database error: {err}"))
    }
}

/// Text form of a row timestamp.
#[must_use]
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Candle repository over a SQLite file.
pub struct SqliteCandleRepository {
    db: Database,
    path: PathBuf,
}

impl SqliteCandleRepository {
    /// Open (or create) the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref().to_path_buf();
        let db = Builder::new_local(&path.to_string_lossy()).build().await?;
        tracing::info!(path = %path.display(), "Opened row store");
        Ok(Self { db, path })
    }

    /// Database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, HistoryError> {
        Ok(self.db.connect()?)
    }

    /// Create the per-timeframe tables and indexes if they are missing.
    pub async fn ensure_schema(&self) -> Result<(), HistoryError> {
        let conn = self.connect()?;
        for timeframe in Timeframe::all() {
            let table = timeframe.table_name();
            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        id INTEGER PRIMARY KEY,
                        symbol TEXT NOT NULL,
                        timestamp TEXT NOT NULL,
                        price_open REAL,
                        price_close REAL,
                        price_high REAL,
                        price_low REAL,
                        volume REAL,
                        zap_id INTEGER
                    )"
                ),
                (),
            )
            .await?;
            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_symbol_timestamp \
                     ON {table} (symbol, timestamp)"
                ),
                (),
            )
            .await?;
        }
        Ok(())
    }

    /// Insert candles for one symbol in a single transaction.
    pub async fn insert_batch(
        &self,
        timeframe: Timeframe,
        symbol: &str,
        zap_id: Option<i64>,
        candles: &[Candle],
    ) -> Result<usize, HistoryError> {
        let conn = self.connect()?;
        let sql = format!(
            "INSERT INTO {} (symbol, timestamp, price_open, price_close, price_high, price_low, volume, zap_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            timeframe.table_name()
        );

        conn.execute("BEGIN", ()).await?;
        for candle in candles {
            let inserted = conn
                .execute(
                    &sql,
                    (
                        Value::Text(symbol.to_string()),
                        Value::Text(format_timestamp(candle.timestamp)),
                        Value::Real(candle.price_open),
                        Value::Real(candle.price_close),
                        Value::Real(candle.price_high),
                        Value::Real(candle.price_low),
                        Value::Real(candle.volume),
                        zap_id.map_or(Value::Null, Value::Integer),
                    ),
                )
                .await;
            if let Err(err) = inserted {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(err.into());
            }
        }
        conn.execute("COMMIT", ()).await?;
        Ok(candles.len())
    }

    async fn select(
        &self,
        timeframe: Timeframe,
        column: &str,
        value: Value,
        limit: Option<NonZeroUsize>,
    ) -> Result<Vec<RowCandle>, HistoryError> {
        let conn = self.connect()?;
        let limit = limit.map_or_else(String::new, |n| format!(" LIMIT {n}"));
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM {} WHERE {column} = ?1 ORDER BY timestamp DESC{limit}",
            timeframe.table_name()
        );

        let mut rows = conn.query(&sql, (value,)).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(RowCandle {
                symbol: text(row.get_value(0)?)?,
                timestamp: timestamp(&row.get_value(1)?)?,
                price_open: real("price_open", &row.get_value(2)?)?,
                price_close: real("price_close", &row.get_value(3)?)?,
                price_high: real("price_high", &row.get_value(4)?)?,
                price_low: real("price_low", &row.get_value(5)?)?,
                volume: real("volume", &row.get_value(6)?)?,
                zap_id: integer(&row.get_value(7)?)?,
            });
        }

        // Newest first, as queried.
        Ok(out)
    }
}

impl std::fmt::Debug for SqliteCandleRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCandleRepository")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CandleRepository for SqliteCandleRepository {
    fn source(&self) -> &'static str {
        "sqlite"
    }

    fn default_limit(&self, _timeframe: Timeframe) -> Option<NonZeroUsize> {
        Some(DEFAULT_LIMIT)
    }

    async fn fetch(
        &self,
        lookup: &SeriesLookup,
        timeframe: Timeframe,
        limit: Option<NonZeroUsize>,
    ) -> Result<SeriesWindow, HistoryError> {
        let rows = match lookup {
            SeriesLookup::Symbol(symbol) => {
                self.select(timeframe, "symbol", Value::Text(symbol.clone()), limit)
                    .await?
            }
            SeriesLookup::ZapId(id) => {
                self.select(timeframe, "zap_id", Value::Integer(*id), limit)
                    .await?
            }
            // Rows carry no external identifier.
            SeriesLookup::ExternalId(_) => Vec::new(),
        };

        let Some(newest) = rows.first() else {
            return Err(HistoryError::NotFound(format!(
                "No {timeframe} data for {lookup}"
            )));
        };

        let symbol = newest.symbol.clone();
        let envelope = Envelope {
            zap_id: rows.iter().find_map(|row| row.zap_id),
            ..Envelope::default()
        };

        Ok(SeriesWindow {
            symbol,
            envelope,
            candles: rows.into_iter().map(Candle::from).collect(),
            total_available: None,
        })
    }

    async fn list_coins(&self) -> Result<Vec<CoinListing>, HistoryError> {
        let conn = self.connect()?;
        let mut coins: BTreeMap<String, Option<i64>> = BTreeMap::new();

        for timeframe in Timeframe::all() {
            let sql = format!(
                "SELECT DISTINCT symbol, zap_id FROM {}",
                timeframe.table_name()
            );
            let mut rows = conn.query(&sql, ()).await?;
            while let Some(row) = rows.next().await? {
                let symbol = text(row.get_value(0)?)?;
                let zap_id = integer(&row.get_value(1)?)?;
                let entry = coins.entry(symbol).or_insert(None);
                if entry.is_none() {
                    *entry = zap_id;
                }
            }
        }

        Ok(coins
            .into_iter()
            .map(|(symbol, zap_id)| CoinListing {
                symbol,
                envelope: Envelope {
                    zap_id,
                    ..Envelope::default()
                },
            })
            .collect())
    }
}

// =============================================================================
// Row Decoding
// =============================================================================

struct RowCandle {
    symbol: String,
    timestamp: DateTime<Utc>,
    price_open: f64,
    price_close: f64,
    price_high: f64,
    price_low: f64,
    volume: f64,
    zap_id: Option<i64>,
}

impl From<RowCandle> for Candle {
    fn from(row: RowCandle) -> Self {
        Self {
            timestamp: row.timestamp,
            price_open: row.price_open,
            price_close: row.price_close,
            price_high: row.price_high,
            price_low: row.price_low,
            volume: row.volume,
        }
    }
}

fn text(value: Value) -> Result<String, HistoryError> {
    match value {
        Value::Text(text) => Ok(text),
        Value::Integer(n) => Ok(n.to_string()),
        Value::Real(n) => Ok(n.to_string()),
        other @ (Value::Null | Value::Blob(_)) => Err(HistoryError::Decode(format!(
            "unreadable row symbol: {other:?}"
        ))),
    }
}

/// Numeric column; NULL and non-numeric cells are decode errors, never zero.
fn real(column: &str, value: &Value) -> Result<f64, HistoryError> {
    let parsed = match value {
        Value::Real(n) => Some(*n),
        Value::Integer(n) => Some(*n as f64),
        Value::Text(text) => text.trim().parse().ok(),
        Value::Null | Value::Blob(_) => None,
    };
    parsed.ok_or_else(|| HistoryError::Decode(format!("unreadable {column}: {value:?}")))
}

/// Nullable integer column.
fn integer(value: &Value) -> Result<Option<i64>, HistoryError> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(n) => Ok(Some(*n)),
        Value::Text(text) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| HistoryError::Decode(format!("unreadable zap_id: {value:?}"))),
        other => Err(HistoryError::Decode(format!("unreadable zap_id: {other:?}"))),
    }
}

fn timestamp(value: &Value) -> Result<DateTime<Utc>, HistoryError> {
    let parsed = match value {
        Value::Text(text) => coerce::parse_timestamp(text),
        Value::Integer(secs) => DateTime::from_timestamp(*secs, 0),
        _ => None,
    };
    parsed.ok_or_else(|| HistoryError::Decode(format!("unreadable row timestamp: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_round_trip_through_text() {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let text = format_timestamp(ts);

        assert_eq!(text, "2023-11-14 22:13:20.000000");
        assert_eq!(timestamp(&Value::Text(text)).unwrap(), ts);
    }

    #[test]
    fn numeric_columns_are_coerced() {
        assert!((real("volume", &Value::Integer(3)).unwrap() - 3.0).abs() < f64::EPSILON);
        assert!((real("volume", &Value::Text("2.5".into())).unwrap() - 2.5).abs() < f64::EPSILON);
        assert_eq!(integer(&Value::Null).unwrap(), None);
        assert_eq!(integer(&Value::Text("42".into())).unwrap(), Some(42));
    }

    #[test]
    fn missing_cells_are_decode_errors() {
        assert_eq!(real("price_open", &Value::Null).unwrap_err().kind(), "decode");
        assert_eq!(
            real("volume", &Value::Text("n/a".into())).unwrap_err().kind(),
            "decode"
        );
        assert_eq!(text(Value::Null).unwrap_err().kind(), "decode");
        assert_eq!(integer(&Value::Text("x".into())).unwrap_err().kind(), "decode");
    }

    #[tokio::test]
    async fn null_price_row_fails_instead_of_reading_zero() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteCandleRepository::open(dir.path().join("null.db"))
            .await
            .unwrap();
        repo.ensure_schema().await.unwrap();
        repo.connect()
            .unwrap()
            .execute(
                "INSERT INTO price_data_1h (symbol, timestamp, price_open, price_close, \
                 price_high, price_low, volume, zap_id) \
                 VALUES ('BTC', '2024-01-01 00:00:00.000000', NULL, 1.0, 1.0, 1.0, 1.0, 1)",
                (),
            )
            .await
            .unwrap();

        let err = repo
            .fetch(&SeriesLookup::symbol("btc"), Timeframe::OneHour, None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "decode");
        assert!(err.to_string().contains("price_open"));
    }

    #[test]
    fn unreadable_timestamp_is_decode_error() {
        let err = timestamp(&Value::Null).unwrap_err();
        assert_eq!(err.kind(), "decode");
    }
}
