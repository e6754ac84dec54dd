//! Row store and importer against a temporary SQLite file.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use chrono::DateTime;
use history_api::infrastructure::import::Importer;
use history_api::{
    Candle, CandleRepository, HistoryService, LocalObjectStore, SeriesLookup,
    SqliteCandleRepository, Timeframe,
};
use serde_json::json;

fn candle(i: i64) -> Candle {
    Candle {
        timestamp: DateTime::from_timestamp(1_700_000_000 + i * 3600, 0).unwrap(),
        price_open: i as f64,
        price_close: i as f64 + 0.5,
        price_high: i as f64 + 1.0,
        price_low: i as f64 - 1.0,
        volume: 100.0,
    }
}

async fn seeded(dir: &Path) -> SqliteCandleRepository {
    let repo = SqliteCandleRepository::open(dir.join("candles.db"))
        .await
        .unwrap();
    repo.ensure_schema().await.unwrap();

    let btc: Vec<Candle> = (0..150).map(candle).collect();
    repo.insert_batch(Timeframe::OneHour, "BTC", Some(1), &btc)
        .await
        .unwrap();
    let eth: Vec<Candle> = (0..5).map(candle).collect();
    repo.insert_batch(Timeframe::OneDay, "ETH", Some(2), &eth)
        .await
        .unwrap();
    repo
}

#[tokio::test]
async fn returns_latest_rows_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let repo = seeded(dir.path()).await;

    let window = repo
        .fetch(
            &SeriesLookup::symbol("btc"),
            Timeframe::OneHour,
            NonZeroUsize::new(50),
        )
        .await
        .unwrap();

    assert_eq!(window.symbol, "BTC");
    assert_eq!(window.candles.len(), 50);
    assert_eq!(window.candles[0], candle(149));
    assert_eq!(window.candles[49], candle(100));
    assert_eq!(window.envelope.zap_id, Some(1));
    assert_eq!(window.total_available, None);
}

#[tokio::test]
async fn unlimited_fetch_by_zap_id() {
    let dir = tempfile::tempdir().unwrap();
    let repo = seeded(dir.path()).await;

    let window = repo
        .fetch(&SeriesLookup::ZapId(2), Timeframe::OneDay, None)
        .await
        .unwrap();

    assert_eq!(window.symbol, "ETH");
    assert_eq!(window.candles.len(), 5);
}

#[tokio::test]
async fn missing_series_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let repo = seeded(dir.path()).await;

    let err = repo
        .fetch(&SeriesLookup::symbol("btc"), Timeframe::OneMinute, None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No 1m data for symbol BTC");

    let err = repo
        .fetch(
            &SeriesLookup::ExternalId("bitcoin".to_string()),
            Timeframe::OneHour,
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn service_applies_default_limit() {
    let dir = tempfile::tempdir().unwrap();
    let service = HistoryService::new(Arc::new(seeded(dir.path()).await));

    let response = service.history("BTC", "1h", None).await.unwrap();

    assert_eq!(response.data.len(), 100);
    assert_eq!(response.metadata.limit_applied, Some(100));
    assert_eq!(response.data[0].source, "sqlite");
    assert_eq!(response.data[0].timestamp, candle(149).timestamp.timestamp());
    assert_eq!(response.data[99].timestamp, candle(50).timestamp.timestamp());
}

#[tokio::test]
async fn coins_span_every_table() {
    let dir = tempfile::tempdir().unwrap();
    let repo = seeded(dir.path()).await;

    let coins = repo.list_coins().await.unwrap();
    let listed: Vec<_> = coins
        .iter()
        .map(|c| (c.symbol.as_str(), c.envelope.zap_id))
        .collect();

    assert_eq!(listed, vec![("BTC", Some(1)), ("ETH", Some(2))]);
}

#[tokio::test(flavor = "multi_thread")]
async fn imports_per_timeframe_documents() {
    let source = tempfile::tempdir().unwrap();
    let records: Vec<_> = (0..2_500)
        .map(|i| {
            json!({
                "timestamp": format!("2024-01-01 00:00:{:02}", i % 60),
                "price_open": i,
                "price_close": i,
                "price_high": i,
                "price_low": i,
                "volume": "1.0"
            })
        })
        .chain(std::iter::once(json!({ "timestamp": "garbage" })))
        .collect();
    std::fs::create_dir_all(source.path().join("1m")).unwrap();
    std::fs::create_dir_all(source.path().join("5m")).unwrap();
    // zap_id follows the array, and the file name differs from the series key.
    std::fs::write(
        source.path().join("1m/xbt.json"),
        serde_json::to_vec(&json!({ "btc": { "1m": records, "zap_id": 7 } })).unwrap(),
    )
    .unwrap();
    std::fs::write(source.path().join("5m/btc.json"), b"{}").unwrap();

    let target = tempfile::tempdir().unwrap();
    let repo = Arc::new(
        SqliteCandleRepository::open(target.path().join("import.db"))
            .await
            .unwrap(),
    );

    let summary = Importer::new(
        Arc::new(LocalObjectStore::new(source.path())),
        Arc::clone(&repo),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(summary.objects, 1);
    assert_eq!(summary.rows, 2_500);
    assert_eq!(summary.skipped_records, 1);
    assert_eq!(summary.skipped_keys, 1);

    let window = repo
        .fetch(&SeriesLookup::ZapId(7), Timeframe::OneMinute, None)
        .await
        .unwrap();
    assert_eq!(window.symbol, "BTC");
    assert_eq!(window.candles.len(), 2_500);

    let by_symbol = repo
        .fetch(&SeriesLookup::symbol("btc"), Timeframe::OneMinute, NonZeroUsize::new(1))
        .await
        .unwrap();
    assert_eq!(by_symbol.envelope.zap_id, Some(7));

    let err = repo
        .fetch(&SeriesLookup::symbol("xbt"), Timeframe::OneMinute, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}
