//! Streaming extractor properties over generated documents.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_possible_wrap)]

use std::io::{self, Cursor, Read};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use history_api::{ExtractError, Timeframe, WindowExtractor, probe};
use proptest::prelude::*;
use serde_json::json;

// =============================================================================
// Fixtures
// =============================================================================

fn record(i: u64) -> serde_json::Value {
    json!({
        "timestamp": 1_600_000_000 + i * 60,
        "price_open": i as f64,
        "price_close": i as f64 + 0.5,
        "price_high": i as f64 + 1.0,
        "price_low": i as f64 - 1.0,
        "volume": 10.0
    })
}

fn document(count: u64) -> Vec<u8> {
    let records: Vec<_> = (0..count).map(record).collect();
    serde_json::to_vec(&json!({
        "BTC": {
            "zap_id": 1,
            "name": "Bitcoin",
            "1h": [record(0)],
            "1m": records,
            "1d": []
        }
    }))
    .unwrap()
}

fn limit(n: usize) -> Option<NonZeroUsize> {
    NonZeroUsize::new(n)
}

/// A reader that bumps a counter when dropped.
struct Tracked<R> {
    inner: R,
    drops: Arc<AtomicUsize>,
}

impl<R> Tracked<R> {
    fn new(inner: R, drops: &Arc<AtomicUsize>) -> Self {
        Self {
            inner,
            drops: Arc::clone(drops),
        }
    }
}

impl<R: Read> Read for Tracked<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R> Drop for Tracked<R> {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Generates `{"BTC":{"zap_id":1,"1m":[...]}}` on the fly, never holding more
/// than one record of text.
struct GeneratedDocument {
    total: u64,
    next: u64,
    pending: Vec<u8>,
    offset: usize,
    finished: bool,
}

impl GeneratedDocument {
    fn new(total: u64) -> Self {
        Self {
            total,
            next: 0,
            pending: br#"{"BTC":{"zap_id":1,"1m":["#.to_vec(),
            offset: 0,
            finished: false,
        }
    }

    fn refill(&mut self) {
        self.offset = 0;
        self.pending.clear();
        if self.next < self.total {
            if self.next > 0 {
                self.pending.push(b',');
            }
            serde_json::to_writer(&mut self.pending, &record(self.next)).unwrap();
            self.next += 1;
        } else if !self.finished {
            self.pending.extend_from_slice(b"]}}");
            self.finished = true;
        }
    }
}

impl Read for GeneratedDocument {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset == self.pending.len() {
            self.refill();
        }
        let available = &self.pending[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        Ok(n)
    }
}

/// Yields its bytes, then fails.
struct FailingReader {
    inner: Cursor<Vec<u8>>,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf)? {
            0 => Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset")),
            n => Ok(n),
        }
    }
}

// =============================================================================
// Window correctness
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn returns_last_k_in_order(total in 0_u64..400, k in 1_usize..300) {
        let extraction = WindowExtractor::new(Timeframe::OneMinute, limit(k))
            .extract(Cursor::new(document(total)))
            .unwrap();

        let expected: Vec<i64> = (total.saturating_sub(k as u64)..total)
            .map(|i| 1_600_000_000 + (i as i64) * 60)
            .collect();
        let actual: Vec<i64> = extraction.candles.iter().map(|c| c.timestamp.timestamp()).collect();

        prop_assert_eq!(actual, expected);
        prop_assert_eq!(extraction.total_available, total as usize);
        prop_assert!(extraction.peak_buffered <= k);
    }

    #[test]
    fn unlimited_returns_everything(total in 0_u64..300) {
        let extraction = WindowExtractor::new(Timeframe::OneMinute, None)
            .extract(Cursor::new(document(total)))
            .unwrap();

        prop_assert_eq!(extraction.candles.len(), total as usize);
        prop_assert_eq!(extraction.total_available, total as usize);
    }
}

#[test]
fn last_fifty_of_one_fifty() {
    let extraction = WindowExtractor::new(Timeframe::OneMinute, limit(50))
        .extract(Cursor::new(document(150)))
        .unwrap();

    assert_eq!(extraction.candles.len(), 50);
    assert_eq!(extraction.candles[0].price_open, 100.0);
    assert_eq!(extraction.candles[49].price_open, 149.0);
    assert_eq!(extraction.envelope.zap_id, Some(1));
    assert_eq!(extraction.envelope.name.as_deref(), Some("Bitcoin"));
}

// =============================================================================
// Bounded memory
// =============================================================================

#[test]
fn million_records_buffer_at_most_limit() {
    let extraction = WindowExtractor::new(Timeframe::OneMinute, limit(100))
        .extract(GeneratedDocument::new(1_000_000))
        .unwrap();

    assert_eq!(extraction.total_available, 1_000_000);
    assert_eq!(extraction.candles.len(), 100);
    assert!(extraction.peak_buffered <= 100);
    assert_eq!(extraction.candles[99].price_open, 999_999.0);
    assert_eq!(extraction.candles[0].price_open, 999_900.0);
}

// =============================================================================
// Envelope position
// =============================================================================

#[test]
fn envelope_found_after_array() {
    let before = br#"{"ETH":{"zap_id":2,"external_id":"ethereum","metadata":{"b":1,"a":2},"1d":[{"timestamp":"2024-01-01","price_open":"1","price_close":2,"price_high":3,"price_low":0.5,"volume":"9"}]}}"#;
    let after = br#"{"ETH":{"1d":[{"timestamp":"2024-01-01","price_open":"1","price_close":2,"price_high":3,"price_low":0.5,"volume":"9"}],"metadata":{"b":1,"a":2},"external_id":"ethereum","zap_id":2}}"#;

    let extractor = WindowExtractor::new(Timeframe::OneDay, limit(10));
    let first = extractor.extract(&before[..]).unwrap();
    let second = extractor.extract(&after[..]).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.symbol, "ETH");
    assert_eq!(first.envelope.external_id.as_deref(), Some("ethereum"));
    assert_eq!(
        serde_json::to_string(&first.envelope.metadata).unwrap(),
        r#"{"b":1,"a":2}"#
    );
}

// =============================================================================
// Resource release
// =============================================================================

#[test]
fn reader_released_after_success() {
    let drops = Arc::new(AtomicUsize::new(0));
    let reader = Tracked::new(Cursor::new(document(10)), &drops);

    WindowExtractor::new(Timeframe::OneMinute, limit(5))
        .extract(reader)
        .unwrap();

    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn reader_released_after_decode_error() {
    let drops = Arc::new(AtomicUsize::new(0));
    let mut bytes = document(10);
    bytes.truncate(bytes.len() / 2);
    let reader = Tracked::new(Cursor::new(bytes), &drops);

    let err = WindowExtractor::new(Timeframe::OneMinute, limit(5))
        .extract(reader)
        .unwrap_err();

    assert!(matches!(err, ExtractError::Decode(_)));
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn reader_released_when_series_missing() {
    let drops = Arc::new(AtomicUsize::new(0));
    let reader = Tracked::new(Cursor::new(br#"{"BTC":{"1d":[]}}"#.to_vec()), &drops);

    let err = WindowExtractor::new(Timeframe::OneMinute, None)
        .extract(reader)
        .unwrap_err();

    assert!(matches!(err, ExtractError::SeriesNotFound(Timeframe::OneMinute)));
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn probe_releases_reader() {
    let drops = Arc::new(AtomicUsize::new(0));
    let header = probe(Tracked::new(Cursor::new(document(3)), &drops)).unwrap();

    assert_eq!(header.symbol, "BTC");
    assert_eq!(header.envelope.zap_id, Some(1));
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn stream_failure_is_transport_error() {
    let mut bytes = document(10);
    bytes.truncate(bytes.len() / 2);
    let reader = FailingReader {
        inner: Cursor::new(bytes),
    };

    let err = WindowExtractor::new(Timeframe::OneMinute, limit(5))
        .extract(reader)
        .unwrap_err();

    assert!(matches!(err, ExtractError::Transport(_)));
}
