//! Streaming Window Extractor
//!
//! Extracts one timeframe array, plus the series envelope, from a document
//! shaped like
//!
//! ```json
//! { "BTC": { "zap_id": 7, "metadata": { }, "1m": [ { }, { } ], "1h": [ ] } }
//! ```
//!
//! without materializing the array. The document is decoded incrementally
//! with `serde_json`'s streaming deserializer; array items are handed one at
//! a time to a [`CandleSink`], and every other array is skipped with
//! [`IgnoredAny`].
//!
//! # Window policy
//!
//! [`WindowExtractor::extract`] keeps a [`TrailingWindow`]: the most recent
//! `limit` records in document order. Every item of the array is read, and at
//! most `limit` candles are buffered at any time. There is no forward-cap
//! mode; the first `limit` records are never returned in place of the last.
//!
//! Envelope keys (`zap_id`, `external_id`, `name`, `metadata`) are captured
//! whether they come before or after the target array.

use std::fmt;
use std::io::{BufReader, Read};
use std::num::NonZeroUsize;
use std::ops::ControlFlow;

use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;

use super::candle::{Candle, Envelope, Timeframe};
use super::coerce;
use super::window::TrailingWindow;

/// Read buffer placed in front of the byte stream.
const READ_BUFFER_BYTES: usize = 64 * 1024;

// =============================================================================
// Errors
// =============================================================================

/// Extraction failures.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The document is malformed, truncated, or a record has the wrong type.
    #[error("malformed document: {0}")]
    Decode(serde_json::Error),

    /// The underlying byte stream failed mid-document.
    #[error("stream read failed: {0}")]
    Transport(serde_json::Error),

    /// The document is well-formed but has no array for the timeframe.
    #[error("no {0} series in document")]
    SeriesNotFound(Timeframe),

    /// The document has no top-level symbol key.
    #[error("document contains no series")]
    EmptyDocument,

    /// The sink refused further records.
    #[error("record sink closed before the series ended")]
    SinkClosed,
}

impl From<serde_json::Error> for ExtractError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Self::Transport(err)
        } else {
            Self::Decode(err)
        }
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Receives decoded candles in document order.
pub trait CandleSink {
    /// Take one candle; `Break` stops decoding with [`ExtractError::SinkClosed`].
    fn accept(&mut self, candle: Candle) -> ControlFlow<()>;
}

impl CandleSink for TrailingWindow<Candle> {
    fn accept(&mut self, candle: Candle) -> ControlFlow<()> {
        self.push(candle);
        ControlFlow::Continue(())
    }
}

struct DiscardSink;

impl CandleSink for DiscardSink {
    fn accept(&mut self, _candle: Candle) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// What to do with an array item that cannot be coerced into a candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordPolicy {
    /// Fail the whole extraction with a decode error.
    #[default]
    Strict,
    /// Log the item, count it, and keep going.
    SkipInvalid,
}

// =============================================================================
// Results
// =============================================================================

/// Envelope and counters of a decoded series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesHeader {
    /// Top-level document key.
    pub symbol: String,
    /// Envelope fields found anywhere in the series object.
    pub envelope: Envelope,
    /// Array items decoded into candles.
    pub seen: usize,
    /// Array items skipped under [`RecordPolicy::SkipInvalid`].
    pub skipped: usize,
}

/// A trailing window extracted from one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Top-level document key.
    pub symbol: String,
    /// Series envelope.
    pub envelope: Envelope,
    /// At most `limit` candles, in document order.
    pub candles: Vec<Candle>,
    /// Number of candles in the source array.
    pub total_available: usize,
    /// Most candles buffered at once during extraction.
    pub peak_buffered: usize,
}

// =============================================================================
// Extractor
// =============================================================================

/// Extracts the trailing window of one timeframe array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowExtractor {
    timeframe: Timeframe,
    limit: Option<NonZeroUsize>,
    policy: RecordPolicy,
}

impl WindowExtractor {
    /// Extractor for `timeframe`; `limit = None` returns the whole array.
    #[must_use]
    pub const fn new(timeframe: Timeframe, limit: Option<NonZeroUsize>) -> Self {
        Self {
            timeframe,
            limit,
            policy: RecordPolicy::Strict,
        }
    }

    /// Replace the record policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RecordPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Target timeframe.
    #[must_use]
    pub const fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Window size, `None` when unbounded.
    #[must_use]
    pub const fn limit(&self) -> Option<NonZeroUsize> {
        self.limit
    }

    /// Decode `reader` and return the trailing window.
    ///
    /// The reader is dropped before this returns, on success and failure.
    pub fn extract<R: Read>(&self, reader: R) -> Result<Extraction, ExtractError> {
        let mut window = TrailingWindow::new(self.limit);
        let header = self.extract_into(reader, &mut window)?;

        Ok(Extraction {
            symbol: header.symbol,
            envelope: header.envelope,
            total_available: header.seen,
            peak_buffered: window.peak(),
            candles: window.into_vec(),
        })
    }

    /// Decode `reader`, streaming every candle of the target array into `sink`.
    ///
    /// `limit` is not applied here; the sink decides what to keep.
    pub fn extract_into<R: Read, S: CandleSink>(
        &self,
        reader: R,
        sink: &mut S,
    ) -> Result<SeriesHeader, ExtractError> {
        let outcome = decode(reader, Some(self.timeframe), self.policy, sink)?;
        if !outcome.found_target {
            return Err(ExtractError::SeriesNotFound(self.timeframe));
        }
        Ok(outcome.header)
    }
}

/// Decode only the envelope of a document, skipping every array.
pub fn probe<R: Read>(reader: R) -> Result<SeriesHeader, ExtractError> {
    decode(reader, None, RecordPolicy::Strict, &mut DiscardSink).map(|outcome| outcome.header)
}

struct Outcome {
    header: SeriesHeader,
    found_target: bool,
}

fn decode<R: Read, S: CandleSink>(
    reader: R,
    target: Option<Timeframe>,
    policy: RecordPolicy,
    sink: &mut S,
) -> Result<Outcome, ExtractError> {
    let mut state = DecodeState {
        target,
        policy,
        sink,
        symbol: None,
        envelope: Envelope::default(),
        found_target: false,
        seen: 0,
        skipped: 0,
        sink_closed: false,
    };

    let mut deserializer =
        serde_json::Deserializer::from_reader(BufReader::with_capacity(READ_BUFFER_BYTES, reader));
    let result = DocumentSeed { state: &mut state }
        .deserialize(&mut deserializer)
        .and_then(|()| deserializer.end());

    if let Err(err) = result {
        if state.sink_closed {
            return Err(ExtractError::SinkClosed);
        }
        return Err(err.into());
    }

    let symbol = state.symbol.ok_or(ExtractError::EmptyDocument)?;

    Ok(Outcome {
        header: SeriesHeader {
            symbol,
            envelope: state.envelope,
            seen: state.seen,
            skipped: state.skipped,
        },
        found_target: state.found_target,
    })
}

// =============================================================================
// Decoding state machine
// =============================================================================

struct DecodeState<'s, S> {
    target: Option<Timeframe>,
    policy: RecordPolicy,
    sink: &'s mut S,
    symbol: Option<String>,
    envelope: Envelope,
    found_target: bool,
    seen: usize,
    skipped: usize,
    sink_closed: bool,
}

/// Top level: `{ SYMBOL: series }`. Keys after the first are skipped.
struct DocumentSeed<'a, 's, S> {
    state: &'a mut DecodeState<'s, S>,
}

impl<'de, S: CandleSink> DeserializeSeed<'de> for DocumentSeed<'_, '_, S> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, S: CandleSink> Visitor<'de> for DocumentSeed<'_, '_, S> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object keyed by symbol")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let state = self.state;
        while let Some(key) = map.next_key::<String>()? {
            if state.symbol.is_some() {
                map.next_value::<IgnoredAny>()?;
                continue;
            }
            state.symbol = Some(key);
            map.next_value_seed(SeriesSeed { state: &mut *state })?;
        }
        Ok(())
    }
}

/// Series object: envelope keys plus one array per timeframe.
struct SeriesSeed<'a, 's, S> {
    state: &'a mut DecodeState<'s, S>,
}

impl<'de, S: CandleSink> DeserializeSeed<'de> for SeriesSeed<'_, '_, S> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, S: CandleSink> Visitor<'de> for SeriesSeed<'_, '_, S> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a series object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let state = self.state;
        let target = state.target.map(Timeframe::as_str);

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "zap_id" => state.envelope.zap_id = map.next_value::<ZapId>()?.0,
                "external_id" => state.envelope.external_id = map.next_value::<Text>()?.0,
                "name" => state.envelope.name = map.next_value::<Text>()?.0,
                "metadata" => state.envelope.metadata = map.next_value::<Value>()?,
                other if Some(other) == target => {
                    map.next_value_seed(ArraySeed { state: &mut *state })?;
                    state.found_target = true;
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(())
    }
}

/// Target array, fed to the sink item by item.
struct ArraySeed<'a, 's, S> {
    state: &'a mut DecodeState<'s, S>,
}

impl<'de, S: CandleSink> DeserializeSeed<'de> for ArraySeed<'_, '_, S> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, S: CandleSink> Visitor<'de> for ArraySeed<'_, '_, S> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a candle array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        let state = self.state;
        let mut index = 0usize;

        loop {
            let candle = match state.policy {
                RecordPolicy::Strict => match seq.next_element::<SourceCandle>()? {
                    Some(record) => Candle::from(record),
                    None => break,
                },
                RecordPolicy::SkipInvalid => match seq.next_element::<Value>()? {
                    Some(raw) => match SourceCandle::deserialize(&raw) {
                        Ok(record) => Candle::from(record),
                        Err(err) => {
                            tracing::warn!(index, error = %err, record = %raw, "Skipping invalid record");
                            state.skipped += 1;
                            index += 1;
                            continue;
                        }
                    },
                    None => break,
                },
            };

            index += 1;
            state.seen += 1;
            if state.sink.accept(candle).is_break() {
                state.sink_closed = true;
                return Err(de::Error::custom("record sink closed"));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Source records
// =============================================================================

/// Array item as stored upstream; unknown fields are ignored.
#[derive(Deserialize)]
struct SourceCandle {
    #[serde(deserialize_with = "coerce::timestamp")]
    timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(deserialize_with = "coerce::float")]
    price_open: f64,
    #[serde(deserialize_with = "coerce::float")]
    price_close: f64,
    #[serde(deserialize_with = "coerce::float")]
    price_high: f64,
    #[serde(deserialize_with = "coerce::float")]
    price_low: f64,
    #[serde(deserialize_with = "coerce::float")]
    volume: f64,
}

impl From<SourceCandle> for Candle {
    fn from(record: SourceCandle) -> Self {
        Self {
            timestamp: record.timestamp,
            price_open: record.price_open,
            price_close: record.price_close,
            price_high: record.price_high,
            price_low: record.price_low,
            volume: record.volume,
        }
    }
}

struct ZapId(Option<i64>);

impl<'de> Deserialize<'de> for ZapId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        coerce::optional_id(deserializer).map(Self)
    }
}

struct Text(Option<String>);

impl<'de> Deserialize<'de> for Text {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        coerce::optional_text(deserializer).map(Self)
    }
}
