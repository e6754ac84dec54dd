//! Bulk Importer
//!
//! Copies every `<timeframe>/<name>.json` document of an object store into
//! the row store. Each document is read twice: a probe for the series key and
//! envelope (`zap_id` may follow the array), then a streaming pass whose
//! candles are inserted in committed batches. The decoding thread and the
//! database writer are joined by a bounded channel, so at most two batches
//! are in memory.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::application::ports::{ObjectStore, StoreError};
use crate::domain::candle::{Candle, Timeframe};
use crate::domain::extractor::{self, CandleSink, ExtractError, RecordPolicy, WindowExtractor};
use crate::error::HistoryError;
use crate::infrastructure::blob::split_key;
use crate::infrastructure::sqlite::SqliteCandleRepository;

/// Rows per committed batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Import failures. Any of these aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Listing or opening an object failed.
    #[error("object store error: {0}")]
    Store(#[from] StoreError),

    /// A document could not be decoded.
    #[error("failed to decode {key}: {source}")]
    Extract {
        /// Object key.
        key: String,
        /// Decoder failure.
        source: ExtractError,
    },

    /// Writing to the row store failed.
    #[error("row store error: {0}")]
    Database(#[from] HistoryError),

    /// The decoding thread panicked or was cancelled.
    #[error("decoder task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Totals of one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Documents imported.
    pub objects: usize,
    /// Rows inserted.
    pub rows: usize,
    /// Records dropped because they could not be coerced.
    pub skipped_records: usize,
    /// Keys ignored because their timeframe is unknown.
    pub skipped_keys: usize,
}

/// Object store to row store copier.
pub struct Importer {
    store: Arc<dyn ObjectStore>,
    repository: Arc<SqliteCandleRepository>,
    batch_size: usize,
}

impl Importer {
    /// Importer with the default batch size.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, repository: Arc<SqliteCandleRepository>) -> Self {
        Self {
            store,
            repository,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the batch size (minimum 1).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Import every document in the store.
    pub async fn run(&self) -> Result<ImportSummary, ImportError> {
        self.repository.ensure_schema().await?;

        let keys = self.store.list("").await?;
        tracing::info!(objects = keys.len(), "Starting import");

        let mut summary = ImportSummary::default();
        for key in &keys {
            let Some((Some(dir), _)) = split_key(key) else {
                continue;
            };
            let Ok(timeframe) = dir.parse::<Timeframe>() else {
                tracing::warn!(key = %key, "Skipping object with unknown timeframe");
                summary.skipped_keys += 1;
                continue;
            };

            let (rows, skipped) = self.import_object(key, timeframe).await?;
            summary.objects += 1;
            summary.rows += rows;
            summary.skipped_records += skipped;
        }

        tracing::info!(
            objects = summary.objects,
            rows = summary.rows,
            skipped_records = summary.skipped_records,
            skipped_keys = summary.skipped_keys,
            "Import finished"
        );
        Ok(summary)
    }

    async fn import_object(
        &self,
        key: &str,
        timeframe: Timeframe,
    ) -> Result<(usize, usize), ImportError> {
        let extract_err = |source| ImportError::Extract {
            key: key.to_string(),
            source,
        };

        let reader = self.store.open(key).await?;
        let header = tokio::task::spawn_blocking(move || extractor::probe(reader))
            .await?
            .map_err(extract_err)?;
        // Rows are keyed by the document's series key, not the file name.
        let symbol = header.symbol.to_uppercase();
        let zap_id = header.envelope.zap_id;

        let reader = self.store.open(key).await?;
        let (tx, mut rx) = mpsc::channel::<Vec<Candle>>(1);
        let batch_size = self.batch_size;
        let decoder = tokio::task::spawn_blocking(move || {
            let mut sink = BatchSink::new(tx, batch_size);
            let extractor =
                WindowExtractor::new(timeframe, None).with_policy(RecordPolicy::SkipInvalid);
            let header = extractor.extract_into(reader, &mut sink)?;
            sink.flush()?;
            Ok::<_, ExtractError>(header)
        });

        let mut inserted = 0;
        let mut write_error = None;
        while let Some(batch) = rx.recv().await {
            match self
                .repository
                .insert_batch(timeframe, &symbol, zap_id, &batch)
                .await
            {
                Ok(count) => {
                    inserted += count;
                    tracing::info!(key, rows = inserted, "Import progress");
                }
                Err(err) => {
                    write_error = Some(err);
                    break;
                }
            }
        }
        drop(rx);

        let decoded = decoder.await?;
        if let Some(err) = write_error {
            return Err(err.into());
        }
        let header = decoded.map_err(extract_err)?;

        tracing::info!(
            key,
            symbol = %symbol,
            timeframe = %timeframe,
            rows = inserted,
            skipped = header.skipped,
            "Imported object"
        );
        Ok((inserted, header.skipped))
    }
}

impl std::fmt::Debug for Importer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Importer")
            .field("store", &self.store.name())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

/// Groups candles into batches and hands them to the writer.
struct BatchSink {
    tx: mpsc::Sender<Vec<Candle>>,
    batch: Vec<Candle>,
    batch_size: usize,
}

impl BatchSink {
    fn new(tx: mpsc::Sender<Vec<Candle>>, batch_size: usize) -> Self {
        Self {
            tx,
            batch: Vec::with_capacity(batch_size),
            batch_size,
        }
    }

    fn send(&mut self) -> ControlFlow<()> {
        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
        match self.tx.blocking_send(batch) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        }
    }

    fn flush(&mut self) -> Result<(), ExtractError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        match self.send() {
            ControlFlow::Continue(()) => Ok(()),
            ControlFlow::Break(()) => Err(ExtractError::SinkClosed),
        }
    }
}

impl CandleSink for BatchSink {
    fn accept(&mut self, candle: Candle) -> ControlFlow<()> {
        self.batch.push(candle);
        if self.batch.len() >= self.batch_size {
            return self.send();
        }
        ControlFlow::Continue(())
    }
}
