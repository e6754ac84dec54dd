//! Candle Import Binary
//!
//! Copies every `<timeframe>/<symbol>.json` document from the configured
//! object store into the SQLite row store.
//!
//! # Usage
//!
//! ```bash
//! CANDLE_BACKEND=r2 R2_ENDPOINT=... R2_BUCKET=... R2_ACCESS_KEY=... R2_SECRET_KEY=... \
//!     cargo run --bin candle-import
//! ```
//!
//! The source is the `r2` or `local` backend configuration; the destination
//! is always `DATABASE_PATH` (default: crypto_data.db).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use history_api::infrastructure::import::Importer;
use history_api::infrastructure::telemetry;
use history_api::{
    Backend, HistoryConfig, LocalObjectStore, ObjectStore, S3ObjectStore,
    SqliteCandleRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let _telemetry_guard = telemetry::init();

    let config = HistoryConfig::from_env()?;
    let store: Arc<dyn ObjectStore> = match config.backend {
        Backend::ObjectStore(settings) => Arc::new(S3ObjectStore::new(&settings)?),
        Backend::Local { data_dir, .. } => Arc::new(LocalObjectStore::new(data_dir)),
        Backend::Sqlite { .. } => {
            bail!("CANDLE_BACKEND must name an object store (r2 or local) to import from")
        }
    };

    let database_path = std::env::var("DATABASE_PATH")
        .ok()
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from("crypto_data.db"), PathBuf::from);
    let repository = SqliteCandleRepository::open(&database_path)
        .await
        .with_context(|| format!("opening {}", database_path.display()))?;

    tracing::info!(
        source = store.name(),
        database = %database_path.display(),
        "Importing candles"
    );

    let summary = Importer::new(store, Arc::new(repository)).run().await?;
    tracing::info!(
        objects = summary.objects,
        rows = summary.rows,
        "Import complete"
    );
    Ok(())
}
