//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the HTTP surface,
//! configuration and observability.

use std::sync::Arc;

use crate::application::ports::CandleRepository;
use crate::error::HistoryError;

use self::blob::BlobCandleRepository;
use self::config::Backend;
use self::object_store::{LocalObjectStore, S3ObjectStore};
use self::sqlite::SqliteCandleRepository;

/// Blob-store repository and document layouts.
pub mod blob;

/// Configuration loading.
pub mod config;

/// Health check and metrics routes.
pub mod health;

/// REST API.
pub mod http;

/// Object store to row store bulk import.
pub mod import;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// HTTP and local-directory object stores.
pub mod object_store;

/// SQLite row store.
pub mod sqlite;

/// Tracing and OpenTelemetry setup.
pub mod telemetry;

/// Build the repository for the configured backend.
///
/// Called once at startup; the result is shared by every handler.
pub async fn connect_backend(backend: &Backend) -> Result<Arc<dyn CandleRepository>, HistoryError> {
    let repository: Arc<dyn CandleRepository> = match backend {
        Backend::Sqlite { database_path } => {
            Arc::new(SqliteCandleRepository::open(database_path).await?)
        }
        Backend::ObjectStore(settings) => Arc::new(BlobCandleRepository::new(
            Arc::new(S3ObjectStore::new(settings)?),
            settings.layout,
        )),
        Backend::Local { data_dir, layout } => Arc::new(BlobCandleRepository::new(
            Arc::new(LocalObjectStore::new(data_dir.clone())),
            *layout,
        )),
    };
    Ok(repository)
}
