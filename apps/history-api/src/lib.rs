#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )
)]

//! Candle History API
//!
//! Read-only HTTP service for historical cryptocurrency OHLCV candles at
//! `1m`, `1h` and `1d` granularity, served from one of three backends: a
//! SQLite row store, an S3/R2-compatible object store, or a local directory
//! of JSON documents.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: candle types and the streaming window extractor
//!   - `candle`: timeframe, candle, envelope and lookup types
//!   - `extractor`: bounded-memory trailing-window decoding
//!   - `window`: fixed-capacity ring buffer
//!
//! - **Application**: ports, wire records and the history service
//!
//! - **Infrastructure**: backends, HTTP router, config and telemetry
//!   - `sqlite`: row store
//!   - `object_store` / `blob`: document stores and the blob repository
//!   - `import`: object store to row store bulk copy
//!   - `http`, `health`: axum routes
//!
//! # Data Flow
//!
//! ```text
//! object store ──► byte stream ──► serde_json ──► WindowExtractor ──┐
//!                                                                  ├──► HistoryService ──► axum
//! SQLite ──► SELECT ... ORDER BY timestamp DESC LIMIT N ───────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Candle types and the streaming extractor.
pub mod domain;

/// Application layer - Ports, wire records and services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Service error taxonomy.
pub mod error;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::candle::{
    Candle, CoinListing, Envelope, InvalidTimeframe, SeriesLookup, SeriesWindow, Timeframe,
    VolumeStats,
};
pub use domain::extractor::{
    CandleSink, ExtractError, Extraction, RecordPolicy, SeriesHeader, WindowExtractor, probe,
};
pub use domain::window::TrailingWindow;

// Application
pub use application::dto::{CandleRecord, CoinSummary, HistoryMetadata, HistoryResponse};
pub use application::ports::{CandleRepository, ObjectReader, ObjectStore, StoreError};
pub use application::services::HistoryService;
pub use error::HistoryError;

// Infrastructure config
pub use infrastructure::config::{
    Backend, ConfigError, Credentials, HistoryConfig, ObjectStoreSettings, ServerSettings,
};

// Backends
pub use infrastructure::blob::{BlobCandleRepository, DocumentLayout};
pub use infrastructure::connect_backend;
pub use infrastructure::object_store::{LocalObjectStore, S3ObjectStore};
pub use infrastructure::sqlite::SqliteCandleRepository;

// HTTP
pub use infrastructure::health::HealthState;
pub use infrastructure::http::{AppState, create_router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
