//! Domain Layer - Candle types and the streaming window extractor.
//!
//! Nothing in this layer performs I/O on its own: the extractor consumes any
//! `std::io::Read` handed to it and the window buffer is a plain data
//! structure.

/// Candle, timeframe and series envelope types.
pub mod candle;

/// Source-value coercion used while decoding documents.
pub mod coerce;

/// Streaming extraction of a timeframe window from a JSON document.
pub mod extractor;

/// Fixed-capacity trailing window buffer.
pub mod window;
