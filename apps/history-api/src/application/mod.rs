//! Application Layer - Use cases and port definitions.
//!
//! This layer turns HTTP-level requests into backend lookups and formats
//! the results into wire records. Backends are reached only through the
//! ports defined here.

/// Wire records returned by the API.
pub mod dto;

/// Port interfaces for storage backends.
pub mod ports;

/// History and coin listing services.
pub mod services;
