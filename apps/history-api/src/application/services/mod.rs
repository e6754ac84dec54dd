//! Application Services
//!
//! The history service validates request parameters, delegates to the
//! configured backend and shapes the wire response.

mod history;

pub use history::{HistoryService, RequestedLimit, parse_limit};
