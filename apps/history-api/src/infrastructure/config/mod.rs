//! Configuration Module
//!
//! Backend selection and server settings, loaded from environment variables.

mod settings;

pub use settings::{
    Backend, ConfigError, Credentials, HistoryConfig, ObjectStoreSettings, ServerSettings,
};
