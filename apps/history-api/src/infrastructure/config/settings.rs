//! History API Configuration Settings
//!
//! Configuration types for the history service, loaded from environment
//! variables.

use std::path::PathBuf;

use crate::infrastructure::blob::DocumentLayout;

/// Object store access key pair.
#[derive(Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(access_key_id: String, secret_access_key: String) -> Self {
        Self {
            access_key_id,
            secret_access_key,
        }
    }

    /// Access key identifier.
    #[must_use]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Secret used to sign requests.
    #[must_use]
    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// S3/R2-compatible object store connection.
#[derive(Debug, Clone)]
pub struct ObjectStoreSettings {
    /// Base URL, without the bucket.
    pub endpoint: String,
    /// Bucket name.
    pub bucket: String,
    /// Signing region; R2 accepts `auto`.
    pub region: String,
    /// Signing credentials.
    pub credentials: Credentials,
    /// Key layout of stored documents.
    pub layout: DocumentLayout,
}

/// Storage backend serving history queries.
#[derive(Debug, Clone)]
pub enum Backend {
    /// SQLite row store.
    Sqlite {
        /// Database file.
        database_path: PathBuf,
    },
    /// Remote object store.
    ObjectStore(ObjectStoreSettings),
    /// Directory of JSON documents.
    Local {
        /// Document root.
        data_dir: PathBuf,
        /// Key layout of stored documents.
        layout: DocumentLayout,
    },
}

impl Backend {
    /// Source tag for this backend.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite { .. } => "sqlite",
            Self::ObjectStore(_) => "r2",
            Self::Local { .. } => "local",
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// HTTP listen port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: 3001 }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Configured backend.
    pub backend: Backend,
    /// Server port settings.
    pub server: ServerSettings,
}

impl HistoryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unknown or its required variables
    /// are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`HistoryConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("CANDLE_BACKEND")
            .unwrap_or_else(|| "sqlite".to_string())
            .to_lowercase()
            .as_str()
        {
            "sqlite" => Backend::Sqlite {
                database_path: lookup("DATABASE_PATH")
                    .filter(|v| !v.is_empty())
                    .map_or_else(|| PathBuf::from("crypto_data.db"), PathBuf::from),
            },
            "r2" => Backend::ObjectStore(ObjectStoreSettings {
                endpoint: required(&lookup, "R2_ENDPOINT")?
                    .trim_end_matches('/')
                    .to_string(),
                bucket: required(&lookup, "R2_BUCKET")?,
                region: lookup("R2_REGION")
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| "auto".to_string()),
                credentials: Credentials::new(
                    required(&lookup, "R2_ACCESS_KEY")?,
                    required(&lookup, "R2_SECRET_KEY")?,
                ),
                layout: parse_layout(&lookup, DocumentLayout::PerTimeframe)?,
            }),
            "local" => Backend::Local {
                data_dir: lookup("DATA_DIR")
                    .filter(|v| !v.is_empty())
                    .map_or_else(|| PathBuf::from("data"), PathBuf::from),
                layout: parse_layout(&lookup, DocumentLayout::PerSymbol)?,
            },
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "CANDLE_BACKEND".to_string(),
                    value: other.to_string(),
                });
            }
        };

        let server = ServerSettings {
            port: parse_env_u16(&lookup, "PORT", ServerSettings::default().port),
        };

        Ok(Self { backend, server })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has a value outside its allowed set.
    #[error("invalid value {value:?} for environment variable {key}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_layout<F>(lookup: &F, default: DocumentLayout) -> Result<DocumentLayout, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup("DOCUMENT_LAYOUT").filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => DocumentLayout::from_str_case_insensitive(&value).ok_or_else(|| {
            ConfigError::InvalidValue {
                key: "DOCUMENT_LAYOUT".to_string(),
                value,
            }
        }),
    }
}

fn parse_env_u16<F>(lookup: &F, key: &str, default: u16) -> u16
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<HistoryConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        HistoryConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_sqlite() {
        let config = load(&[]).unwrap();
        match config.backend {
            Backend::Sqlite { database_path } => {
                assert_eq!(database_path, PathBuf::from("crypto_data.db"));
            }
            other => panic!("unexpected backend {other:?}"),
        }
        assert_eq!(config.server.port, 3001);
    }

    #[test]
    fn object_store_requires_endpoint_and_bucket() {
        let err = load(&[("CANDLE_BACKEND", "r2")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "R2_ENDPOINT"));

        let err = load(&[("CANDLE_BACKEND", "r2"), ("R2_ENDPOINT", "http://r2"), ("R2_BUCKET", "")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(ref key) if key == "R2_BUCKET"));
    }

    #[test]
    fn object_store_requires_key_pair() {
        let err = load(&[
            ("CANDLE_BACKEND", "r2"),
            ("R2_ENDPOINT", "http://r2"),
            ("R2_BUCKET", "candles"),
            ("R2_ACCESS_KEY", "key-id"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "R2_SECRET_KEY"));
    }

    #[test]
    fn object_store_settings() {
        let config = load(&[
            ("CANDLE_BACKEND", "R2"),
            ("R2_ENDPOINT", "http://r2.local/"),
            ("R2_BUCKET", "candles"),
            ("R2_ACCESS_KEY", "key-id"),
            ("R2_SECRET_KEY", "secret"),
        ])
        .unwrap();

        let Backend::ObjectStore(settings) = config.backend else {
            panic!("expected object store backend");
        };
        assert_eq!(settings.endpoint, "http://r2.local");
        assert_eq!(settings.bucket, "candles");
        assert_eq!(settings.layout, DocumentLayout::PerTimeframe);
        assert_eq!(settings.region, "auto");
        assert_eq!(settings.credentials.access_key_id(), "key-id");
        assert_eq!(settings.credentials.secret_access_key(), "secret");
    }

    #[test]
    fn local_backend_layout_override() {
        let config = load(&[
            ("CANDLE_BACKEND", "local"),
            ("DATA_DIR", "/srv/candles"),
            ("DOCUMENT_LAYOUT", "per-timeframe"),
        ])
        .unwrap();

        let Backend::Local { data_dir, layout } = config.backend else {
            panic!("expected local backend");
        };
        assert_eq!(data_dir, PathBuf::from("/srv/candles"));
        assert_eq!(layout, DocumentLayout::PerTimeframe);
    }

    #[test]
    fn local_backend_defaults_to_per_symbol() {
        let config = load(&[("CANDLE_BACKEND", "local")]).unwrap();
        assert!(matches!(
            config.backend,
            Backend::Local { layout: DocumentLayout::PerSymbol, .. }
        ));
    }

    #[test]
    fn unknown_values_are_rejected() {
        let err = load(&[("CANDLE_BACKEND", "postgres")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "CANDLE_BACKEND"));

        let err = load(&[("CANDLE_BACKEND", "local"), ("DOCUMENT_LAYOUT", "nested")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "DOCUMENT_LAYOUT"));
    }

    #[test]
    fn malformed_port_falls_back() {
        let config = load(&[("PORT", "http")]).unwrap();
        assert_eq!(config.server.port, 3001);

        let config = load(&[("PORT", "8080")]).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn credentials_redacted_debug() {
        let creds = Credentials::new("key-id".to_string(), "secret-token".to_string());
        let debug = format!("{creds:?}");
        assert!(debug.contains("key-id"));
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn backend_source_tags() {
        assert_eq!(
            Backend::Sqlite { database_path: PathBuf::new() }.as_str(),
            "sqlite"
        );
        assert_eq!(
            Backend::Local { data_dir: PathBuf::new(), layout: DocumentLayout::PerSymbol }.as_str(),
            "local"
        );
    }
}
