//! Configuration types, built from environment variables.

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::sync::SyncOptions;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path to the local database file.
    pub db_path: String,
    /// HTTP listen port.
    pub port: u16,
    /// Gmail API bearer access token.
    pub gmail_access_token: SecretString,
    /// OpenAI API key for the summarizer.
    pub openai_api_key: SecretString,
    /// Default sync knobs; the model can be overridden per request.
    pub sync: SyncOptions,
}

impl AppConfig {
    /// Build config from environment variables.
    ///
    /// `GMAIL_ACCESS_TOKEN` and `OPENAI_API_KEY` are required; everything
    /// else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let gmail_access_token = std::env::var("GMAIL_ACCESS_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("GMAIL_ACCESS_TOKEN".into()))?;
        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".into()))?;

        let db_path = std::env::var("INBOXBRIEF_DB_PATH")
            .unwrap_or_else(|_| "./data/inboxbrief.db".to_string());

        let port: u16 = match std::env::var("INBOXBRIEF_PORT") {
            Ok(s) => s.parse().map_err(|_| ConfigError::InvalidValue {
                key: "INBOXBRIEF_PORT".into(),
                message: format!("not a port number: {s}"),
            })?,
            Err(_) => 8080,
        };

        let mut sync = SyncOptions::default();
        if let Ok(model) = std::env::var("INBOXBRIEF_MODEL") {
            sync.model = model;
        }
        if let Some(cap) = read_usize("INBOXBRIEF_SYNC_CAP")? {
            sync.max_per_run = cap;
        }
        if let Some(concurrency) = read_usize("INBOXBRIEF_SYNC_CONCURRENCY")? {
            sync.concurrency = concurrency.max(1);
        }

        Ok(Self {
            db_path,
            port,
            gmail_access_token: SecretString::from(gmail_access_token),
            openai_api_key: SecretString::from(openai_api_key),
            sync,
        })
    }
}

fn read_usize(key: &str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(key) {
        Ok(s) => s
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.into(),
                message: format!("not a number: {s}"),
            }),
        Err(_) => Ok(None),
    }
}
