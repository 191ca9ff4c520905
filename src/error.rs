//! Error types for inboxbrief.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Enrichment error: {0}")]
    Enrich(#[from] EnrichError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Mailbox collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Mailbox request failed: {0}")]
    RequestFailed(String),

    #[error("Mailbox returned invalid payload for message {id}: {reason}")]
    InvalidPayload { id: String, reason: String },

    #[error("Message not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),
}

/// Errors from the enrichment collaborators (summarizer / buzz scorer).
///
/// These are always recovered locally with documented defaults — they
/// never propagate out of the sync pipeline.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("Summarizer request failed: {0}")]
    Summarizer(String),

    #[error("Summarizer returned invalid JSON: {0}")]
    InvalidResponse(String),

    #[error("Buzz scorer request failed: {0}")]
    Buzz(String),

    #[error("Call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Sync pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Candidate listing failed: {0}")]
    Listing(#[from] MailboxError),

    #[error("Store error during sync: {0}")]
    Store(#[from] DatabaseError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
