use std::sync::Arc;

use inboxbrief::config::AppConfig;
use inboxbrief::enrich::{Enricher, OpenAiSummarizer, WebBuzzScorer};
use inboxbrief::mailbox::GmailMailbox;
use inboxbrief::server::{AppState, api_routes};
use inboxbrief::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export GMAIL_ACCESS_TOKEN=ya29....");
        eprintln!("  export OPENAI_API_KEY=sk-...");
        std::process::exit(1);
    });

    eprintln!("📬 inboxbrief v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.sync.model);
    eprintln!("   API: http://0.0.0.0:{}/api", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let db_path = std::path::Path::new(&config.db_path);
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(db_path).await.unwrap_or_else(
        |e| {
            eprintln!("Error: Failed to open database at {}: {}", config.db_path, e);
            std::process::exit(1);
        },
    ));
    eprintln!("   Database: {}", config.db_path);

    // ── Collaborators ────────────────────────────────────────────────────
    let mailbox = Arc::new(GmailMailbox::new(config.gmail_access_token.clone()));
    let enricher = Arc::new(Enricher::new(
        Arc::new(OpenAiSummarizer::new(config.openai_api_key.clone())),
        Arc::new(WebBuzzScorer::new()),
    ));

    // ── HTTP server ──────────────────────────────────────────────────────
    let state = AppState {
        db,
        mailbox,
        enricher,
        sync_defaults: config.sync.clone(),
    };
    let app = api_routes(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "API server started");
    axum::serve(listener, app).await?;

    Ok(())
}
