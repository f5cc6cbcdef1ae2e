use std::sync::Arc;

use relay_assist::channels::{TelegramTransport, Transport};
use relay_assist::config::RelayConfig;
use relay_assist::http::relay_routes;
use relay_assist::llm::{LlmBackend, LlmConfig, create_provider};
use relay_assist::relay::RelayDispatcher;
use relay_assist::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
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

    // Read API key from environment
    let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_else(|_| {
        eprintln!("Error: ANTHROPIC_API_KEY not set");
        eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
        std::process::exit(1);
    });

    let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_else(|_| {
        eprintln!("Error: TELEGRAM_BOT_TOKEN not set");
        std::process::exit(1);
    });

    let config = RelayConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let model =
        std::env::var("RELAY_MODEL").unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

    let http_port: u16 = std::env::var("RELAY_HTTP_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    eprintln!("🤖 Relay Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Primary user: {}", config.primary_user);
    eprintln!("   Model: {}", model);
    eprintln!("   Relay API: http://0.0.0.0:{}/api/relay/status", http_port);
    eprintln!("   Draft expiry: {} min\n", config.draft_expiry_minutes);

    // Create LLM provider
    let llm_config = LlmConfig {
        backend: LlmBackend::Anthropic,
        api_key: secrecy::SecretString::from(api_key),
        model,
    };
    let llm = create_provider(&llm_config)?;

    // ── Database ─────────────────────────────────────────────────────────
    let db_path =
        std::env::var("RELAY_DB_PATH").unwrap_or_else(|_| "./data/relay-assist.db".to_string());

    let db_path_ref = std::path::Path::new(&db_path);
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(db_path_ref)
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {}", db_path, e);
                std::process::exit(1);
            }),
    );

    eprintln!("   Database: {}", db_path);

    // ── Transport + Dispatcher ──────────────────────────────────────────
    let transport = Arc::new(TelegramTransport::new(
        bot_token,
        config.primary_user.clone(),
    ));
    let transport_dyn: Arc<dyn Transport> = transport.clone();

    let dispatcher = Arc::new(RelayDispatcher::new(
        config.clone(),
        Arc::clone(&db),
        llm,
        transport_dyn,
    ));
    dispatcher.initialize().await?;

    // ── HTTP surface ────────────────────────────────────────────────────
    let app = relay_routes(Arc::clone(&db), config.primary_user.clone());
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", http_port))
            .await
            .expect("Failed to bind relay API port");
        tracing::info!(port = http_port, "Relay API server started");
        axum::serve(listener, app).await.ok();
    });

    // ── Poll loop ───────────────────────────────────────────────────────
    // Events are dispatched serially: one at a time, in arrival order,
    // which is what keeps per-contact draft updates consistent.
    tracing::info!("Relay loop started");
    let mut offset = 0i64;
    loop {
        match transport.poll_once(&mut offset).await {
            Ok(events) => {
                for event in events {
                    dispatcher.handle(event).await;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Polling failed, backing off");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        }
    }
}
