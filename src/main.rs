use anyhow::Result;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use notion_gateway::auth::{
    CredentialManager, CredentialStore, MemoryCredentialStore, OAuthSettings,
    SqliteCredentialStore,
};
use notion_gateway::config::{self, Config};
use notion_gateway::dispatch::{Dispatcher, ACTIONS};
use notion_gateway::http_client::NotionHttpClient;
use notion_gateway::{middleware, routes};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("🚀 Notion Gateway starting...");
    tracing::info!(
        "Server configured: {}:{}",
        config.server_host,
        config.server_port
    );

    // Credential storage
    let store: Arc<dyn CredentialStore> = match config.database_file {
        Some(ref path) => {
            tracing::info!("Opening credential database: {}", path.display());
            Arc::new(SqliteCredentialStore::open(path)?)
        }
        None => {
            tracing::warn!(
                "DATABASE_FILE not set - credentials are kept in memory and lost on restart"
            );
            Arc::new(MemoryCredentialStore::new())
        }
    };

    let credentials = Arc::new(CredentialManager::new(
        OAuthSettings::from_config(&config),
        store,
        config.http_request_timeout,
    )?);
    tracing::info!("✅ Credential manager initialized");

    let http_client = Arc::new(NotionHttpClient::new(
        &config.notion_api_base,
        &config.notion_version,
        config.http_max_connections,
        config.http_connect_timeout,
        config.http_request_timeout,
    )?);
    tracing::info!("✅ HTTP client initialized with connection pooling");

    let dispatcher = Arc::new(Dispatcher::new(credentials.clone(), http_client));
    tracing::info!(
        "✅ Dispatcher ready with {} actions: {}",
        ACTIONS.len(),
        ACTIONS.iter().map(|a| a.name).collect::<Vec<_>>().join(", ")
    );

    let app_state = routes::AppState {
        proxy_api_key: config.proxy_api_key.clone(),
        credentials,
        dispatcher,
    };

    let app = build_app(app_state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    print_startup_banner(&config);

    tracing::info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 Server shutdown complete");

    Ok(())
}

/// Build the application with all routes and middleware
fn build_app(state: routes::AppState) -> axum::Router {
    use axum::Router;

    Router::new()
        .merge(routes::health_routes())
        .merge(routes::oauth_routes(state.clone()))
        .merge(routes::query_routes(state))
        .layer(middleware::cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Print startup banner
fn print_startup_banner(config: &config::Config) {
    let banner = r#"
╔═══════════════════════════════════════════════════════════╗
║                                                           ║
║              🌉 Notion Gateway                            ║
║                                                           ║
║  OAuth broker and action dispatcher for the Notion API   ║
║                                                           ║
╚═══════════════════════════════════════════════════════════╝
"#;

    println!("{}", banner);
    println!("  Version:        {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Server:         http://{}:{}",
        config.server_host, config.server_port
    );
    println!("  Notion API:     {}", config.notion_api_base);
    println!("  Notion-Version: {}", config.notion_version);
    println!("  Redirect URI:   {}", config.redirect_uri);
    println!(
        "  Credentials:    {}",
        config
            .database_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "in-memory".to_string())
    );
    println!(
        "  Proxy API key:  {}",
        if config.proxy_api_key.is_some() {
            "required"
        } else {
            "disabled"
        }
    );
    println!("  Log Level:      {}", config.log_level);
    println!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
