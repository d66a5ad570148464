use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Url;
use std::path::PathBuf;

pub const DEFAULT_NOTION_API_BASE: &str = "https://api.notion.com/v1";

/// Protocol version this integration was built against
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

/// Notion Gateway - OAuth broker and action dispatcher
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "3000")]
    pub port: u16,

    /// Notion OAuth client identifier
    #[arg(long, env = "NOTION_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Notion OAuth client secret
    #[arg(long, env = "NOTION_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// OAuth callback URL registered with Notion
    #[arg(long, env = "REDIRECT_URI")]
    pub redirect_uri: Option<String>,

    /// Notion API base URL
    #[arg(long, env = "NOTION_API_BASE", default_value = DEFAULT_NOTION_API_BASE)]
    pub api_base: String,

    /// Value of the Notion-Version header
    #[arg(long, env = "NOTION_VERSION", default_value = DEFAULT_NOTION_VERSION)]
    pub notion_version: String,

    /// `owner` parameter of the authorization URL
    #[arg(long, env = "NOTION_OAUTH_OWNER", default_value = "user")]
    pub oauth_owner: String,

    /// SQLite file for stored credentials (in-memory when unset)
    #[arg(short = 'd', long, env = "DATABASE_FILE")]
    pub db_file: Option<String>,

    /// Proxy API key required on /query
    #[arg(short = 'k', long, env = "PROXY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "30")]
    pub http_connect_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "60")]
    pub http_timeout: u64,

    /// Idle connections kept per host
    #[arg(long, env = "HTTP_MAX_CONNECTIONS", default_value = "20")]
    pub http_max_connections: usize,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Inbound authentication
    pub proxy_api_key: Option<String>,

    // Notion OAuth client
    pub notion_client_id: String,
    pub notion_client_secret: String,
    pub redirect_uri: String,
    pub oauth_owner: String,

    // Notion API
    pub notion_api_base: String,
    pub notion_version: String,

    // Credential storage
    pub database_file: Option<PathBuf>,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();

        // Hosting platforms commonly inject PORT rather than SERVER_PORT
        let server_port = match std::env::var("PORT").ok().and_then(|s| s.parse().ok()) {
            Some(port) if std::env::var("SERVER_PORT").is_err() => port,
            _ => args.port,
        };

        let config = Config {
            server_host: args.host,
            server_port,

            proxy_api_key: args.api_key.filter(|k| !k.is_empty()),

            notion_client_id: args
                .client_id
                .context("NOTION_CLIENT_ID is required (use --client-id or set NOTION_CLIENT_ID)")?,
            notion_client_secret: args.client_secret.context(
                "NOTION_CLIENT_SECRET is required (use --client-secret or set NOTION_CLIENT_SECRET)",
            )?,
            redirect_uri: args
                .redirect_uri
                .context("REDIRECT_URI is required (use --redirect-uri or set REDIRECT_URI)")?,
            oauth_owner: args.oauth_owner,

            notion_api_base: args.api_base.trim_end_matches('/').to_string(),
            notion_version: args.notion_version,

            database_file: args
                .db_file
                .filter(|s| !s.is_empty())
                .map(|s| expand_tilde(&s)),

            http_max_connections: args.http_max_connections,
            http_connect_timeout: args.http_connect_timeout,
            http_request_timeout: args.http_timeout,

            log_level: args.log_level,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.notion_client_id.trim().is_empty() {
            anyhow::bail!("NOTION_CLIENT_ID must not be empty");
        }
        if self.notion_client_secret.trim().is_empty() {
            anyhow::bail!("NOTION_CLIENT_SECRET must not be empty");
        }
        if self.notion_version.trim().is_empty() {
            anyhow::bail!("NOTION_VERSION must not be empty");
        }

        Url::parse(&self.redirect_uri)
            .with_context(|| format!("REDIRECT_URI is not a valid URL: {}", self.redirect_uri))?;
        Url::parse(&self.notion_api_base).with_context(|| {
            format!(
                "NOTION_API_BASE is not a valid URL: {}",
                self.notion_api_base
            )
        })?;

        if let Some(ref db_file) = self.database_file {
            if let Some(parent) = db_file.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    anyhow::bail!(
                        "Directory for DATABASE_FILE does not exist: {}",
                        parent.display()
                    );
                }
            }
        }

        Ok(())
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
pub(crate) fn test_config(api_base: &str) -> Config {
    Config {
        server_host: "127.0.0.1".to_string(),
        server_port: 3000,
        proxy_api_key: None,
        notion_client_id: "test-client-id".to_string(),
        notion_client_secret: "test-client-secret".to_string(),
        redirect_uri: "https://gateway.example.com/oauth/callback".to_string(),
        oauth_owner: "user".to_string(),
        notion_api_base: api_base.to_string(),
        notion_version: DEFAULT_NOTION_VERSION.to_string(),
        database_file: None,
        http_max_connections: 20,
        http_connect_timeout: 5,
        http_request_timeout: 10,
        log_level: "info".to_string(),
    }
}
