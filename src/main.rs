use anyhow::Context;
use clap::Parser;
use github_token_proxy::api::build_routes;
use github_token_proxy::core::models::{ProxyConfig, UpstreamProxyConfig};
use github_token_proxy::core::storage::{derive_key, generate_key, EncryptedFileVault};
use github_token_proxy::core::{DefaultStorageConfig, StorageConfig};
use github_token_proxy::state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Directory holding the encrypted token file (default ~/.github_token_proxy)
    #[arg(short, long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Shared secret for the admin endpoints (X-Admin-Password)
    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,

    /// Vault key: 64 hex chars, or any passphrase (hashed with SHA-256)
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Comma separated CORS origins, "*" allows all
    #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',', default_value = "*")]
    allowed_origins: Vec<String>,

    #[arg(long, env = "UPSTREAM_BASE_URL", default_value = "https://api.github.com")]
    upstream_base_url: String,

    /// Upstream request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 10)]
    request_timeout: u64,

    /// Optional outbound proxy (http://, https://, socks5://)
    #[arg(long, env = "UPSTREAM_PROXY")]
    upstream_proxy: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let storage = match args.data_dir {
        Some(dir) => DefaultStorageConfig::with_path(dir),
        None => DefaultStorageConfig::new(),
    }
    .map_err(anyhow::Error::msg)
    .context("Failed to prepare data directory")?;

    let key = match args.secret_key.as_deref().filter(|k| !k.is_empty()) {
        Some(secret) => derive_key(secret),
        None => {
            tracing::warn!(
                "SECRET_KEY is not set, using an ephemeral key: tokens saved now cannot be read after a restart"
            );
            generate_key()
        }
    };
    let vault = Arc::new(EncryptedFileVault::new(storage.tokens_path(), key));

    let admin_password = args.admin_password.filter(|p| !p.is_empty());
    if admin_password.is_none() {
        tracing::warn!("ADMIN_PASSWORD is not set, all admin endpoints will reject requests");
    }

    let config = ProxyConfig {
        port: args.port,
        admin_password,
        allowed_origins: args
            .allowed_origins
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect(),
        upstream_base_url: args.upstream_base_url,
        request_timeout: args.request_timeout,
        upstream_proxy: UpstreamProxyConfig::from_url(args.upstream_proxy),
        ..ProxyConfig::default()
    };

    let app_state =
        Arc::new(AppState::new(config, vault).context("Failed to build upstream client")?);

    // 启动时加载已持久化的 Token
    let count = app_state.token_manager.load_tokens().await;
    tracing::info!(
        "Loaded {} token(s) from {:?}",
        count,
        storage.tokens_path()
    );

    let app = build_routes(app_state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], app_state.config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
