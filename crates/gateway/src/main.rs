use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use zg_auth::federated::{LoginStateStore, OauthClient, OidcClient};
use zg_auth::tokens::TokenSigner;
use zg_blobs::BlobStore;
use zg_catalog::Catalog;
use zg_discovery::{DiscoveryProvider, HttpDiscoveryProvider};
use zg_domain::config::{Config, ConfigSeverity, CorsConfig};

use zg_gateway::api;
use zg_gateway::cli::{Cli, Command};
use zg_gateway::runtime::downloads::{spawn_flush_task, DownloadCoalescer};
use zg_gateway::runtime::publish_lock::PublishLockMap;
use zg_gateway::spa;
use zg_gateway::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            let config = Config::from_env().context("reading configuration")?;
            init_tracing(&config.log_level);
            run_server(Arc::new(config)).await
        }
        Some(Command::Version) => {
            println!("ziggurat {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing. `RUST_LOG` wins over `LOG_LEVEL`.
fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("{level},zg_gateway=debug"))),
        )
        .json()
        .init();
}

/// Start the registry server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!(name = %config.registry.name, "ziggurat starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Catalog ──────────────────────────────────────────────────────
    let catalog = Arc::new(
        Catalog::open(&config.storage.db_path).context("opening catalog")?,
    );

    // ── Blob store ───────────────────────────────────────────────────
    let blobs = Arc::new(
        BlobStore::new(
            config.storage.storage_path.clone(),
            config.storage.max_package_size,
        )
        .context("opening blob store")?,
    );

    // ── Token signer (secret validated above, read once) ─────────────
    let signer = Arc::new(TokenSigner::new(config.auth.secret_key.as_bytes().to_vec()));

    // ── Identity providers ───────────────────────────────────────────
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .context("building HTTP client")?;

    let mut oidc: HashMap<String, Arc<OidcClient>> = HashMap::new();
    for provider in &config.auth.oidc {
        oidc.insert(
            provider.id.clone(),
            Arc::new(OidcClient::new(provider.clone(), http.clone())),
        );
    }
    let mut oauth: HashMap<String, Arc<OauthClient>> = HashMap::new();
    for provider in &config.auth.oauth {
        oauth.insert(
            provider.id.clone(),
            Arc::new(OauthClient::new(provider.clone(), http.clone())),
        );
    }
    if !oidc.is_empty() || !oauth.is_empty() {
        tracing::info!(
            oidc = oidc.len(),
            oauth = oauth.len(),
            "federated identity providers ready"
        );
    }

    // ── Discovery client ─────────────────────────────────────────────
    let discovery: Option<Arc<dyn DiscoveryProvider>> = match &config.discovery.url {
        Some(url) => {
            tracing::info!(url = %url, "discovery proxy enabled");
            Some(Arc::new(HttpDiscoveryProvider::new(url.clone(), http.clone())))
        }
        None => None,
    };

    // ── Runtime stores ───────────────────────────────────────────────
    let publish_locks = Arc::new(PublishLockMap::new());
    let downloads = Arc::new(DownloadCoalescer::new());

    let state = AppState {
        config: config.clone(),
        catalog: catalog.clone(),
        blobs,
        signer,
        logins: Arc::new(LoginStateStore::new()),
        oidc: Arc::new(oidc),
        oauth: Arc::new(oauth),
        discovery,
        publish_locks: publish_locks.clone(),
        downloads: downloads.clone(),
    };

    // ── Periodic download-count flush ────────────────────────────────
    spawn_flush_task(downloads.clone(), catalog.clone());

    // ── Periodic publish-lock pruning ────────────────────────────────
    {
        let publish_locks = publish_locks.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                publish_locks.prune_idle();
            }
        });
    }

    // ── CORS layer (config-aware) ────────────────────────────────────
    let cors_layer = build_cors_layer(&config.cors);

    // ── Concurrency limit (backpressure protection) ────────────────
    let max_concurrent = std::env::var("MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    // ── Rate-limit layer (per-IP token bucket via governor) ─────────
    let governor_layer = config.server.rate_limit.as_ref().map(|rl| {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let gov_config = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second)
            .burst_size(rl.burst_size)
            .finish()
            .expect("rate_limit: requests_per_second and burst_size must be > 0");

        tracing::info!(
            requests_per_second = rl.requests_per_second,
            burst_size = rl.burst_size,
            "per-IP rate limiting enabled"
        );

        GovernorLayer {
            config: Arc::new(gov_config),
        }
    });
    if governor_layer.is_none() {
        tracing::info!("per-IP rate limiting disabled (RATE_LIMIT_PER_SECOND=0)");
    }

    // ── Router ───────────────────────────────────────────────────────
    let router = api::router(&state)
        .merge(spa::router(&state))
        .fallback(spa::fallback)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));
    let app = if let Some(gov) = governor_layer {
        router.layer(gov).with_state(state.clone())
    } else {
        router.with_state(state.clone())
    };

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "ziggurat listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    // One final flush so shutdown loses no counted downloads.
    downloads.flush(&catalog);
    tracing::info!("ziggurat stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}

/// Build a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may carry a trailing `*` wildcard for the port segment
/// (e.g. `http://localhost:*`), expanded into a predicate that matches any
/// port on that host. A literal `"*"` allows all origins (not recommended
/// for production).
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    use axum::http::header;

    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    // Partition into exact origins and wildcard-port patterns.
    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();
    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            let origin_str = origin.to_str().unwrap_or("");
            // The remainder after the prefix must be digits only, so
            // "http://localhost:3000.evil.com" cannot slip through.
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
