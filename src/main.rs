use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use axum::{Router, middleware};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_governor::{
    GovernorLayer,
    governor::GovernorConfigBuilder,
    key_extractor::{PeerIpKeyExtractor, SmartIpKeyExtractor},
};
use tower_http::set_header::SetResponseHeaderLayer;

use anyhow::anyhow;

use phonebridge::{ServerConfig, middleware::call_limit_middleware, routes, state::AppState};

/// Phonebridge - relay phone calls to a conversational AI
#[derive(Parser, Debug)]
#[command(name = "phonebridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("phonebridge=info,tower_http=info")),
        )
        .init();

    // Must be installed before the first outbound TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        ServerConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    let address = config.address();
    let rate_limit_rps = config.rate_limit_requests_per_second;
    let rate_limit_period = config.rate_limit_period();
    let rate_limit_burst = config.rate_limit_burst_size;
    let trust_proxy_headers = config.trust_proxy_headers;
    let sweep_interval = Duration::from_secs(config.token_sweep_interval_seconds);
    if config.webhook_url.is_none() {
        warn!("WEBHOOK_URL not set; signatures are checked against the URL rebuilt from request headers");
    }

    let app_state = AppState::new(config);

    let shutdown = CancellationToken::new();
    let sweeper = app_state
        .tokens
        .spawn_sweeper(sweep_interval, shutdown.clone());

    // Rate limiting (disabled when rate >= 100000 for load testing).
    // Proxy headers are client-controlled unless a proxy rewrites them, so the
    // socket peer is the key by default.
    let (peer_limit, proxy_limit) = if rate_limit_rps >= 100000 {
        info!("Rate limiting disabled (rate >= 100000/s)");
        (None, None)
    } else if trust_proxy_headers {
        let governor_config = GovernorConfigBuilder::default()
            .period(rate_limit_period)
            .burst_size(rate_limit_burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow!("Invalid rate limiter configuration"))?;
        info!("Rate limiting webhook by forwarded client IP");
        (None, Some(GovernorLayer::new(governor_config)))
    } else {
        let governor_config = GovernorConfigBuilder::default()
            .period(rate_limit_period)
            .burst_size(rate_limit_burst)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow!("Invalid rate limiter configuration"))?;
        (Some(GovernorLayer::new(governor_config)), None)
    };

    // Webhook is rate limited; the media stream is gated by the call limit instead
    let voice_routes = routes::voice::create_voice_router()
        .layer(tower::util::option_layer(peer_limit))
        .layer(tower::util::option_layer(proxy_limit));

    let media_routes = routes::media::create_media_router().layer(
        middleware::from_fn_with_state(app_state.clone(), call_limit_middleware),
    );

    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_CONTENT_TYPE_OPTIONS,
            http::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_FRAME_OPTIONS,
            http::HeaderValue::from_static("DENY"),
        ));

    let app = Router::new()
        .merge(routes::api::create_api_router())
        .merge(voice_routes)
        .merge(media_routes)
        .with_state(app_state)
        .layer(security_headers);

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    let listener = TcpListener::bind(&socket_addr).await?;
    info!("Server listening on http://{}", socket_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    shutdown.cancel();
    let _ = sweeper.await;
    info!("Server stopped");

    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM, then cancel background tasks.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}
