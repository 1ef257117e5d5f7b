use initdata::{config::AppConfig, router};
use std::net::SocketAddr;

/// Init-data verification server entry point.
///
/// Initializes tracing, loads and validates configuration, and starts the
/// HTTP server. Refuses to start without `BOT_TOKEN`: every verification
/// depends on it.
///
/// # Configuration
/// See [`AppConfig::from_env`]. `RUST_LOG` controls logging verbosity
/// (default: "initdata=debug,tower_http=debug").
///
/// # Deployment
/// Server binds to 0.0.0.0 to accept external connections, required for
/// platforms like Render, Railway, Fly.io, etc.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "initdata=debug,tower_http=debug".into())
        )
        .init();

    tracing::info!("Starting init data verification server");

    let cfg = AppConfig::from_env()?;
    cfg.validate()?;
    let port = cfg.port;

    let app = router(cfg)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Server listening on {}", addr);

    // Peer addresses feed the per-IP rate limiter
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
