use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tracing_subscriber::EnvFilter;

use quizhub_server::config::ServerConfig;
use quizhub_server::{build_app, spawn_background_tasks, tls};

/// How long in-flight connections get to finish once shutdown starts.
const TLS_DRAIN: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    init_tracing();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Quizhub server starting");

    let config = ServerConfig::load();
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    }
    let addr = config.listen_addr.clone();
    let tls = if config.tls.enabled {
        match tls::rustls_config(&config.tls) {
            Ok(rustls) => {
                tracing::info!(
                    cert = %config.tls.cert_file,
                    key = %config.tls.key_file,
                    min_version = %config.tls.min_version,
                    "TLS enabled"
                );
                Some(rustls)
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to load TLS configuration");
                std::process::exit(1);
            },
        }
    } else {
        None
    };

    let (app, state) = build_app(config);
    let reaper = spawn_background_tasks(&state);

    let result = match tls {
        Some(rustls) => serve_tls(&addr, app, rustls).await,
        None => serve_plain(&addr, app).await,
    };
    if let Err(e) = result {
        tracing::error!(addr = %addr, error = %e, "Server error");
        state.cancel.cancel();
        std::process::exit(1);
    }

    state.cancel.cancel();
    let _ = reaper.await;
    tracing::info!("Server shutdown complete");
}

async fn serve_plain(addr: &str, app: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Listening (http)");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn serve_tls(addr: &str, app: Router, rustls: RustlsConfig) -> std::io::Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let handle = axum_server::Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.graceful_shutdown(Some(TLS_DRAIN));
    });

    tracing::info!(addr = %addr, "Listening (https)");
    axum_server::bind_rustls(addr, rustls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("QUIZHUB_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
