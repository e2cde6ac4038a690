//! hush-server - REST API server binary.

use std::net::SocketAddr;

use hush_core::{BackgroundRuntime, EngineConfig, RuntimeConfig};
use hush_server::{create_engine, create_server, create_server_with_auth, AppState};
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive(Level::INFO.into())
        .add_directive("hush_server=debug".parse().unwrap_or_else(|_| Level::DEBUG.into()));

    if std::env::var("HUSH_LOG_JSON").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let host = std::env::var("HUSH_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("HUSH_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .map_err(|e| format!("HUSH_PORT must be a valid port number: {}", e))?;
    let require_auth = std::env::var("HUSH_REQUIRE_AUTH").is_ok();

    let config = match std::env::var("HUSH_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading configuration file");
            EngineConfig::from_file(path)?
        }
        Err(_) => EngineConfig::from_env(),
    };

    let (engine, store) = create_engine(config)?;

    let runtime = BackgroundRuntime::new(engine, RuntimeConfig::from_env()).await?;
    runtime.start().await?;
    info!("Background runtime started (activity monitor + learner)");

    let state = AppState::new_with_runtime(runtime, store);

    let app = if require_auth {
        info!("Authentication enabled");
        create_server_with_auth(state.clone())
    } else {
        info!("Authentication disabled");
        create_server(state.clone())
    };

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting hush-server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("Shutdown signal received, stopping background runtime...");
        })
        .await?;

    if let Some(mut runtime) = state.take_runtime().await {
        runtime.shutdown().await?;
    }

    info!("Server stopped cleanly");
    Ok(())
}
