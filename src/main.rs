//! Clipper Guard - main entry point
//!
//! Without a subcommand (or with `serve`) this starts the HTTP service.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;

use clipper_guard::cli::{Cli, CliApp, Commands, context::load_config};
use clipper_guard::{create_app, init_tracing};

/// Time given to background tasks after cancellation
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        // Only warn if it's not a "file not found" error
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let cli = Cli::parse();
    match cli.command {
        None | Some(Commands::Serve) => run_server(&cli).await,
        Some(_) => {
            let code = CliApp::new(cli).run().await?;
            std::process::exit(code);
        }
    }
}

/// Run the HTTP server
async fn run_server(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration. Check config/*.toml and CLIPPER_GUARD__* env vars: {}",
            e
        )
    })?;

    // Initialize tracing (after config is loaded so we can use logging config)
    init_tracing(&config.logging).map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!("Starting Clipper Guard...");
    tracing::info!(
        "Configuration loaded: server={}:{}",
        config.server.host,
        config.server.port
    );

    let app_handle = create_app(&config).await?;

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("Server listening on {}", addr);

    // Start server with graceful shutdown
    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app_handle
            .router
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(app_handle.shutdown_token))
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals and cancel background tasks
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }

    tracing::info!("Cancelling background tasks...");
    shutdown_token.cancel();
    tokio::time::sleep(SHUTDOWN_GRACE).await;
}
