use clap::Parser;
use perflab_server::{metrics_router, serve};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "perflab-server")]
#[command(about = "Instrumented helloworld.Greeter service for load testing", long_about = None)]
#[command(version)]
struct Args {
    /// The server port
    #[arg(long, default_value_t = 50051, env = "GREETER_PORT")]
    port: u16,

    /// The metrics port
    #[arg(long, default_value_t = 2112, env = "GREETER_METRICS_PORT")]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let args = Args::parse();

    let metrics_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.metrics_port));
    let metrics_listener = TcpListener::bind(metrics_addr).await?;
    tracing::info!("Starting metrics server on {}", metrics_addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, metrics_router()).await {
            tracing::error!("Metrics server failed: {}", e);
        }
    });

    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port))).await?;
    serve(listener, shutdown_signal()).await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_target(false).init();
}

/// Wait for SIGTERM or SIGINT signal for graceful shutdown.
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
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
