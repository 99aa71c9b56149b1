//! medgraph server - main entry point

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use medgraph::{metrics, server, AppContext, Config};

#[derive(Parser)]
#[command(name = "medgraph")]
#[command(about = "Medical knowledge-graph QA assistant server", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to serve the chat application on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    addr: String,

    /// Path the chat WebSocket is mounted under
    #[arg(long, env = "CHAT_MOUNT_PATH", default_value = "/chat")]
    mount_path: String,

    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    /// Directory for the rotating log file
    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Log to stderr and to a daily-rotated file on local disk.
    let file_appender = tracing_appender::rolling::daily(&cli.log_dir, "medgraph.log");
    let (file_writer, _file_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("medgraph=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    info!("Starting medgraph server");

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let config = Config::from_env();
    let ctx = Arc::new(AppContext::initialize(config).await?);

    let addr: SocketAddr = cli.addr.parse()?;
    server::run(ctx, addr, &cli.mount_path).await?;

    Ok(())
}
