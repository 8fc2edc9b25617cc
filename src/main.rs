use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kiosk_server::ServerConfig;
use kiosk_waiver::DocumentRenderer;

/// Fleet coordinator for signature kiosks and admin consoles.
#[derive(Parser, Debug)]
#[command(name = "kioskd", version)]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 5000, env = "KIOSK_PORT")]
    port: u16,

    /// Directory where signed waiver documents are written.
    #[arg(long, default_value = "waivers", env = "KIOSK_STORAGE_DIR")]
    storage_dir: PathBuf,

    /// Company name printed on waiver documents.
    #[arg(long, default_value = "COMPANY NAME", env = "KIOSK_COMPANY_NAME")]
    company_name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    tokio::fs::create_dir_all(&args.storage_dir).await?;

    let config = ServerConfig {
        port: args.port,
        storage_dir: args.storage_dir,
        ..ServerConfig::default()
    };
    let renderer = Arc::new(DocumentRenderer::new(args.company_name));

    let mut handle = kiosk_server::start(config, renderer).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
        _ = handle.join() => {}
    }
    Ok(())
}
