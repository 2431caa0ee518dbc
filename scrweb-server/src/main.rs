//! scrweb relay server entry point.
//!
//! ```text
//! scrweb-server                  Run in the foreground
//! scrweb-server --config <path>  Load a custom config TOML
//! scrweb-server --port <port>    Override the listen port
//! scrweb-server --gen-config     Write default config to stdout
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scrweb_core::{AdbShell, SessionRegistry};
use scrweb_server::AppState;
use scrweb_server::config::ServerConfig;

/// How long shutdown waits for sessions to release their pipelines.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "scrweb-server", about = "Relay device screens to browser viewers")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "scrweb.toml")]
    config: PathBuf,

    /// Listen port, overriding the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ServerConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.port = port;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("scrweb-server v{}", env!("CARGO_PKG_VERSION"));
    info!("capture: {}", config.pipeline.capture_program.display());
    info!("transcode: {}", config.pipeline.transcode_program.display());
    info!("virtual target: {}", config.device.virtual_target);

    let device = config.to_device_config();
    let shell = Arc::new(AdbShell::new(device.adb_path.clone()));
    let registry = SessionRegistry::new(config.to_pipeline_config(), &device, shell);
    let state = AppState::new(registry);

    let addr: SocketAddr =
        format!("{}:{}", config.network.bind_address, config.network.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    let ws_path = config.ws_path();
    info!("listening on ws://{addr}{ws_path}");

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        shutdown.cancel();
    });

    scrweb_server::serve(listener, state, &ws_path, SHUTDOWN_GRACE).await?;
    Ok(())
}
