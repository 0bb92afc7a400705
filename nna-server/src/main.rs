//! NNA classifier server entry point.
//!
//! ```text
//! nna-server                  Run in the foreground
//! nna-server --config <path>  Load a custom config TOML
//! nna-server --gen-config     Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nna_core::AcceleratorProxy;
use nna_server::config::ServerConfig;
use nna_server::service::ClassifierServer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "nna-server", about = "NNA image classifier server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "nna-server.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        println!("{}", ServerConfig::default_toml()?);
        return Ok(());
    }

    // Load config.
    let config = ServerConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let session_config = config.to_session_config()?;
    info!("nna-server v{}", env!("CARGO_PKG_VERSION"));
    info!("address: {}", config.bind_addr());
    info!("frame: {}", session_config.layout);
    info!("backend: {}", config.accelerator.backend);

    // An engine that cannot be configured is fatal.
    let accelerator = match config
        .build_driver()
        .and_then(|driver| AcceleratorProxy::configure(driver, config.to_accelerator_config()))
    {
        Ok(proxy) => proxy.into_shared(),
        Err(e) => {
            error!("accelerator setup failed: {e}");
            return Err(e.into());
        }
    };

    let server = ClassifierServer::new(config, accelerator);
    let stop = server.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(true, Ordering::SeqCst);
    });

    server.run().await?;

    Ok(())
}
