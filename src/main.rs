use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;

use sse_chat::config;
use sse_chat::server::HttpServer;
use sse_chat::storage::MessageStore;

#[derive(Parser)]
#[command(name = "sse_chat", version, about = "Database-backed SSE chat server")]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Listen address override (host:port)
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let app_config = config::load_config(&cli.config);
    let listen_addr = cli.listen.unwrap_or_else(|| app_config.listen_addr.clone());
    let db_path = config::resolve_db_path(&app_config);

    if let Some(parent) = Path::new(&db_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let store = Arc::new(MessageStore::open(&db_path)?);
    log::info!("Message store opened at {db_path}");

    let server = HttpServer::bind(
        &listen_addr,
        store,
        Duration::from_millis(app_config.poll_interval_ms),
    )?;
    if let Some(addr) = server.local_addr() {
        log::info!("Listening on http://{addr}");
    }

    let shutdown = server.shutdown_handle();
    let accept_loop = tokio::task::spawn_blocking(move || server.run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Shutdown signal received");
            // Runtime teardown waits for the blocking accept loop, so it
            // has to be unblocked first.
            shutdown.shutdown();
        }
        result = accept_loop => {
            if let Err(err) = result {
                log::error!("Accept loop terminated: {err}");
            }
        }
    }

    Ok(())
}
