use clap::Parser;
use log::{error, info};
use scanrelay::configuration::{Args, Config};
use scanrelay::scan_dispatch::{CondaRuntime, OllamaCatalog, ScanDispatcher};
use scanrelay::session_management::SessionLifecycle;
use scanrelay::storage::DatabaseStore;
use scanrelay::web_interface::{ApiContext, WebServer};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    info!("Importing configuration");

    let args = Args::parse();
    let config = Config::load(&args).unwrap_or_else(|e| {
        error!("Unable to load configuration: {}", e);
        std::process::exit(1);
    });

    info!("Configuration imported successfully");

    let store = DatabaseStore::open(&config.storage.database_path)
        .await
        .unwrap_or_else(|e| {
            error!(
                "Unable to open session database {}: {}, exiting...",
                config.storage.database_path.display(),
                e
            );
            std::process::exit(1);
        });
    info!(
        "Session database ready at {}",
        config.storage.database_path.display()
    );

    let runtime = CondaRuntime::new(
        config.scanner.conda_binary.clone(),
        config.scanner.reserved_environments.clone(),
    );
    let lifecycle = SessionLifecycle::new(
        Arc::new(store),
        ScanDispatcher::new(Arc::new(runtime)),
        config.scanner.max_concurrent_scans,
        config.termination_grace(),
    );
    info!(
        "Accepting up to {} concurrent scans",
        config.scanner.max_concurrent_scans
    );

    let server = WebServer::new(ApiContext {
        lifecycle,
        models: OllamaCatalog::new(config.scanner.ollama_binary.clone()),
    });

    if let Err(e) = server
        .start(&config.server.bind_address, config.server.port)
        .await
    {
        error!("Web server stopped: {}, exiting...", e);
        std::process::exit(1);
    }
}
