use std::process::ExitCode;

use tracing::{error, info};

use scribevault::{Config, Database, Library, WebServer};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> ExitCode {
    let config_path =
        std::env::var("SCRIBEVAULT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    // Load configuration
    let config = match Config::load_with_env(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {config_path}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = scribevault::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        scribevault::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    info!("ScribeVault starting");

    let db = match Database::open(&config.database.path).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database {}: {e}", config.database.path);
            return ExitCode::FAILURE;
        }
    };

    let library = match Library::new(db, &config.files, &config.ingest) {
        Ok(library) => library,
        Err(e) => {
            error!("Failed to initialize file storage: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        storage = %config.files.storage_path,
        staging = %config.files.staging_path,
        "File storage initialized"
    );

    let server = match WebServer::new(&config.web, library, &config.uploads) {
        Ok(server) => server,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Web server error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
