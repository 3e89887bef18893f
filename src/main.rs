use clap::{Arg, Command};
use log::LevelFilter;
use phishguard::api::{self, AppState};
use phishguard::{Config, EmailMessage};
use std::process;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    let matches = Command::new("phishguard")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Phishing-risk scoring service with ledger-backed sender attestations")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/phishguard.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("test-email")
                .long("test-email")
                .value_name("FILE")
                .help("Run one email file through the ingestion pipeline and print the result")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/phishguard.yaml");
    let config_found = std::path::Path::new(config_path).exists();
    let config = match load_config(config_path, config_found) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        config
            .logging
            .level
            .parse::<LevelFilter>()
            .unwrap_or(LevelFilter::Info)
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if !config_found {
        log::warn!("Configuration file '{config_path}' not found, using default configuration");
    }

    if matches.get_flag("test-config") {
        println!("Configuration OK");
        println!("  Listen: {}:{}", config.server.bind_address, config.server.port);
        println!("  API prefix: {:?}", config.server.api_prefix);
        println!("  Scoring backend: {:?}", config.scoring.backend);
        println!("  Ledger backend: {:?}", config.ledger.backend);
        return;
    }

    let state = match AppState::from_config(&config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            eprintln!("Error initializing backends: {e}");
            process::exit(1);
        }
    };

    if let Some(email_file) = matches.get_one::<String>("test-email") {
        if let Err(e) = test_email_file(&state, email_file).await {
            eprintln!("Error: {e}");
            process::exit(1);
        }
        return;
    }

    if let Err(e) = serve(&config, state).await {
        log::error!("Server error: {e}");
        process::exit(1);
    }
}

fn load_config(path: &str, exists: bool) -> anyhow::Result<Config> {
    if exists {
        Config::from_file(path)
    } else {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

async fn test_email_file(state: &AppState, email_file: &str) -> anyhow::Result<()> {
    let bytes = std::fs::read(email_file)?;
    let message = EmailMessage::new(String::from_utf8_lossy(&bytes).into_owned());
    let result = state.pipeline.ingest(&message).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn serve(config: &Config, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = api::router(state, &config.server.api_prefix, config.server.max_body_bytes);

    let bind_addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    log::info!("phishguard listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("phishguard stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received, draining connections");
}
