// src/main.rs

//! The main entry point for a triadstore node.

use anyhow::Result;
use std::env;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};
use triadstore::config::Config;
use triadstore::server;

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("triadstore version {VERSION}");
        return Ok(());
    }

    // The configuration path comes from --config, defaulting to "config.toml".
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    let mut config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };

    // --listen overrides server.listen.
    if let Some(index) = args.iter().position(|arg| arg == "--listen") {
        match args.get(index + 1) {
            Some(addr) => config.server.listen = addr.clone(),
            None => {
                eprintln!("--listen flag requires a value");
                std::process::exit(1);
            }
        }
    }

    let initial_log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());

    // Reloadable so SIGHUP can change the level without a restart.
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    if let Err(e) = server::run(config, Some(config_path.to_string()), Arc::new(reload_handle)).await
    {
        error!("Node runtime error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
