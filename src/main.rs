use std::path::Path;

use tracing_subscriber::EnvFilter;

use plantwatch::app_context::AppContext;
use plantwatch::config::{load_config, Config};
use plantwatch::jobs::start_background_jobs;
use plantwatch::store::Store;

const CONFIG_PATH: &str = "config.toml";

fn init_json_logging() {
    if let Err(error) = tracing_log::LogTracer::init() {
        eprintln!(
            "logging bridge initialization failed (continuing with existing logger): {}",
            error
        );
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .finish();

    if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("global logger initialization failed: {}", error);
    }
}

fn load_or_default_config() -> Option<Config> {
    if Path::new(CONFIG_PATH).exists() {
        match load_config(CONFIG_PATH) {
            Ok(config) => Some(config),
            Err(error) => {
                log::error!("Configuration error: {}", error);
                None
            }
        }
    } else {
        log::info!("no {} found, running with built-in defaults", CONFIG_PATH);
        let config: Config = match toml::from_str("") {
            Ok(config) => config,
            Err(error) => {
                log::error!("default configuration failed to build: {}", error);
                return None;
            }
        };
        if let Err(error) = config.validate() {
            log::error!("default configuration failed validation: {}", error);
            return None;
        }
        Some(config)
    }
}

#[tokio::main]
async fn main() {
    init_json_logging();

    let Some(config) = load_or_default_config() else {
        return;
    };

    log::info!("plantwatch is starting...");

    let store = match Store::open_from_config(&config.store) {
        Ok(store) => store,
        Err(error) => {
            log::error!("failed to open store at {}: {}", config.store.path, error);
            return;
        }
    };

    let ctx = match AppContext::new(config, store) {
        Ok(ctx) => ctx,
        Err(error) => {
            log::error!("failed to build application state: {}", error);
            return;
        }
    };

    log::info!(
        "monitoring {} equipment at {}s tick interval",
        ctx.registry.len(),
        ctx.config.simulator.tick_interval_secs
    );
    let jobs = start_background_jobs(ctx);

    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("shutdown signal received, finishing in-flight work"),
        Err(error) => log::error!("failed to listen for shutdown signal: {}", error),
    }

    jobs.shutdown().await;
    log::info!("plantwatch stopped");
}
