use config_probe::config::{ConfigManager, LogFormat};
use config_probe::metrics::{self, initialize_metrics};
use config_probe::server;

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    // Load config first to get log level
    let config_mgr = ConfigManager::start().await?;
    let cfg = config_mgr.config.read().await.clone();
    let log_level = cfg.get_tracing_level()?;

    println!("Starting config_probe");

    initialize_metrics(cfg.enable_latency_history);

    if cfg.enable_latency_history {
        println!("Latency history tracking enabled");
    } else {
        println!("Latency history tracking disabled - showing current latency only");
    }

    // Init tracing with configured log level
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("config_probe={}", log_level.as_str().to_lowercase()).parse()?);
    match cfg.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }

    // Start metrics endpoint
    tokio::spawn(metrics::serve_metrics(cfg.metrics_addr));

    info!(
        listen_addr = %cfg.listen_addr,
        timeout_ms = cfg.default_timeout_ms,
        "serving config probe API"
    );
    server::serve(cfg.listen_addr, config_mgr.config.clone()).await;

    Ok(())
}
