use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

const DEFAULT_CONFIG_FILE: &str = "config-probe.json";
const MAX_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: SocketAddr,
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "default_enable_latency_history")]
    pub enable_latency_history: bool,
}

fn default_listen_addr() -> SocketAddr {
    ([0, 0, 0, 0], 8080).into()
}

fn default_metrics_addr() -> SocketAddr {
    ([0, 0, 0, 0], 9100).into()
}

fn default_timeout_ms() -> u64 {
    crate::prober::tcp_connect::DEFAULT_TIMEOUT_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_enable_latency_history() -> bool {
    false
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            metrics_addr: default_metrics_addr(),
            default_timeout_ms: default_timeout_ms(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            enable_latency_history: default_enable_latency_history(),
        }
    }
}

impl ServiceConfig {
    /// Get the log level as a tracing::Level
    pub fn get_tracing_level(&self) -> Result<tracing::Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(tracing::Level::TRACE),
            "debug" => Ok(tracing::Level::DEBUG),
            "info" => Ok(tracing::Level::INFO),
            "warn" | "warning" => Ok(tracing::Level::WARN),
            "error" => Ok(tracing::Level::ERROR),
            _ => Err(anyhow::anyhow!("Invalid log level: {}. Valid levels are: trace, debug, info, warn, error", self.log_level))
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.get_tracing_level()?;
        if self.default_timeout_ms == 0 || self.default_timeout_ms > MAX_TIMEOUT_MS {
            return Err(anyhow::anyhow!(
                "default_timeout_ms must be between 1 and {}, got {}",
                MAX_TIMEOUT_MS,
                self.default_timeout_ms
            ));
        }
        Ok(())
    }

    /// Apply `LISTEN_ADDR` and `PROBE_TIMEOUT_MS` on top of the file values.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("LISTEN_ADDR") {
            self.listen_addr = addr
                .parse()
                .with_context(|| format!("Invalid LISTEN_ADDR: {}", addr))?;
        }
        if let Some(ms) = lookup("PROBE_TIMEOUT_MS") {
            self.default_timeout_ms = ms
                .parse()
                .with_context(|| format!("Invalid PROBE_TIMEOUT_MS: {}", ms))?;
        }
        Ok(())
    }
}

pub struct ConfigManager {
    pub config: Arc<RwLock<ServiceConfig>>,
}

impl ConfigManager {
    pub async fn start() -> Result<Self> {
        let explicit = std::env::var("CONFIG_FILE").ok();
        let config_file = explicit
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        if explicit.is_none() && !Path::new(&config_file).exists() {
            println!("No {} found, using built-in defaults", config_file);
            let mut initial = ServiceConfig::default();
            initial.apply_overrides(|k| std::env::var(k).ok())?;
            initial.validate()?;
            return Ok(ConfigManager {
                config: Arc::new(RwLock::new(initial)),
            });
        }

        Self::start_with_local_file(config_file).await
    }

    async fn start_with_local_file(config_file: String) -> Result<Self> {
        println!("Starting with local file: {}", config_file);

        let initial = Self::load_file_config(&config_file).await?;
        let config = Arc::new(RwLock::new(initial));

        let poll_interval_sec: u64 = std::env::var("CONFIG_POLL_INTERVAL_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        // Spawn background task to watch file for changes
        {
            let config_clone = config.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(tokio::time::Duration::from_secs(poll_interval_sec)).await;
                    match Self::load_file_config(&config_file).await {
                        Ok(new_cfg) => {
                            let mut c = config_clone.write().await;
                            if *c != new_cfg {
                                tracing::info!(
                                    timeout_ms = new_cfg.default_timeout_ms,
                                    "Local config file updated"
                                );
                                *c = new_cfg;
                            }
                        }
                        Err(e) => {
                            tracing::error!("Error reading config file {}: {:?}", config_file, e);
                        }
                    }
                }
            });
        }

        Ok(ConfigManager { config })
    }

    async fn load_file_config(file_path: &str) -> Result<ServiceConfig> {
        if !Path::new(file_path).exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", file_path));
        }

        let content = fs::read_to_string(file_path).await?;
        let mut config: ServiceConfig = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", file_path))?;
        config.apply_overrides(|k| std::env::var(k).ok())?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg: ServiceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, ServiceConfig::default());
        assert_eq!(cfg.default_timeout_ms, 5000);
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.log_format, LogFormat::Text);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_document_overrides_fields() {
        let cfg: ServiceConfig = serde_json::from_str(
            r#"{"listen_addr":"127.0.0.1:3000","default_timeout_ms":1500,"log_format":"json","log_level":"DEBUG"}"#,
        )
        .unwrap();
        assert_eq!(cfg.listen_addr.port(), 3000);
        assert_eq!(cfg.default_timeout_ms, 1500);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.get_tracing_level().unwrap(), tracing::Level::DEBUG);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let cfg = ServiceConfig { log_level: "loud".into(), ..Default::default() };
        assert!(cfg.validate().is_err());

        let cfg = ServiceConfig { default_timeout_ms: 0, ..Default::default() };
        assert!(cfg.validate().is_err());

        let cfg = ServiceConfig { default_timeout_ms: MAX_TIMEOUT_MS + 1, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_overrides_take_precedence() {
        let env: HashMap<&str, &str> =
            HashMap::from([("LISTEN_ADDR", "127.0.0.1:9999"), ("PROBE_TIMEOUT_MS", "250")]);
        let mut cfg = ServiceConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.listen_addr.port(), 9999);
        assert_eq!(cfg.default_timeout_ms, 250);

        let mut cfg = ServiceConfig::default();
        assert!(cfg.apply_overrides(|_| Some("nope".to_string())).is_err());
    }

    #[tokio::test]
    async fn loads_config_from_file() {
        let path = std::env::temp_dir().join(format!("config-probe-{}.json", std::process::id()));
        fs::write(&path, r#"{"default_timeout_ms":750,"enable_latency_history":true}"#)
            .await
            .unwrap();

        let path_str = path.to_string_lossy().to_string();
        let cfg = ConfigManager::load_file_config(&path_str).await;
        let _ = fs::remove_file(&path).await;

        let cfg = cfg.unwrap();
        assert!(cfg.enable_latency_history);
        assert_eq!(cfg.default_timeout_ms, 750);

        assert!(ConfigManager::load_file_config("/nonexistent/config-probe.json").await.is_err());
    }
}
