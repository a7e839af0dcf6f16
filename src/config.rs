use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub scheduler_poll_interval_secs: u64,
    pub scheduler_workers: usize,
    pub scheduler_batch_size: i64,
    pub webhook_timeout_secs: u64,
    pub ai_timeout_secs: u64,
    pub ai_api_base: String,
    pub ai_api_key: Option<String>,
    pub ai_model: String,
    /// Without a gateway, outbound messages go to the logging mock adapter
    pub channel_gateway_url: Option<String>,
    pub channel_gateway_token: Option<String>,
    pub webhook_signing_secret: Option<String>,
    pub instance_id: String,
    pub otel_exporter_endpoint: Option<String>,
    pub service_name: String,
    pub metrics_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://autoreach.db?mode=rwc".to_string());

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let metrics_port = env::var("METRICS_PORT")
            .unwrap_or_else(|_| "9000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        Ok(Config {
            database_url,
            server_host,
            server_port,
            scheduler_poll_interval_secs: number("SCHEDULER_POLL_INTERVAL_SECS", 5)?,
            scheduler_workers: number("SCHEDULER_WORKERS", 8)?,
            scheduler_batch_size: number("SCHEDULER_BATCH_SIZE", 50)?,
            webhook_timeout_secs: number("WEBHOOK_TIMEOUT_SECS", 30)?,
            ai_timeout_secs: number("AI_TIMEOUT_SECS", 45)?,
            ai_api_base: env::var("AI_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            ai_api_key: optional("AI_API_KEY"),
            ai_model: env::var("AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            channel_gateway_url: optional("CHANNEL_GATEWAY_URL"),
            channel_gateway_token: optional("CHANNEL_GATEWAY_TOKEN"),
            webhook_signing_secret: optional("WEBHOOK_SIGNING_SECRET"),
            instance_id: env::var("INSTANCE_ID")
                .unwrap_or_else(|_| format!("autoreach-{}", std::process::id())),
            otel_exporter_endpoint: optional("OTEL_EXPORTER_OTLP_ENDPOINT"),
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "autoreach".to_string()),
            metrics_port,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_poll_interval_secs.max(1))
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_secs)
    }
}

/// Empty values count as unset
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn number<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        _ => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("{key} must be a number, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
}
