use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub purge: PurgeConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

/// Retry policy and template defaults for the delivery task
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Maximum delivery attempts per notification
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Base backoff unit in milliseconds (attempt N waits N * this)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Template used when a notification carries no template name
    #[serde(default = "default_template")]
    pub default_template: String,
    /// Write `SENT` back to the store after a successful send
    #[serde(default)]
    pub mark_sent_on_success: bool,
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_template() -> String {
    "default-email".to_string()
}

impl DeliveryConfig {
    /// Delay to wait after the given (1-based) failed attempt
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(attempt as u64))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Record store backend: "memory" or "postgres"
    #[serde(default = "default_store_backend")]
    pub backend: String,
}

fn default_store_backend() -> String {
    "memory".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u32,
}

fn default_database_url() -> String {
    "postgres://localhost:5432/lms".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u32 {
    5
}

fn default_idle_timeout() -> u32 {
    600
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Mail transport: "smtp" or "log"
    #[serde(default = "default_mail_transport")]
    pub transport: String,
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default = "default_mail_timeout")]
    pub timeout_seconds: u64,
}

fn default_mail_transport() -> String {
    "log".to_string()
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    1025
}

fn default_from_email() -> String {
    "noreply@localhost".to_string()
}

fn default_from_name() -> String {
    "LMS Notifications".to_string()
}

fn default_mail_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplatesConfig {
    /// Directory of `*.html` templates loaded at startup (file stem = template id)
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurgeConfig {
    #[serde(default = "default_purge_enabled")]
    pub enabled: bool,
    #[serde(default = "default_purge_interval")]
    pub interval_seconds: u64,
}

fn default_purge_enabled() -> bool {
    true
}

fn default_purge_interval() -> u64 {
    3600 // 1 hour
}

/// Prometheus scrape endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Address of the `/metrics` listener
    #[serde(default = "default_metrics_addr")]
    pub bind_addr: String,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
    /// Emit JSON log lines instead of the human-readable format
    #[serde(default)]
    pub json_logs: bool,
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "lms-notification-service".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("delivery.max_retry_attempts", 3)?
            .set_default("delivery.retry_delay_ms", 1000)?
            .set_default("delivery.default_template", "default-email")?
            .set_default("store.backend", "memory")?
            .set_default("mail.transport", "log")?
            .set_default("purge.interval_seconds", 3600)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // DELIVERY__RETRY_DELAY_MS, STORE__BACKEND, MAIL__HOST, DATABASE__URL, etc.
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: default_max_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            default_template: default_template(),
            mark_sent_on_success: false,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_size: default_pool_size(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            transport: default_mail_transport(),
            host: default_smtp_host(),
            port: default_smtp_port(),
            from_email: default_from_email(),
            from_name: default_from_name(),
            username: None,
            password: None,
            use_tls: false,
            timeout_seconds: default_mail_timeout(),
        }
    }
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            enabled: default_purge_enabled(),
            interval_seconds: default_purge_interval(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            bind_addr: default_metrics_addr(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
            json_logs: false,
        }
    }
}
