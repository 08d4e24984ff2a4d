use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `SEGMENTATOR__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Size of the fixed connection pool shared by handlers and the sweeper.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Upper bound on the startup connect-retry loop, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// SQLite busy timeout, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    /// Interval between TTL sweep ticks, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_file_ext")]
    pub file_ext: String,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
    /// Public base URL used when handing back report links.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_service_name() -> String {
    "segmentator".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_db_path() -> String {
    "segmentator.db".to_string()
}
fn default_max_connections() -> usize {
    8
}
fn default_connect_timeout_secs() -> u64 {
    30
}
fn default_busy_timeout_ms() -> u64 {
    5000
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_file_prefix() -> String {
    "report_".to_string()
}
fn default_file_ext() -> String {
    ".csv".to_string()
}
fn default_storage_dir() -> String {
    "reports".to_string()
}
fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            file_prefix: default_file_prefix(),
            file_ext: default_file_ext(),
            storage_dir: default_storage_dir(),
            public_base_url: default_public_base_url(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            api: ApiConfig::default(),
            store: StoreConfig::default(),
            sweeper: SweeperConfig::default(),
            report: ReportConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("SEGMENTATOR")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
