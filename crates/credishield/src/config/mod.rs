use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub scoring: ScoringConfig,
    pub session: SessionConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let base_url = env::var("CREDISHIELD_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string())
            .trim_end_matches('/')
            .to_string();
        if base_url.is_empty() {
            return Err(ConfigError::MissingApiUrl);
        }

        let scoring = ScoringConfig {
            base_url,
            request_timeout: Duration::from_millis(read_positive_u64(
                "CREDISHIELD_TIMEOUT_MS",
                10_000,
            )?),
            max_retries: read_u32("CREDISHIELD_MAX_RETRIES", 1)?,
            retry_base_delay: Duration::from_millis(read_u64("CREDISHIELD_RETRY_DELAY_MS", 600)?),
            debounce: Duration::from_millis(read_u64("CREDISHIELD_DEBOUNCE_MS", 600)?),
            health_interval: Duration::from_secs(read_positive_u64(
                "CREDISHIELD_HEALTH_INTERVAL_SECS",
                15,
            )?),
        };

        let session = SessionConfig {
            directory: env::var("CREDISHIELD_SESSION_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".credishield-session")),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            scoring,
            session,
        })
    }
}

fn read_u64(variable: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(variable) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { variable, raw }),
        Err(_) => Ok(default),
    }
}

fn read_u32(variable: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(variable) {
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidNumber { variable, raw }),
        Err(_) => Ok(default),
    }
}

/// Like [`read_u64`] but zero is rejected.
fn read_positive_u64(variable: &'static str, default: u64) -> Result<u64, ConfigError> {
    match read_u64(variable, default)? {
        0 => Err(ConfigError::MustBePositive { variable }),
        value => Ok(value),
    }
}

/// Settings controlling the HTTP server binding of the offline demo scorer.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Remote scoring endpoint and the timing knobs of the assessment loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    pub base_url: String,
    /// Hard ceiling for a single HTTP attempt; retries multiply the worst case.
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub debounce: Duration,
    pub health_interval: Duration,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout: Duration::from_secs(10),
            max_retries: 1,
            retry_base_delay: Duration::from_millis(600),
            debounce: Duration::from_millis(600),
            health_interval: Duration::from_secs(15),
        }
    }
}

/// Location of file-backed session state.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub directory: PathBuf,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str, raw: String },
    MustBePositive { variable: &'static str },
    MissingApiUrl,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable, raw } => {
                write!(f, "{variable} must be a non-negative integer (got '{raw}')")
            }
            ConfigError::MustBePositive { variable } => {
                write!(f, "{variable} must be greater than zero")
            }
            ConfigError::MissingApiUrl => write!(f, "CREDISHIELD_API_URL must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::MustBePositive { .. }
            | ConfigError::MissingApiUrl => None,
        }
    }
}
