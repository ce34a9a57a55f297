use std::env;
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
    pub drafts: DraftConfig,
    pub sessions: SessionConfig,
    pub payment: PaymentConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let directory = env::var("EVISA_DRAFT_DIR")
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from);

        let idle_timeout = match env::var("EVISA_SESSION_IDLE_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::InvalidSessionTimeout { value: raw })?,
            Err(_) => SessionConfig::DEFAULT_IDLE_TIMEOUT,
        };

        let fee_minor_units = match env::var("EVISA_FEE_MINOR_UNITS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|amount| *amount > 0)
                .ok_or(ConfigError::InvalidFee { value: raw })?,
            Err(_) => PaymentConfig::DEFAULT_FEE_MINOR_UNITS,
        };
        let currency = env::var("EVISA_FEE_CURRENCY")
            .map(|raw| raw.trim().to_ascii_lowercase())
            .unwrap_or_else(|_| PaymentConfig::DEFAULT_CURRENCY.to_string());
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::InvalidCurrency { value: currency });
        }

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                ansi: environment == AppEnvironment::Development,
            },
            drafts: DraftConfig { directory },
            sessions: SessionConfig { idle_timeout },
            payment: PaymentConfig {
                fee_minor_units,
                currency,
                description: PaymentConfig::DEFAULT_DESCRIPTION.to_string(),
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
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
    pub ansi: bool,
}

/// Where in-progress application drafts are kept. `None` keeps them in memory.
#[derive(Debug, Clone, Default)]
pub struct DraftConfig {
    pub directory: Option<PathBuf>,
}

/// Lifetime of server-side form sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub idle_timeout: Duration,
}

impl SessionConfig {
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Self::DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Application fee charged at checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfig {
    pub fee_minor_units: u64,
    pub currency: String,
    pub description: String,
}

impl PaymentConfig {
    pub const DEFAULT_FEE_MINOR_UNITS: u64 = 5900;
    pub const DEFAULT_CURRENCY: &'static str = "usd";
    pub const DEFAULT_DESCRIPTION: &'static str = "E-Visa Application Fee";
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            fee_minor_units: Self::DEFAULT_FEE_MINOR_UNITS,
            currency: Self::DEFAULT_CURRENCY.to_string(),
            description: Self::DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_PORT must be a valid u16")]
    InvalidPort,
    #[error("APP_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost { source: std::net::AddrParseError },
    #[error("EVISA_SESSION_IDLE_SECS must be a positive number of seconds (found '{value}')")]
    InvalidSessionTimeout { value: String },
    #[error("EVISA_FEE_MINOR_UNITS must be a positive integer (found '{value}')")]
    InvalidFee { value: String },
    #[error("EVISA_FEE_CURRENCY must be a three letter ISO code (found '{value}')")]
    InvalidCurrency { value: String },
}
