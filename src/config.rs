//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use crate::payments::types::PaymentMethod;
use std::env;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub settlement: SettlementConfig,
    pub wallet: WalletSdkConfig,
    pub enabled_methods: Vec<PaymentMethod>,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Settlement backend configuration
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Wallet (redirect/approval) provider configuration
#[derive(Debug, Clone)]
pub struct WalletSdkConfig {
    pub sdk_url: String,
    pub api_base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub currency: String,
    pub plan_id: Option<String>,
    pub timeout_secs: u64,
}

fn parse_var<T: FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        let enabled_raw = env::var("ENABLED_PAYMENT_METHODS")
            .unwrap_or_else(|_| "card-processor,wallet-processor".to_string());
        let mut enabled_methods = Vec::new();
        for part in enabled_raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let method = PaymentMethod::from_str(part)
                .map_err(|_| ConfigError::InvalidValue("ENABLED_PAYMENT_METHODS".to_string()))?;
            if !enabled_methods.contains(&method) {
                enabled_methods.push(method);
            }
        }

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            settlement: SettlementConfig::from_env()?,
            wallet: WalletSdkConfig::from_env()?,
            enabled_methods,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.logging.validate()?;
        if self.enabled_methods.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one payment method must be enabled".to_string(),
            ));
        }
        // Both adapters settle through the backend.
        self.settlement.validate()?;
        if self.enabled_methods.contains(&PaymentMethod::WalletProcessor) {
            self.wallet.validate()?;
        }

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("SERVER_PORT", "8000")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl SettlementConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(SettlementConfig {
            base_url: env::var("SETTLEMENT_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9000/api".to_string()),
            api_key: env::var("SETTLEMENT_API_KEY").ok().filter(|k| !k.is_empty()),
            timeout_secs: parse_var("SETTLEMENT_TIMEOUT_SECS", "30")?,
            max_retries: parse_var("SETTLEMENT_MAX_RETRIES", "2")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_url(&self.base_url) {
            return Err(ConfigError::InvalidValue(
                "SETTLEMENT_BASE_URL must be a valid URL".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "SETTLEMENT_TIMEOUT_SECS".to_string(),
            ));
        }

        Ok(())
    }
}

impl WalletSdkConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(WalletSdkConfig {
            sdk_url: env::var("WALLET_SDK_URL")
                .unwrap_or_else(|_| "https://www.paypal.com/sdk/js".to_string()),
            api_base_url: env::var("WALLET_API_BASE_URL")
                .unwrap_or_else(|_| "https://api-m.sandbox.paypal.com".to_string()),
            client_id: env::var("WALLET_CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("WALLET_CLIENT_SECRET").unwrap_or_default(),
            currency: env::var("WALLET_CURRENCY")
                .unwrap_or_else(|_| "USD".to_string())
                .to_ascii_uppercase(),
            plan_id: env::var("WALLET_PLAN_ID").ok().filter(|p| !p.is_empty()),
            timeout_secs: parse_var("WALLET_TIMEOUT_SECS", "30")?,
        })
    }

    /// Vendor script URL, parameterized by client id and currency.
    pub fn script_url(&self) -> String {
        let intent = if self.plan_id.is_some() {
            "&vault=true&intent=subscription"
        } else {
            "&intent=capture"
        };
        format!(
            "{}?client-id={}&currency={}{}",
            self.sdk_url, self.client_id, self.currency, intent
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.is_empty() {
            return Err(ConfigError::MissingVariable("WALLET_CLIENT_ID".to_string()));
        }
        if self.client_secret.is_empty() {
            return Err(ConfigError::MissingVariable(
                "WALLET_CLIENT_SECRET".to_string(),
            ));
        }
        if !is_http_url(&self.sdk_url) || !is_http_url(&self.api_base_url) {
            return Err(ConfigError::InvalidValue(
                "WALLET_SDK_URL and WALLET_API_BASE_URL must be valid URLs".to_string(),
            ));
        }
        if self.currency.len() != 3 {
            return Err(ConfigError::InvalidValue("WALLET_CURRENCY".to_string()));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
