//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::env;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub mpesa: MpesaConfig,
    pub orders: OrderServiceConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Daraja (M-Pesa) configuration
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub environment: String,
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub short_code: String,
    pub passkey: String,
    pub callback_url: String,
    pub country_code: String,
    pub request_timeout: u64,      // seconds
    pub token_refresh_margin: u64, // seconds
}

/// Order service collaborator configuration
#[derive(Debug, Clone)]
pub struct OrderServiceConfig {
    pub base_url: String,
    pub request_timeout: u64, // seconds
    pub max_retries: u32,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            mpesa: MpesaConfig::from_env()?,
            orders: OrderServiceConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        self.mpesa.validate()?;
        self.orders.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8004".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
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

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
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

impl MpesaConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("MPESA_ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string());

        Ok(MpesaConfig {
            base_url: env::var("MPESA_BASE_URL").unwrap_or_else(|_| {
                if environment == "production" {
                    "https://api.safaricom.co.ke".to_string()
                } else {
                    "https://sandbox.safaricom.co.ke".to_string()
                }
            }),
            environment,
            consumer_key: env::var("MPESA_CONSUMER_KEY")
                .map_err(|_| ConfigError::MissingVariable("MPESA_CONSUMER_KEY".to_string()))?,
            consumer_secret: env::var("MPESA_CONSUMER_SECRET")
                .map_err(|_| ConfigError::MissingVariable("MPESA_CONSUMER_SECRET".to_string()))?,
            short_code: env::var("MPESA_SHORT_CODE")
                .map_err(|_| ConfigError::MissingVariable("MPESA_SHORT_CODE".to_string()))?,
            passkey: env::var("MPESA_PASSKEY")
                .map_err(|_| ConfigError::MissingVariable("MPESA_PASSKEY".to_string()))?,
            callback_url: env::var("MPESA_CALLBACK_URL")
                .map_err(|_| ConfigError::MissingVariable("MPESA_CALLBACK_URL".to_string()))?,
            country_code: env::var("MPESA_COUNTRY_CODE").unwrap_or_else(|_| "254".to_string()),
            request_timeout: env::var("MPESA_REQUEST_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MPESA_REQUEST_TIMEOUT".to_string()))?,
            token_refresh_margin: env::var("MPESA_TOKEN_REFRESH_MARGIN")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MPESA_TOKEN_REFRESH_MARGIN".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_environments = ["sandbox", "production"];
        if !valid_environments.contains(&self.environment.as_str()) {
            return Err(ConfigError::InvalidValue("MPESA_ENVIRONMENT".to_string()));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "MPESA_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if !self.callback_url.starts_with("http://") && !self.callback_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "MPESA_CALLBACK_URL must be a valid URL".to_string(),
            ));
        }

        if self.short_code.is_empty() || !self.short_code.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidValue("MPESA_SHORT_CODE".to_string()));
        }

        if self.country_code.is_empty() || !self.country_code.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidValue("MPESA_COUNTRY_CODE".to_string()));
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidValue(
                "MPESA_REQUEST_TIMEOUT".to_string(),
            ));
        }

        Ok(())
    }
}

impl OrderServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(OrderServiceConfig {
            base_url: env::var("ORDER_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8003".to_string()),
            request_timeout: env::var("ORDER_SERVICE_TIMEOUT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("ORDER_SERVICE_TIMEOUT".to_string()))?,
            max_retries: env::var("ORDER_SERVICE_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("ORDER_SERVICE_MAX_RETRIES".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "ORDER_SERVICE_URL must be a valid URL".to_string(),
            ));
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidValue(
                "ORDER_SERVICE_TIMEOUT".to_string(),
            ));
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
}

impl From<std::num::ParseIntError> for ConfigError {
    fn from(_: std::num::ParseIntError) -> Self {
        ConfigError::InvalidValue("Failed to parse integer value".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mpesa_config() -> MpesaConfig {
        MpesaConfig {
            environment: "sandbox".to_string(),
            base_url: "https://sandbox.safaricom.co.ke".to_string(),
            consumer_key: "key".to_string(),
            consumer_secret: "secret".to_string(),
            short_code: "174379".to_string(),
            passkey: "passkey".to_string(),
            callback_url: "https://pay.example.com/payments/mpesa/callback".to_string(),
            country_code: "254".to_string(),
            request_timeout: 30,
            token_refresh_margin: 60,
        }
    }

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8004,
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Invalid port
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mpesa_config_validation() {
        assert!(mpesa_config().validate().is_ok());
    }

    #[test]
    fn test_mpesa_invalid_environment() {
        let mut config = mpesa_config();
        config.environment = "staging".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mpesa_non_numeric_short_code() {
        let mut config = mpesa_config();
        config.short_code = "abc123".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_order_service_url_validation() {
        let config = OrderServiceConfig {
            base_url: "localhost:8003".to_string(),
            request_timeout: 10,
            max_retries: 3,
        };

        assert!(config.validate().is_err());
    }
}
