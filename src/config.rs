use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

use crate::federation::ledger::{RISK_THRESHOLD_MAX, RISK_THRESHOLD_MIN};
use crate::federation::rate_limit::RateLimiterConfig;

/// Configuration for the banlink federation service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanlinkConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Federation behavior
    pub federation: FederationConfig,
    /// Outbound delivery and enforcement
    pub outbound: OutboundConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,
    /// Enable PostgreSQL (if false, runs fully in-memory)
    pub postgres_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Max ban reports admitted per origin inside the rate window
    pub rate_limit_max_events: usize,
    /// Rate window length in seconds
    pub rate_limit_window_secs: i64,
    /// Window inside which a repeated subject report is a duplicate
    pub dedup_window_secs: i64,
    /// Default risk threshold for new nodes
    pub default_risk_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundConfig {
    /// Enforcement webhook endpoint (kick/ban commands are POSTed here)
    pub enforce_endpoint: String,
    /// Per-delivery timeout in seconds
    pub notify_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug)
    pub level: String,
}

impl Default for BanlinkConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8470,
            },
            database: DatabaseConfig {
                postgres_url: "postgresql://localhost:5432/banlink".to_string(),
                postgres_enabled: false,
            },
            federation: FederationConfig {
                rate_limit_max_events: 5,
                rate_limit_window_secs: 180,
                dedup_window_secs: 300,
                default_risk_threshold: 100,
            },
            outbound: OutboundConfig {
                enforce_endpoint: "http://127.0.0.1:8471/enforce".to_string(),
                notify_timeout_secs: 10,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl BanlinkConfig {
    /// Load configuration from environment variables and validate
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Server configuration
        if let Ok(host) = env::var("BANLINK_HOST") {
            config.server.host = host;
        }

        if let Ok(port) = env::var("BANLINK_PORT") {
            config.server.port = port.parse().context("Invalid BANLINK_PORT value")?;
        }

        // Database configuration
        if let Ok(url) = env::var("BANLINK_POSTGRES_URL") {
            config.database.postgres_url = url;
        }

        if let Ok(enabled) = env::var("BANLINK_POSTGRES_ENABLED") {
            config.database.postgres_enabled = enabled
                .parse()
                .context("Invalid BANLINK_POSTGRES_ENABLED value")?;
        }

        // Federation configuration
        if let Ok(max_events) = env::var("BANLINK_RATE_LIMIT_MAX_EVENTS") {
            config.federation.rate_limit_max_events = max_events
                .parse()
                .context("Invalid BANLINK_RATE_LIMIT_MAX_EVENTS value")?;
        }

        if let Ok(window) = env::var("BANLINK_RATE_LIMIT_WINDOW_SECS") {
            config.federation.rate_limit_window_secs = window
                .parse()
                .context("Invalid BANLINK_RATE_LIMIT_WINDOW_SECS value")?;
        }

        if let Ok(window) = env::var("BANLINK_DEDUP_WINDOW_SECS") {
            config.federation.dedup_window_secs = window
                .parse()
                .context("Invalid BANLINK_DEDUP_WINDOW_SECS value")?;
        }

        if let Ok(threshold) = env::var("BANLINK_DEFAULT_RISK_THRESHOLD") {
            config.federation.default_risk_threshold = threshold
                .parse()
                .context("Invalid BANLINK_DEFAULT_RISK_THRESHOLD value")?;
        }

        // Outbound configuration
        if let Ok(endpoint) = env::var("BANLINK_ENFORCE_ENDPOINT") {
            config.outbound.enforce_endpoint = endpoint;
        }

        if let Ok(timeout) = env::var("BANLINK_NOTIFY_TIMEOUT_SECS") {
            config.outbound.notify_timeout_secs = timeout
                .parse()
                .context("Invalid BANLINK_NOTIFY_TIMEOUT_SECS value")?;
        }

        // Logging configuration
        if let Ok(log_level) = env::var("BANLINK_LOG_LEVEL") {
            config.logging.level = log_level;
        }

        config.validate()?;

        Ok(config)
    }

    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            max_events: self.federation.rate_limit_max_events,
            time_window_secs: self.federation.rate_limit_window_secs,
        }
    }

    /// Validate configuration for consistency
    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be non-zero"));
        }

        if self.federation.rate_limit_max_events == 0 {
            return Err(anyhow::anyhow!("Rate limit must admit at least one event"));
        }

        if self.federation.rate_limit_window_secs <= 0 {
            return Err(anyhow::anyhow!("Rate limit window must be positive"));
        }

        if self.federation.dedup_window_secs <= 0 {
            return Err(anyhow::anyhow!("Dedup window must be positive"));
        }

        if self.federation.default_risk_threshold < RISK_THRESHOLD_MIN
            || self.federation.default_risk_threshold > RISK_THRESHOLD_MAX
        {
            return Err(anyhow::anyhow!(
                "Default risk threshold must be between {} and {}",
                RISK_THRESHOLD_MIN,
                RISK_THRESHOLD_MAX
            ));
        }

        if self.database.postgres_enabled && self.database.postgres_url.is_empty() {
            return Err(anyhow::anyhow!(
                "PostgreSQL is enabled but no connection string is set"
            ));
        }

        if self.outbound.enforce_endpoint.is_empty() {
            return Err(anyhow::anyhow!("Enforcement endpoint cannot be empty"));
        }

        if self.outbound.notify_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Notify timeout must be non-zero"));
        }

        Ok(())
    }
}
