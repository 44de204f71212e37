//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `SMOKECTL_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `SMOKECTL_` override YAML values
//! 3. **SLACK_WEBHOOK_URL** - Special case: overrides `notifications.webhook_url` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `SMOKECTL_SMOKE__CONCURRENCY=10` sets the `smoke.concurrency` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use smokectl::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! SMOKECTL_PORT=8080
//!
//! # Send failure summaries to a Slack incoming webhook
//! SLACK_WEBHOOK_URL="https://hooks.slack.com/services/T000/B000/XXXX"
//!
//! # Override nested values
//! SMOKECTL_SMOKE__DEFAULT_TIMEOUT=5s
//! SMOKECTL_ENABLE_METRICS=false
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "SMOKECTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// CORS settings for the dashboard calling the run endpoint
    pub cors: CorsConfig,
    /// Probe defaults and limits applied to every run
    pub smoke: SmokeConfig,
    /// Failure notification delivery
    pub notifications: NotificationsConfig,
}

/// Defaults and bounds for smoke runs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmokeConfig {
    /// Per-probe timeout used when a run does not specify one
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Lower clamp for a requested per-probe timeout
    #[serde(with = "humantime_serde")]
    pub min_timeout: Duration,
    /// Upper clamp for a requested per-probe timeout
    #[serde(with = "humantime_serde")]
    pub max_timeout: Duration,
    /// Latency above which a passing probe gets a warning, when the run does not specify one
    pub default_warn_over_ms: u64,
    /// Maximum number of probes in flight at once
    pub concurrency: usize,
    /// User-Agent sent with every probe
    pub user_agent: String,
    /// Number of body bytes kept for content and JSON checks
    pub body_sample_limit: usize,
}

/// Webhook notifications for failed runs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationsConfig {
    /// Incoming-webhook URL receiving `{"text": ...}` payloads. Unset disables notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<Url>,
    /// Timeout for a single webhook delivery
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// CORS configuration for the run endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard", serialize_with = "serialize_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://dashboard.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn serialize_wildcard<S>(serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str("*")
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            enable_metrics: true,
            cors: CorsConfig::default(),
            smoke: SmokeConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(8000),
            min_timeout: Duration::from_millis(1000),
            max_timeout: Duration::from_millis(30000),
            default_warn_over_ms: 1500,
            concurrency: 5,
            user_agent: "SmokeTester/1.0 (+smokectl)".to_string(),
            body_sample_limit: 64 * 1024,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            max_age: Some(3600), // Cache preflight for 1 hour
        }
    }
}

impl SmokeConfig {
    /// Clamp a requested timeout into `[min_timeout, max_timeout]`, or fall back to the default.
    ///
    /// Any number is accepted: negative values clamp to the floor, fractions are kept.
    pub fn effective_timeout(&self, requested_ms: Option<f64>) -> Duration {
        match requested_ms {
            Some(ms) if !ms.is_nan() => {
                let min_ms = self.min_timeout.as_micros() as f64 / 1000.0;
                let max_ms = self.max_timeout.as_micros() as f64 / 1000.0;
                Duration::from_micros((ms.clamp(min_ms, max_ms) * 1000.0).round() as u64)
            }
            _ => self.default_timeout,
        }
    }

    /// The requested warning threshold, or the default when absent or not positive.
    pub fn effective_warn_over_ms(&self, requested_ms: Option<f64>) -> u64 {
        match requested_ms {
            // time_ms is whole milliseconds, so flooring keeps `time_ms > threshold` exact
            Some(ms) if ms > 0.0 => ms.floor() as u64,
            _ => self.default_warn_over_ms,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<(), Error> {
        let smoke = &self.smoke;

        if smoke.concurrency == 0 {
            return Err(Error::Internal {
                operation: "Config validation: smoke.concurrency must be at least 1".to_string(),
            });
        }

        if smoke.min_timeout.is_zero() || smoke.min_timeout > smoke.max_timeout {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: Invalid timeout bounds: min_timeout ({:?}) must be non-zero and not greater than max_timeout ({:?})",
                    smoke.min_timeout, smoke.max_timeout
                ),
            });
        }

        if smoke.default_timeout < smoke.min_timeout || smoke.default_timeout > smoke.max_timeout {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: default_timeout ({:?}) must lie within [{:?}, {:?}]",
                    smoke.default_timeout, smoke.min_timeout, smoke.max_timeout
                ),
            });
        }

        if smoke.body_sample_limit == 0 {
            return Err(Error::Internal {
                operation: "Config validation: smoke.body_sample_limit must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("SMOKECTL_").ignore(&["config"]).split("__"))
            // The conventional Slack variable name feeds the webhook notifier
            .merge(
                Env::raw()
                    .only(&["SLACK_WEBHOOK_URL"])
                    .map(|_| "notifications.webhook_url".into()),
            )
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults_without_config_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.port, 3001);
            assert_eq!(config.smoke.concurrency, 5);
            assert_eq!(config.smoke.default_timeout, Duration::from_millis(8000));
            assert_eq!(config.smoke.default_warn_over_ms, 1500);
            assert_eq!(config.smoke.body_sample_limit, 65536);
            assert!(config.notifications.webhook_url.is_none());
            assert!(matches!(config.cors.allowed_origins.as_slice(), [CorsOrigin::Wildcard]));

            Ok(())
        });
    }

    #[test]
    fn test_yaml_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 9000
smoke:
  default_timeout: 5s
  concurrency: 3
  user_agent: custom-agent
notifications:
  webhook_url: https://hooks.example.com/abc
  timeout: 2s
cors:
  allowed_origins:
    - https://dashboard.example.com
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.port, 9000);
            assert_eq!(config.smoke.default_timeout, Duration::from_secs(5));
            assert_eq!(config.smoke.concurrency, 3);
            assert_eq!(config.smoke.user_agent, "custom-agent");
            // Unspecified fields keep their defaults
            assert_eq!(config.smoke.max_timeout, Duration::from_secs(30));
            assert_eq!(
                config.notifications.webhook_url.as_ref().map(Url::as_str),
                Some("https://hooks.example.com/abc")
            );
            assert_eq!(config.notifications.timeout, Duration::from_secs(2));
            match &config.cors.allowed_origins[..] {
                [CorsOrigin::Url(url)] => assert_eq!(url.as_str(), "https://dashboard.example.com/"),
                other => panic!("unexpected origins: {other:?}"),
            }

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "port: 9000\n")?;

            jail.set_env("SMOKECTL_HOST", "127.0.0.1");
            jail.set_env("SMOKECTL_PORT", "8080");
            jail.set_env("SMOKECTL_SMOKE__CONCURRENCY", "8");
            // Read by clap, not a config field
            jail.set_env("SMOKECTL_CONFIG", "test.yaml");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 8080);
            assert_eq!(config.smoke.concurrency, 8);
            assert_eq!(config.bind_address(), "127.0.0.1:8080");

            Ok(())
        });
    }

    #[test]
    fn test_slack_webhook_env_sets_notifications_url() {
        Jail::expect_with(|jail| {
            jail.set_env("SLACK_WEBHOOK_URL", "https://hooks.slack.com/services/T0/B0/X");

            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(
                config.notifications.webhook_url.as_ref().map(Url::as_str),
                Some("https://hooks.slack.com/services/T0/B0/X")
            );

            Ok(())
        });
    }

    #[test]
    fn test_unknown_fields_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "smoke:\n  retries: 3\n")?;

            assert!(Config::load(&args("test.yaml")).is_err());

            Ok(())
        });
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.smoke.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_default_timeout_outside_bounds() {
        let mut config = Config::default();
        config.smoke.default_timeout = Duration::from_secs(60);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("default_timeout"));
    }

    #[test]
    fn test_effective_timeout_clamps() {
        let smoke = SmokeConfig::default();
        assert_eq!(smoke.effective_timeout(None), Duration::from_millis(8000));
        assert_eq!(smoke.effective_timeout(Some(10.0)), Duration::from_millis(1000));
        assert_eq!(smoke.effective_timeout(Some(-5.0)), Duration::from_millis(1000));
        assert_eq!(smoke.effective_timeout(Some(2500.0)), Duration::from_millis(2500));
        assert_eq!(smoke.effective_timeout(Some(2500.5)), Duration::from_micros(2_500_500));
        assert_eq!(smoke.effective_timeout(Some(120_000.0)), Duration::from_millis(30000));
        assert_eq!(smoke.effective_timeout(Some(f64::NAN)), Duration::from_millis(8000));
    }

    #[test]
    fn test_effective_warn_over_ms() {
        let smoke = SmokeConfig::default();
        assert_eq!(smoke.effective_warn_over_ms(None), 1500);
        assert_eq!(smoke.effective_warn_over_ms(Some(0.0)), 1500);
        assert_eq!(smoke.effective_warn_over_ms(Some(-5.0)), 1500);
        assert_eq!(smoke.effective_warn_over_ms(Some(1500.0)), 1500);
        assert_eq!(smoke.effective_warn_over_ms(Some(200.7)), 200);
    }
}
