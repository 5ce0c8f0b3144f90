pub mod args;

use std::time::Duration;

use aws_smithy_types::checksum_config::RequestChecksumCalculation;
use fancy_regex::Regex;

use crate::poller::PollPolicy;
use crate::types::{AccessKeys, S3Credentials};

pub const DEFAULT_MAX_SCANNER_WAIT_SECONDS: u64 = 120;
pub const DEFAULT_POLL_INTERVAL_MILLISECONDS: u64 = 1000;
pub const DEFAULT_CLEANUP_RETRY_INTERVAL_MILLISECONDS: u64 = 5000;
pub const DEFAULT_CLEANUP_TIMEOUT_SECONDS: u64 = 480;
pub const DEFAULT_RESTORE_DAYS: i32 = 1;
pub const DEFAULT_REGION: &str = "us-east-1";

/// Main configuration for an s3ilm-rs suite run.
///
/// Holds the connection settings for the server under test, the optional
/// remote tier that gates the transition and restore families, and the
/// bounds used by the poller and the cleanup coordinator.
///
/// # Quick Start
///
/// ```
/// use s3ilm_rs::Config;
///
/// let config = Config::for_endpoint("http://localhost:9000", "minioadmin", "minioadmin");
/// assert_eq!(config.max_scanner_wait_seconds, 120);
/// assert!(config.remote_tier_name.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub client_config: Option<ClientConfig>,
    pub tracing_config: Option<TracingConfig>,
    /// Transition target. Transition and restore scenarios are NA without it.
    pub remote_tier_name: Option<String>,
    pub max_scanner_wait_seconds: u64,
    pub poll_interval_milliseconds: u64,
    pub cleanup_retry_interval_milliseconds: u64,
    pub cleanup_timeout_seconds: u64,
    pub restore_days: i32,
    /// Only scenario functions matching this pattern run.
    pub scenario_include_regex: Option<Regex>,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

impl Config {
    /// Create a `Config` for a server reachable at `endpoint` with static keys.
    pub fn for_endpoint(endpoint: &str, access_key: &str, secret_key: &str) -> Self {
        Config {
            client_config: Some(ClientConfig {
                credential: S3Credentials::Credentials {
                    access_keys: AccessKeys {
                        access_key: access_key.to_string(),
                        secret_access_key: secret_key.to_string(),
                        session_token: None,
                    },
                },
                endpoint_url: Some(endpoint.to_string()),
                ..ClientConfig::default()
            }),
            ..Config::default()
        }
    }

    /// Bound used for every wait on the lifecycle scanner.
    pub fn scanner_poll_policy(&self) -> PollPolicy {
        PollPolicy::elapsed(
            Duration::from_secs(self.max_scanner_wait_seconds),
            Duration::from_millis(self.poll_interval_milliseconds),
        )
    }

    pub fn cleanup_retry_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_retry_interval_milliseconds)
    }

    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_secs(self.cleanup_timeout_seconds)
    }

    pub fn is_scenario_selected(&self, function: &str) -> bool {
        match &self.scenario_include_regex {
            Some(regex) => regex.is_match(function).unwrap_or(false),
            None => true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            client_config: None,
            tracing_config: None,
            remote_tier_name: None,
            max_scanner_wait_seconds: DEFAULT_MAX_SCANNER_WAIT_SECONDS,
            poll_interval_milliseconds: DEFAULT_POLL_INTERVAL_MILLISECONDS,
            cleanup_retry_interval_milliseconds: DEFAULT_CLEANUP_RETRY_INTERVAL_MILLISECONDS,
            cleanup_timeout_seconds: DEFAULT_CLEANUP_TIMEOUT_SECONDS,
            restore_days: DEFAULT_RESTORE_DAYS,
            scenario_include_regex: None,
            auto_complete_shell: None,
        }
    }
}

/// AWS S3 client configuration for the server under test.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
    pub disable_stalled_stream_protection: bool,
    pub request_checksum_calculation: RequestChecksumCalculation,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            credential: S3Credentials::FromEnvironment,
            region: Some(DEFAULT_REGION.to_string()),
            endpoint_url: None,
            force_path_style: true,
            retry_config: RetryConfig::default(),
            cli_timeout_config: CLITimeoutConfig::default(),
            disable_stalled_stream_protection: false,
            request_checksum_calculation: RequestChecksumCalculation::WhenRequired,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            aws_max_attempts: 3,
            initial_backoff_milliseconds: 100,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

/// Tracing (logging) configuration.
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}
