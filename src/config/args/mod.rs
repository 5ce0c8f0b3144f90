use crate::config::{CLITimeoutConfig, ClientConfig, Config, RetryConfig, TracingConfig};
use crate::types::{AccessKeys, S3Credentials};
use aws_smithy_types::checksum_config::RequestChecksumCalculation;
use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use fancy_regex::Regex;
use std::ffi::OsString;

pub mod value_parser;


// ---------------------------------------------------------------------------
// Default constants
// ---------------------------------------------------------------------------

const DEFAULT_ENABLE_HTTPS: bool = false;
const DEFAULT_REGION: &str = crate::config::DEFAULT_REGION;
const DEFAULT_DISABLE_PATH_STYLE: bool = false;
const DEFAULT_MAX_SCANNER_WAIT_SECONDS: u64 = crate::config::DEFAULT_MAX_SCANNER_WAIT_SECONDS;
const DEFAULT_POLL_INTERVAL_MILLISECONDS: u64 =
    crate::config::DEFAULT_POLL_INTERVAL_MILLISECONDS;
const DEFAULT_CLEANUP_RETRY_INTERVAL_MILLISECONDS: u64 =
    crate::config::DEFAULT_CLEANUP_RETRY_INTERVAL_MILLISECONDS;
const DEFAULT_CLEANUP_TIMEOUT_SECONDS: u64 = crate::config::DEFAULT_CLEANUP_TIMEOUT_SECONDS;
const DEFAULT_RESTORE_DAYS: i32 = crate::config::DEFAULT_RESTORE_DAYS;
const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 100;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_DISABLE_STALLED_STREAM_PROTECTION: bool = false;

// ---------------------------------------------------------------------------
// Error messages
// ---------------------------------------------------------------------------

const ERROR_MESSAGE_INVALID_REGEX: &str = "Invalid regular expression pattern";
const ERROR_MESSAGE_SECRET_KEY_REQUIRED: &str =
    "SECRET_KEY must be set when ACCESS_KEY is set.";
const ERROR_MESSAGE_MAX_SCANNER_WAIT_ZERO: &str = "Max scanner wait seconds must be at least 1.";
const ERROR_MESSAGE_POLL_INTERVAL_ZERO: &str = "Poll interval must be at least 1 millisecond.";
const ERROR_MESSAGE_CLEANUP_TIMEOUT_ZERO: &str = "Cleanup timeout must be at least 1 second.";
const ERROR_MESSAGE_RESTORE_DAYS_NOT_POSITIVE: &str = "Restore days must be at least 1.";
const ERROR_MESSAGE_AWS_MAX_ATTEMPTS_ZERO: &str = "AWS max attempts must be at least 1.";

// ---------------------------------------------------------------------------
// CLIArgs (clap-derived argument struct)
// ---------------------------------------------------------------------------

/// s3ilm - S3 Object Lifecycle Management conformance suite.
///
/// Runs expiry, transition, restore and versioned-expiry scenarios against
/// an S3-compatible server and prints one JSON result per line.
///
/// Example:
///   SERVER_ENDPOINT=localhost:9000 ACCESS_KEY=minioadmin SECRET_KEY=minioadmin s3ilm
///   s3ilm --server-endpoint localhost:9000 --remote-tier-name WARM-TIER -v
#[derive(Parser, Clone, Debug)]
#[command(name = "s3ilm", version, about, long_about = None)]
pub struct CLIArgs {
    // -----------------------------------------------------------------------
    // Server under test
    // -----------------------------------------------------------------------
    /// Server endpoint, `host:port` or an http(s) URL.
    #[arg(
        long,
        env,
        value_parser = value_parser::endpoint::check_endpoint,
        default_value_if("auto_complete_shell", clap::builder::ArgPredicate::IsPresent, "localhost:9000"),
        help_heading = "Server",
    )]
    pub server_endpoint: String,

    /// Access key for the server under test.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Server")]
    pub access_key: Option<String>,

    /// Secret key for the server under test.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Server")]
    pub secret_key: Option<String>,

    /// Use https when the endpoint carries no scheme.
    #[arg(long, env, default_value_t = DEFAULT_ENABLE_HTTPS, help_heading = "Server")]
    pub enable_https: bool,

    #[arg(long, env, default_value = DEFAULT_REGION, value_parser = NonEmptyStringValueParser::new(), help_heading = "Server")]
    pub region: String,

    /// Use virtual-hosted-style addressing instead of path-style.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_PATH_STYLE, help_heading = "Server")]
    pub disable_path_style: bool,

    // -----------------------------------------------------------------------
    // Suite options
    // -----------------------------------------------------------------------
    /// Remote tier (storage class) for transition and restore scenarios.
    /// These scenarios are reported NA when it is not set.
    #[arg(long, env, help_heading = "Suite")]
    pub remote_tier_name: Option<String>,

    /// Maximum time to wait for the lifecycle scanner, in seconds. Default: 120.
    #[arg(long, env, default_value_t = DEFAULT_MAX_SCANNER_WAIT_SECONDS, help_heading = "Suite")]
    pub max_scanner_wait_seconds: u64,

    /// Interval between re-reads while waiting for the scanner. Default: 1000.
    #[arg(long, env, default_value_t = DEFAULT_POLL_INTERVAL_MILLISECONDS, help_heading = "Suite")]
    pub poll_interval_milliseconds: u64,

    /// Number of days requested by RestoreObject. Default: 1.
    #[arg(long, env, default_value_t = DEFAULT_RESTORE_DAYS, help_heading = "Suite")]
    pub restore_days: i32,

    /// Run only scenario functions matching this regex (e.g. '^testExpire').
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Suite")]
    pub scenario_include_regex: Option<String>,

    // -----------------------------------------------------------------------
    // Cleanup options
    // -----------------------------------------------------------------------
    /// Interval between bucket cleanup attempts. Default: 5000.
    #[arg(long, env, default_value_t = DEFAULT_CLEANUP_RETRY_INTERVAL_MILLISECONDS, help_heading = "Cleanup")]
    pub cleanup_retry_interval_milliseconds: u64,

    /// Give up cleaning a bucket after this many seconds. Default: 480.
    #[arg(long, env, default_value_t = DEFAULT_CLEANUP_TIMEOUT_SECONDS, help_heading = "Cleanup")]
    pub cleanup_timeout_seconds: u64,

    // -----------------------------------------------------------------------
    // Logging options
    // -----------------------------------------------------------------------
    /// Verbosity level. -q (quiet), default (normal), -v, -vv, -vvv.
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Output logs in JSON format.
    #[arg(long, env, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Logging")]
    pub json_tracing: bool,

    /// Enable AWS SDK tracing.
    #[arg(long, env, default_value_t = DEFAULT_AWS_SDK_TRACING, help_heading = "Logging")]
    pub aws_sdk_tracing: bool,

    /// Enable tracing span events.
    #[arg(long, env, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Logging")]
    pub span_events_tracing: bool,

    /// Disable colored output in logs.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Logging")]
    pub disable_color_tracing: bool,

    // -----------------------------------------------------------------------
    // Retry options
    // -----------------------------------------------------------------------
    /// Maximum retry attempts for AWS SDK operations. Default: 3.
    #[arg(long, env, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, help_heading = "Retry")]
    pub aws_max_attempts: u32,

    /// Initial backoff in milliseconds for retries. Default: 100.
    #[arg(long, env, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, help_heading = "Retry")]
    pub initial_backoff_milliseconds: u64,

    // -----------------------------------------------------------------------
    // Timeout options
    // -----------------------------------------------------------------------
    /// Overall operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_timeout_milliseconds: Option<u64>,

    /// Per-attempt operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_attempt_timeout_milliseconds: Option<u64>,

    /// Connection timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub connect_timeout_milliseconds: Option<u64>,

    /// Read timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub read_timeout_milliseconds: Option<u64>,

    // -----------------------------------------------------------------------
    // Advanced
    // -----------------------------------------------------------------------
    /// Disable stalled stream protection.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_STALLED_STREAM_PROTECTION, help_heading = "Advanced")]
    pub disable_stalled_stream_protection: bool,

    /// Generate shell completions.
    #[arg(long, env, help_heading = "Advanced")]
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

// ---------------------------------------------------------------------------
// parse_from_args (public API)
// ---------------------------------------------------------------------------

/// Parse command-line arguments into a `CLIArgs` struct.
///
/// # Example
///
/// ```
/// use s3ilm_rs::config::args::parse_from_args;
///
/// let args = vec!["s3ilm", "--server-endpoint", "localhost:9000", "--enable-https"];
/// let cli_args = parse_from_args(args).unwrap();
/// assert!(cli_args.enable_https);
/// ```
pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

/// Parse arguments and build a Config in one step.
pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    Config::try_from(cli_args)
}

// ---------------------------------------------------------------------------
// Validation and Config conversion
// ---------------------------------------------------------------------------

impl CLIArgs {
    fn validate(&self) -> Result<(), String> {
        if self.access_key.is_some() && self.secret_key.is_none() {
            return Err(ERROR_MESSAGE_SECRET_KEY_REQUIRED.to_string());
        }
        if self.max_scanner_wait_seconds == 0 {
            return Err(ERROR_MESSAGE_MAX_SCANNER_WAIT_ZERO.to_string());
        }
        if self.poll_interval_milliseconds == 0 {
            return Err(ERROR_MESSAGE_POLL_INTERVAL_ZERO.to_string());
        }
        if self.cleanup_timeout_seconds == 0 {
            return Err(ERROR_MESSAGE_CLEANUP_TIMEOUT_ZERO.to_string());
        }
        if self.restore_days < 1 {
            return Err(ERROR_MESSAGE_RESTORE_DAYS_NOT_POSITIVE.to_string());
        }
        if self.aws_max_attempts == 0 {
            return Err(ERROR_MESSAGE_AWS_MAX_ATTEMPTS_ZERO.to_string());
        }
        Ok(())
    }

    fn build_scenario_include_regex(&self) -> Result<Option<Regex>, String> {
        match &self.scenario_include_regex {
            Some(pattern) => Regex::new(pattern).map(Some).map_err(|e| {
                format!("{ERROR_MESSAGE_INVALID_REGEX} for scenario-include-regex: {e}")
            }),
            None => Ok(None),
        }
    }

    fn build_client_config(&self) -> ClientConfig {
        let credential = if let Some(ref access_key) = self.access_key {
            S3Credentials::Credentials {
                access_keys: AccessKeys {
                    access_key: access_key.clone(),
                    secret_access_key: self.secret_key.clone().unwrap_or_default(),
                    session_token: None,
                },
            }
        } else {
            S3Credentials::FromEnvironment
        };

        ClientConfig {
            credential,
            region: Some(self.region.clone()),
            endpoint_url: Some(value_parser::endpoint::endpoint_url(
                &self.server_endpoint,
                self.enable_https,
            )),
            force_path_style: !self.disable_path_style,
            retry_config: RetryConfig {
                aws_max_attempts: self.aws_max_attempts,
                initial_backoff_milliseconds: self.initial_backoff_milliseconds,
            },
            cli_timeout_config: CLITimeoutConfig {
                operation_timeout_milliseconds: self.operation_timeout_milliseconds,
                operation_attempt_timeout_milliseconds: self.operation_attempt_timeout_milliseconds,
                connect_timeout_milliseconds: self.connect_timeout_milliseconds,
                read_timeout_milliseconds: self.read_timeout_milliseconds,
            },
            disable_stalled_stream_protection: self.disable_stalled_stream_protection,
            request_checksum_calculation: RequestChecksumCalculation::WhenRequired,
        }
    }

    fn build_tracing_config(&self) -> Option<TracingConfig> {
        let log_level = self.verbosity.log_level()?;

        Some(TracingConfig {
            tracing_level: log_level,
            json_tracing: self.json_tracing,
            aws_sdk_tracing: self.aws_sdk_tracing,
            span_events_tracing: self.span_events_tracing,
            disable_color_tracing: self.disable_color_tracing,
        })
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(args: CLIArgs) -> Result<Self, Self::Error> {
        args.validate()?;

        let scenario_include_regex = args.build_scenario_include_regex()?;
        let client_config = args.build_client_config();
        let tracing_config = args.build_tracing_config();

        // An empty REMOTE_TIER_NAME means "no tier", like an unset one.
        let remote_tier_name = args
            .remote_tier_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        Ok(Config {
            client_config: Some(client_config),
            tracing_config,
            remote_tier_name,
            max_scanner_wait_seconds: args.max_scanner_wait_seconds,
            poll_interval_milliseconds: args.poll_interval_milliseconds,
            cleanup_retry_interval_milliseconds: args.cleanup_retry_interval_milliseconds,
            cleanup_timeout_seconds: args.cleanup_timeout_seconds,
            restore_days: args.restore_days,
            scenario_include_regex,
            auto_complete_shell: args.auto_complete_shell,
        })
    }
}
