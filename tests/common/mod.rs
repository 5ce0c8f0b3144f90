//! Shared E2E test infrastructure for s3ilm-rs.
//!
//! The server under test is configured through the same environment
//! variables the CLI reads: `SERVER_ENDPOINT`, `ACCESS_KEY`, `SECRET_KEY`,
//! `ENABLE_HTTPS`, `REMOTE_TIER_NAME` and `MAX_SCANNER_WAIT_SECONDS`.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use aws_sdk_s3::Client;
use s3ilm_rs::config::args::build_config_from_args;
use s3ilm_rs::naming::DEFAULT_BUCKET_PREFIX;
use s3ilm_rs::{Config, MemoryReporter, Suite, SuiteSummary, create_suite_cancellation_token};

/// Upper bound for a whole E2E test, covering every scanner wait and the
/// cleanup ceiling.
pub const E2E_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Outcome of one suite run.
#[derive(Debug)]
pub struct SuiteRun {
    pub summary: SuiteSummary,
    pub reporter: MemoryReporter,
}

pub struct TestHelper {
    client: Client,
}

impl TestHelper {
    pub async fn new() -> Arc<Self> {
        let config = Self::build_config(vec![]);
        let client = config
            .client_config
            .as_ref()
            .expect("client config is always set from the command line")
            .create_client()
            .await;
        Arc::new(Self { client })
    }

    /// Build a `Config` from the environment plus extra command-line args.
    pub fn build_config(args: Vec<&str>) -> Config {
        let mut full_args = vec!["s3ilm"];
        full_args.extend(args);
        build_config_from_args(full_args).expect("failed to build config from environment")
    }

    pub async fn run_suite(config: Config) -> SuiteRun {
        let reporter = MemoryReporter::new();
        let suite = Suite::new(
            config,
            Arc::new(reporter.clone()),
            create_suite_cancellation_token(),
        )
        .await
        .expect("failed to create suite");

        let summary = suite.run().await.expect("suite run failed");
        SuiteRun { summary, reporter }
    }

    /// Buckets named in `run`'s results that still exist on the server.
    pub async fn leftover_buckets(&self, run: &SuiteRun) -> Vec<String> {
        let created: Vec<String> = run
            .reporter
            .results()
            .iter()
            .filter_map(|result| result.args.get("bucketName").cloned())
            .collect();

        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .expect("ListBuckets failed");

        output
            .buckets()
            .iter()
            .filter_map(|bucket| bucket.name())
            .filter(|name| name.starts_with(DEFAULT_BUCKET_PREFIX))
            .filter(|name| created.iter().any(|bucket| bucket == name))
            .map(str::to_string)
            .collect()
    }
}

/// Wrap an E2E test body in a timeout.
///
/// ```ignore
/// #[tokio::test]
/// async fn my_test() {
///     e2e_timeout!(async {
///         // test body here
///     });
/// }
/// ```
#[macro_export]
macro_rules! e2e_timeout {
    ($body:expr) => {
        tokio::time::timeout(common::E2E_TIMEOUT, $body)
            .await
            .expect("E2E test timed out")
    };
}
