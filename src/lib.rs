/*!
# Overview
s3ilm-rs is a conformance test suite for S3 Object Lifecycle Management.
It checks how an S3-compatible server applies lifecycle rules: expiration,
transition to a remote tier, restore from that tier, and version-aware
expiration of current versions, non-current versions and delete markers.

## Features
- **Black-box**: every assertion is made by re-reading objects until the
  server's lifecycle scanner has acted, within a bounded window
- **Self-cleaning**: every scenario runs in its own randomly named buckets,
  which are emptied and removed in the background whether it passed or not
- **Capability aware**: servers without lifecycle, versioning, object lock
  or a remote tier get NA records instead of failures
- **Machine readable**: one JSON result per line on stdout
- **Library-First**: the s3ilm CLI is a thin wrapper over this crate

## As a Library

```toml
[dependencies]
s3ilm-rs = "0.1"
tokio = { version = "1", features = ["full"] }
```

```no_run
use std::sync::Arc;

use s3ilm_rs::config::args::build_config_from_args;
use s3ilm_rs::{JsonLinesReporter, Suite, create_suite_cancellation_token};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = vec![
        "s3ilm",
        "--server-endpoint",
        "localhost:9000",
        "--access-key",
        "minioadmin",
        "--secret-key",
        "minioadmin",
        "--remote-tier-name",
        "WARM-TIER",
    ];
    let config = build_config_from_args(args).map_err(anyhow::Error::msg)?;

    let suite = Suite::new(
        config,
        Arc::new(JsonLinesReporter::stdout()),
        create_suite_cancellation_token(),
    )
    .await?;
    let summary = suite.run().await?;

    eprintln!(
        "{} passed, {} failed, {} not applicable",
        summary.passed, summary.failed, summary.not_applicable
    );
    Ok(())
}
```
*/

#![allow(clippy::collapsible_if)]

pub mod cleanup;
pub mod config;
pub mod lifecycle;
pub mod naming;
pub mod poller;
pub mod probe;
pub mod report;
pub mod scenario;
pub mod storage;
pub mod suite;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::Config;
pub use config::args::{CLIArgs, build_config_from_args, parse_from_args};
pub use lifecycle::{LifecycleConfiguration, LifecycleRule};
pub use report::{
    JsonLinesReporter, MemoryReporter, ResultReporter, Status, SuiteSummary, TestResult,
};
pub use storage::{Storage, StorageTrait, create_storage};
pub use suite::Suite;
pub use types::error::{
    S3IlmError, exit_code_from_error, is_not_found_error, is_not_implemented_error,
};
pub use types::token::{SuiteCancellationToken, create_suite_cancellation_token};
