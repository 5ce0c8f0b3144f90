//! Scenario runner.
//!
//! A scenario family (one result `function`, e.g. `testExpiry`) is a list of
//! typed test cases executed by [`run_cases`]. Each case goes through setup,
//! trigger, poll and assert inside [`TestCase::execute`], stopping at the first
//! failure. The runner then reports the outcome and schedules cleanup of every
//! bucket the case created, whether it passed or not.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::cleanup::CleanupCoordinator;
use crate::config::Config;
use crate::lifecycle::LifecycleConfiguration;
use crate::naming::BucketNamer;
use crate::poller::{Observation, PollOutcome, PollReport, Poller, Progress};
use crate::report::{ResultReporter, SuiteSummary, TestResult};
use crate::storage::Storage;
use crate::types::error::is_not_implemented_error;
use crate::types::token::SuiteCancellationToken;
use crate::types::{PutOptions, PutResult};

pub mod expiry;
pub mod legal_hold;
pub mod lifecycle_config;
pub mod restore;
pub mod transition;
pub mod versioned;

/// Everything a scenario needs: the storage under test, the configuration,
/// the shared name generator and the result sinks.
pub struct ScenarioContext {
    pub storage: Storage,
    pub config: Config,
    pub namer: Arc<BucketNamer>,
    pub poller: Poller,
    cleanup: CleanupCoordinator,
    reporter: Arc<dyn ResultReporter>,
    summary: Arc<Mutex<SuiteSummary>>,
    cancellation_token: SuiteCancellationToken,
}

impl ScenarioContext {
    pub fn new(
        storage: Storage,
        config: Config,
        reporter: Arc<dyn ResultReporter>,
        cancellation_token: SuiteCancellationToken,
    ) -> Self {
        ScenarioContext {
            cleanup: CleanupCoordinator::from_config(storage.clone(), &config),
            poller: Poller::new(config.scanner_poll_policy()),
            storage,
            config,
            namer: Arc::new(BucketNamer::default()),
            reporter,
            summary: Arc::new(Mutex::new(SuiteSummary::default())),
            cancellation_token,
        }
    }

    pub fn with_namer(mut self, namer: BucketNamer) -> Self {
        self.namer = Arc::new(namer);
        self
    }

    pub fn cleanup(&self) -> &CleanupCoordinator {
        &self.cleanup
    }

    /// Report `result` and count it in the summary.
    pub fn record(&self, result: TestResult) {
        self.summary
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(result.status);

        if let Err(e) = self.reporter.report(&result) {
            error!(
                function = result.function,
                error = format!("{e:#}"),
                "failed to report test result."
            );
        }
    }

    pub fn summary(&self) -> SuiteSummary {
        *self.summary.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn remote_tier(&self) -> Option<&str> {
        self.config.remote_tier_name.as_deref()
    }
}

/// Why a test case did not pass.
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("{message}")]
    Failed {
        message: String,
        error: Option<anyhow::Error>,
    },
    /// `alert` names the missing capability.
    #[error("{alert}: {message}")]
    NotApplicable { alert: String, message: String },
}

impl ScenarioError {
    pub fn failed(message: impl Into<String>) -> Self {
        ScenarioError::Failed {
            message: message.into(),
            error: None,
        }
    }
}

pub type ScenarioResult<T = ()> = std::result::Result<T, ScenarioError>;

/// Conversions from storage results into scenario outcomes.
pub trait ScenarioResultExt<T> {
    /// Any error fails the case with `message`.
    fn or_fail(self, message: &str) -> ScenarioResult<T>;

    /// `NotImplemented` makes the case NA for `capability`; any other error
    /// fails it with `message`.
    fn or_not_applicable(self, capability: &str, message: &str) -> ScenarioResult<T>;
}

impl<T> ScenarioResultExt<T> for anyhow::Result<T> {
    fn or_fail(self, message: &str) -> ScenarioResult<T> {
        self.map_err(|e| ScenarioError::Failed {
            message: message.to_string(),
            error: Some(e),
        })
    }

    fn or_not_applicable(self, capability: &str, message: &str) -> ScenarioResult<T> {
        self.map_err(|e| {
            if is_not_implemented_error(&e) {
                ScenarioError::NotApplicable {
                    alert: capability.to_string(),
                    message: format!("{e:#}"),
                }
            } else {
                ScenarioError::Failed {
                    message: message.to_string(),
                    error: Some(e),
                }
            }
        })
    }
}

/// Turn a finished poll into a scenario outcome, failing with `message` when
/// the awaited state never showed up.
pub fn expect_poll<T>(
    report: anyhow::Result<PollReport<T>>,
    message: &str,
) -> ScenarioResult<PollReport<T>> {
    let report = report.or_fail("Unexpected error while polling")?;
    match &report.outcome {
        PollOutcome::Satisfied => Ok(report),
        PollOutcome::Violated(reason) => Err(ScenarioError::failed(format!("{message}: {reason}"))),
        PollOutcome::Exhausted => Err(ScenarioError::failed(format!(
            "{message} (gave up after {} reads in {} ms)",
            report.attempts,
            report.elapsed.as_millis()
        ))),
    }
}

pub(crate) const LIFECYCLE_CAPABILITY: &str = "PutBucketLifecycleConfiguration";

pub async fn put_lifecycle(
    ctx: &ScenarioContext,
    bucket: &str,
    configuration: &LifecycleConfiguration,
) -> ScenarioResult {
    ctx.storage
        .put_bucket_lifecycle_configuration(bucket, configuration)
        .await
        .or_not_applicable(LIFECYCLE_CAPABILITY, "PutBucketLifecycleConfiguration Failed")
}

pub async fn put_object(
    ctx: &ScenarioContext,
    bucket: &str,
    key: &str,
    content: &[u8],
    options: &PutOptions,
) -> ScenarioResult<PutResult> {
    ctx.storage
        .put_object(bucket, key, content.to_vec(), options)
        .await
        .or_fail("PutObject Failed")
}

/// Poll until the object (or the given version) is gone.
pub async fn expect_deleted(
    ctx: &ScenarioContext,
    bucket: &str,
    key: &str,
    version_id: Option<&str>,
) -> ScenarioResult {
    let report = ctx
        .poller
        .wait_for(
            key,
            move || ctx.storage.get_object(bucket, key, version_id),
            |observation| {
                if observation.is_absent() {
                    Progress::Satisfied
                } else {
                    Progress::Pending
                }
            },
        )
        .await;
    expect_poll(report, &format!("Expected {key} to be deleted")).map(|_| ())
}

/// Re-read for the full bound; the object must stay with `content`.
pub async fn expect_retained(
    ctx: &ScenarioContext,
    bucket: &str,
    key: &str,
    version_id: Option<&str>,
    content: &[u8],
) -> ScenarioResult {
    let report = ctx
        .poller
        .hold(
            key,
            move || ctx.storage.get_object(bucket, key, version_id),
            |observation| match observation {
                Observation::Present(object) if object.content == content => Ok(()),
                Observation::Present(_) => Err(format!("content of {key} changed")),
                Observation::Absent => Err(format!("{key} was deleted")),
            },
        )
        .await;
    expect_poll(report, &format!("Expected {key} to be retained")).map(|_| ())
}

/// Per-case state owned by the runner: the argument snapshot and the buckets
/// the case created.
#[derive(Debug)]
pub struct ScenarioRun {
    function: &'static str,
    args: BTreeMap<String, String>,
    buckets: Vec<String>,
}

impl ScenarioRun {
    fn new(function: &'static str, args: BTreeMap<String, String>) -> Self {
        ScenarioRun {
            function,
            args,
            buckets: Vec::new(),
        }
    }

    pub fn function(&self) -> &'static str {
        self.function
    }

    pub fn args(&self) -> &BTreeMap<String, String> {
        &self.args
    }

    pub fn buckets(&self) -> &[String] {
        &self.buckets
    }

    pub fn set_arg(&mut self, name: &str, value: impl ToString) {
        self.args.insert(name.to_string(), value.to_string());
    }

    /// Create a uniquely named bucket owned by this case.
    pub async fn create_bucket(&mut self, ctx: &ScenarioContext) -> ScenarioResult<String> {
        let bucket = ctx.namer.next_name();
        self.set_arg("bucketName", &bucket);
        ctx.storage
            .create_bucket(&bucket, false)
            .await
            .or_fail("CreateBucket Failed")?;
        self.buckets.push(bucket.clone());
        Ok(bucket)
    }

    /// Create a uniquely named bucket with versioning enabled.
    pub async fn create_versioned_bucket(
        &mut self,
        ctx: &ScenarioContext,
    ) -> ScenarioResult<String> {
        let bucket = self.create_bucket(ctx).await?;
        ctx.storage
            .put_bucket_versioning(&bucket, true)
            .await
            .or_not_applicable("PutBucketVersioning", "Put VersioningConfiguration failed")?;
        Ok(bucket)
    }

    /// Create a uniquely named bucket with object lock enabled.
    pub async fn create_locked_bucket(&mut self, ctx: &ScenarioContext) -> ScenarioResult<String> {
        let bucket = ctx.namer.next_name();
        self.set_arg("bucketName", &bucket);
        ctx.storage
            .create_bucket(&bucket, true)
            .await
            .or_not_applicable("ObjectLock", "CreateBucket with object lock failed")?;
        self.buckets.push(bucket.clone());
        Ok(bucket)
    }
}

/// One test case of a family.
#[async_trait]
pub trait TestCase: Send + Sync {
    /// Arguments recorded with the result, besides those added while running.
    fn args(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    async fn execute(&self, ctx: &ScenarioContext, run: &mut ScenarioRun) -> ScenarioResult;
}

/// Execute `cases` in order, reporting one result per case and scheduling
/// the cleanup of the buckets each case created.
pub async fn run_cases<C: TestCase>(ctx: &ScenarioContext, function: &'static str, cases: &[C]) {
    for (i, case) in cases.iter().enumerate() {
        if ctx.is_cancelled() {
            warn!(function = function, "cancelled. remaining cases are skipped.");
            return;
        }

        let mut args = case.args();
        if cases.len() > 1 {
            args.insert("testCase".to_string(), i.to_string());
        }
        let mut run = ScenarioRun::new(function, args);

        let start = Instant::now();
        let outcome = case.execute(ctx, &mut run).await;
        let duration = start.elapsed();

        let result = match outcome {
            Ok(()) => TestResult::pass(function, run.args.clone(), duration),
            Err(ScenarioError::Failed { message, error }) => TestResult::fail(
                function,
                run.args.clone(),
                duration,
                &message,
                error.map(|e| format!("{e:#}")),
            ),
            Err(ScenarioError::NotApplicable { alert, message }) => {
                TestResult::not_applicable(function, run.args.clone(), duration, &message, &alert)
            }
        };
        ctx.record(result);

        for bucket in &run.buckets {
            ctx.cleanup().schedule(bucket, function, run.args.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requirement {
    Lifecycle,
    Versioning,
    RemoteTier,
}

/// A scenario family.
#[async_trait]
pub trait Scenario: Send + Sync {
    /// Name reported in the `function` field.
    fn function(&self) -> &'static str;

    fn requirements(&self) -> &'static [Requirement];

    async fn run(&self, ctx: &ScenarioContext);
}

/// Every family, in execution order.
pub fn all_scenarios() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(expiry::Expiry),
        Box::new(expiry::ExpiryByAge),
        Box::new(lifecycle_config::LifecycleReplace),
        Box::new(versioned::ExpireCurrentVersion),
        Box::new(versioned::ExpireNonCurrentVersions),
        Box::new(versioned::NewerNoncurrentVersions),
        Box::new(versioned::ExpireDeleteMarkers),
        Box::new(transition::Transition),
        Box::new(transition::ExpireTransitioned),
        Box::new(restore::Restore),
        Box::new(restore::RestoreMultipart),
        Box::new(legal_hold::LockingLegalHold),
    ]
}
