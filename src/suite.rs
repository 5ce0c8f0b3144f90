//! Suite orchestration.
//!
//! [`Suite::run`] checks that the server answers, probes the optional APIs
//! the selected families depend on, then runs the families one after another.
//! A family whose requirement is missing gets a single NA record instead of
//! running. Bucket cleanups scheduled along the way are joined before the
//! summary is returned, and their failures are recorded as FAIL results.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::naming::BucketNamer;
use crate::probe::{Capability, probe_lifecycle, probe_versioning};
use crate::report::{ResultReporter, SuiteSummary, TestResult};
use crate::scenario::{
    LIFECYCLE_CAPABILITY, Requirement, Scenario, ScenarioContext, all_scenarios,
};
use crate::storage::{Storage, create_storage};
use crate::types::error::S3IlmError;
use crate::types::token::SuiteCancellationToken;

const VERSIONING_CAPABILITY: &str = "PutBucketVersioning";
const MISSING_TIER_ALERT: &str = "REMOTE_TIER_NAME is not set";

/// Runs the whole conformance suite against one server.
///
/// Families run one after another; the buckets they create are cleaned up
/// in background tasks that are awaited before [`Suite::run`] returns.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use s3ilm_rs::{Config, JsonLinesReporter, Suite, create_suite_cancellation_token};
///
/// # async fn run() -> anyhow::Result<()> {
/// let config = Config::for_endpoint("http://localhost:9000", "minioadmin", "minioadmin");
/// let suite = Suite::new(
///     config,
///     Arc::new(JsonLinesReporter::stdout()),
///     create_suite_cancellation_token(),
/// )
/// .await?;
///
/// let summary = suite.run().await?;
/// println!("{} passed, {} failed", summary.passed, summary.failed);
/// # Ok(())
/// # }
/// ```
pub struct Suite {
    ctx: ScenarioContext,
    scenarios: Vec<Box<dyn Scenario>>,
}

#[derive(Debug, Clone)]
struct Capabilities {
    lifecycle: Capability,
    versioning: Capability,
}

impl Suite {
    /// Connect to the server described by `config`.
    pub async fn new(
        config: Config,
        reporter: Arc<dyn ResultReporter>,
        cancellation_token: SuiteCancellationToken,
    ) -> Result<Self> {
        let storage = create_storage(&config).await?;
        Ok(Self::with_storage(
            storage,
            config,
            reporter,
            cancellation_token,
        ))
    }

    pub fn with_storage(
        storage: Storage,
        config: Config,
        reporter: Arc<dyn ResultReporter>,
        cancellation_token: SuiteCancellationToken,
    ) -> Self {
        Suite {
            ctx: ScenarioContext::new(storage, config, reporter, cancellation_token),
            scenarios: all_scenarios(),
        }
    }

    pub fn with_namer(mut self, namer: BucketNamer) -> Self {
        self.ctx = self.ctx.with_namer(namer);
        self
    }

    /// Functions of the families selected by the include pattern, in run order.
    pub fn selected_functions(&self) -> Vec<&'static str> {
        self.selected().map(|scenario| scenario.function()).collect()
    }

    fn selected(&self) -> impl Iterator<Item = &dyn Scenario> {
        self.scenarios
            .iter()
            .map(Box::as_ref)
            .filter(|scenario| self.ctx.config.is_scenario_selected(scenario.function()))
    }

    fn needs(&self, requirement: Requirement) -> bool {
        self.selected()
            .any(|scenario| scenario.requirements().contains(&requirement))
    }

    /// Run every selected family and wait for all cleanups.
    ///
    /// Scenario failures are reported, not returned; only an unreachable
    /// server is an error.
    pub async fn run(&self) -> Result<SuiteSummary> {
        self.ctx
            .storage
            .check_connectivity()
            .await
            .map_err(|e| anyhow!(S3IlmError::Connection(format!("{e:#}"))))?;
        info!("connected to the server under test.");

        let capabilities = self.probe_capabilities().await;

        for scenario in self.selected() {
            if self.ctx.is_cancelled() {
                warn!("cancellation requested. no further scenarios are started.");
                break;
            }

            if let Some(result) = self.unmet_requirement(scenario, &capabilities) {
                self.ctx.record(result);
                continue;
            }

            info!(function = scenario.function(), "scenario started.");
            scenario.run(&self.ctx).await;
            debug!(function = scenario.function(), "scenario finished.");
        }

        let pending = self.ctx.cleanup().pending();
        if pending > 0 {
            info!(buckets = pending, "waiting for bucket cleanup.");
        }
        for failure in self.ctx.cleanup().join_all().await {
            self.ctx.record(failure);
        }

        let summary = self.ctx.summary();
        info!(
            passed = summary.passed,
            failed = summary.failed,
            not_applicable = summary.not_applicable,
            "suite finished."
        );
        Ok(summary)
    }

    async fn probe_capabilities(&self) -> Capabilities {
        let lifecycle = if self.needs(Requirement::Lifecycle) {
            probe_lifecycle(&self.ctx).await
        } else {
            Capability::Supported
        };
        let versioning = if self.needs(Requirement::Versioning) {
            probe_versioning(&self.ctx).await
        } else {
            Capability::Supported
        };
        Capabilities {
            lifecycle,
            versioning,
        }
    }

    /// An NA record for the first requirement of `scenario` that is not met.
    fn unmet_requirement(
        &self,
        scenario: &dyn Scenario,
        capabilities: &Capabilities,
    ) -> Option<TestResult> {
        let function = scenario.function();
        scenario
            .requirements()
            .iter()
            .find_map(|requirement| match requirement {
                Requirement::Lifecycle if !capabilities.lifecycle.is_available() => {
                    Some(TestResult::not_applicable(
                        function,
                        BTreeMap::new(),
                        Duration::ZERO,
                        "PutBucketLifecycleConfiguration is not implemented by the server",
                        LIFECYCLE_CAPABILITY,
                    ))
                }
                Requirement::Versioning if !capabilities.versioning.is_available() => {
                    Some(TestResult::not_applicable(
                        function,
                        BTreeMap::new(),
                        Duration::ZERO,
                        "PutBucketVersioning is not implemented by the server",
                        VERSIONING_CAPABILITY,
                    ))
                }
                Requirement::RemoteTier if self.ctx.remote_tier().is_none() => {
                    Some(TestResult::not_applicable_with_alert(
                        function,
                        BTreeMap::new(),
                        Duration::ZERO,
                        "transition and restore need a remote tier; set REMOTE_TIER_NAME",
                        MISSING_TIER_ALERT,
                    ))
                }
                _ => None,
            })
    }
}
