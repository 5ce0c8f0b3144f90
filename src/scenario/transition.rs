//! Transition to the remote tier, and expiry of transitioned objects.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{
    Requirement, Scenario, ScenarioContext, ScenarioError, ScenarioResult, ScenarioRun, TestCase,
    expect_deleted, expect_poll, expect_retained, put_lifecycle, put_object, run_cases,
};
use crate::lifecycle::{LifecycleConfiguration, LifecycleRule};
use crate::poller::{Observation, Progress};
use crate::types::PutOptions;

const OBJECT_CONTENT: &[u8] = b"my content 1";
const TIERED: &[Requirement] = &[Requirement::Lifecycle, Requirement::RemoteTier];

/// The configured remote tier, or NA when there is none.
pub(crate) fn remote_tier(ctx: &ScenarioContext) -> ScenarioResult<String> {
    ctx.remote_tier()
        .map(str::to_string)
        .ok_or_else(|| ScenarioError::NotApplicable {
            alert: "RemoteTier".to_string(),
            message: "REMOTE_TIER_NAME is not set".to_string(),
        })
}

/// Poll until the object reports `tier` as its storage class, with its
/// content unchanged.
pub(crate) async fn wait_for_transition(
    ctx: &ScenarioContext,
    bucket: &str,
    key: &str,
    tier: &str,
    content: &[u8],
) -> ScenarioResult {
    let report = ctx
        .poller
        .wait_for(
            key,
            move || ctx.storage.get_object(bucket, key, None),
            |observation| match observation {
                Observation::Present(object) if object.storage_class.as_deref() == Some(tier) => {
                    if object.content == content {
                        Progress::Satisfied
                    } else {
                        Progress::Violated(format!("content of {key} changed on transition"))
                    }
                }
                Observation::Present(_) => Progress::Pending,
                Observation::Absent => Progress::Violated(format!("{key} was deleted")),
            },
        )
        .await;
    expect_poll(report, &format!("Expected {key} to be transitioned to {tier}")).map(|_| ())
}

/// Re-read for the full bound; the object must stay out of `tier`.
async fn expect_not_transitioned(
    ctx: &ScenarioContext,
    bucket: &str,
    key: &str,
    tier: &str,
    content: &[u8],
) -> ScenarioResult {
    let report = ctx
        .poller
        .hold(
            key,
            move || ctx.storage.get_object(bucket, key, None),
            |observation| match observation {
                Observation::Present(object) if object.storage_class.as_deref() == Some(tier) => {
                    Err(format!("{key} was transitioned to {tier}"))
                }
                Observation::Present(object) if object.content != content => {
                    Err(format!("content of {key} changed"))
                }
                Observation::Present(_) => Ok(()),
                Observation::Absent => Err(format!("{key} was deleted")),
            },
        )
        .await;
    expect_poll(report, &format!("Expected {key} not to be transitioned")).map(|_| ())
}

#[derive(Debug, Clone)]
pub struct TransitionCase {
    pub object: &'static str,
    pub prefix: &'static str,
    pub transition_offset_days: i64,
    pub expect_transitioned: bool,
}

fn transition_cases() -> Vec<TransitionCase> {
    vec![
        TransitionCase {
            object: "object",
            prefix: "",
            transition_offset_days: 1,
            expect_transitioned: false,
        },
        TransitionCase {
            object: "object",
            prefix: "",
            transition_offset_days: -1,
            expect_transitioned: true,
        },
        TransitionCase {
            object: "object",
            prefix: "prefix",
            transition_offset_days: -1,
            expect_transitioned: false,
        },
        TransitionCase {
            object: "prefix/object",
            prefix: "prefix",
            transition_offset_days: -1,
            expect_transitioned: true,
        },
    ]
}

#[async_trait]
impl TestCase for TransitionCase {
    fn args(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("objectName".to_string(), self.object.to_string()),
            ("prefix".to_string(), self.prefix.to_string()),
            (
                "transitionOffsetDays".to_string(),
                self.transition_offset_days.to_string(),
            ),
        ])
    }

    async fn execute(&self, ctx: &ScenarioContext, run: &mut ScenarioRun) -> ScenarioResult {
        let tier = remote_tier(ctx)?;
        run.set_arg("storageClass", &tier);
        let bucket = run.create_bucket(ctx).await?;

        let configuration = LifecycleConfiguration::single(LifecycleRule::transition_by_date(
            self.transition_offset_days,
            &tier,
            self.prefix,
        ));
        put_lifecycle(ctx, &bucket, &configuration).await?;
        put_object(
            ctx,
            &bucket,
            self.object,
            OBJECT_CONTENT,
            &PutOptions::default(),
        )
        .await?;

        if self.expect_transitioned {
            wait_for_transition(ctx, &bucket, self.object, &tier, OBJECT_CONTENT).await
        } else {
            expect_not_transitioned(ctx, &bucket, self.object, &tier, OBJECT_CONTENT).await
        }
    }
}

pub struct Transition;

#[async_trait]
impl Scenario for Transition {
    fn function(&self) -> &'static str {
        "testTransition"
    }

    fn requirements(&self) -> &'static [Requirement] {
        TIERED
    }

    async fn run(&self, ctx: &ScenarioContext) {
        run_cases(ctx, self.function(), &transition_cases()).await;
    }
}

/// An object already in the remote tier is expired once the configuration
/// is replaced by a past-date expiry matching its key.
#[derive(Debug, Clone)]
pub struct ExpireTransitionedCase {
    pub object: &'static str,
    pub prefix: &'static str,
    pub expect_deleted: bool,
}

#[async_trait]
impl TestCase for ExpireTransitionedCase {
    fn args(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("objectName".to_string(), self.object.to_string()),
            ("prefix".to_string(), self.prefix.to_string()),
        ])
    }

    async fn execute(&self, ctx: &ScenarioContext, run: &mut ScenarioRun) -> ScenarioResult {
        let tier = remote_tier(ctx)?;
        run.set_arg("storageClass", &tier);
        let bucket = run.create_bucket(ctx).await?;

        let transition =
            LifecycleConfiguration::single(LifecycleRule::transition_by_date(-1, &tier, ""));
        put_lifecycle(ctx, &bucket, &transition).await?;
        put_object(
            ctx,
            &bucket,
            self.object,
            OBJECT_CONTENT,
            &PutOptions::default(),
        )
        .await?;
        wait_for_transition(ctx, &bucket, self.object, &tier, OBJECT_CONTENT).await?;

        let expiry = LifecycleConfiguration::single(LifecycleRule::expire_by_date(-1, self.prefix));
        put_lifecycle(ctx, &bucket, &expiry).await?;

        if self.expect_deleted {
            expect_deleted(ctx, &bucket, self.object, None).await
        } else {
            expect_retained(ctx, &bucket, self.object, None, OBJECT_CONTENT).await
        }
    }
}

pub struct ExpireTransitioned;

#[async_trait]
impl Scenario for ExpireTransitioned {
    fn function(&self) -> &'static str {
        "testExpireTransitioned"
    }

    fn requirements(&self) -> &'static [Requirement] {
        TIERED
    }

    async fn run(&self, ctx: &ScenarioContext) {
        let cases = [
            ExpireTransitionedCase {
                object: "prefix/object",
                prefix: "prefix",
                expect_deleted: true,
            },
            ExpireTransitionedCase {
                object: "object",
                prefix: "prefix",
                expect_deleted: false,
            },
        ];
        run_cases(ctx, self.function(), &cases).await;
    }
}
