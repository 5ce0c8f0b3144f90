//! Lifecycle configuration replacement.

use async_trait::async_trait;

use super::{
    LIFECYCLE_CAPABILITY, Requirement, Scenario, ScenarioContext, ScenarioError, ScenarioResult,
    ScenarioResultExt, ScenarioRun, TestCase, expect_retained, put_lifecycle, put_object,
    run_cases,
};
use crate::lifecycle::{LifecycleConfiguration, LifecycleRule};
use crate::types::PutOptions;

const REPLACED_OBJECT: &str = "expire/object";
const OBJECT_CONTENT: &[u8] = b"my content 1";

/// The second PutBucketLifecycleConfiguration must replace the first one
/// entirely: the first rule disappears from the stored configuration and no
/// longer acts on objects.
#[derive(Debug, Clone)]
pub struct ReplaceCase;

async fn stored_rule_ids(ctx: &ScenarioContext, bucket: &str) -> ScenarioResult<Vec<String>> {
    let mut ids = ctx
        .storage
        .get_bucket_lifecycle_configuration(bucket)
        .await
        .or_not_applicable(LIFECYCLE_CAPABILITY, "GetBucketLifecycleConfiguration Failed")?;
    ids.sort();
    Ok(ids)
}

#[async_trait]
impl TestCase for ReplaceCase {
    async fn execute(&self, ctx: &ScenarioContext, run: &mut ScenarioRun) -> ScenarioResult {
        let bucket = run.create_bucket(ctx).await?;

        let first = LifecycleConfiguration::single(
            LifecycleRule::expire_by_date(-1, "expire").with_id("first-expire"),
        );
        put_lifecycle(ctx, &bucket, &first).await?;
        let ids = stored_rule_ids(ctx, &bucket).await?;
        if ids != first.rule_ids() {
            return Err(ScenarioError::failed(format!(
                "Expected rules {:?} but got {:?}",
                first.rule_ids(),
                ids
            )));
        }

        // Neither rule makes "expire/object" due; only the replaced one would.
        let second = LifecycleConfiguration::new(vec![
            LifecycleRule::expire_by_date(-1, "unused").with_id("second-expire"),
            LifecycleRule::expire_by_age(30, "expire").with_id("second-age"),
        ])
        .map_err(|e| ScenarioError::Failed {
            message: "Invalid lifecycle configuration".to_string(),
            error: Some(e),
        })?;
        put_lifecycle(ctx, &bucket, &second).await?;

        let mut expected = second.rule_ids();
        expected.sort();
        let ids = stored_rule_ids(ctx, &bucket).await?;
        if ids != expected {
            return Err(ScenarioError::failed(format!(
                "Expected the configuration to be replaced by {expected:?} but got {ids:?}"
            )));
        }

        put_object(
            ctx,
            &bucket,
            REPLACED_OBJECT,
            OBJECT_CONTENT,
            &PutOptions::default(),
        )
        .await?;
        expect_retained(ctx, &bucket, REPLACED_OBJECT, None, OBJECT_CONTENT).await
    }
}

pub struct LifecycleReplace;

#[async_trait]
impl Scenario for LifecycleReplace {
    fn function(&self) -> &'static str {
        "testLifecycleReplace"
    }

    fn requirements(&self) -> &'static [Requirement] {
        &[Requirement::Lifecycle]
    }

    async fn run(&self, ctx: &ScenarioContext) {
        run_cases(ctx, self.function(), &[ReplaceCase]).await;
    }
}
