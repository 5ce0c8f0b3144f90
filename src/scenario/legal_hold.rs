//! Object-lock legal hold.

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_s3::types::ObjectLockLegalHoldStatus;

use super::{
    Requirement, Scenario, ScenarioContext, ScenarioError, ScenarioResult, ScenarioResultExt,
    ScenarioRun, TestCase, put_object, run_cases,
};
use crate::types::PutOptions;
use crate::types::error::is_not_found_error;

const OBJECT: &str = "object";
const OBJECT_CONTENT: &[u8] = b"my content 1";

async fn expect_legal_hold(
    ctx: &ScenarioContext,
    bucket: &str,
    version_id: &str,
    expected: ObjectLockLegalHoldStatus,
) -> ScenarioResult {
    let status = ctx
        .storage
        .get_object_legal_hold(bucket, OBJECT, Some(version_id))
        .await
        .or_not_applicable("GetObjectLegalHold", "GetObjectLegalHold Failed")?;
    if status != expected {
        return Err(ScenarioError::failed(format!(
            "Expected legal hold {} but got {}",
            expected.as_str(),
            status.as_str()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub enum LegalHoldCase {
    /// ON blocks deletion of the version, OFF allows it.
    LockedBucket,
    /// A bucket created without object lock rejects legal-hold calls.
    UnlockedBucket,
}

impl LegalHoldCase {
    async fn locked_bucket(ctx: &ScenarioContext, run: &mut ScenarioRun) -> ScenarioResult {
        let bucket = run.create_locked_bucket(ctx).await?;

        let version_id = put_object(
            ctx,
            &bucket,
            OBJECT,
            OBJECT_CONTENT,
            &PutOptions::with_legal_hold(ObjectLockLegalHoldStatus::On),
        )
        .await?
        .version_id
        .ok_or_else(|| ScenarioError::failed("PutObject on a locked bucket returned no version id"))?;
        run.set_arg("versionId", &version_id);

        expect_legal_hold(ctx, &bucket, &version_id, ObjectLockLegalHoldStatus::On).await?;

        if ctx
            .storage
            .delete_object(&bucket, OBJECT, Some(&version_id))
            .await
            .is_ok()
        {
            return Err(ScenarioError::failed(
                "Expected DeleteObject of a version under legal hold to fail",
            ));
        }

        ctx.storage
            .put_object_legal_hold(
                &bucket,
                OBJECT,
                Some(&version_id),
                ObjectLockLegalHoldStatus::Off,
            )
            .await
            .or_not_applicable("PutObjectLegalHold", "PutObjectLegalHold Failed")?;
        expect_legal_hold(ctx, &bucket, &version_id, ObjectLockLegalHoldStatus::Off).await?;

        ctx.storage
            .delete_object(&bucket, OBJECT, Some(&version_id))
            .await
            .or_fail("DeleteObject after releasing the legal hold failed")?;

        match ctx
            .storage
            .get_object(&bucket, OBJECT, Some(&version_id))
            .await
        {
            Err(e) if is_not_found_error(&e) => Ok(()),
            Err(e) => Err(ScenarioError::Failed {
                message: "GET of the deleted version failed unexpectedly".to_string(),
                error: Some(e),
            }),
            Ok(_) => Err(ScenarioError::failed(
                "Expected the version to be deleted after releasing the legal hold",
            )),
        }
    }

    async fn unlocked_bucket(ctx: &ScenarioContext, run: &mut ScenarioRun) -> ScenarioResult {
        let bucket = run.create_bucket(ctx).await?;
        put_object(ctx, &bucket, OBJECT, OBJECT_CONTENT, &PutOptions::default()).await?;

        let result = ctx
            .storage
            .put_object_legal_hold(&bucket, OBJECT, None, ObjectLockLegalHoldStatus::On)
            .await;
        if result.is_ok() {
            return Err(ScenarioError::failed(
                "Expected PutObjectLegalHold on a bucket without object lock to fail",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl TestCase for LegalHoldCase {
    fn args(&self) -> BTreeMap<String, String> {
        let object_lock = matches!(self, LegalHoldCase::LockedBucket);
        BTreeMap::from([
            ("objectName".to_string(), OBJECT.to_string()),
            ("objectLock".to_string(), object_lock.to_string()),
        ])
    }

    async fn execute(&self, ctx: &ScenarioContext, run: &mut ScenarioRun) -> ScenarioResult {
        match self {
            LegalHoldCase::LockedBucket => Self::locked_bucket(ctx, run).await,
            LegalHoldCase::UnlockedBucket => Self::unlocked_bucket(ctx, run).await,
        }
    }
}

pub struct LockingLegalHold;

#[async_trait]
impl Scenario for LockingLegalHold {
    fn function(&self) -> &'static str {
        "testLockingLegalhold"
    }

    fn requirements(&self) -> &'static [Requirement] {
        &[Requirement::Versioning]
    }

    async fn run(&self, ctx: &ScenarioContext) {
        let cases = [LegalHoldCase::LockedBucket, LegalHoldCase::UnlockedBucket];
        run_cases(ctx, self.function(), &cases).await;
    }
}
