//! Restore of transitioned objects, single-part and multipart.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::warn;

use super::transition::{remote_tier, wait_for_transition};
use super::{
    Requirement, Scenario, ScenarioContext, ScenarioError, ScenarioResult, ScenarioResultExt,
    ScenarioRun, TestCase, expect_poll, put_lifecycle, put_object, run_cases,
};
use crate::lifecycle::{LifecycleConfiguration, LifecycleRule, day_boundary};
use crate::poller::{Observation, Progress};
use crate::types::restore::RestoreStatus;
use crate::types::{PutOptions, UploadedPart};

const OBJECT: &str = "object";
const MIB: usize = 1024 * 1024;
pub const MULTIPART_OBJECT_SIZE: usize = 15 * MIB;
pub const MULTIPART_PART_SIZE: usize = 5 * MIB;

fn random_content(len: usize) -> Vec<u8> {
    let mut content = vec![0u8; len];
    rand::thread_rng().fill(&mut content[..]);
    content
}

/// Upload `content` in parts of [`MULTIPART_PART_SIZE`], aborting the upload
/// when any step fails.
async fn upload_multipart(
    ctx: &ScenarioContext,
    bucket: &str,
    key: &str,
    content: &[u8],
) -> ScenarioResult {
    let upload_id = ctx
        .storage
        .create_multipart_upload(bucket, key)
        .await
        .or_fail("CreateMultipartUpload Failed")?;

    let result = upload_parts(ctx, bucket, key, &upload_id, content).await;
    if result.is_err() {
        if let Err(e) = ctx
            .storage
            .abort_multipart_upload(bucket, key, &upload_id)
            .await
        {
            warn!(
                bucket = bucket,
                key = key,
                upload_id = upload_id,
                error = format!("{e:#}"),
                "failed to abort multipart upload."
            );
        }
    }
    result
}

async fn upload_parts(
    ctx: &ScenarioContext,
    bucket: &str,
    key: &str,
    upload_id: &str,
    content: &[u8],
) -> ScenarioResult {
    let mut parts: Vec<UploadedPart> = Vec::new();
    for (i, chunk) in content.chunks(MULTIPART_PART_SIZE).enumerate() {
        let part_number = i as i32 + 1;
        let part = ctx
            .storage
            .upload_part(bucket, key, upload_id, part_number, chunk.to_vec())
            .await
            .or_fail(&format!("UploadPart {part_number} Failed"))?;
        parts.push(part);
    }

    ctx.storage
        .complete_multipart_upload(bucket, key, upload_id, parts)
        .await
        .or_fail("CompleteMultipartUpload Failed")?;
    Ok(())
}

/// Transition an object, restore it, and check the restored copy.
#[derive(Debug, Clone)]
pub struct RestoreCase {
    pub multipart: bool,
}

#[async_trait]
impl TestCase for RestoreCase {
    fn args(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("objectName".to_string(), OBJECT.to_string()),
            ("multipart".to_string(), self.multipart.to_string()),
        ])
    }

    async fn execute(&self, ctx: &ScenarioContext, run: &mut ScenarioRun) -> ScenarioResult {
        let tier = remote_tier(ctx)?;
        let days = ctx.config.restore_days;
        run.set_arg("storageClass", &tier);
        run.set_arg("restoreDays", days);
        let bucket = run.create_bucket(ctx).await?;

        let configuration =
            LifecycleConfiguration::single(LifecycleRule::transition_by_date(-1, &tier, ""));
        put_lifecycle(ctx, &bucket, &configuration).await?;

        let content = if self.multipart {
            let content = random_content(MULTIPART_OBJECT_SIZE);
            upload_multipart(ctx, &bucket, OBJECT, &content).await?;
            content
        } else {
            let content = b"my content 1".to_vec();
            put_object(ctx, &bucket, OBJECT, &content, &PutOptions::default()).await?;
            content
        };

        wait_for_transition(ctx, &bucket, OBJECT, &tier, &content).await?;

        ctx.storage
            .restore_object(&bucket, OBJECT, None, days)
            .await
            .or_not_applicable("RestoreObject", "RestoreObject Failed")?;

        let bucket = bucket.as_str();
        let content = content.as_slice();
        let mut restored: Option<(RestoreStatus, DateTime<Utc>)> = None;
        let report = ctx
            .poller
            .wait_for(
                OBJECT,
                move || ctx.storage.get_object(bucket, OBJECT, None),
                |observation| {
                    let object = match observation {
                        Observation::Present(object) => object,
                        Observation::Absent => {
                            return Progress::Violated(format!("{OBJECT} was deleted"));
                        }
                    };
                    let Some(header) = object.restore.as_deref() else {
                        return Progress::Pending;
                    };
                    match RestoreStatus::parse(header) {
                        Ok(status) if status.is_completed() => {
                            if object.content != content {
                                return Progress::Violated(
                                    "content of the restored object changed".to_string(),
                                );
                            }
                            restored = Some((status, Utc::now()));
                            Progress::Satisfied
                        }
                        Ok(_) => Progress::Pending,
                        Err(e) => Progress::Violated(format!("{e:#}")),
                    }
                },
            )
            .await;
        expect_poll(report, "Expected the restore to complete")?;

        match restored {
            Some((status, completed_at)) => {
                check_restore_expiry(status.expiry_date, completed_at, days)
            }
            None => Err(ScenarioError::failed("Restore completed without a status")),
        }
    }
}

/// The expiry-date must be UTC midnight `days + 1` days after the day the
/// restore was seen completed.
fn check_restore_expiry(
    actual: Option<DateTime<Utc>>,
    completed_at: DateTime<Utc>,
    days: i32,
) -> ScenarioResult {
    let expected = day_boundary(completed_at, days as i64 + 1);
    if actual != Some(expected) {
        return Err(ScenarioError::failed(format!(
            "Expected restore expiry-date {} but got {:?}",
            expected.to_rfc2822(),
            actual.map(|date| date.to_rfc2822())
        )));
    }
    Ok(())
}

pub struct Restore;

#[async_trait]
impl Scenario for Restore {
    fn function(&self) -> &'static str {
        "testRestore"
    }

    fn requirements(&self) -> &'static [Requirement] {
        &[Requirement::Lifecycle, Requirement::RemoteTier]
    }

    async fn run(&self, ctx: &ScenarioContext) {
        run_cases(ctx, self.function(), &[RestoreCase { multipart: false }]).await;
    }
}

pub struct RestoreMultipart;

#[async_trait]
impl Scenario for RestoreMultipart {
    fn function(&self) -> &'static str {
        "testRestoreMultipart"
    }

    fn requirements(&self) -> &'static [Requirement] {
        &[Requirement::Lifecycle, Requirement::RemoteTier]
    }

    async fn run(&self, ctx: &ScenarioContext) {
        run_cases(ctx, self.function(), &[RestoreCase { multipart: true }]).await;
    }
}
