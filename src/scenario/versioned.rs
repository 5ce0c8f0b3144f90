//! Version-aware expiration: current-version expiry, non-current expiry with
//! and without a retention count, and expired delete-marker cleanup.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{
    Requirement, Scenario, ScenarioContext, ScenarioError, ScenarioResult, ScenarioResultExt,
    ScenarioRun, TestCase, expect_deleted, expect_poll, put_lifecycle, put_object, run_cases,
};
use crate::lifecycle::{LifecycleConfiguration, LifecycleRule};
use crate::poller::{Observation, Progress};
use crate::storage::list_key_versions;
use crate::types::{PutOptions, S3Version};

const OBJECT: &str = "object";
const VERSIONED: &[Requirement] = &[Requirement::Lifecycle, Requirement::Versioning];

fn version_content(n: usize) -> Vec<u8> {
    format!("my content {n}").into_bytes()
}

/// Put `content` and return the version id the server assigned.
async fn put_version(
    ctx: &ScenarioContext,
    bucket: &str,
    content: &[u8],
    options: &PutOptions,
) -> ScenarioResult<String> {
    put_object(ctx, bucket, OBJECT, content, options)
        .await?
        .version_id
        .ok_or_else(|| ScenarioError::failed("PutObject on a versioned bucket returned no version id"))
}

fn invalid_configuration(e: anyhow::Error) -> ScenarioError {
    ScenarioError::Failed {
        message: "Invalid lifecycle configuration".to_string(),
        error: Some(e),
    }
}

/// Poll the version list of [`OBJECT`] until `removed` are all gone, while
/// every id in `retained` stays and no delete marker shows up.
async fn wait_for_removed_versions(
    ctx: &ScenarioContext,
    bucket: &str,
    removed: &[String],
    retained: &[String],
) -> ScenarioResult {
    let report = ctx
        .poller
        .wait_for(
            OBJECT,
            move || list_key_versions(&ctx.storage, bucket, OBJECT),
            |observation| {
                let Observation::Present(entries) = observation else {
                    return Progress::Violated("the object has no versions left".to_string());
                };
                if entries.iter().any(S3Version::is_delete_marker) {
                    return Progress::Violated("unexpected delete marker".to_string());
                }
                let present: HashSet<_> = entries.iter().filter_map(S3Version::version_id).collect();
                if let Some(missing) = retained.iter().find(|id| !present.contains(id.as_str())) {
                    return Progress::Violated(format!("version {missing} was expired"));
                }
                if removed.iter().any(|id| present.contains(id.as_str())) {
                    Progress::Pending
                } else {
                    Progress::Satisfied
                }
            },
        )
        .await;
    expect_poll(report, "Expected non-current versions to be expired").map(|_| ())
}

/// Versions that must survive for the full window.
async fn hold_versions(ctx: &ScenarioContext, bucket: &str, retained: &[String]) -> ScenarioResult {
    let report = ctx
        .poller
        .hold(
            OBJECT,
            move || list_key_versions(&ctx.storage, bucket, OBJECT),
            |observation| {
                let entries = observation.present().map(Vec::as_slice).unwrap_or_default();
                let present: HashSet<_> = entries.iter().filter_map(S3Version::version_id).collect();
                match retained.iter().find(|id| !present.contains(id.as_str())) {
                    Some(missing) => Err(format!("version {missing} was expired")),
                    None => Ok(()),
                }
            },
        )
        .await;
    expect_poll(report, "Expected all versions to be retained").map(|_| ())
}

async fn expect_version_content(
    ctx: &ScenarioContext,
    bucket: &str,
    version_id: &str,
    content: &[u8],
) -> ScenarioResult {
    let object = ctx
        .storage
        .get_object(bucket, OBJECT, Some(version_id))
        .await
        .or_fail(&format!("GET of version {version_id} failed"))?;
    if object.content != content {
        return Err(ScenarioError::failed(format!(
            "content of version {version_id} changed"
        )));
    }
    Ok(())
}

/// A past-date expiry on a versioned bucket adds a delete marker on top of
/// the current version; the versions underneath keep their content.
#[derive(Debug, Clone)]
pub struct ExpireCurrentVersionCase;

#[async_trait]
impl TestCase for ExpireCurrentVersionCase {
    fn args(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("objectName".to_string(), OBJECT.to_string())])
    }

    async fn execute(&self, ctx: &ScenarioContext, run: &mut ScenarioRun) -> ScenarioResult {
        let bucket = run.create_versioned_bucket(ctx).await?;

        let mut versions = Vec::new();
        for n in 1..=2 {
            let content = version_content(n);
            let version_id = put_version(ctx, &bucket, &content, &PutOptions::default()).await?;
            versions.push((version_id, content));
        }

        let configuration = LifecycleConfiguration::single(LifecycleRule::expire_by_date(-2, ""));
        put_lifecycle(ctx, &bucket, &configuration).await?;

        expect_deleted(ctx, &bucket, OBJECT, None).await?;

        let entries = list_key_versions(&ctx.storage, &bucket, OBJECT)
            .await
            .or_fail("ListObjectVersions Failed")?;
        match entries.first() {
            Some(latest) if latest.is_delete_marker() && latest.is_latest() => {}
            _ => {
                return Err(ScenarioError::failed(
                    "Expected a delete marker to be the current version",
                ));
            }
        }
        if entries.len() != versions.len() + 1 {
            return Err(ScenarioError::failed(format!(
                "Expected {} versions and one delete marker but found {} entries",
                versions.len(),
                entries.len()
            )));
        }

        for (version_id, content) in &versions {
            expect_version_content(ctx, &bucket, version_id, content).await?;
        }
        Ok(())
    }
}

pub struct ExpireCurrentVersion;

#[async_trait]
impl Scenario for ExpireCurrentVersion {
    fn function(&self) -> &'static str {
        "testExpireCurrentVersion"
    }

    fn requirements(&self) -> &'static [Requirement] {
        VERSIONED
    }

    async fn run(&self, ctx: &ScenarioContext) {
        run_cases(ctx, self.function(), &[ExpireCurrentVersionCase]).await;
    }
}

/// Versions are backdated by `ages_days` (oldest first, the last one becomes
/// current); versions whose age exceeds `noncurrent_days` must expire.
#[derive(Debug, Clone)]
pub struct ExpireNonCurrentCase {
    pub ages_days: Vec<i64>,
    pub noncurrent_days: i32,
}

impl ExpireNonCurrentCase {
    fn is_due(&self, age_days: i64) -> bool {
        -age_days > self.noncurrent_days as i64 + 1
    }
}

#[async_trait]
impl TestCase for ExpireNonCurrentCase {
    fn args(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("objectName".to_string(), OBJECT.to_string()),
            ("noncurrentDays".to_string(), self.noncurrent_days.to_string()),
            ("versionAges".to_string(), format!("{:?}", self.ages_days)),
        ])
    }

    async fn execute(&self, ctx: &ScenarioContext, run: &mut ScenarioRun) -> ScenarioResult {
        let bucket = run.create_versioned_bucket(ctx).await?;

        let now = Utc::now();
        let mut removed = Vec::new();
        let mut retained = Vec::new();
        let last = self.ages_days.len().saturating_sub(1);
        for (i, age) in self.ages_days.iter().enumerate() {
            let options = PutOptions::with_source_mtime(now + Duration::days(*age));
            let version_id = put_version(ctx, &bucket, &version_content(i + 1), &options).await?;
            if i != last && self.is_due(*age) {
                removed.push(version_id);
            } else {
                retained.push(version_id);
            }
        }

        let configuration = LifecycleConfiguration::single(LifecycleRule::noncurrent_expiration(
            self.noncurrent_days,
            None,
            "",
        ));
        put_lifecycle(ctx, &bucket, &configuration).await?;

        wait_for_removed_versions(ctx, &bucket, &removed, &retained).await?;

        let current = ctx
            .storage
            .get_object(&bucket, OBJECT, None)
            .await
            .or_fail("GET of the current version failed")?;
        if current.content != version_content(self.ages_days.len()) {
            return Err(ScenarioError::failed("content of the current version changed"));
        }
        Ok(())
    }
}

pub struct ExpireNonCurrentVersions;

#[async_trait]
impl Scenario for ExpireNonCurrentVersions {
    fn function(&self) -> &'static str {
        "testExpireNonCurrentVersions"
    }

    fn requirements(&self) -> &'static [Requirement] {
        VERSIONED
    }

    async fn run(&self, ctx: &ScenarioContext) {
        let case = ExpireNonCurrentCase {
            ages_days: vec![-5, -4, -3, -3, -3, 0],
            noncurrent_days: 2,
        };
        run_cases(ctx, self.function(), &[case]).await;
    }
}

/// Number of non-current versions a `NewerNoncurrentVersions = keep` rule
/// removes from a key with `versions` versions, all of them due.
pub fn expected_removed(versions: usize, keep: usize) -> usize {
    versions.saturating_sub(1).saturating_sub(keep)
}

/// Split version ids (oldest first, the last one current) into the ids a
/// `NewerNoncurrentVersions = keep` rule removes and those it retains.
pub fn split_by_retention(version_ids: &[String], keep: usize) -> (Vec<String>, Vec<String>) {
    let removed = expected_removed(version_ids.len(), keep);
    let (removed, retained) = version_ids.split_at(removed);
    (removed.to_vec(), retained.to_vec())
}

/// All versions are long past `NoncurrentDays`; only the retention count
/// decides which survive.
#[derive(Debug, Clone)]
pub struct NewerNoncurrentCase {
    pub versions: usize,
    pub keep: i32,
}

#[async_trait]
impl TestCase for NewerNoncurrentCase {
    fn args(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("objectName".to_string(), OBJECT.to_string()),
            ("versions".to_string(), self.versions.to_string()),
            ("newerNoncurrentVersions".to_string(), self.keep.to_string()),
        ])
    }

    async fn execute(&self, ctx: &ScenarioContext, run: &mut ScenarioRun) -> ScenarioResult {
        let bucket = run.create_versioned_bucket(ctx).await?;

        let base = Utc::now() - Duration::days(10);
        let mut version_ids = Vec::with_capacity(self.versions);
        for i in 0..self.versions {
            let options = PutOptions::with_source_mtime(base + Duration::minutes(i as i64));
            version_ids.push(put_version(ctx, &bucket, &version_content(i + 1), &options).await?);
        }

        let configuration = LifecycleConfiguration::single(LifecycleRule::noncurrent_expiration(
            1,
            Some(self.keep),
            "",
        ));
        put_lifecycle(ctx, &bucket, &configuration).await?;

        let (removed, retained) = split_by_retention(&version_ids, self.keep.max(0) as usize);
        if removed.is_empty() {
            hold_versions(ctx, &bucket, &retained).await
        } else {
            wait_for_removed_versions(ctx, &bucket, &removed, &retained).await
        }
    }
}

pub struct NewerNoncurrentVersions;

#[async_trait]
impl Scenario for NewerNoncurrentVersions {
    fn function(&self) -> &'static str {
        "testNewerNoncurrentVersions"
    }

    fn requirements(&self) -> &'static [Requirement] {
        VERSIONED
    }

    async fn run(&self, ctx: &ScenarioContext) {
        let cases = [
            NewerNoncurrentCase {
                versions: 5,
                keep: 2,
            },
            NewerNoncurrentCase {
                versions: 4,
                keep: 1,
            },
            NewerNoncurrentCase {
                versions: 2,
                keep: 3,
            },
        ];
        run_cases(ctx, self.function(), &cases).await;
    }
}

/// Every version expires as non-current under an explicit delete marker;
/// the marker is then alone and expired, so it must be removed too.
#[derive(Debug, Clone)]
pub struct ExpireDeleteMarkersCase;

#[async_trait]
impl TestCase for ExpireDeleteMarkersCase {
    fn args(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("objectName".to_string(), OBJECT.to_string())])
    }

    async fn execute(&self, ctx: &ScenarioContext, run: &mut ScenarioRun) -> ScenarioResult {
        let bucket = run.create_versioned_bucket(ctx).await?;

        let now = Utc::now();
        for (n, age) in [(1, -5), (2, -4)] {
            let options = PutOptions::with_source_mtime(now + Duration::days(age));
            put_version(ctx, &bucket, &version_content(n), &options).await?;
        }
        let outcome = ctx
            .storage
            .delete_object(&bucket, OBJECT, None)
            .await
            .or_fail("DeleteObject Failed")?;
        if !outcome.delete_marker {
            return Err(ScenarioError::failed(
                "DeleteObject on a versioned bucket did not create a delete marker",
            ));
        }

        let configuration = LifecycleConfiguration::new(vec![
            LifecycleRule::noncurrent_expiration(1, None, ""),
            LifecycleRule::expired_marker_cleanup(""),
        ])
        .map_err(invalid_configuration)?;
        put_lifecycle(ctx, &bucket, &configuration).await?;

        let bucket = bucket.as_str();
        let report = ctx
            .poller
            .wait_for(
                OBJECT,
                move || list_key_versions(&ctx.storage, bucket, OBJECT),
                |observation| match observation.present() {
                    Some(entries) if !entries.is_empty() => Progress::Pending,
                    _ => Progress::Satisfied,
                },
            )
            .await;
        let report = expect_poll(report, "Expected all versions and delete markers to be removed")?;

        let remaining = report.last.present().map(Vec::len).unwrap_or(0);
        if remaining != 0 {
            return Err(ScenarioError::failed(format!(
                "{remaining} versions or delete markers remain"
            )));
        }
        Ok(())
    }
}

pub struct ExpireDeleteMarkers;

#[async_trait]
impl Scenario for ExpireDeleteMarkers {
    fn function(&self) -> &'static str {
        "testExpireDeleteMarkers"
    }

    fn requirements(&self) -> &'static [Requirement] {
        VERSIONED
    }

    async fn run(&self, ctx: &ScenarioContext) {
        run_cases(ctx, self.function(), &[ExpireDeleteMarkersCase]).await;
    }
}
