//! Cleanup coordinator.
//!
//! Every bucket a scenario creates is handed to [`CleanupCoordinator::schedule`]
//! when the scenario finishes, whatever its outcome. Each bucket is emptied
//! and deleted by its own task in a shared [`JoinSet`]; the suite calls
//! [`CleanupCoordinator::join_all`] once at the end and reports every bucket
//! that could not be removed within the ceiling as a failed result of the
//! function that created it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use aws_sdk_s3::types::ObjectLockLegalHoldStatus;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::report::TestResult;
use crate::storage::{MAX_LISTING_PAGES, Storage};
use crate::types::error::s3_error_code;

const NO_SUCH_BUCKET: &str = "NoSuchBucket";

#[derive(Clone)]
pub struct CleanupCoordinator {
    storage: Storage,
    retry_interval: Duration,
    timeout: Duration,
    tasks: Arc<Mutex<JoinSet<Option<TestResult>>>>,
}

impl CleanupCoordinator {
    pub fn new(storage: Storage, retry_interval: Duration, timeout: Duration) -> Self {
        CleanupCoordinator {
            storage,
            retry_interval,
            timeout,
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn from_config(storage: Storage, config: &Config) -> Self {
        Self::new(
            storage,
            config.cleanup_retry_interval(),
            config.cleanup_timeout(),
        )
    }

    /// Spawn the removal of `bucket`. A failure is attributed to `function`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self, bucket: &str, function: &str, args: BTreeMap<String, String>) {
        let storage = self.storage.clone();
        let retry_interval = self.retry_interval;
        let timeout = self.timeout;
        let bucket = bucket.to_string();
        let function = function.to_string();

        debug!(bucket = bucket, function = function, "cleanup scheduled.");

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.spawn(async move {
            let start = Instant::now();
            match cleanup_bucket(&storage, &bucket, retry_interval, timeout).await {
                Ok(()) => None,
                Err(e) => Some(TestResult::fail(
                    &function,
                    args,
                    start.elapsed(),
                    &format!("Unable to cleanup bucket '{bucket}' after ILM tests"),
                    Some(format!("{e:#}")),
                )),
            }
        });
    }

    pub fn pending(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Wait for every scheduled cleanup and return the failures.
    ///
    /// Cleanups scheduled while this is waiting are picked up by the next call.
    pub async fn join_all(&self) -> Vec<TestResult> {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(failure)) => failures.push(failure),
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "cleanup task did not complete.");
                    failures.push(TestResult::fail(
                        "cleanupBucket",
                        BTreeMap::new(),
                        Duration::ZERO,
                        "cleanup task did not complete",
                        Some(e.to_string()),
                    ));
                }
            }
        }
        failures
    }
}

/// Empty and delete `bucket`, retrying every `retry_interval` until `timeout`.
///
/// A bucket that no longer exists counts as removed.
pub async fn cleanup_bucket(
    storage: &Storage,
    bucket: &str,
    retry_interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let start = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = match remove_bucket(storage, bucket).await {
            Err(e) if s3_error_code(&e) == Some(NO_SUCH_BUCKET) => Ok(()),
            result => result,
        };

        let e = match result {
            Ok(()) => {
                info!(bucket = bucket, attempt = attempt, "bucket removed.");
                return Ok(());
            }
            Err(e) => e,
        };

        if start.elapsed() + retry_interval > timeout {
            return Err(e.context(format!(
                "bucket {bucket} could not be removed within {} seconds ({attempt} attempts).",
                timeout.as_secs()
            )));
        }

        warn!(
            bucket = bucket,
            attempt = attempt,
            error = format!("{e:#}"),
            "bucket removal failed. retrying in {} ms.",
            retry_interval.as_millis()
        );
        tokio::time::sleep(retry_interval).await;
    }
}

/// One removal pass: delete every version and delete marker, then the bucket.
///
/// Entries are deleted page by page as they are listed. A listing error ends
/// the walk but the bucket deletion is still attempted.
async fn remove_bucket(storage: &Storage, bucket: &str) -> Result<()> {
    let mut deleted = 0;
    let mut failed = 0;
    let mut listing_error = None;
    let mut key_marker: Option<String> = None;
    let mut version_id_marker: Option<String> = None;

    for _ in 0..MAX_LISTING_PAGES {
        let page = match storage
            .list_object_versions(bucket, key_marker.as_deref(), version_id_marker.as_deref())
            .await
        {
            Ok(page) => page,
            Err(e) => {
                warn!(
                    bucket = bucket,
                    key_marker = key_marker.as_deref().unwrap_or_default(),
                    error = format!("{e:#}"),
                    "failed to list object versions during cleanup."
                );
                listing_error = Some(e);
                break;
            }
        };

        for entry in &page.entries {
            match delete_version(storage, bucket, entry.key(), entry.version_id()).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    failed += 1;
                    warn!(
                        bucket = bucket,
                        key = entry.key(),
                        version_id = entry.version_id().unwrap_or_default(),
                        error = format!("{e:#}"),
                        "failed to delete object version during cleanup."
                    );
                }
            }
        }

        if !page.is_truncated
            || (page.next_key_marker.is_none() && page.next_version_id_marker.is_none())
        {
            break;
        }
        key_marker = page.next_key_marker;
        version_id_marker = page.next_version_id_marker;
    }
    debug!(
        bucket = bucket,
        deleted = deleted,
        failed = failed,
        listing_failed = listing_error.is_some(),
        "cleanup pass finished."
    );

    storage.delete_bucket(bucket).await.with_context(|| {
        let mut message = format!("failed to delete bucket {bucket}.");
        if failed > 0 {
            message.push_str(&format!(" {failed} versions could not be deleted."));
        }
        if let Some(e) = &listing_error {
            message.push_str(&format!(" listing versions failed: {e:#}"));
        }
        message
    })
}

/// Delete a version, releasing its legal hold once if the first attempt fails.
async fn delete_version(
    storage: &Storage,
    bucket: &str,
    key: &str,
    version_id: Option<&str>,
) -> Result<()> {
    let first = match storage.delete_object(bucket, key, version_id).await {
        Ok(_) => return Ok(()),
        Err(e) => e,
    };

    if storage
        .put_object_legal_hold(bucket, key, version_id, ObjectLockLegalHoldStatus::Off)
        .await
        .is_err()
    {
        return Err(first);
    }

    debug!(bucket = bucket, key = key, "legal hold released for cleanup.");
    storage
        .delete_object(bucket, key, version_id)
        .await
        .map(|_| ())
        .map_err(|e| {
            warn!(bucket = bucket, key = key, error = format!("{first:#}"), "first delete attempt failed.");
            e.context("delete failed again after releasing the legal hold.")
        })
}
