//! Shared test utilities for the s3ilm-rs library crate.
//!
//! [`MockStorage`] is an in-memory [`StorageTrait`] with a tiny simulated
//! lifecycle scanner, so the poller, the cleanup coordinator, the probes and
//! the scenarios can be exercised without a server.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::primitives::DateTime as SmithyDateTime;
use aws_sdk_s3::types::{
    DeleteMarkerEntry, ObjectLockLegalHoldStatus, ObjectVersion, ObjectVersionStorageClass,
};
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::lifecycle::{
    ExpirationSpec, LifecycleConfiguration, RuleAction, RuleStatus, day_boundary,
};
use crate::storage::StorageTrait;
use crate::types::error::S3IlmError;
use crate::types::{
    DeleteOutcome, FetchedObject, PutOptions, PutResult, S3Version, UploadedPart, VersionListing,
};

pub(crate) const TEST_TIER: &str = "WARM-TIER";
const STANDARD: &str = "STANDARD";
const NULL_VERSION: &str = "null";

/// Initialise a dummy tracing subscriber for tests.
///
/// Uses `try_init` so that only the first call in a process actually
/// installs the subscriber; subsequent calls are silently ignored.
pub(crate) fn init_dummy_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dummy=trace")
        .try_init();
}

/// A [`Config`] with short bounds, a remote tier and no client settings.
pub(crate) fn make_test_config() -> Config {
    Config {
        remote_tier_name: Some(TEST_TIER.to_string()),
        max_scanner_wait_seconds: 5,
        poll_interval_milliseconds: 100,
        cleanup_retry_interval_milliseconds: 100,
        cleanup_timeout_seconds: 2,
        ..Config::default()
    }
}

#[derive(Debug, Clone)]
struct MockRestore {
    days: i32,
    reads_left: u32,
}

#[derive(Debug, Clone)]
struct MockEntry {
    version_id: String,
    /// `None` for a delete marker.
    content: Option<Vec<u8>>,
    last_modified: DateTime<Utc>,
    storage_class: String,
    restore: Option<MockRestore>,
    restore_expiry: Option<DateTime<Utc>>,
    legal_hold: bool,
}

impl MockEntry {
    fn is_delete_marker(&self) -> bool {
        self.content.is_none()
    }

    fn restore_header(&self) -> Option<String> {
        if self.restore.is_some() {
            return Some(r#"ongoing-request="true""#.to_string());
        }
        self.restore_expiry.map(|expiry| {
            format!(
                r#"ongoing-request="false", expiry-date="{}""#,
                expiry.format("%a, %d %b %Y %H:%M:%S GMT")
            )
        })
    }

    fn to_s3_version(&self, key: &str, is_latest: bool) -> S3Version {
        let last_modified = SmithyDateTime::from_chrono_utc(self.last_modified);
        match &self.content {
            Some(content) => S3Version::Version(
                ObjectVersion::builder()
                    .key(key)
                    .version_id(&self.version_id)
                    .is_latest(is_latest)
                    .last_modified(last_modified)
                    .size(content.len() as i64)
                    .storage_class(ObjectVersionStorageClass::from(self.storage_class.as_str()))
                    .build(),
            ),
            None => S3Version::DeleteMarker(
                DeleteMarkerEntry::builder()
                    .key(key)
                    .version_id(&self.version_id)
                    .is_latest(is_latest)
                    .last_modified(last_modified)
                    .build(),
            ),
        }
    }
}

#[derive(Debug, Default)]
struct MockUpload {
    key: String,
    parts: BTreeMap<i32, Vec<u8>>,
}

#[derive(Debug, Default)]
struct MockBucket {
    versioned: bool,
    object_lock: bool,
    lifecycle: Option<LifecycleConfiguration>,
    /// Versions of each key, oldest first.
    objects: BTreeMap<String, Vec<MockEntry>>,
    uploads: HashMap<String, MockUpload>,
    reads: u32,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    code: String,
    remaining: Option<u32>,
}

#[derive(Debug)]
struct MockState {
    buckets: BTreeMap<String, MockBucket>,
    next_id: u64,
    page_size: usize,
    scan_delay_reads: u32,
    restore_delay_reads: u32,
    lifecycle_not_implemented: bool,
    versioning_not_implemented: bool,
    object_lock_not_implemented: bool,
    failures: HashMap<&'static str, InjectedFailure>,
    paged_listing_failure: Option<String>,
    calls: HashMap<&'static str, usize>,
}

impl Default for MockState {
    fn default() -> Self {
        MockState {
            buckets: BTreeMap::new(),
            next_id: 0,
            page_size: 1000,
            scan_delay_reads: 0,
            restore_delay_reads: 1,
            lifecycle_not_implemented: false,
            versioning_not_implemented: false,
            object_lock_not_implemented: false,
            failures: HashMap::new(),
            paged_listing_failure: None,
            calls: HashMap::new(),
        }
    }
}

fn service_error(code: &str, message: &str) -> anyhow::Error {
    anyhow!(S3IlmError::Service {
        code: code.to_string(),
        message: message.to_string(),
    })
}

fn no_such_bucket(bucket: &str) -> anyhow::Error {
    service_error("NoSuchBucket", &format!("bucket {bucket} does not exist"))
}

impl MockState {
    fn next_version_id(&mut self) -> String {
        self.next_id += 1;
        format!("v{:06}", self.next_id)
    }

    fn bucket_mut(&mut self, bucket: &str) -> Result<&mut MockBucket> {
        self.buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))
    }

    /// Count a read and run the simulated scanner once enough reads happened.
    fn read(&mut self, bucket: &str) -> Result<()> {
        let delay = self.scan_delay_reads;
        let b = self.bucket_mut(bucket)?;
        b.reads += 1;
        if b.reads > delay {
            b.scan(Utc::now());
        }
        Ok(())
    }
}

impl MockBucket {
    fn new(versioned: bool, object_lock: bool) -> Self {
        MockBucket {
            versioned: versioned || object_lock,
            object_lock,
            ..MockBucket::default()
        }
    }

    fn scan(&mut self, now: DateTime<Utc>) {
        let Some(lifecycle) = self.lifecycle.clone() else {
            return;
        };
        let today = day_boundary(now, 0);
        let rules: Vec<_> = lifecycle
            .rules()
            .iter()
            .filter(|rule| rule.status() == RuleStatus::Enabled)
            .collect();

        for rule in &rules {
            if let RuleAction::Transition {
                date,
                storage_class,
            } = rule.action()
            {
                if *date > now {
                    continue;
                }
                for (key, entries) in self.objects.iter_mut() {
                    if !rule.matches(key) {
                        continue;
                    }
                    if let Some(latest) = entries.last_mut() {
                        if !latest.is_delete_marker() && latest.storage_class == STANDARD {
                            latest.storage_class = storage_class.clone();
                        }
                    }
                }
            }
        }

        for rule in &rules {
            if let RuleAction::NoncurrentVersionExpiration {
                noncurrent_days,
                newer_noncurrent_versions,
            } = rule.action()
            {
                let keep = newer_noncurrent_versions.unwrap_or(0).max(0) as usize;
                for (key, entries) in self.objects.iter_mut() {
                    if !rule.matches(key) || entries.len() < 2 {
                        continue;
                    }
                    let current = entries.len() - 1;
                    let mut retained = Vec::with_capacity(entries.len());
                    // Non-current versions, newest first.
                    for (rank, entry) in entries[..current].iter().rev().enumerate() {
                        let due = day_boundary(entry.last_modified, *noncurrent_days as i64 + 1);
                        if rank < keep || entry.legal_hold || due >= today {
                            retained.push(entry.clone());
                        }
                    }
                    retained.reverse();
                    retained.push(entries[current].clone());
                    *entries = retained;
                }
            }
        }

        for rule in &rules {
            let RuleAction::Expiration(spec) = rule.action() else {
                continue;
            };
            if *spec == ExpirationSpec::ExpiredObjectDeleteMarker {
                continue;
            }
            let mut next_marker_ids = Vec::new();
            for (key, entries) in self.objects.iter_mut() {
                if !rule.matches(key) {
                    continue;
                }
                let Some(latest) = entries.last() else {
                    continue;
                };
                if latest.is_delete_marker() {
                    continue;
                }
                let expired = match spec {
                    ExpirationSpec::Date(date) => *date <= now,
                    ExpirationSpec::Days(days) => {
                        day_boundary(latest.last_modified, *days as i64 + 1) <= now
                    }
                    ExpirationSpec::ExpiredObjectDeleteMarker => false,
                };
                if expired {
                    next_marker_ids.push(key.clone());
                }
            }
            for key in next_marker_ids {
                if self.versioned {
                    let marker_id = format!("marker-{}", now.timestamp_micros());
                    if let Some(entries) = self.objects.get_mut(&key) {
                        entries.push(MockEntry {
                            version_id: marker_id,
                            content: None,
                            last_modified: now,
                            storage_class: STANDARD.to_string(),
                            restore: None,
                            restore_expiry: None,
                            legal_hold: false,
                        });
                    }
                } else {
                    self.objects.remove(&key);
                }
            }
        }

        for rule in &rules {
            if *rule.action() != RuleAction::Expiration(ExpirationSpec::ExpiredObjectDeleteMarker) {
                continue;
            }
            self.objects.retain(|key, entries| {
                !(rule.matches(key) && entries.len() == 1 && entries[0].is_delete_marker())
            });
        }

        self.objects.retain(|_, entries| !entries.is_empty());
    }

    fn flattened(&self) -> Vec<(String, MockEntry, bool)> {
        self.objects
            .iter()
            .flat_map(|(key, entries)| {
                entries
                    .iter()
                    .rev()
                    .enumerate()
                    .map(move |(i, entry)| (key.clone(), entry.clone(), i == 0))
            })
            .collect()
    }
}

/// In-memory storage for unit tests.
///
/// Cloning shares the state, so a test can keep a handle for assertions after
/// boxing a clone as [`crate::storage::Storage`].
///
/// The simulated scanner runs on every read (GetObject, ListObjectVersions)
/// once `with_scan_delay` reads have passed:
/// - transitions move current versions to the rule's storage class,
/// - non-current versions expire when whole days past the threshold,
///   keeping `NewerNoncurrentVersions` of the newest,
/// - expiration removes the object, or adds a delete marker when versioned,
/// - a lone delete marker is removed by `ExpiredObjectDeleteMarker`.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockStorage {
    state: Arc<Mutex<MockState>>,
}

impl MockStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call and return the injected failure for `op`, if any.
    fn enter(&self, op: &'static str) -> Result<MutexGuard<'_, MockState>> {
        let mut state = self.lock();
        *state.calls.entry(op).or_insert(0) += 1;

        if let Some(failure) = state.failures.get_mut(op) {
            let code = failure.code.clone();
            match failure.remaining.as_mut() {
                Some(0) => {}
                Some(remaining) => {
                    *remaining -= 1;
                    return Err(injected_error(&code, op));
                }
                None => return Err(injected_error(&code, op)),
            }
        }
        Ok(state)
    }

    pub(crate) fn with_page_size(self, page_size: usize) -> Self {
        self.lock().page_size = page_size.max(1);
        self
    }

    /// The scanner only acts after this many reads of a bucket.
    pub(crate) fn with_scan_delay(self, reads: u32) -> Self {
        self.lock().scan_delay_reads = reads;
        self
    }

    /// Restores complete after this many reads of the object.
    pub(crate) fn with_restore_delay(self, reads: u32) -> Self {
        self.lock().restore_delay_reads = reads;
        self
    }

    pub(crate) fn with_lifecycle_not_implemented(self) -> Self {
        self.lock().lifecycle_not_implemented = true;
        self
    }

    pub(crate) fn with_versioning_not_implemented(self) -> Self {
        self.lock().versioning_not_implemented = true;
        self
    }

    pub(crate) fn with_object_lock_not_implemented(self) -> Self {
        self.lock().object_lock_not_implemented = true;
        self
    }

    /// Every call of `op` fails with the S3 error `code`.
    pub(crate) fn fail_operation(&self, op: &'static str, code: &str) {
        self.lock().failures.insert(
            op,
            InjectedFailure {
                code: code.to_string(),
                remaining: None,
            },
        );
    }

    /// The next `times` calls of `op` fail with the S3 error `code`.
    pub(crate) fn fail_operation_times(&self, op: &'static str, code: &str, times: u32) {
        self.lock().failures.insert(
            op,
            InjectedFailure {
                code: code.to_string(),
                remaining: Some(times),
            },
        );
    }

    /// ListObjectVersions fails with `code` for every page after the first.
    pub(crate) fn fail_paged_listing(&self, code: &str) {
        self.lock().paged_listing_failure = Some(code.to_string());
    }

    pub(crate) fn insert_bucket(&self, bucket: &str, versioned: bool) {
        self.lock()
            .buckets
            .insert(bucket.to_string(), MockBucket::new(versioned, false));
    }

    pub(crate) fn insert_object(&self, bucket: &str, key: &str, content: &[u8]) -> String {
        self.insert_object_with_mtime(bucket, key, content, Utc::now())
    }

    pub(crate) fn insert_object_with_mtime(
        &self,
        bucket: &str,
        key: &str,
        content: &[u8],
        last_modified: DateTime<Utc>,
    ) -> String {
        let mut state = self.lock();
        let version_id = state.next_version_id();
        let b = state
            .buckets
            .get_mut(bucket)
            .unwrap_or_else(|| panic!("bucket {bucket} not inserted"));
        let version_id = if b.versioned {
            version_id
        } else {
            b.objects.remove(key);
            NULL_VERSION.to_string()
        };
        b.objects.entry(key.to_string()).or_default().push(MockEntry {
            version_id: version_id.clone(),
            content: Some(content.to_vec()),
            last_modified,
            storage_class: STANDARD.to_string(),
            restore: None,
            restore_expiry: None,
            legal_hold: false,
        });
        version_id
    }

    pub(crate) fn bucket_exists(&self, bucket: &str) -> bool {
        self.lock().buckets.contains_key(bucket)
    }

    pub(crate) fn bucket_names(&self) -> Vec<String> {
        self.lock().buckets.keys().cloned().collect()
    }

    /// Versions and delete markers left in `bucket`.
    pub(crate) fn entry_count(&self, bucket: &str) -> usize {
        self.lock()
            .buckets
            .get(bucket)
            .map(|b| b.objects.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub(crate) fn calls(&self, op: &str) -> usize {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.calls("list_object_versions")
    }
}

fn injected_error(code: &str, op: &str) -> anyhow::Error {
    match code {
        "NoSuchKey" => anyhow!(S3IlmError::NoSuchKey(format!("injected by {op}"))),
        "NoSuchVersion" => anyhow!(S3IlmError::NoSuchVersion(format!("injected by {op}"))),
        "NotImplemented" => anyhow!(S3IlmError::NotImplemented(format!("injected by {op}"))),
        "AwsSdk" => anyhow!(S3IlmError::AwsSdk(format!("injected by {op}"))),
        _ => service_error(code, &format!("injected by {op}")),
    }
}

#[async_trait]
impl StorageTrait for MockStorage {
    async fn check_connectivity(&self) -> Result<()> {
        self.enter("check_connectivity")?;
        Ok(())
    }

    async fn create_bucket(&self, bucket: &str, object_lock_enabled: bool) -> Result<()> {
        let mut state = self.enter("create_bucket")?;
        if object_lock_enabled && state.object_lock_not_implemented {
            return Err(anyhow!(S3IlmError::NotImplemented(
                "object lock is not implemented".to_string()
            )));
        }
        if state.buckets.contains_key(bucket) {
            return Err(service_error("BucketAlreadyOwnedByYou", bucket));
        }
        state.buckets.insert(
            bucket.to_string(),
            MockBucket::new(false, object_lock_enabled),
        );
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let mut state = self.enter("delete_bucket")?;
        let b = state.bucket_mut(bucket)?;
        if !b.objects.is_empty() {
            return Err(service_error("BucketNotEmpty", bucket));
        }
        state.buckets.remove(bucket);
        Ok(())
    }

    async fn put_bucket_versioning(&self, bucket: &str, enabled: bool) -> Result<()> {
        let mut state = self.enter("put_bucket_versioning")?;
        if state.versioning_not_implemented {
            return Err(anyhow!(S3IlmError::NotImplemented(
                "versioning is not implemented".to_string()
            )));
        }
        state.bucket_mut(bucket)?.versioned = enabled;
        Ok(())
    }

    async fn put_bucket_lifecycle_configuration(
        &self,
        bucket: &str,
        configuration: &LifecycleConfiguration,
    ) -> Result<()> {
        let mut state = self.enter("put_bucket_lifecycle_configuration")?;
        if state.lifecycle_not_implemented {
            return Err(anyhow!(S3IlmError::NotImplemented(
                "lifecycle is not implemented".to_string()
            )));
        }
        state.bucket_mut(bucket)?.lifecycle = Some(configuration.clone());
        Ok(())
    }

    async fn get_bucket_lifecycle_configuration(&self, bucket: &str) -> Result<Vec<String>> {
        let mut state = self.enter("get_bucket_lifecycle_configuration")?;
        match &state.bucket_mut(bucket)?.lifecycle {
            Some(lifecycle) => Ok(lifecycle.rule_ids()),
            None => Err(service_error(
                "NoSuchLifecycleConfiguration",
                "The lifecycle configuration does not exist",
            )),
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Vec<u8>,
        options: &PutOptions,
    ) -> Result<PutResult> {
        let mut state = self.enter("put_object")?;
        let next_id = state.next_version_id();
        let b = state.bucket_mut(bucket)?;
        if options.legal_hold.is_some() && !b.object_lock {
            return Err(service_error(
                "InvalidRequest",
                "Bucket is missing ObjectLockConfiguration",
            ));
        }

        let version_id = if b.versioned {
            next_id
        } else {
            b.objects.remove(key);
            NULL_VERSION.to_string()
        };
        b.objects.entry(key.to_string()).or_default().push(MockEntry {
            version_id: version_id.clone(),
            content: Some(content),
            last_modified: options.source_mtime.unwrap_or_else(Utc::now),
            storage_class: STANDARD.to_string(),
            restore: None,
            restore_expiry: None,
            legal_hold: options.legal_hold == Some(ObjectLockLegalHoldStatus::On),
        });

        Ok(PutResult {
            version_id: b.versioned.then_some(version_id),
            e_tag: Some(format!("\"etag-{key}\"")),
        })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<FetchedObject> {
        let mut state = self.enter("get_object")?;
        state.read(bucket)?;
        let b = state.bucket_mut(bucket)?;
        let versioned = b.versioned;

        let entries = b.objects.get_mut(key);
        let entry = match (entries, version_id) {
            (None, None) => {
                return Err(anyhow!(S3IlmError::NoSuchKey(format!("{key} not found"))));
            }
            (None, Some(v)) => {
                return Err(anyhow!(S3IlmError::NoSuchVersion(format!("{key}?versionId={v}"))));
            }
            (Some(entries), None) => match entries.last_mut() {
                Some(entry) if !entry.is_delete_marker() => entry,
                _ => return Err(anyhow!(S3IlmError::NoSuchKey(format!("{key} not found")))),
            },
            (Some(entries), Some(v)) => match entries.iter_mut().find(|e| e.version_id == v) {
                Some(entry) if entry.is_delete_marker() => {
                    return Err(service_error(
                        "MethodNotAllowed",
                        "The specified method is not allowed against this resource.",
                    ));
                }
                Some(entry) => entry,
                None => {
                    return Err(anyhow!(S3IlmError::NoSuchVersion(format!(
                        "{key}?versionId={v}"
                    ))));
                }
            },
        };

        if let Some(restore) = entry.restore.as_mut() {
            if restore.reads_left == 0 {
                let days = restore.days;
                entry.restore = None;
                entry.restore_expiry = Some(day_boundary(Utc::now(), days as i64 + 1));
            } else {
                restore.reads_left -= 1;
            }
        }

        Ok(FetchedObject {
            content: entry.content.clone().unwrap_or_default(),
            version_id: versioned.then(|| entry.version_id.clone()),
            storage_class: (entry.storage_class != STANDARD).then(|| entry.storage_class.clone()),
            restore: entry.restore_header(),
        })
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<DeleteOutcome> {
        let mut state = self.enter("delete_object")?;
        let marker_id = state.next_version_id();
        let b = state.bucket_mut(bucket)?;

        match version_id {
            None if b.versioned => {
                b.objects.entry(key.to_string()).or_default().push(MockEntry {
                    version_id: marker_id.clone(),
                    content: None,
                    last_modified: Utc::now(),
                    storage_class: STANDARD.to_string(),
                    restore: None,
                    restore_expiry: None,
                    legal_hold: false,
                });
                Ok(DeleteOutcome {
                    version_id: Some(marker_id),
                    delete_marker: true,
                })
            }
            None => {
                b.objects.remove(key);
                Ok(DeleteOutcome::default())
            }
            Some(v) => {
                let Some(entries) = b.objects.get_mut(key) else {
                    return Ok(DeleteOutcome::default());
                };
                let Some(position) = entries.iter().position(|e| e.version_id == v) else {
                    return Ok(DeleteOutcome::default());
                };
                if entries[position].legal_hold {
                    return Err(service_error("AccessDenied", "Object is WORM protected"));
                }
                let removed = entries.remove(position);
                if entries.is_empty() {
                    b.objects.remove(key);
                }
                Ok(DeleteOutcome {
                    version_id: Some(removed.version_id),
                    delete_marker: removed.content.is_none(),
                })
            }
        }
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        key_marker: Option<&str>,
        version_id_marker: Option<&str>,
    ) -> Result<VersionListing> {
        let mut state = self.enter("list_object_versions")?;
        if key_marker.is_some() {
            if let Some(code) = &state.paged_listing_failure {
                return Err(injected_error(code, "list_object_versions"));
            }
        }
        state.read(bucket)?;
        let page_size = state.page_size;
        let flattened = state.bucket_mut(bucket)?.flattened();

        let start = match (key_marker, version_id_marker) {
            (None, _) => 0,
            // Positional, so a marker whose entry was deleted still resumes
            // at the next one. Versions of a key are listed newest (highest
            // id) first.
            (Some(km), Some(vm)) => flattened
                .iter()
                .position(|(k, e, _)| k.as_str() > km || (k == km && e.version_id.as_str() < vm))
                .unwrap_or(flattened.len()),
            (Some(km), None) => flattened
                .iter()
                .position(|(k, _, _)| k.as_str() > km)
                .unwrap_or(flattened.len()),
        };

        let page: Vec<_> = flattened.iter().skip(start).take(page_size).collect();
        let is_truncated = start + page.len() < flattened.len();
        let (next_key_marker, next_version_id_marker) = match (is_truncated, page.last()) {
            (true, Some((k, e, _))) => (Some(k.clone()), Some(e.version_id.clone())),
            _ => (None, None),
        };

        Ok(VersionListing {
            entries: page
                .into_iter()
                .map(|(k, e, latest)| e.to_s3_version(k, *latest))
                .collect(),
            is_truncated,
            next_key_marker,
            next_version_id_marker,
        })
    }

    async fn put_object_legal_hold(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        status: ObjectLockLegalHoldStatus,
    ) -> Result<()> {
        let mut state = self.enter("put_object_legal_hold")?;
        let b = state.bucket_mut(bucket)?;
        if !b.object_lock {
            return Err(service_error(
                "InvalidRequest",
                "Bucket is missing ObjectLockConfiguration",
            ));
        }
        let entry = find_entry(b, key, version_id)?;
        entry.legal_hold = status == ObjectLockLegalHoldStatus::On;
        Ok(())
    }

    async fn get_object_legal_hold(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<ObjectLockLegalHoldStatus> {
        let mut state = self.enter("get_object_legal_hold")?;
        let b = state.bucket_mut(bucket)?;
        if !b.object_lock {
            return Err(service_error(
                "InvalidRequest",
                "Bucket is missing ObjectLockConfiguration",
            ));
        }
        let entry = find_entry(b, key, version_id)?;
        Ok(if entry.legal_hold {
            ObjectLockLegalHoldStatus::On
        } else {
            ObjectLockLegalHoldStatus::Off
        })
    }

    async fn restore_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        days: i32,
    ) -> Result<()> {
        let mut state = self.enter("restore_object")?;
        let reads_left = state.restore_delay_reads;
        let b = state.bucket_mut(bucket)?;
        let entry = find_entry(b, key, version_id)?;
        if entry.storage_class == STANDARD {
            return Err(service_error(
                "InvalidObjectState",
                "The operation is not valid for the object's storage class",
            ));
        }
        entry.restore = Some(MockRestore { days, reads_left });
        entry.restore_expiry = None;
        Ok(())
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        let mut state = self.enter("create_multipart_upload")?;
        let upload_id = format!("upload-{}", state.next_version_id());
        state.bucket_mut(bucket)?.uploads.insert(
            upload_id.clone(),
            MockUpload {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        content: Vec<u8>,
    ) -> Result<UploadedPart> {
        let mut state = self.enter("upload_part")?;
        let upload = state
            .bucket_mut(bucket)?
            .uploads
            .get_mut(upload_id)
            .filter(|upload| upload.key == key)
            .ok_or_else(|| service_error("NoSuchUpload", upload_id))?;
        upload.parts.insert(part_number, content);
        Ok(UploadedPart {
            part_number,
            e_tag: format!("\"etag-part-{part_number}\""),
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<PutResult> {
        let mut state = self.enter("complete_multipart_upload")?;
        let next_id = state.next_version_id();
        let b = state.bucket_mut(bucket)?;
        let upload = b
            .uploads
            .remove(upload_id)
            .ok_or_else(|| service_error("NoSuchUpload", upload_id))?;

        let mut content = Vec::new();
        for part in &parts {
            let data = upload
                .parts
                .get(&part.part_number)
                .ok_or_else(|| service_error("InvalidPart", &part.part_number.to_string()))?;
            content.extend_from_slice(data);
        }

        let version_id = if b.versioned {
            next_id
        } else {
            b.objects.remove(key);
            NULL_VERSION.to_string()
        };
        b.objects.entry(key.to_string()).or_default().push(MockEntry {
            version_id: version_id.clone(),
            content: Some(content),
            last_modified: Utc::now(),
            storage_class: STANDARD.to_string(),
            restore: None,
            restore_expiry: None,
            legal_hold: false,
        });

        Ok(PutResult {
            version_id: b.versioned.then_some(version_id),
            e_tag: Some(format!("\"etag-{key}-{}\"", parts.len())),
        })
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> Result<()> {
        let mut state = self.enter("abort_multipart_upload")?;
        state.bucket_mut(bucket)?.uploads.remove(upload_id);
        Ok(())
    }
}

fn find_entry<'a>(
    b: &'a mut MockBucket,
    key: &str,
    version_id: Option<&str>,
) -> Result<&'a mut MockEntry> {
    let entries = b
        .objects
        .get_mut(key)
        .ok_or_else(|| anyhow!(S3IlmError::NoSuchKey(format!("{key} not found"))))?;
    let entry = match version_id {
        Some(v) => entries.iter_mut().find(|e| e.version_id == v),
        None => entries.last_mut(),
    };
    entry
        .filter(|e| !e.is_delete_marker())
        .ok_or_else(|| anyhow!(S3IlmError::NoSuchVersion(format!("{key} version not found"))))
}
