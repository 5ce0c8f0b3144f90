use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::types::ObjectLockLegalHoldStatus;
use dyn_clone::DynClone;

use crate::config::Config;
use crate::lifecycle::LifecycleConfiguration;
use crate::types::error::S3IlmError;
use crate::types::{
    DeleteOutcome, FetchedObject, PutOptions, PutResult, S3Version, UploadedPart, VersionListing,
};

pub mod s3;

/// Type alias for a boxed Storage trait object.
pub type Storage = Box<dyn StorageTrait + Send + Sync>;

/// The S3 operations the suite needs from the server under test.
///
/// Every method takes the bucket explicitly: scenarios create their own
/// buckets, and the cleanup coordinator works on buckets from all of them.
/// Failed calls return an `anyhow::Error` wrapping a classified
/// [`S3IlmError`], so callers can use
/// [`is_not_found_error`](crate::types::error::is_not_found_error) and
/// [`is_not_implemented_error`](crate::types::error::is_not_implemented_error).
#[async_trait]
pub trait StorageTrait: DynClone {
    /// Cheap authenticated call used to fail fast on a bad endpoint.
    async fn check_connectivity(&self) -> Result<()>;

    async fn create_bucket(&self, bucket: &str, object_lock_enabled: bool) -> Result<()>;

    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    async fn put_bucket_versioning(&self, bucket: &str, enabled: bool) -> Result<()>;

    /// Replaces the bucket's whole lifecycle configuration.
    async fn put_bucket_lifecycle_configuration(
        &self,
        bucket: &str,
        configuration: &LifecycleConfiguration,
    ) -> Result<()>;

    /// Returns the ids of the rules currently configured.
    async fn get_bucket_lifecycle_configuration(&self, bucket: &str) -> Result<Vec<String>>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Vec<u8>,
        options: &PutOptions,
    ) -> Result<PutResult>;

    /// Reads the object and its body completely.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<FetchedObject>;

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<DeleteOutcome>;

    /// One page of ListObjectVersions, starting after the given markers.
    async fn list_object_versions(
        &self,
        bucket: &str,
        key_marker: Option<&str>,
        version_id_marker: Option<&str>,
    ) -> Result<VersionListing>;

    async fn put_object_legal_hold(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        status: ObjectLockLegalHoldStatus,
    ) -> Result<()>;

    async fn get_object_legal_hold(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<ObjectLockLegalHoldStatus>;

    async fn restore_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        days: i32,
    ) -> Result<()>;

    /// Returns the upload id.
    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String>;

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        content: Vec<u8>,
    ) -> Result<UploadedPart>;

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<PutResult>;

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str)
    -> Result<()>;
}

dyn_clone::clone_trait_object!(StorageTrait);

/// Upper bound on ListObjectVersions pages walked in one listing.
pub(crate) const MAX_LISTING_PAGES: usize = 10_000;

/// Walk every page of ListObjectVersions for `bucket`.
///
/// Entries are returned in listing order: by key, newest version first.
pub async fn list_all_versions(storage: &Storage, bucket: &str) -> Result<Vec<S3Version>> {
    let mut entries = Vec::new();
    let mut key_marker: Option<String> = None;
    let mut version_id_marker: Option<String> = None;

    for _ in 0..MAX_LISTING_PAGES {
        let page = storage
            .list_object_versions(bucket, key_marker.as_deref(), version_id_marker.as_deref())
            .await?;
        entries.extend(page.entries);

        if !page.is_truncated {
            return Ok(entries);
        }
        if page.next_key_marker.is_none() && page.next_version_id_marker.is_none() {
            return Err(anyhow!(
                "truncated ListObjectVersions response for {bucket} carries no markers"
            ));
        }
        key_marker = page.next_key_marker;
        version_id_marker = page.next_version_id_marker;
    }

    Err(anyhow!(
        "ListObjectVersions for {bucket} did not finish within {MAX_LISTING_PAGES} pages"
    ))
}

/// All entries (versions and delete markers) of one key, newest first.
pub async fn list_key_versions(
    storage: &Storage,
    bucket: &str,
    key: &str,
) -> Result<Vec<S3Version>> {
    Ok(list_all_versions(storage, bucket)
        .await?
        .into_iter()
        .filter(|entry| entry.key() == key)
        .collect())
}

/// Create the S3 storage for the server described by `config`.
pub async fn create_storage(config: &Config) -> Result<Storage> {
    let client_config = config
        .client_config
        .as_ref()
        .ok_or_else(|| anyhow!(S3IlmError::InvalidConfig("no client configuration".into())))?;

    Ok(s3::S3Storage::boxed(client_config.create_client().await))
}
