pub mod client_builder;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketVersioningStatus, CompletedMultipartUpload, CompletedPart, ObjectLockLegalHold,
    ObjectLockLegalHoldStatus, RestoreRequest, VersioningConfiguration,
};
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use aws_smithy_types::body::SdkBody;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use chrono::SecondsFormat;

use crate::lifecycle::LifecycleConfiguration;
use crate::storage::{Storage, StorageTrait};
use crate::types::error::S3IlmError;
use crate::types::{
    DeleteOutcome, FetchedObject, PutOptions, PutResult, S3Version, UploadedPart, VersionListing,
};

/// MinIO records this header as the version's modification time.
const SOURCE_MTIME_HEADER: &str = "x-minio-source-mtime";

/// Classify an SDK error by its S3 error code, falling back to the HTTP
/// status when the response carried no parsable error body.
fn classify_sdk_error<E: std::fmt::Display + ProvideErrorMetadata>(
    e: &SdkError<E, Response<SdkBody>>,
) -> S3IlmError {
    if let Some(service_err) = e.as_service_error() {
        let message = service_err.message().unwrap_or("no message").to_string();
        match service_err.code() {
            Some("NoSuchKey") | Some("NotFound") => return S3IlmError::NoSuchKey(message),
            Some("NoSuchVersion") => return S3IlmError::NoSuchVersion(message),
            Some("NotImplemented") => return S3IlmError::NotImplemented(message),
            Some(code) => {
                return S3IlmError::Service {
                    code: code.to_string(),
                    message,
                };
            }
            None => {}
        }
    }

    match e.raw_response().map(|r| r.status().as_u16()) {
        Some(404) => S3IlmError::NoSuchKey(e.to_string()),
        Some(501) => S3IlmError::NotImplemented(e.to_string()),
        _ => S3IlmError::AwsSdk(e.to_string()),
    }
}

/// Log a failed S3 call and turn it into a classified `anyhow::Error`.
///
/// Not-found results are routine while polling for deletions and are only
/// logged at debug level.
fn sdk_error<E: std::fmt::Display + ProvideErrorMetadata>(
    e: SdkError<E, Response<SdkBody>>,
    api: &str,
    bucket: &str,
    key: &str,
    context: &'static str,
) -> anyhow::Error {
    let classified = classify_sdk_error(&e);
    let s3_error_code = classified.code().unwrap_or("N/A").to_string();

    if classified.is_not_found() {
        tracing::debug!(
            bucket = bucket,
            key = key,
            s3_error_code = s3_error_code,
            "S3 {} API call returned not found for s3://{}/{}.",
            api,
            bucket,
            key,
        );
    } else {
        tracing::warn!(
            bucket = bucket,
            key = key,
            s3_error_code = s3_error_code,
            s3_error_message = %classified,
            "S3 {} API call failed for s3://{}/{}: {}.",
            api,
            bucket,
            key,
            classified,
        );
    }

    anyhow!(classified).context(context)
}

/// S3 storage backed by an `aws_sdk_s3::Client`.
#[derive(Clone)]
pub struct S3Storage {
    client: Arc<Client>,
}

impl S3Storage {
    pub fn new(client: Client) -> Self {
        S3Storage {
            client: Arc::new(client),
        }
    }

    pub fn boxed(client: Client) -> Storage {
        Box::new(S3Storage::new(client))
    }
}

#[async_trait]
impl StorageTrait for S3Storage {
    async fn check_connectivity(&self) -> Result<()> {
        self.client
            .list_buckets()
            .send()
            .await
            .map_err(|e| sdk_error(e, "ListBuckets", "", "", "aws_sdk_s3::client::list_buckets() failed."))?;
        Ok(())
    }

    async fn create_bucket(&self, bucket: &str, object_lock_enabled: bool) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if object_lock_enabled {
            request = request.object_lock_enabled_for_bucket(true);
        }

        request.send().await.map_err(|e| {
            sdk_error(e, "CreateBucket", bucket, "", "aws_sdk_s3::client::create_bucket() failed.")
        })?;

        tracing::debug!(
            bucket = bucket,
            object_lock_enabled = object_lock_enabled,
            "bucket created."
        );
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| {
                sdk_error(e, "DeleteBucket", bucket, "", "aws_sdk_s3::client::delete_bucket() failed.")
            })?;
        Ok(())
    }

    async fn put_bucket_versioning(&self, bucket: &str, enabled: bool) -> Result<()> {
        let status = if enabled {
            BucketVersioningStatus::Enabled
        } else {
            BucketVersioningStatus::Suspended
        };

        self.client
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(VersioningConfiguration::builder().status(status).build())
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    e,
                    "PutBucketVersioning",
                    bucket,
                    "",
                    "aws_sdk_s3::client::put_bucket_versioning() failed.",
                )
            })?;
        Ok(())
    }

    async fn put_bucket_lifecycle_configuration(
        &self,
        bucket: &str,
        configuration: &LifecycleConfiguration,
    ) -> Result<()> {
        let lifecycle_configuration = configuration.to_sdk()?;

        self.client
            .put_bucket_lifecycle_configuration()
            .bucket(bucket)
            .lifecycle_configuration(lifecycle_configuration)
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    e,
                    "PutBucketLifecycleConfiguration",
                    bucket,
                    "",
                    "aws_sdk_s3::client::put_bucket_lifecycle_configuration() failed.",
                )
            })?;

        tracing::debug!(
            bucket = bucket,
            rules = ?configuration.rule_ids(),
            "lifecycle configuration applied."
        );
        Ok(())
    }

    async fn get_bucket_lifecycle_configuration(&self, bucket: &str) -> Result<Vec<String>> {
        let output = self
            .client
            .get_bucket_lifecycle_configuration()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    e,
                    "GetBucketLifecycleConfiguration",
                    bucket,
                    "",
                    "aws_sdk_s3::client::get_bucket_lifecycle_configuration() failed.",
                )
            })?;

        Ok(output
            .rules()
            .iter()
            .filter_map(|rule| rule.id().map(str::to_string))
            .collect())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Vec<u8>,
        options: &PutOptions,
    ) -> Result<PutResult> {
        let request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(content))
            .set_object_lock_legal_hold_status(options.legal_hold.clone());

        let result = match options.source_mtime {
            Some(source_mtime) => {
                let value = source_mtime.to_rfc3339_opts(SecondsFormat::Nanos, true);
                request
                    .customize()
                    .mutate_request(move |req| {
                        req.headers_mut().insert(SOURCE_MTIME_HEADER, value.clone());
                    })
                    .send()
                    .await
            }
            None => request.send().await,
        };

        let output = result.map_err(|e| {
            sdk_error(e, "PutObject", bucket, key, "aws_sdk_s3::client::put_object() failed.")
        })?;

        Ok(PutResult {
            version_id: output.version_id().map(str::to_string),
            e_tag: output.e_tag().map(str::to_string),
        })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<FetchedObject> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .set_version_id(version_id.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                sdk_error(e, "GetObject", bucket, key, "aws_sdk_s3::client::get_object() failed.")
            })?;

        let version_id = output.version_id().map(str::to_string);
        let storage_class = output.storage_class().map(|c| c.as_str().to_string());
        let restore = output.restore().map(str::to_string);

        let content = output
            .body
            .collect()
            .await
            .with_context(|| format!("failed to read the body of s3://{bucket}/{key}."))?
            .into_bytes()
            .to_vec();

        Ok(FetchedObject {
            content,
            version_id,
            storage_class,
            restore,
        })
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<DeleteOutcome> {
        let output = self
            .client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .set_version_id(version_id.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                sdk_error(e, "DeleteObject", bucket, key, "aws_sdk_s3::client::delete_object() failed.")
            })?;

        Ok(DeleteOutcome {
            version_id: output.version_id().map(str::to_string),
            delete_marker: output.delete_marker().unwrap_or(false),
        })
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        key_marker: Option<&str>,
        version_id_marker: Option<&str>,
    ) -> Result<VersionListing> {
        let output = self
            .client
            .list_object_versions()
            .bucket(bucket)
            .set_key_marker(key_marker.map(str::to_string))
            .set_version_id_marker(version_id_marker.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    e,
                    "ListObjectVersions",
                    bucket,
                    "",
                    "aws_sdk_s3::client::list_object_versions() failed.",
                )
            })?;

        let mut entries: Vec<S3Version> = output
            .versions()
            .iter()
            .cloned()
            .map(S3Version::Version)
            .chain(
                output
                    .delete_markers()
                    .iter()
                    .cloned()
                    .map(S3Version::DeleteMarker),
            )
            .collect();
        // Versions and markers come back in separate lists; restore the
        // per-key newest-first order.
        entries.sort_by(|a, b| {
            a.key().cmp(b.key()).then_with(|| {
                let mtime = |e: &S3Version| e.last_modified().map(|d| (d.secs(), d.subsec_nanos()));
                mtime(b).cmp(&mtime(a))
            })
        });

        Ok(VersionListing {
            entries,
            is_truncated: output.is_truncated() == Some(true),
            next_key_marker: output.next_key_marker().map(str::to_string),
            next_version_id_marker: output.next_version_id_marker().map(str::to_string),
        })
    }

    async fn put_object_legal_hold(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        status: ObjectLockLegalHoldStatus,
    ) -> Result<()> {
        self.client
            .put_object_legal_hold()
            .bucket(bucket)
            .key(key)
            .set_version_id(version_id.map(str::to_string))
            .legal_hold(ObjectLockLegalHold::builder().status(status).build())
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    e,
                    "PutObjectLegalHold",
                    bucket,
                    key,
                    "aws_sdk_s3::client::put_object_legal_hold() failed.",
                )
            })?;
        Ok(())
    }

    async fn get_object_legal_hold(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<ObjectLockLegalHoldStatus> {
        let output = self
            .client
            .get_object_legal_hold()
            .bucket(bucket)
            .key(key)
            .set_version_id(version_id.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    e,
                    "GetObjectLegalHold",
                    bucket,
                    key,
                    "aws_sdk_s3::client::get_object_legal_hold() failed.",
                )
            })?;

        output
            .legal_hold()
            .and_then(|hold| hold.status())
            .cloned()
            .ok_or_else(|| anyhow!("GetObjectLegalHold for s3://{bucket}/{key} returned no status."))
    }

    async fn restore_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        days: i32,
    ) -> Result<()> {
        self.client
            .restore_object()
            .bucket(bucket)
            .key(key)
            .set_version_id(version_id.map(str::to_string))
            .restore_request(RestoreRequest::builder().days(days).build())
            .send()
            .await
            .map_err(|e| {
                sdk_error(e, "RestoreObject", bucket, key, "aws_sdk_s3::client::restore_object() failed.")
            })?;

        tracing::debug!(bucket = bucket, key = key, days = days, "restore requested.");
        Ok(())
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    e,
                    "CreateMultipartUpload",
                    bucket,
                    key,
                    "aws_sdk_s3::client::create_multipart_upload() failed.",
                )
            })?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("CreateMultipartUpload for s3://{bucket}/{key} returned no upload id."))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        content: Vec<u8>,
    ) -> Result<UploadedPart> {
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| {
                sdk_error(e, "UploadPart", bucket, key, "aws_sdk_s3::client::upload_part() failed.")
            })?;

        let e_tag = output
            .e_tag()
            .ok_or_else(|| anyhow!("UploadPart {part_number} for s3://{bucket}/{key} returned no ETag."))?;

        Ok(UploadedPart {
            part_number,
            e_tag: e_tag.to_string(),
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<PutResult> {
        let completed_parts = parts
            .into_iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(part.e_tag)
                    .build()
            })
            .collect();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    e,
                    "CompleteMultipartUpload",
                    bucket,
                    key,
                    "aws_sdk_s3::client::complete_multipart_upload() failed.",
                )
            })?;

        Ok(PutResult {
            version_id: output.version_id().map(str::to_string),
            e_tag: output.e_tag().map(str::to_string),
        })
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    e,
                    "AbortMultipartUpload",
                    bucket,
                    key,
                    "aws_sdk_s3::client::abort_multipart_upload() failed.",
                )
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::error::{is_not_found_error, is_not_implemented_error};
    use aws_sdk_s3::operation::get_object::GetObjectError;
    use aws_smithy_runtime_api::http::StatusCode;
    use aws_smithy_types::error::ErrorMetadata;

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }

    fn service_error(
        code: Option<&str>,
        status: u16,
    ) -> SdkError<GetObjectError, Response<SdkBody>> {
        let mut metadata = ErrorMetadata::builder().message("test message");
        if let Some(code) = code {
            metadata = metadata.code(code);
        }
        SdkError::service_error(
            GetObjectError::generic(metadata.build()),
            Response::new(StatusCode::try_from(status).unwrap(), SdkBody::empty()),
        )
    }

    #[test]
    fn classify_not_found_codes() {
        init_dummy_tracing_subscriber();

        assert_eq!(
            classify_sdk_error(&service_error(Some("NoSuchKey"), 404)),
            S3IlmError::NoSuchKey("test message".to_string())
        );
        assert_eq!(
            classify_sdk_error(&service_error(Some("NotFound"), 404)),
            S3IlmError::NoSuchKey("test message".to_string())
        );
        assert_eq!(
            classify_sdk_error(&service_error(Some("NoSuchVersion"), 404)),
            S3IlmError::NoSuchVersion("test message".to_string())
        );
    }

    #[test]
    fn classify_not_implemented() {
        assert_eq!(
            classify_sdk_error(&service_error(Some("NotImplemented"), 501)),
            S3IlmError::NotImplemented("test message".to_string())
        );
    }

    #[test]
    fn classify_other_service_error() {
        assert_eq!(
            classify_sdk_error(&service_error(Some("AccessDenied"), 403)),
            S3IlmError::Service {
                code: "AccessDenied".to_string(),
                message: "test message".to_string(),
            }
        );
    }

    #[test]
    fn classify_falls_back_to_status() {
        assert!(matches!(
            classify_sdk_error(&service_error(None, 404)),
            S3IlmError::NoSuchKey(_)
        ));
        assert!(matches!(
            classify_sdk_error(&service_error(None, 501)),
            S3IlmError::NotImplemented(_)
        ));
        assert!(matches!(
            classify_sdk_error(&service_error(None, 500)),
            S3IlmError::AwsSdk(_)
        ));
    }

    #[test]
    fn classify_timeout_is_sdk_error() {
        let e: SdkError<GetObjectError, Response<SdkBody>> =
            SdkError::timeout_error("operation timed out");
        assert!(matches!(classify_sdk_error(&e), S3IlmError::AwsSdk(_)));
    }

    #[test]
    fn sdk_error_keeps_classification_under_context() {
        let e = sdk_error(
            service_error(Some("NoSuchVersion"), 404),
            "GetObject",
            "bucket",
            "key",
            "aws_sdk_s3::client::get_object() failed.",
        );
        assert!(is_not_found_error(&e));
        assert_eq!(e.to_string(), "aws_sdk_s3::client::get_object() failed.");

        let e = sdk_error(
            service_error(Some("NotImplemented"), 501),
            "PutBucketLifecycleConfiguration",
            "bucket",
            "",
            "aws_sdk_s3::client::put_bucket_lifecycle_configuration() failed.",
        );
        assert!(is_not_implemented_error(&e));
    }
}
