use std::fmt;
use std::fmt::{Debug, Formatter};

use aws_sdk_s3::primitives::DateTime;
use aws_sdk_s3::types::{DeleteMarkerEntry, ObjectLockLegalHoldStatus, ObjectVersion};
use chrono::Utc;
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

pub mod error;
pub mod restore;
pub mod token;

/// An entry returned by ListObjectVersions.
///
/// Versions and delete markers share the version-id space of a key, so the
/// cleanup pass and the versioned scenarios treat them as one ordered list.
#[derive(Debug, Clone, PartialEq)]
pub enum S3Version {
    Version(ObjectVersion),
    DeleteMarker(DeleteMarkerEntry),
}

impl S3Version {
    pub fn key(&self) -> &str {
        match &self {
            Self::Version(version) => version.key().unwrap_or_default(),
            Self::DeleteMarker(marker) => marker.key().unwrap_or_default(),
        }
    }

    pub fn version_id(&self) -> Option<&str> {
        match &self {
            Self::Version(version) => version.version_id(),
            Self::DeleteMarker(marker) => marker.version_id(),
        }
    }

    pub fn last_modified(&self) -> Option<&DateTime> {
        match &self {
            Self::Version(version) => version.last_modified(),
            Self::DeleteMarker(marker) => marker.last_modified(),
        }
    }

    pub fn is_latest(&self) -> bool {
        match &self {
            Self::Version(version) => version.is_latest().unwrap_or(false),
            Self::DeleteMarker(marker) => marker.is_latest().unwrap_or(false),
        }
    }

    pub fn is_delete_marker(&self) -> bool {
        matches!(self, Self::DeleteMarker(_))
    }
}

/// One page of a ListObjectVersions response.
#[derive(Debug, Clone, Default)]
pub struct VersionListing {
    pub entries: Vec<S3Version>,
    pub is_truncated: bool,
    pub next_key_marker: Option<String>,
    pub next_version_id_marker: Option<String>,
}

/// Optional attributes attached to a PutObject request.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Backdated modification time, sent as `x-minio-source-mtime`.
    ///
    /// Servers that honour the header record it as the version's mtime, which
    /// lets non-current expiry be exercised without waiting for days.
    pub source_mtime: Option<chrono::DateTime<Utc>>,
    pub legal_hold: Option<ObjectLockLegalHoldStatus>,
}

impl PutOptions {
    pub fn with_source_mtime(source_mtime: chrono::DateTime<Utc>) -> Self {
        PutOptions {
            source_mtime: Some(source_mtime),
            ..PutOptions::default()
        }
    }

    pub fn with_legal_hold(status: ObjectLockLegalHoldStatus) -> Self {
        PutOptions {
            legal_hold: Some(status),
            ..PutOptions::default()
        }
    }
}

/// Result of a successful PutObject or CompleteMultipartUpload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutResult {
    pub version_id: Option<String>,
    pub e_tag: Option<String>,
}

/// A fully-read GetObject response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedObject {
    pub content: Vec<u8>,
    pub version_id: Option<String>,
    pub storage_class: Option<String>,
    /// Raw `x-amz-restore` header, see [`restore::RestoreStatus`].
    pub restore: Option<String>,
}

/// Result of a DeleteObject call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteOutcome {
    pub version_id: Option<String>,
    pub delete_marker: bool,
}

/// A part handed back by UploadPart, needed to complete the upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedPart {
    pub part_number: i32,
    pub e_tag: String,
}

/// AWS credential types supported by s3ilm-rs.
#[derive(Debug, Clone)]
pub enum S3Credentials {
    Credentials { access_keys: AccessKeys },
    FromEnvironment,
}

/// AWS access key pair with secure zeroization.
///
/// The secret_access_key and session_token are securely cleared from memory
/// when this struct is dropped, using the zeroize crate.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        let session_token = self
            .session_token
            .as_ref()
            .map_or("None", |_| "** redacted **");
        keys.field("access_key", &self.access_key)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token);
        keys.finish()
    }
}
