//! Capability probes.
//!
//! Before the families that depend on an optional API run, the suite tries
//! that API once against a throwaway bucket. Only an explicit `NotImplemented`
//! classification marks the capability as absent; any other failure leaves
//! the probe inconclusive, which the suite logs and then treats as supported
//! so a broken server shows up as failed scenarios rather than NA ones.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{info, warn};

use crate::lifecycle::{LifecycleConfiguration, LifecycleRule};
use crate::scenario::ScenarioContext;
use crate::types::error::is_not_implemented_error;

pub const LIFECYCLE_PROBE_FUNCTION: &str = "isPutLifecycleConfigurationImplemented";
pub const VERSIONING_PROBE_FUNCTION: &str = "isPutBucketVersioningImplemented";

const PROBE_RULE_ID: &str = "check-ilm-implemented";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Supported,
    NotImplemented,
    /// The probe failed for another reason.
    Unknown(String),
}

impl Capability {
    /// Whether dependent scenarios should run.
    pub fn is_available(&self) -> bool {
        !matches!(self, Capability::NotImplemented)
    }

    fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Capability::Supported,
            Err(e) if is_not_implemented_error(&e) => Capability::NotImplemented,
            Err(e) => Capability::Unknown(format!("{e:#}")),
        }
    }
}

/// Is PutBucketLifecycleConfiguration implemented?
pub async fn probe_lifecycle(ctx: &ScenarioContext) -> Capability {
    let capability = probe(ctx, LIFECYCLE_PROBE_FUNCTION, |ctx, bucket| async move {
        let configuration = LifecycleConfiguration::single(
            LifecycleRule::expire_by_date(1, "").with_id(PROBE_RULE_ID),
        );
        ctx.storage
            .put_bucket_lifecycle_configuration(&bucket, &configuration)
            .await
    })
    .await;
    log_capability("PutBucketLifecycleConfiguration", &capability);
    capability
}

/// Is PutBucketVersioning implemented?
pub async fn probe_versioning(ctx: &ScenarioContext) -> Capability {
    let capability = probe(ctx, VERSIONING_PROBE_FUNCTION, |ctx, bucket| async move {
        ctx.storage.put_bucket_versioning(&bucket, true).await
    })
    .await;
    log_capability("PutBucketVersioning", &capability);
    capability
}

async fn probe<'a, F, Fut>(ctx: &'a ScenarioContext, function: &str, operation: F) -> Capability
where
    F: FnOnce(&'a ScenarioContext, String) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let bucket = ctx.namer.next_name();
    let args = BTreeMap::from([("bucketName".to_string(), bucket.clone())]);

    if let Err(e) = ctx.storage.create_bucket(&bucket, false).await {
        return Capability::from_result(Err(e));
    }

    let capability = Capability::from_result(operation(ctx, bucket.clone()).await);
    ctx.cleanup().schedule(&bucket, function, args);
    capability
}

fn log_capability(api: &str, capability: &Capability) {
    match capability {
        Capability::Supported => info!(api = api, "capability probe: supported."),
        Capability::NotImplemented => warn!(api = api, "capability probe: not implemented."),
        Capability::Unknown(error) => warn!(
            api = api,
            error = error,
            "capability probe was inconclusive. dependent scenarios will run."
        ),
    }
}
