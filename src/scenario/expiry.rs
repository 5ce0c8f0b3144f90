//! Expiration of non-versioned objects, by date and by age.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{
    Requirement, Scenario, ScenarioContext, ScenarioResult, ScenarioRun, TestCase,
    expect_deleted, expect_retained, put_lifecycle, put_object, run_cases,
};
use crate::lifecycle::{LifecycleConfiguration, LifecycleRule};
use crate::types::PutOptions;

pub(crate) const OBJECT_CONTENT: &[u8] = b"my content 1";

#[derive(Debug, Clone)]
pub struct ExpiryCase {
    pub object: &'static str,
    pub prefix: &'static str,
    /// Days from today; negative dates are already due.
    pub expiry_offset_days: i64,
    pub expect_deleted: bool,
}

fn expiry_cases() -> Vec<ExpiryCase> {
    vec![
        ExpiryCase {
            object: "object",
            prefix: "",
            expiry_offset_days: 1,
            expect_deleted: false,
        },
        ExpiryCase {
            object: "object",
            prefix: "",
            expiry_offset_days: -1,
            expect_deleted: true,
        },
        ExpiryCase {
            object: "object",
            prefix: "prefix",
            expiry_offset_days: -1,
            expect_deleted: false,
        },
        ExpiryCase {
            object: "prefix/object",
            prefix: "prefix",
            expiry_offset_days: -1,
            expect_deleted: true,
        },
    ]
}

#[async_trait]
impl TestCase for ExpiryCase {
    fn args(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("objectName".to_string(), self.object.to_string()),
            ("prefix".to_string(), self.prefix.to_string()),
            (
                "expiryOffsetDays".to_string(),
                self.expiry_offset_days.to_string(),
            ),
        ])
    }

    async fn execute(&self, ctx: &ScenarioContext, run: &mut ScenarioRun) -> ScenarioResult {
        let bucket = run.create_bucket(ctx).await?;

        let configuration = LifecycleConfiguration::single(LifecycleRule::expire_by_date(
            self.expiry_offset_days,
            self.prefix,
        ));
        put_lifecycle(ctx, &bucket, &configuration).await?;
        put_object(
            ctx,
            &bucket,
            self.object,
            OBJECT_CONTENT,
            &PutOptions::default(),
        )
        .await?;

        if self.expect_deleted {
            expect_deleted(ctx, &bucket, self.object, None).await
        } else {
            expect_retained(ctx, &bucket, self.object, None, OBJECT_CONTENT).await
        }
    }
}

pub struct Expiry;

#[async_trait]
impl Scenario for Expiry {
    fn function(&self) -> &'static str {
        "testExpiry"
    }

    fn requirements(&self) -> &'static [Requirement] {
        &[Requirement::Lifecycle]
    }

    async fn run(&self, ctx: &ScenarioContext) {
        run_cases(ctx, self.function(), &expiry_cases()).await;
    }
}

/// A fresh object under an age-based rule is not due yet and must survive
/// the whole polling window.
#[derive(Debug, Clone)]
pub struct ExpiryByAgeCase {
    pub days: i32,
}

#[async_trait]
impl TestCase for ExpiryByAgeCase {
    fn args(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("objectName".to_string(), "object".to_string()),
            ("expirationDays".to_string(), self.days.to_string()),
        ])
    }

    async fn execute(&self, ctx: &ScenarioContext, run: &mut ScenarioRun) -> ScenarioResult {
        let bucket = run.create_bucket(ctx).await?;

        let configuration = LifecycleConfiguration::single(LifecycleRule::expire_by_age(self.days, ""));
        put_lifecycle(ctx, &bucket, &configuration).await?;
        put_object(ctx, &bucket, "object", OBJECT_CONTENT, &PutOptions::default()).await?;

        expect_retained(ctx, &bucket, "object", None, OBJECT_CONTENT).await
    }
}

pub struct ExpiryByAge;

#[async_trait]
impl Scenario for ExpiryByAge {
    fn function(&self) -> &'static str {
        "testExpiryByAge"
    }

    fn requirements(&self) -> &'static [Requirement] {
        &[Requirement::Lifecycle]
    }

    async fn run(&self, ctx: &ScenarioContext) {
        run_cases(ctx, self.function(), &[ExpiryByAgeCase { days: 1 }]).await;
    }
}
