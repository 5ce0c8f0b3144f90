//! Lifecycle rule builder.
//!
//! Rules are constructed relative to "today": dates are truncated to the UTC
//! day boundary before the day offset is applied, which matches the
//! day-granularity evaluation of lifecycle scanners. A negative offset puts a
//! date in the past (immediately eligible), a positive one in the future.
//!
//! Construction is pure. Nothing in this module talks to the server; the
//! storage layer turns a [`LifecycleConfiguration`] into the SDK's
//! `BucketLifecycleConfiguration` via [`LifecycleConfiguration::to_sdk`].

use std::collections::HashSet;

use anyhow::{Context, Result, anyhow};
use aws_sdk_s3::primitives::DateTime as SmithyDateTime;
use aws_sdk_s3::types::{
    BucketLifecycleConfiguration, ExpirationStatus, LifecycleExpiration,
    LifecycleRule as SdkLifecycleRule, LifecycleRuleFilter, NoncurrentVersionExpiration,
    Transition, TransitionStorageClass,
};
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::{DateTime, Duration, DurationRound, Utc};

/// Midnight UTC of `now`, shifted by `offset_days`.
pub fn day_boundary(now: DateTime<Utc>, offset_days: i64) -> DateTime<Utc> {
    let midnight = now.duration_trunc(Duration::days(1)).unwrap_or(now);
    midnight + Duration::days(offset_days)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStatus {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpirationSpec {
    Date(DateTime<Utc>),
    Days(i32),
    ExpiredObjectDeleteMarker,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleAction {
    Expiration(ExpirationSpec),
    Transition {
        date: DateTime<Utc>,
        storage_class: String,
    },
    NoncurrentVersionExpiration {
        noncurrent_days: i32,
        newer_noncurrent_versions: Option<i32>,
    },
}

/// A single lifecycle rule with exactly one action.
///
/// Fields are private; a rule cannot be changed once built apart from the
/// consuming `with_id`/`disabled` adjusters.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleRule {
    id: String,
    status: RuleStatus,
    prefix: String,
    action: RuleAction,
}

fn offset_label(offset_days: i64) -> String {
    match offset_days {
        0 => "today".to_string(),
        d if d < 0 => format!("past-{}d", -d),
        d => format!("future-{d}d"),
    }
}

impl LifecycleRule {
    fn new(id: String, prefix: &str, action: RuleAction) -> Self {
        LifecycleRule {
            id,
            status: RuleStatus::Enabled,
            prefix: prefix.to_string(),
            action,
        }
    }

    pub fn expire_by_date(offset_days: i64, prefix: &str) -> Self {
        Self::expire_by_date_from(Utc::now(), offset_days, prefix)
    }

    pub fn expire_by_date_from(now: DateTime<Utc>, offset_days: i64, prefix: &str) -> Self {
        Self::new(
            format!("expire-by-date-{}", offset_label(offset_days)),
            prefix,
            RuleAction::Expiration(ExpirationSpec::Date(day_boundary(now, offset_days))),
        )
    }

    pub fn expire_by_age(days: i32, prefix: &str) -> Self {
        Self::new(
            format!("expire-after-{days}d"),
            prefix,
            RuleAction::Expiration(ExpirationSpec::Days(days)),
        )
    }

    pub fn transition_by_date(offset_days: i64, storage_class: &str, prefix: &str) -> Self {
        Self::transition_by_date_from(Utc::now(), offset_days, storage_class, prefix)
    }

    pub fn transition_by_date_from(
        now: DateTime<Utc>,
        offset_days: i64,
        storage_class: &str,
        prefix: &str,
    ) -> Self {
        Self::new(
            format!(
                "transition-to-{}-{}",
                storage_class.to_lowercase(),
                offset_label(offset_days)
            ),
            prefix,
            RuleAction::Transition {
                date: day_boundary(now, offset_days),
                storage_class: storage_class.to_string(),
            },
        )
    }

    pub fn noncurrent_expiration(
        noncurrent_days: i32,
        newer_noncurrent_versions: Option<i32>,
        prefix: &str,
    ) -> Self {
        let id = match newer_noncurrent_versions {
            Some(keep) => format!("expire-noncurrent-after-{noncurrent_days}d-keep-{keep}"),
            None => format!("expire-noncurrent-after-{noncurrent_days}d"),
        };
        Self::new(
            id,
            prefix,
            RuleAction::NoncurrentVersionExpiration {
                noncurrent_days,
                newer_noncurrent_versions,
            },
        )
    }

    pub fn expired_marker_cleanup(prefix: &str) -> Self {
        Self::new(
            "expire-delete-markers".to_string(),
            prefix,
            RuleAction::Expiration(ExpirationSpec::ExpiredObjectDeleteMarker),
        )
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.status = RuleStatus::Disabled;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> RuleStatus {
        self.status
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn action(&self) -> &RuleAction {
        &self.action
    }

    /// An empty prefix matches every key.
    pub fn matches(&self, key: &str) -> bool {
        key.starts_with(&self.prefix)
    }

    fn to_sdk(&self) -> Result<SdkLifecycleRule> {
        let status = match self.status {
            RuleStatus::Enabled => ExpirationStatus::Enabled,
            RuleStatus::Disabled => ExpirationStatus::Disabled,
        };

        let builder = SdkLifecycleRule::builder()
            .id(&self.id)
            .status(status)
            .filter(LifecycleRuleFilter::builder().prefix(&self.prefix).build());

        let builder = match &self.action {
            RuleAction::Expiration(ExpirationSpec::Date(date)) => builder.expiration(
                LifecycleExpiration::builder()
                    .date(SmithyDateTime::from_chrono_utc(*date))
                    .build(),
            ),
            RuleAction::Expiration(ExpirationSpec::Days(days)) => {
                builder.expiration(LifecycleExpiration::builder().days(*days).build())
            }
            RuleAction::Expiration(ExpirationSpec::ExpiredObjectDeleteMarker) => builder
                .expiration(
                    LifecycleExpiration::builder()
                        .expired_object_delete_marker(true)
                        .build(),
                ),
            RuleAction::Transition {
                date,
                storage_class,
            } => builder.transitions(
                Transition::builder()
                    .date(SmithyDateTime::from_chrono_utc(*date))
                    .storage_class(TransitionStorageClass::from(storage_class.as_str()))
                    .build(),
            ),
            RuleAction::NoncurrentVersionExpiration {
                noncurrent_days,
                newer_noncurrent_versions,
            } => builder.noncurrent_version_expiration(
                NoncurrentVersionExpiration::builder()
                    .noncurrent_days(*noncurrent_days)
                    .set_newer_noncurrent_versions(*newer_noncurrent_versions)
                    .build(),
            ),
        };

        builder
            .build()
            .with_context(|| format!("failed to build lifecycle rule {}", self.id))
    }
}

/// The complete lifecycle configuration of a bucket.
///
/// Sending it replaces whatever configuration the bucket had before.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleConfiguration {
    rules: Vec<LifecycleRule>,
}

impl LifecycleConfiguration {
    /// Build a configuration, rejecting an empty rule list and duplicate ids.
    pub fn new(rules: Vec<LifecycleRule>) -> Result<Self> {
        if rules.is_empty() {
            return Err(anyhow!("a lifecycle configuration needs at least one rule"));
        }

        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id()) {
                return Err(anyhow!("duplicate lifecycle rule id: {}", rule.id()));
            }
        }

        Ok(LifecycleConfiguration { rules })
    }

    pub fn single(rule: LifecycleRule) -> Self {
        LifecycleConfiguration { rules: vec![rule] }
    }

    pub fn rules(&self) -> &[LifecycleRule] {
        &self.rules
    }

    pub fn rule_ids(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.id().to_string()).collect()
    }

    pub fn to_sdk(&self) -> Result<BucketLifecycleConfiguration> {
        let rules = self
            .rules
            .iter()
            .map(LifecycleRule::to_sdk)
            .collect::<Result<Vec<_>>>()?;

        BucketLifecycleConfiguration::builder()
            .set_rules(Some(rules))
            .build()
            .context("failed to build bucket lifecycle configuration")
    }
}
