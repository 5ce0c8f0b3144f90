//! Parsing of the `x-amz-restore` response header.
//!
//! The header looks like
//! `ongoing-request="false", expiry-date="Fri, 21 Dec 2012 00:00:00 GMT"`;
//! the expiry date is only present once the restore has completed.

use anyhow::{Context, Result, anyhow};
use aws_sdk_s3::primitives::{DateTime as SmithyDateTime, DateTimeFormat};
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::{DateTime, Utc};
use fancy_regex::Regex;

const RESTORE_HEADER_PATTERN: &str = r#"ongoing-request="(.*?)"(, expiry-date="(.*?)")?"#;

#[derive(Debug, Clone, PartialEq)]
pub struct RestoreStatus {
    pub ongoing_request: bool,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl RestoreStatus {
    pub fn parse(header: &str) -> Result<Self> {
        let regex = Regex::new(RESTORE_HEADER_PATTERN)?;
        let captures = regex
            .captures(header)?
            .ok_or_else(|| anyhow!("unrecognized x-amz-restore header: {header}"))?;

        let ongoing_request = match captures.get(1).map(|m| m.as_str()) {
            Some("true") => true,
            Some("false") => false,
            other => {
                return Err(anyhow!(
                    "invalid ongoing-request value {:?} in x-amz-restore header",
                    other
                ));
            }
        };

        let expiry_date = match captures.get(3) {
            Some(m) => Some(parse_http_date(m.as_str())?),
            None => None,
        };

        Ok(RestoreStatus {
            ongoing_request,
            expiry_date,
        })
    }

    /// The restored copy is available: no request in flight and an expiry is set.
    pub fn is_completed(&self) -> bool {
        !self.ongoing_request && self.expiry_date.is_some()
    }
}

fn parse_http_date(value: &str) -> Result<DateTime<Utc>> {
    let date_time = SmithyDateTime::from_str(value, DateTimeFormat::HttpDate)
        .with_context(|| format!("invalid expiry-date in x-amz-restore header: {value}"))?;
    date_time
        .to_chrono_utc()
        .with_context(|| format!("expiry-date out of range: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_completed_restore() {
        let status = RestoreStatus::parse(
            r#"ongoing-request="false", expiry-date="Fri, 21 Dec 2012 00:00:00 GMT""#,
        )
        .unwrap();

        assert!(!status.ongoing_request);
        assert_eq!(
            status.expiry_date,
            Some(Utc.with_ymd_and_hms(2012, 12, 21, 0, 0, 0).unwrap())
        );
        assert!(status.is_completed());
    }

    #[test]
    fn parse_ongoing_restore() {
        let status = RestoreStatus::parse(r#"ongoing-request="true""#).unwrap();

        assert!(status.ongoing_request);
        assert!(status.expiry_date.is_none());
        assert!(!status.is_completed());
    }

    #[test]
    fn parse_rejects_unrelated_header() {
        assert!(RestoreStatus::parse("").is_err());
        assert!(RestoreStatus::parse("expiry-date=\"x\"").is_err());
    }

    #[test]
    fn parse_rejects_unknown_ongoing_value() {
        assert!(RestoreStatus::parse(r#"ongoing-request="maybe""#).is_err());
    }

    #[test]
    fn parse_rejects_invalid_expiry_date() {
        assert!(
            RestoreStatus::parse(r#"ongoing-request="false", expiry-date="not a date""#).is_err()
        );
    }
}
