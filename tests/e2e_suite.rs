//! E2E tests running the suite against a live S3-compatible server.

#![cfg(e2e_test)]

mod common;

use common::TestHelper;
use s3ilm_rs::Status;

fn failures(run: &common::SuiteRun) -> Vec<String> {
    run.reporter
        .results()
        .iter()
        .filter(|result| result.status == Status::Fail)
        .map(|result| {
            format!(
                "{} {:?}: {}",
                result.function,
                result.args,
                result.message.as_deref().unwrap_or_default()
            )
        })
        .collect()
}

#[tokio::test]
async fn e2e_expiry_scenarios_pass_and_clean_up() {
    e2e_timeout!(async {
        let helper = TestHelper::new().await;
        let config = TestHelper::build_config(vec!["--scenario-include-regex", "^testExpiry"]);

        let run = TestHelper::run_suite(config).await;

        assert!(failures(&run).is_empty(), "{:#?}", failures(&run));
        assert!(run.summary.total() > 0);
        assert!(helper.leftover_buckets(&run).await.is_empty());
    });
}

#[tokio::test]
async fn e2e_legal_hold_scenario() {
    e2e_timeout!(async {
        let helper = TestHelper::new().await;
        let config =
            TestHelper::build_config(vec!["--scenario-include-regex", "^testLockingLegalhold$"]);

        let run = TestHelper::run_suite(config).await;

        let results = run.reporter.results();
        assert_eq!(results.len(), 2);
        assert!(failures(&run).is_empty(), "{:#?}", failures(&run));
        assert!(helper.leftover_buckets(&run).await.is_empty());
    });
}

#[tokio::test]
async fn e2e_full_suite() {
    e2e_timeout!(async {
        let helper = TestHelper::new().await;
        let config = TestHelper::build_config(vec![]);
        let tier_configured = config.remote_tier_name.is_some();

        let run = TestHelper::run_suite(config).await;

        assert!(failures(&run).is_empty(), "{:#?}", failures(&run));
        if !tier_configured {
            assert!(run.reporter.results().iter().any(|result| {
                result.status == Status::NotApplicable
                    && result.alert.as_deref() == Some("REMOTE_TIER_NAME is not set")
            }));
        }
        assert!(helper.leftover_buckets(&run).await.is_empty());
    });
}
