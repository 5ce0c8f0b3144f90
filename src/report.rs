//! Result reporting.
//!
//! Every scenario case, every not-applicable family and every failed cleanup
//! produces one [`TestResult`]. Results are written as one JSON object per
//! line so downstream tooling can consume the stream without parsing log
//! output; a tracing event is emitted alongside each record.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub const SUITE_NAME: &str = "ilm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "FAIL")]
    Fail,
    #[serde(rename = "NA")]
    NotApplicable,
}

/// One record of the result stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub function: String,
    pub args: BTreeMap<String, String>,
    /// Milliseconds.
    pub duration: u64,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestResult {
    fn new(
        function: &str,
        args: BTreeMap<String, String>,
        duration: Duration,
        status: Status,
    ) -> Self {
        TestResult {
            name: SUITE_NAME.to_string(),
            function: function.to_string(),
            args,
            duration: duration.as_millis() as u64,
            status,
            alert: None,
            message: None,
            error: None,
        }
    }

    pub fn pass(function: &str, args: BTreeMap<String, String>, duration: Duration) -> Self {
        Self::new(function, args, duration, Status::Pass)
    }

    pub fn fail(
        function: &str,
        args: BTreeMap<String, String>,
        duration: Duration,
        message: &str,
        error: Option<String>,
    ) -> Self {
        TestResult {
            message: Some(message.to_string()),
            error,
            ..Self::new(function, args, duration, Status::Fail)
        }
    }

    /// `alert` names the missing capability, e.g. "PutBucketLifecycleConfiguration".
    pub fn not_applicable(
        function: &str,
        args: BTreeMap<String, String>,
        duration: Duration,
        message: &str,
        alert: &str,
    ) -> Self {
        Self::not_applicable_with_alert(
            function,
            args,
            duration,
            message,
            &not_implemented_alert(alert),
        )
    }

    /// Like [`TestResult::not_applicable`], with `alert` reported as given.
    pub fn not_applicable_with_alert(
        function: &str,
        args: BTreeMap<String, String>,
        duration: Duration,
        message: &str,
        alert: &str,
    ) -> Self {
        TestResult {
            alert: Some(alert.to_string()),
            message: Some(message.to_string()),
            ..Self::new(function, args, duration, Status::NotApplicable)
        }
    }

    pub fn to_json_line(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialize test result")
    }
}

/// "PutBucketLifecycle is not supported" -> "PutBucketLifecycle is NotImplemented".
fn not_implemented_alert(alert: &str) -> String {
    let capability = alert.split_whitespace().next().unwrap_or(alert);
    format!("{capability} is NotImplemented")
}

/// Sink for test results.
pub trait ResultReporter: Send + Sync {
    fn report(&self, result: &TestResult) -> Result<()>;
}

fn trace_result(result: &TestResult) {
    match result.status {
        Status::Pass => info!(
            function = result.function,
            duration_ms = result.duration,
            "PASS"
        ),
        Status::Fail => error!(
            function = result.function,
            duration_ms = result.duration,
            fail_message = result.message.as_deref().unwrap_or_default(),
            error = result.error.as_deref().unwrap_or_default(),
            "FAIL"
        ),
        Status::NotApplicable => warn!(
            function = result.function,
            alert = result.alert.as_deref().unwrap_or_default(),
            "NA"
        ),
    }
}

/// Writes one JSON line per result to the wrapped writer (stdout in the CLI).
pub struct JsonLinesReporter<W: Write + Send> {
    writer: Mutex<W>,
}

impl JsonLinesReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        JsonLinesReporter::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonLinesReporter<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesReporter {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> ResultReporter for JsonLinesReporter<W> {
    fn report(&self, result: &TestResult) -> Result<()> {
        trace_result(result);

        let line = result.to_json_line()?;
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(writer, "{line}").context("failed to write test result")?;
        writer.flush().context("failed to flush test result")
    }
}

/// Keeps results in memory. Used by library callers that want the records
/// rather than a stream.
#[derive(Debug, Clone, Default)]
pub struct MemoryReporter {
    results: Arc<Mutex<Vec<TestResult>>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<TestResult> {
        self.results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ResultReporter for MemoryReporter {
    fn report(&self, result: &TestResult) -> Result<()> {
        trace_result(result);
        self.results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(result.clone());
        Ok(())
    }
}

/// Counts of results by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuiteSummary {
    pub passed: u64,
    pub failed: u64,
    pub not_applicable: u64,
}

impl SuiteSummary {
    pub fn record(&mut self, status: Status) {
        match status {
            Status::Pass => self.passed += 1,
            Status::Fail => self.failed += 1,
            Status::NotApplicable => self.not_applicable += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.passed + self.failed + self.not_applicable
    }
}
