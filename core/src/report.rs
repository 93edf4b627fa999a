//! Execution report and the sinks it is emitted to.

use std::fmt;
use std::io::Write;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::error::ReportError;
use crate::scheduler::{CaseKind, CaseState};

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_micros() as f64 / 1000.0)
}

/// How much a failing case matters, in Allure's levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Blocker,
    Critical,
    Normal,
    Minor,
    Trivial,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Blocker => "blocker",
            Severity::Critical => "critical",
            Severity::Normal => "normal",
            Severity::Minor => "minor",
            Severity::Trivial => "trivial",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Reporting annotations attached to a case when it is declared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Labels {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story: Option<String>,
}

/// Outcome of one test case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub id: String,
    pub kind: CaseKind,
    pub state: CaseState,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(flatten)]
    pub labels: Labels,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Finalized record of a run. Entries appear in the order cases finished.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    suite: String,
    started_at: DateTime<Utc>,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    elapsed: Duration,
    summary: Summary,
    entries: Vec<ReportEntry>,
}

impl ExecutionReport {
    pub fn suite(&self) -> &str {
        &self.suite
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    pub fn entry(&self, id: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn state_of(&self, id: &str) -> Option<CaseState> {
        self.entry(id).map(|e| e.state)
    }

    /// True when every case passed.
    pub fn is_success(&self) -> bool {
        self.summary.passed == self.summary.total
    }
}

/// Append-only collector used while a run is in progress.
pub(crate) struct Recorder {
    suite: String,
    started_at: DateTime<Utc>,
    clock: Instant,
    entries: Vec<ReportEntry>,
}

impl Recorder {
    pub(crate) fn start(suite: &str) -> Self {
        Self {
            suite: suite.to_string(),
            started_at: Utc::now(),
            clock: Instant::now(),
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn finish(self) -> ExecutionReport {
        let mut summary = Summary {
            total: self.entries.len(),
            ..Summary::default()
        };
        for entry in &self.entries {
            match entry.state {
                CaseState::Passed => summary.passed += 1,
                CaseState::Failed => summary.failed += 1,
                CaseState::Skipped => summary.skipped += 1,
                CaseState::Pending | CaseState::Running => {}
            }
        }
        ExecutionReport {
            suite: self.suite,
            started_at: self.started_at,
            elapsed: self.clock.elapsed(),
            summary,
            entries: self.entries,
        }
    }
}

/// Receives the finished report.
pub trait ReportSink {
    fn emit(&mut self, report: &ExecutionReport) -> Result<(), ReportError>;
}

/// Writes one log line per case plus a summary line.
#[derive(Debug, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn emit(&mut self, report: &ExecutionReport) -> Result<(), ReportError> {
        for entry in report.entries() {
            let severity = entry.labels.severity.unwrap_or(Severity::Normal);
            let about = entry.labels.description.as_deref().unwrap_or("");
            match (&entry.state, &entry.detail) {
                (CaseState::Passed, _) => {
                    log::info!("PASSED  {} ({:.0?}) {about}", entry.id, entry.elapsed)
                }
                (state, Some(detail)) => log::warn!(
                    "{state:<7} [{severity}] {} ({:.0?}) {about}: {detail}",
                    entry.id,
                    entry.elapsed
                ),
                (state, None) => log::warn!("{state:<7} [{severity}] {} {about}", entry.id),
            }
        }
        let s = report.summary();
        log::info!(
            "{}: {} cases, {} passed, {} failed, {} skipped in {:.2?}",
            report.suite(),
            s.total,
            s.passed,
            s.failed,
            s.skipped,
            report.elapsed()
        );
        Ok(())
    }
}

/// Pretty-printed JSON to any writer.
pub struct JsonSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for JsonSink<W> {
    fn emit(&mut self, report: &ExecutionReport) -> Result<(), ReportError> {
        serde_json::to_writer_pretty(&mut self.writer, report)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, state: CaseState) -> ReportEntry {
        ReportEntry {
            id: id.to_string(),
            kind: CaseKind::Test,
            state,
            elapsed: Duration::from_millis(5),
            detail: (state != CaseState::Passed).then(|| "boom".to_string()),
            labels: Labels::default(),
        }
    }

    fn sample() -> ExecutionReport {
        let mut recorder = Recorder::start("sample");
        recorder.push(entry("a", CaseState::Passed));
        recorder.push(entry("b", CaseState::Failed));
        recorder.push(entry("c", CaseState::Skipped));
        recorder.finish()
    }

    #[test]
    fn summary_counts_states() {
        let report = sample();
        assert_eq!(
            report.summary(),
            Summary {
                total: 3,
                passed: 1,
                failed: 1,
                skipped: 1
            }
        );
        assert!(!report.is_success());
        assert_eq!(report.state_of("b"), Some(CaseState::Failed));
        assert_eq!(report.state_of("zzz"), None);
    }

    #[test]
    fn empty_report_is_successful() {
        assert!(Recorder::start("empty").finish().is_success());
    }

    #[test]
    fn json_sink_writes_entries() {
        let mut sink = JsonSink::new(Vec::new());
        sink.emit(&sample()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&sink.into_inner()).unwrap();
        assert_eq!(json["suite"], "sample");
        assert_eq!(json["summary"]["failed"], 1);
        assert_eq!(json["entries"][0]["state"], "PASSED");
        assert_eq!(json["entries"][0]["elapsed_ms"], 5.0);
        assert!(json["entries"][0].get("detail").is_none());
        assert_eq!(json["entries"][2]["detail"], "boom");
    }

    #[test]
    fn labels_are_flattened_into_entries() {
        let mut recorder = Recorder::start("labels");
        let mut labelled = entry("createUser", CaseState::Passed);
        labelled.labels = Labels {
            description: Some("create a user with every field set".into()),
            severity: Some(Severity::Blocker),
            feature: Some("User Management".into()),
            story: None,
        };
        recorder.push(labelled);
        let mut sink = JsonSink::new(Vec::new());
        sink.emit(&recorder.finish()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&sink.into_inner()).unwrap();
        let entry = &json["entries"][0];
        assert_eq!(entry["description"], "create a user with every field set");
        assert_eq!(entry["severity"], "blocker");
        assert_eq!(entry["feature"], "User Management");
        assert!(entry.get("story").is_none());
    }

    #[test]
    fn log_sink_accepts_any_report() {
        LogSink.emit(&sample()).unwrap();
    }
}
