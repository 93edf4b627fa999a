//! Error types for the suite core.
//!
//! # Design
//! Errors are split by the boundary they cross. `TransportError` and
//! `AssertionFailure` are what a single test body can run into and are folded
//! into `CaseError`, which the scheduler turns into a report entry. Only
//! `PlanError` (a malformed dependency graph) stops a run, and it is raised
//! before any test body executes.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// The HTTP round-trip itself failed. A non-2xx status is *not* one of these.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("could not connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("I/O error talking to {url}: {reason}")]
    Io { url: String, reason: String },
}

/// A single expectation that did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{description}: expected {expected}, got {actual}")]
pub struct AssertionFailure {
    pub description: String,
    pub expected: String,
    pub actual: String,
}

impl AssertionFailure {
    pub fn new(
        description: impl Into<String>,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Self {
            description: description.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Everything a test body can fail with.
#[derive(Debug, Error)]
pub enum CaseError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{}", join_failures(.0))]
    Assertions(Vec<AssertionFailure>),

    /// A dependency did not publish the value this case needs.
    #[error("fixture `{key}` not published by `{case}`")]
    Fixture { case: String, key: String },

    #[error("could not decode response body: {0}")]
    Decode(String),

    #[error("test body panicked: {0}")]
    Panicked(String),
}

impl From<AssertionFailure> for CaseError {
    fn from(failure: AssertionFailure) -> Self {
        CaseError::Assertions(vec![failure])
    }
}

fn join_failures(failures: &[AssertionFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// The dependency graph cannot be scheduled. Fatal to the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("cyclic dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("`{case}` depends on unknown case `{dependency}`")]
    UnknownDependency { case: String, dependency: String },

    #[error("duplicate case identifier `{0}`")]
    DuplicateCase(String),

    #[error("no suite named `{0}`")]
    UnknownSuite(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("report serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
