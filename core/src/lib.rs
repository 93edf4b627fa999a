//! Dependency-ordered API test engine for the GoRest `/public/v2` service.
//!
//! # Overview
//! A test case builds a payload ([`FieldMap`]), sends it through the
//! [`Executor`], and checks the [`HttpResponse`] with a [`Verifier`]. Cases
//! are declared into a [`PlanBuilder`] together with the cases they depend on;
//! the [`Scheduler`] runs them in dependency order, hands the values a passed
//! case publishes to its dependents, and skips everything downstream of a
//! failure. The outcome is an [`ExecutionReport`].
//!
//! # Design
//! - The network sits behind the [`Transport`] trait; the executor never
//!   interprets status codes.
//! - Graphs are validated before anything runs: duplicate ids, unknown
//!   dependencies and cycles are [`PlanError`]s.
//! - Configuration is loaded once and passed down explicitly.

pub mod assertions;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod payload;
pub mod report;
pub mod scheduler;
pub mod suites;

pub use assertions::{Matcher, Verifier};
pub use client::{Executor, Transport, UreqTransport};
pub use config::{ClientConfig, FailureMode, FixtureConfig, SuiteConfig};
pub use error::{AssertionFailure, CaseError, ConfigError, PlanError, ReportError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use payload::{FieldMap, FieldValue};
pub use report::{
    ExecutionReport, JsonSink, Labels, LogSink, ReportEntry, ReportSink, Severity, Summary,
};
pub use scheduler::{
    CaseContext, CaseKind, CaseResult, CaseState, Fixture, Plan, PlanBuilder, Scheduler,
};
pub use suites::Suite;
