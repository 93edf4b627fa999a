//! Response assertions.
//!
//! # Design
//! Each check is a free function returning `Result<(), AssertionFailure>` so it
//! can be used on its own. [`Verifier`] strings checks together for one
//! response and, depending on [`FailureMode`], either stops at the first
//! failure or collects all of them before handing a single `CaseError` back
//! to the test body.
//!
//! Paths address the parsed JSON body. `a.b` walks objects, `[0]` or a bare
//! integer segment indexes arrays, and a name applied to an array collects that
//! field from every element: `field` over a `422` body yields the list of all
//! offending field names.

use std::fmt;

use serde_json::Value;

use crate::config::FailureMode;
use crate::error::{AssertionFailure, CaseError};
use crate::http::HttpResponse;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> Vec<Segment> {
    let path = path.trim();
    let path = path.strip_prefix('$').unwrap_or(path);
    let mut segments = Vec::new();
    for part in path.split('.').filter(|p| !p.is_empty()) {
        let (name, mut rest) = match part.find('[') {
            Some(i) => part.split_at(i),
            None => (part, ""),
        };
        if !name.is_empty() {
            match name.parse::<usize>() {
                Ok(i) => segments.push(Segment::Index(i)),
                Err(_) => segments.push(Segment::Key(name.to_string())),
            }
        }
        while let Some(open) = rest.strip_prefix('[') {
            let Some(close) = open.find(']') else {
                segments.push(Segment::Key(rest.to_string()));
                break;
            };
            match open[..close].trim().parse::<usize>() {
                Ok(i) => segments.push(Segment::Index(i)),
                Err(_) => segments.push(Segment::Key(open[..close].trim().to_string())),
            }
            rest = &open[close + 1..];
        }
    }
    segments
}

fn collect_key(value: &Value, key: &str) -> Option<Value> {
    match value {
        Value::Object(map) => map.get(key).cloned(),
        Value::Array(items) => Some(Value::Array(
            items.iter().filter_map(|item| collect_key(item, key)).collect(),
        )),
        _ => None,
    }
}

/// Value at `path` inside `root`, or `None` when the path does not exist.
pub fn select(root: &Value, path: &str) -> Option<Value> {
    let mut current = root.clone();
    for segment in parse_path(path) {
        current = match segment {
            Segment::Key(key) => collect_key(&current, &key)?,
            Segment::Index(i) => current.as_array()?.get(i)?.clone(),
        };
    }
    Some(current)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    Equals(Value),
    HasItem(Value),
    HasItems(Vec<Value>),
    IsEmptyString,
    IsEmptyList,
}

impl Matcher {
    pub fn equals(value: impl Into<Value>) -> Self {
        Matcher::Equals(value.into())
    }

    pub fn has_item(value: impl Into<Value>) -> Self {
        Matcher::HasItem(value.into())
    }

    pub fn has_items<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Matcher::HasItems(values.into_iter().map(Into::into).collect())
    }

    pub fn is_empty_string() -> Self {
        Matcher::IsEmptyString
    }

    pub fn is_empty_list() -> Self {
        Matcher::IsEmptyList
    }

    pub fn matches(&self, actual: &Value) -> bool {
        match self {
            Matcher::Equals(expected) => actual == expected,
            Matcher::HasItem(item) => actual.as_array().is_some_and(|a| a.contains(item)),
            Matcher::HasItems(items) => actual
                .as_array()
                .is_some_and(|a| items.iter().all(|item| a.contains(item))),
            Matcher::IsEmptyString => actual.as_str() == Some(""),
            Matcher::IsEmptyList => actual.as_array().is_some_and(Vec::is_empty),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Equals(v) => write!(f, "{v}"),
            Matcher::HasItem(v) => write!(f, "a list containing {v}"),
            Matcher::HasItems(vs) => {
                let items: Vec<String> = vs.iter().map(ToString::to_string).collect();
                write!(f, "a list containing [{}]", items.join(", "))
            }
            Matcher::IsEmptyString => f.write_str("an empty string"),
            Matcher::IsEmptyList => f.write_str("an empty list"),
        }
    }
}

fn preview(response: &HttpResponse) -> String {
    const LIMIT: usize = 200;
    let text = response.text();
    if text.chars().count() > LIMIT {
        format!("{}...", text.chars().take(LIMIT).collect::<String>())
    } else {
        format!("{text:?}")
    }
}

pub fn assert_status(response: &HttpResponse, expected: u16) -> Result<(), AssertionFailure> {
    if response.status() == expected {
        Ok(())
    } else {
        Err(AssertionFailure::new(
            "status code",
            expected,
            format!("{} with body {}", response.status(), preview(response)),
        ))
    }
}

pub fn assert_body_contains(response: &HttpResponse, needle: &str) -> Result<(), AssertionFailure> {
    if response.text().contains(needle) {
        Ok(())
    } else {
        Err(AssertionFailure::new(
            "body contains",
            format!("{needle:?}"),
            preview(response),
        ))
    }
}

pub fn assert_body_empty(response: &HttpResponse) -> Result<(), AssertionFailure> {
    if response.body().is_empty() {
        Ok(())
    } else {
        Err(AssertionFailure::new("body", "empty", preview(response)))
    }
}

pub fn assert_field(
    response: &HttpResponse,
    path: &str,
    matcher: &Matcher,
) -> Result<(), AssertionFailure> {
    let description = format!("field `{path}`");
    let Some(root) = response.parsed() else {
        return Err(AssertionFailure::new(
            description,
            matcher,
            format!("non-JSON body {}", preview(response)),
        ));
    };
    match select(root, path) {
        Some(actual) if matcher.matches(&actual) => Ok(()),
        Some(actual) => Err(AssertionFailure::new(description, matcher, actual)),
        None => Err(AssertionFailure::new(description, matcher, "no such path")),
    }
}

/// Chained checks against one response.
#[derive(Debug)]
pub struct Verifier<'r> {
    response: &'r HttpResponse,
    mode: FailureMode,
    failures: Vec<AssertionFailure>,
}

impl<'r> Verifier<'r> {
    pub fn new(response: &'r HttpResponse, mode: FailureMode) -> Self {
        Self {
            response,
            mode,
            failures: Vec::new(),
        }
    }

    fn check(
        mut self,
        check: impl FnOnce(&HttpResponse) -> Result<(), AssertionFailure>,
    ) -> Self {
        if self.mode == FailureMode::FirstFailure && !self.failures.is_empty() {
            return self;
        }
        if let Err(failure) = check(self.response) {
            self.failures.push(failure);
        }
        self
    }

    pub fn status(self, expected: u16) -> Self {
        self.check(|r| assert_status(r, expected))
    }

    pub fn body_contains(self, needle: &str) -> Self {
        self.check(|r| assert_body_contains(r, needle))
    }

    pub fn body_contains_all(self, needles: &[&str]) -> Self {
        needles
            .iter()
            .fold(self, |verifier, needle| verifier.body_contains(needle))
    }

    pub fn body_empty(self) -> Self {
        self.check(assert_body_empty)
    }

    pub fn field(self, path: &str, matcher: Matcher) -> Self {
        self.check(|r| assert_field(r, path, &matcher))
    }

    pub fn failures(&self) -> &[AssertionFailure] {
        &self.failures
    }

    pub fn finish(self) -> Result<(), CaseError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(CaseError::Assertions(self.failures))
        }
    }
}
