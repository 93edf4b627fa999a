//! GoRest test suites.
//!
//! Each suite declares its cases into a [`PlanBuilder`] under a group named
//! after the suite, so any selection of suites merges into one graph with
//! independent branches.

mod comments;
mod e2e;
mod posts;
mod todos;
mod users;

use std::sync::Arc;

use serde_json::Value;

use crate::assertions::{Matcher, Verifier};
use crate::client::Executor;
use crate::config::{FailureMode, FixtureConfig};
use crate::error::{CaseError, PlanError};
use crate::http::{HttpRequest, HttpResponse};
use crate::payload::FieldMap;
use crate::scheduler::{done, fixture, CaseContext, CaseResult, Plan, PlanBuilder};

pub const USERS: &str = "/public/v2/users";
pub const POSTS: &str = "/public/v2/posts";
pub const COMMENTS: &str = "/public/v2/comments";
pub const TODOS: &str = "/public/v2/todos";

type Declare = fn(&mut PlanBuilder, &Suite);

const REGISTRY: &[(&str, Declare)] = &[
    ("users_valid", users::valid),
    ("users_invalid", users::invalid),
    ("posts_valid", posts::valid),
    ("posts_invalid", posts::invalid),
    ("comments_valid", comments::valid),
    ("comments_invalid", comments::invalid),
    ("todos_valid", todos::valid),
    ("todos_invalid", todos::invalid),
    ("e2e", e2e::flow),
];

/// Names accepted by [`plan`], besides `all`.
pub fn names() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(name, _)| *name)
}

/// Shared handles every case closure carries.
#[derive(Debug, Clone)]
pub struct Suite {
    executor: Arc<Executor>,
    mode: FailureMode,
    fixtures: Arc<FixtureConfig>,
}

impl Suite {
    pub fn new(executor: Arc<Executor>, mode: FailureMode, fixtures: FixtureConfig) -> Self {
        Self {
            executor,
            mode,
            fixtures: Arc::new(fixtures),
        }
    }

    pub fn fixtures(&self) -> &FixtureConfig {
        &self.fixtures
    }

    /// Wraps a case body so it owns a handle to this suite.
    fn case<F>(&self, body: F) -> impl Fn(&CaseContext<'_>) -> CaseResult + Send + Sync + 'static
    where
        F: Fn(&Suite, &CaseContext<'_>) -> CaseResult + Send + Sync + 'static,
    {
        let suite = self.clone();
        move |ctx| body(&suite, ctx)
    }

    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, CaseError> {
        Ok(self.executor.execute(request)?)
    }

    fn verify<'r>(&self, response: &'r HttpResponse) -> Verifier<'r> {
        Verifier::new(response, self.mode)
    }

    fn user_payload(&self) -> FieldMap {
        let f = &self.fixtures;
        let mut payload = FieldMap::new();
        payload
            .name(&f.user_name)
            .email(f.unique_email())
            .gender(&f.gender)
            .status("active");
        payload
    }

    /// POST a fresh user, publish `id` and `email`.
    fn create_user(&self) -> CaseResult {
        let payload = self.user_payload();
        let response = self.send(&HttpRequest::post(USERS).json(&payload))?;
        self.verify(&response)
            .status(201)
            .field("name", Matcher::equals(self.fixtures.user_name.as_str()))
            .field("gender", Matcher::equals(self.fixtures.gender.as_str()))
            .field("status", Matcher::equals("active"))
            .finish()?;
        let id = id_in(&response)?;
        let email = text_in(&response, "email")?;
        Ok(fixture([("id", Value::from(id)), ("email", Value::from(email))]))
    }

    fn create_post(&self, user: i64) -> CaseResult {
        let f = &self.fixtures;
        let mut payload = FieldMap::new();
        payload.title(&f.post_title).body(&f.post_body);
        let request = HttpRequest::post(format!("{USERS}/{user}/posts")).json(&payload);
        let response = self.send(&request)?;
        self.verify(&response)
            .status(201)
            .field("user_id", Matcher::equals(user))
            .field("title", Matcher::equals(f.post_title.as_str()))
            .field("body", Matcher::equals(f.post_body.as_str()))
            .finish()?;
        Ok(fixture([("id", id_in(&response)?)]))
    }

    fn comment_payload(&self, post: i64, email: &str) -> FieldMap {
        let f = &self.fixtures;
        let mut payload = FieldMap::new();
        payload
            .post_id(post)
            .name(&f.user_name)
            .email(email)
            .body(&f.comment_body);
        payload
    }

    fn create_comment(&self, post: i64) -> CaseResult {
        let email = self.fixtures.unique_email();
        let payload = self.comment_payload(post, &email);
        let response = self.send(&HttpRequest::post(COMMENTS).json(&payload))?;
        self.verify(&response)
            .status(201)
            .field("post_id", Matcher::equals(post))
            .field("name", Matcher::equals(self.fixtures.user_name.as_str()))
            .field("email", Matcher::equals(email.as_str()))
            .finish()?;
        Ok(fixture([("id", id_in(&response)?)]))
    }

    fn create_todo(&self, user: i64, title: &str, status: &str) -> CaseResult {
        let mut payload = FieldMap::new();
        payload
            .title(title)
            .due_on(&self.fixtures.due_on)
            .status(status);
        let request = HttpRequest::post(format!("{USERS}/{user}/todos")).json(&payload);
        let response = self.send(&request)?;
        self.verify(&response)
            .status(201)
            .field("user_id", Matcher::equals(user))
            .field("title", Matcher::equals(title))
            .field("status", Matcher::equals(status))
            .finish()?;
        Ok(fixture([("id", id_in(&response)?)]))
    }

    fn delete_user(&self, user: i64) -> CaseResult {
        let response = self.send(&HttpRequest::delete(format!("{USERS}/{user}")))?;
        self.verify(&response).status(204).body_empty().finish()?;
        done()
    }

    fn expect_gone(&self, user: i64) -> CaseResult {
        let response = self.send(&HttpRequest::get(format!("{USERS}/{user}")))?;
        self.verify(&response)
            .status(404)
            .field("message", Matcher::equals("Resource not found"))
            .finish()?;
        done()
    }

    /// 422 whose error list names `field` with `message`.
    fn expect_rejected(&self, request: &HttpRequest, field: &str, message: &str) -> CaseResult {
        let response = self.send(request)?;
        self.verify(&response)
            .status(422)
            .field("field", Matcher::has_item(field))
            .field("message", Matcher::has_item(message))
            .finish()?;
        done()
    }

    /// The same request without credentials is refused.
    fn expect_unauthorized(&self, request: HttpRequest) -> CaseResult {
        let response = self.send(&request.anonymous())?;
        self.verify(&response)
            .status(401)
            .field("message", Matcher::equals("Authentication failed"))
            .finish()?;
        done()
    }
}

fn id_in(response: &HttpResponse) -> Result<i64, CaseError> {
    response
        .parsed()
        .and_then(|body| body.get("id"))
        .and_then(Value::as_i64)
        .ok_or_else(|| CaseError::Decode(format!("no integer `id` in {}", response.text())))
}

fn text_in(response: &HttpResponse, key: &str) -> Result<String, CaseError> {
    response
        .parsed()
        .and_then(|body| body.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CaseError::Decode(format!("no string `{key}` in {}", response.text())))
}

/// Declare one suite by name into `builder`.
pub fn declare(name: &str, builder: &mut PlanBuilder, suite: &Suite) -> Result<(), PlanError> {
    if name == "all" {
        all(builder, suite);
        return Ok(());
    }
    let (_, register) = REGISTRY
        .iter()
        .find(|(known, _)| *known == name)
        .ok_or_else(|| PlanError::UnknownSuite(name.to_string()))?;
    register(builder, suite);
    Ok(())
}

/// Every suite, each in its own group.
pub fn all(builder: &mut PlanBuilder, suite: &Suite) {
    for (_, register) in REGISTRY {
        register(builder, suite);
    }
}

/// Build one plan from the named suites; no names means all of them.
pub fn plan<S: AsRef<str>>(names: &[S], suite: &Suite) -> Result<Plan, PlanError> {
    let mut builder = PlanBuilder::new();
    if names.is_empty() {
        all(&mut builder, suite);
    }
    for name in names {
        declare(name.as_ref(), &mut builder, suite)?;
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::client::Transport;
    use crate::config::ClientConfig;
    use crate::error::TransportError;
    use crate::http::HttpMethod;
    use crate::report::Severity;
    use crate::scheduler::{CaseKind, CaseState, Scheduler};

    /// Answers like the service would for one user with id 42.
    #[derive(Default)]
    struct Canned {
        calls: Mutex<Vec<String>>,
    }

    impl Transport for Canned {
        fn send(
            &self,
            method: HttpMethod,
            url: &str,
            _headers: &[(String, String)],
            body: Option<&[u8]>,
        ) -> Result<HttpResponse, TransportError> {
            self.calls.lock().unwrap().push(format!("{method} {url}"));
            let sent: Value = body
                .and_then(|b| serde_json::from_slice(b).ok())
                .unwrap_or(Value::Null);
            let path = url.trim_start_matches("http://canned");
            let (status, reply) = match (method, path) {
                (HttpMethod::Post, "/public/v2/users") => {
                    let mut user = sent;
                    user["id"] = json!(42);
                    (201, user)
                }
                (HttpMethod::Post, "/public/v2/users/42/posts") => {
                    let mut post = sent;
                    post["id"] = json!(7);
                    post["user_id"] = json!(42);
                    (201, post)
                }
                (HttpMethod::Get, "/public/v2/users/42/posts") => (
                    200,
                    json!([{"id": 7, "user_id": 42, "title": "This is a Post title"}]),
                ),
                (HttpMethod::Delete, "/public/v2/users/42") => {
                    return Ok(HttpResponse::new(204, Vec::new(), ""))
                }
                _ => (404, json!({"message": "Resource not found"})),
            };
            Ok(HttpResponse::new(status, Vec::new(), reply.to_string()))
        }
    }

    #[test]
    fn created_user_id_lands_in_the_post_path() {
        let canned = Arc::new(Canned::default());
        let executor = Executor::with_transport(&ClientConfig::new("http://canned"), canned.clone());
        let suite = Suite::new(
            Arc::new(executor),
            FailureMode::FirstFailure,
            FixtureConfig::default(),
        );
        let report = Scheduler::sequential().run("posts", &plan(&["posts_valid"], &suite).unwrap());

        assert!(report.is_success(), "{report:?}");
        assert_eq!(
            report.state_of("posts_valid::getDeletedUser"),
            Some(CaseState::Passed)
        );
        let calls = canned.calls.lock().unwrap();
        assert_eq!(
            *calls,
            [
                "POST http://canned/public/v2/users",
                "POST http://canned/public/v2/users/42/posts",
                "GET http://canned/public/v2/users/42/posts",
                "DELETE http://canned/public/v2/users/42",
                "GET http://canned/public/v2/users/42",
            ]
        );
    }

    fn suite() -> Suite {
        let executor = Executor::new(&ClientConfig::new("http://127.0.0.1:9"));
        Suite::new(
            Arc::new(executor),
            FailureMode::CollectAll,
            FixtureConfig::default(),
        )
    }

    #[test]
    fn every_suite_builds() {
        for name in names() {
            let plan = plan(&[name], &suite()).unwrap();
            assert!(!plan.is_empty(), "{name}");
            assert!(plan.order().iter().all(|id| id.starts_with(name)));
        }
    }

    #[test]
    fn all_merges_every_group() {
        let merged = plan::<&str>(&[], &suite()).unwrap();
        let explicit = plan(&["all"], &suite()).unwrap();
        let sum: usize = names().map(|n| plan(&[n], &suite()).unwrap().len()).sum();
        assert_eq!(merged.len(), sum);
        assert_eq!(explicit.order(), merged.order());
    }

    #[test]
    fn unknown_suite_is_reported() {
        assert_eq!(
            plan(&["users_valid", "nope"], &suite()).unwrap_err(),
            PlanError::UnknownSuite("nope".into())
        );
    }

    #[test]
    fn selecting_a_suite_twice_is_a_duplicate() {
        assert!(matches!(
            plan(&["todos_valid", "todos_valid"], &suite()),
            Err(PlanError::DuplicateCase(_))
        ));
    }

    #[test]
    fn teardowns_close_their_groups() {
        let plan = plan(&["posts_invalid"], &suite()).unwrap();
        assert_eq!(plan.order().first(), Some(&"posts_invalid::createUser"));
        assert_eq!(plan.order().last(), Some(&"posts_invalid::deleteUser"));
    }

    #[test]
    fn user_lifecycle_replaces_before_renaming_back() {
        let plan = plan(&["users_valid"], &suite()).unwrap();
        let local: Vec<&str> = plan
            .order()
            .iter()
            .map(|id| id.trim_start_matches("users_valid::"))
            .collect();
        assert_eq!(
            local,
            [
                "createUser",
                "putUser",
                "patchUser",
                "getUser",
                "listUsers",
                "deleteUser",
                "getDeletedUser",
            ]
        );
        let put = plan.labels_of("users_valid::putUser").unwrap();
        assert_eq!(put.severity, Some(Severity::Blocker));
        assert_eq!(put.story.as_deref(), Some("User CRUD Operations"));
    }

    #[test]
    fn every_case_names_its_feature_and_every_test_its_severity() {
        let plan = plan(&["all"], &suite()).unwrap();
        for id in plan.order() {
            let labels = plan.labels_of(id).unwrap();
            assert!(labels.feature.is_some(), "{id}");
            assert!(labels.story.is_some(), "{id}");
            if plan.kind_of(id) == Some(CaseKind::Test) {
                assert!(labels.severity.is_some(), "{id}");
            }
        }
    }
}
