//! Suites run over real HTTP against the mock service.
//!
//! # Design
//! Each test starts its own mock server on a random port (a tokio
//! current-thread runtime on a background thread), then drives it with the
//! blocking executor exactly as the binary would.

use std::sync::Arc;
use std::time::Duration;

use gorest_suite::{
    suites, CaseState, ClientConfig, ExecutionReport, Executor, FailureMode, FixtureConfig,
    HttpRequest, JsonSink, PlanBuilder, ReportSink, Scheduler, Suite, Verifier,
};

const TOKEN: &str = "integration-token";

/// Start the mock service and return its base URL.
fn start_mock() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            gorest_mock::run(listener, TOKEN).await
        })
    });
    format!("http://{addr}")
}

fn config(base_url: &str, token: Option<&str>) -> ClientConfig {
    let config = ClientConfig::new(base_url).with_timeout(Duration::from_secs(5));
    match token {
        Some(t) => config.with_token(t),
        None => config,
    }
}

fn suite(base_url: &str) -> Suite {
    Suite::new(
        Arc::new(Executor::new(&config(base_url, Some(TOKEN)))),
        FailureMode::CollectAll,
        FixtureConfig::default(),
    )
}

fn assert_all_passed(report: &ExecutionReport) {
    let failures: Vec<_> = report
        .entries()
        .iter()
        .filter(|e| e.state != CaseState::Passed)
        .map(|e| format!("{} {}: {:?}", e.state, e.id, e.detail))
        .collect();
    assert!(failures.is_empty(), "{failures:#?}");
    assert!(report.summary().total > 0);
}

#[test]
fn every_suite_passes_against_the_mock() {
    let base = start_mock();
    for name in suites::names() {
        let plan = suites::plan(&[name], &suite(&base)).unwrap();
        let report = Scheduler::sequential().run(name, &plan);
        assert_all_passed(&report);
    }
}

#[test]
fn all_suites_pass_on_a_worker_pool() {
    let base = start_mock();
    let plan = suites::plan(&["all"], &suite(&base)).unwrap();
    let report = Scheduler::with_workers(4).run("all", &plan);
    assert_all_passed(&report);
    assert_eq!(report.summary().total, plan.len());
}

#[test]
fn missing_token_fails_creates_and_skips_dependents() {
    let base = start_mock();
    let anonymous = Suite::new(
        Arc::new(Executor::new(&config(&base, None))),
        FailureMode::FirstFailure,
        FixtureConfig::default(),
    );
    let plan = suites::plan(&["posts_valid"], &anonymous).unwrap();
    let report = Scheduler::sequential().run("posts_valid", &plan);

    assert_eq!(report.state_of("posts_valid::createUser"), Some(CaseState::Failed));
    let detail = report
        .entry("posts_valid::createUser")
        .and_then(|e| e.detail.clone())
        .unwrap();
    assert!(detail.contains("401"), "{detail}");
    for id in ["createPost", "listUserPosts", "deleteUser", "getDeletedUser"] {
        assert_eq!(
            report.state_of(&format!("posts_valid::{id}")),
            Some(CaseState::Skipped),
            "{id}"
        );
    }
    assert_eq!(report.summary().skipped, 4);
}

#[test]
fn failed_setup_skips_the_group_without_touching_others() {
    let base = start_mock();
    let anonymous = Suite::new(
        Arc::new(Executor::new(&config(&base, None))),
        FailureMode::FirstFailure,
        FixtureConfig::default(),
    );
    let mut builder = PlanBuilder::new();
    suites::declare("todos_invalid", &mut builder, &anonymous).unwrap();
    suites::declare("users_invalid", &mut builder, &suite(&base)).unwrap();
    let report = Scheduler::sequential().run("mixed", &builder.build().unwrap());

    assert_eq!(report.state_of("todos_invalid::createUser"), Some(CaseState::Failed));
    assert_eq!(report.state_of("todos_invalid::blankTitle"), Some(CaseState::Skipped));
    assert_eq!(report.state_of("todos_invalid::deleteUser"), Some(CaseState::Skipped));
    assert_eq!(report.state_of("users_invalid::blankName"), Some(CaseState::Passed));
    assert_eq!(report.state_of("users_invalid::deleteUser"), Some(CaseState::Passed));
}

#[test]
fn fixtures_carry_created_ids_between_cases() {
    let base = start_mock();
    let executor = Arc::new(Executor::new(&config(&base, Some(TOKEN))));
    let mut builder = PlanBuilder::new();

    let exec = Arc::clone(&executor);
    builder.test("createUser", move |_| {
        let mut payload = gorest_suite::FieldMap::new();
        payload
            .name("Mark Robinson")
            .email("fixture.flow@example.com")
            .gender("male")
            .status("active");
        let response = exec.execute(&HttpRequest::post(suites::USERS).json(&payload))?;
        Verifier::new(&response, FailureMode::FirstFailure)
            .status(201)
            .finish()?;
        let id = response.parsed().and_then(|v| v["id"].as_i64()).unwrap_or(-1);
        Ok(gorest_suite::scheduler::fixture([("id", id)]))
    });

    let exec = Arc::clone(&executor);
    builder
        .test("readBack", move |ctx| {
            let id = ctx.id_of("createUser")?;
            let response = exec.execute(&HttpRequest::get(format!("{}/{id}", suites::USERS)))?;
            Verifier::new(&response, FailureMode::FirstFailure)
                .status(200)
                .field("email", gorest_suite::Matcher::equals("fixture.flow@example.com"))
                .finish()?;
            gorest_suite::scheduler::done()
        })
        .depends_on(&["createUser"]);

    let report = Scheduler::sequential().run("fixtures", &builder.build().unwrap());
    assert_all_passed(&report);
}

#[test]
fn json_report_lists_every_case() {
    let base = start_mock();
    let plan = suites::plan(&["todos_valid"], &suite(&base)).unwrap();
    let report = Scheduler::sequential().run("todos_valid", &plan);

    let mut sink = JsonSink::new(Vec::new());
    sink.emit(&report).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&sink.into_inner()).unwrap();
    assert_eq!(json["suite"], "todos_valid");
    assert_eq!(json["summary"]["passed"], plan.len());
    let ids: Vec<&str> = json["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, plan.order());
}

#[test]
fn unreachable_service_fails_without_skipping_independent_cases() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let plan = suites::plan(&["e2e"], &suite(&format!("http://{addr}"))).unwrap();
    let report = Scheduler::sequential().run("e2e", &plan);
    let entry = report.entry("e2e::createUser").unwrap();
    assert_eq!(entry.state, CaseState::Failed);
    assert!(entry.detail.as_deref().unwrap().contains(&addr.to_string()));
    assert_eq!(report.summary().failed, 1);
    assert_eq!(report.summary().skipped, plan.len() - 1);
}

/// Accepts connections and never answers them.
fn start_silent() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming().flatten() {
            held.push(stream);
        }
    });
    format!("http://{addr}")
}

#[test]
fn timed_out_case_fails_while_independent_cases_pass() {
    let silent = Arc::new(Executor::new(
        &ClientConfig::new(&start_silent()).with_timeout(Duration::from_secs(1)),
    ));
    let live = Arc::new(Executor::new(&config(&start_mock(), Some(TOKEN))));
    let mut builder = PlanBuilder::new();

    builder.test("slowList", move |_| {
        silent.execute(&HttpRequest::get(suites::USERS))?;
        gorest_suite::scheduler::done()
    });
    builder
        .test("afterSlow", |_| gorest_suite::scheduler::done())
        .depends_on(&["slowList"]);
    builder.test("liveList", move |_| {
        let response = live.execute(&HttpRequest::get(suites::USERS))?;
        Verifier::new(&response, FailureMode::FirstFailure)
            .status(200)
            .finish()?;
        gorest_suite::scheduler::done()
    });

    let report = Scheduler::with_workers(2).run("timeouts", &builder.build().unwrap());
    let slow = report.entry("slowList").unwrap();
    assert_eq!(slow.state, CaseState::Failed);
    assert!(slow.detail.as_deref().unwrap().contains("timed out"), "{:?}", slow.detail);
    assert_eq!(report.state_of("afterSlow"), Some(CaseState::Skipped));
    assert_eq!(report.state_of("liveList"), Some(CaseState::Passed));
}
