use super::{Suite, USERS};
use crate::assertions::Matcher;
use crate::http::HttpRequest;
use crate::payload::FieldMap;
use crate::report::Severity;
use crate::scheduler::{done, PlanBuilder};

const FEATURE: &str = "Todo Management";

fn todos_of(user: i64) -> String {
    format!("{USERS}/{user}/todos")
}

pub(super) fn valid(b: &mut PlanBuilder, s: &Suite) {
    b.group("todos_valid")
        .feature(FEATURE, "Todo CRUD Operations");

    b.test("createUser", s.case(|s, _| s.create_user()))
        .severity(Severity::Critical);

    b.test(
        "createCompletedTodo",
        s.case(|s, ctx| {
            let user = ctx.id_of("createUser")?;
            s.create_todo(user, &s.fixtures.todo_title_completed, "completed")
        }),
    )
    .depends_on(&["createUser"])
    .severity(Severity::Critical);

    b.test(
        "createPendingTodo",
        s.case(|s, ctx| {
            let user = ctx.id_of("createUser")?;
            s.create_todo(user, &s.fixtures.todo_title_pending, "pending")
        }),
    )
    .depends_on(&["createUser"])
    .severity(Severity::Critical);

    b.test(
        "listTodos",
        s.case(|s, ctx| {
            let user = ctx.id_of("createUser")?;
            let ids = [
                ctx.id_of("createCompletedTodo")?,
                ctx.id_of("createPendingTodo")?,
            ];
            let response = s.send(&HttpRequest::get(todos_of(user)))?;
            s.verify(&response)
                .status(200)
                .field("id", Matcher::has_items(ids))
                .field("status", Matcher::has_items(["completed", "pending"]))
                .field("due_on", Matcher::has_item(s.fixtures.due_on.as_str()))
                .finish()?;
            done()
        }),
    )
    .depends_on(&["createCompletedTodo", "createPendingTodo"])
    .severity(Severity::Normal);

    b.test(
        "deleteUser",
        s.case(|s, ctx| s.delete_user(ctx.id_of("createUser")?)),
    )
    .depends_on(&["listTodos"])
    .severity(Severity::Critical);

    b.test(
        "listTodosAfterDelete",
        s.case(|s, ctx| {
            let response = s.send(&HttpRequest::get(todos_of(ctx.id_of("createUser")?)))?;
            s.verify(&response)
                .status(200)
                .field("", Matcher::is_empty_list())
                .finish()?;
            done()
        }),
    )
    .depends_on(&["deleteUser"])
    .describe("todos go away with their owner")
    .severity(Severity::Normal);
}

pub(super) fn invalid(b: &mut PlanBuilder, s: &Suite) {
    b.group("todos_invalid")
        .feature(FEATURE, "Todo Validation and Error Handling");

    b.setup("createUser", s.case(|s, _| s.create_user()));

    b.test(
        "blankTitle",
        s.case(|s, ctx| {
            let mut payload = FieldMap::new();
            payload
                .title("")
                .due_on(&s.fixtures.due_on)
                .status("pending");
            let request = HttpRequest::post(todos_of(ctx.id_of("createUser")?)).json(&payload);
            s.expect_rejected(&request, "title", "can't be blank")
        }),
    )
    .severity(Severity::Critical);

    b.test(
        "blankStatus",
        s.case(|s, ctx| {
            let mut payload = FieldMap::new();
            payload
                .title(&s.fixtures.todo_title_pending)
                .due_on(&s.fixtures.due_on)
                .status("");
            let request = HttpRequest::post(todos_of(ctx.id_of("createUser")?)).json(&payload);
            s.expect_rejected(
                &request,
                "status",
                "can't be blank, can be pending or completed",
            )
        }),
    )
    .severity(Severity::Critical);

    b.test(
        "createWithoutToken",
        s.case(|s, ctx| {
            let mut payload = FieldMap::new();
            payload
                .title(&s.fixtures.todo_title_pending)
                .status("pending");
            s.expect_unauthorized(
                HttpRequest::post(todos_of(ctx.id_of("createUser")?)).json(&payload),
            )
        }),
    )
    .severity(Severity::Critical);

    b.teardown(
        "deleteUser",
        s.case(|s, ctx| s.delete_user(ctx.id_of("createUser")?)),
    );
}
