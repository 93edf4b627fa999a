//! One user walking through every resource type.

use super::{Suite, COMMENTS, POSTS, TODOS};
use crate::assertions::Matcher;
use crate::http::HttpRequest;
use crate::report::Severity;
use crate::scheduler::{done, PlanBuilder};

/// GET `path` and expect `id` among the listed ids.
fn expect_listed(s: &Suite, path: &str, id: i64) -> crate::scheduler::CaseResult {
    let response = s.send(&HttpRequest::get(path))?;
    s.verify(&response)
        .status(200)
        .field("id", Matcher::has_item(id))
        .finish()?;
    done()
}

pub(super) fn flow(b: &mut PlanBuilder, s: &Suite) {
    b.group("e2e").feature("Full Website", "E2E Scenario");

    b.test("createUser", s.case(|s, _| s.create_user()))
        .severity(Severity::Blocker);
    b.test(
        "createPost",
        s.case(|s, ctx| s.create_post(ctx.id_of("createUser")?)),
    )
    .depends_on(&["createUser"])
    .severity(Severity::Critical);
    b.test(
        "createComment",
        s.case(|s, ctx| s.create_comment(ctx.id_of("createPost")?)),
    )
    .depends_on(&["createPost"])
    .severity(Severity::Critical);
    b.test(
        "createTodo",
        s.case(|s, ctx| {
            let user = ctx.id_of("createUser")?;
            s.create_todo(user, &s.fixtures.todo_title_pending, "pending")
        }),
    )
    .depends_on(&["createUser"])
    .severity(Severity::Critical);

    b.test(
        "listPosts",
        s.case(|s, ctx| expect_listed(s, POSTS, ctx.id_of("createPost")?)),
    )
    .depends_on(&["createPost"])
    .severity(Severity::Normal);
    b.test(
        "listComments",
        s.case(|s, ctx| expect_listed(s, COMMENTS, ctx.id_of("createComment")?)),
    )
    .depends_on(&["createComment"])
    .severity(Severity::Normal);
    b.test(
        "listTodos",
        s.case(|s, ctx| expect_listed(s, TODOS, ctx.id_of("createTodo")?)),
    )
    .depends_on(&["createTodo"])
    .severity(Severity::Normal);

    b.test(
        "deleteUser",
        s.case(|s, ctx| s.delete_user(ctx.id_of("createUser")?)),
    )
    .depends_on(&["listPosts", "listComments", "listTodos"])
    .severity(Severity::Critical);
    b.test(
        "getDeletedUser",
        s.case(|s, ctx| s.expect_gone(ctx.id_of("createUser")?)),
    )
    .depends_on(&["deleteUser"])
    .severity(Severity::Normal);
}
