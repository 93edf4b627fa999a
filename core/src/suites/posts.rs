use super::{Suite, USERS};
use crate::assertions::Matcher;
use crate::http::HttpRequest;
use crate::payload::FieldMap;
use crate::report::Severity;
use crate::scheduler::{done, PlanBuilder};

pub(super) fn valid(b: &mut PlanBuilder, s: &Suite) {
    b.group("posts_valid")
        .feature(FEATURE, "Post CRUD Operations");

    b.test("createUser", s.case(|s, _| s.create_user()))
        .severity(Severity::Critical);

    b.test(
        "createPost",
        s.case(|s, ctx| s.create_post(ctx.id_of("createUser")?)),
    )
    .depends_on(&["createUser"])
    .severity(Severity::Critical);

    b.test(
        "listUserPosts",
        s.case(|s, ctx| {
            let user = ctx.id_of("createUser")?;
            let post = ctx.id_of("createPost")?;
            let response = s.send(&HttpRequest::get(format!("{USERS}/{user}/posts")))?;
            s.verify(&response)
                .status(200)
                .field("id", Matcher::has_item(post))
                .field("title", Matcher::has_item(s.fixtures.post_title.as_str()))
                .field("user_id", Matcher::has_item(user))
                .finish()?;
            done()
        }),
    )
    .depends_on(&["createPost"])
    .severity(Severity::Normal);

    b.test(
        "deleteUser",
        s.case(|s, ctx| s.delete_user(ctx.id_of("createUser")?)),
    )
    .depends_on(&["listUserPosts"])
    .severity(Severity::Critical);

    b.test(
        "getDeletedUser",
        s.case(|s, ctx| s.expect_gone(ctx.id_of("createUser")?)),
    )
    .depends_on(&["deleteUser"])
    .severity(Severity::Normal);
}

const FEATURE: &str = "Post Management";

fn post_path(user: i64) -> String {
    format!("{USERS}/{user}/posts")
}

pub(super) fn invalid(b: &mut PlanBuilder, s: &Suite) {
    b.group("posts_invalid")
        .feature(FEATURE, "Post Validation and Error Handling");

    b.setup("createUser", s.case(|s, _| s.create_user()));

    b.test(
        "blankTitle",
        s.case(|s, ctx| {
            let mut payload = FieldMap::new();
            payload.title("").body(&s.fixtures.post_body);
            let request = HttpRequest::post(post_path(ctx.id_of("createUser")?)).json(&payload);
            s.expect_rejected(&request, "title", "can't be blank")
        }),
    )
    .severity(Severity::Critical);

    b.test(
        "blankBody",
        s.case(|s, ctx| {
            let mut payload = FieldMap::new();
            payload.title(&s.fixtures.post_title).body("");
            let request = HttpRequest::post(post_path(ctx.id_of("createUser")?)).json(&payload);
            s.expect_rejected(&request, "body", "can't be blank")
        }),
    )
    .severity(Severity::Critical);

    b.test(
        "missingTitle",
        s.case(|s, ctx| {
            let mut payload = FieldMap::new();
            payload.body(&s.fixtures.post_body);
            let request = HttpRequest::post(post_path(ctx.id_of("createUser")?)).json(&payload);
            s.expect_rejected(&request, "title", "can't be blank")
        }),
    )
    .describe("an omitted key is treated like a blank one")
    .severity(Severity::Normal);

    b.test(
        "createWithoutToken",
        s.case(|s, ctx| {
            let mut payload = FieldMap::new();
            payload.title(&s.fixtures.post_title).body(&s.fixtures.post_body);
            s.expect_unauthorized(
                HttpRequest::post(post_path(ctx.id_of("createUser")?)).json(&payload),
            )
        }),
    )
    .severity(Severity::Critical);

    b.test(
        "unknownUser",
        s.case(|s, _| {
            let mut payload = FieldMap::new();
            payload.title(&s.fixtures.post_title).body(&s.fixtures.post_body);
            s.expect_rejected(
                &HttpRequest::post(post_path(0)).json(&payload),
                "user",
                "must exist",
            )
        }),
    )
    .severity(Severity::Normal);

    b.teardown(
        "deleteUser",
        s.case(|s, ctx| s.delete_user(ctx.id_of("createUser")?)),
    );
}
