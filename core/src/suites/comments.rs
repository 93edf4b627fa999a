use super::{Suite, COMMENTS, POSTS};
use crate::assertions::Matcher;
use crate::http::HttpRequest;
use crate::payload::FieldMap;
use crate::report::Severity;
use crate::scheduler::{done, PlanBuilder};

const FEATURE: &str = "Comment Management";

const CREATED: [&str; 3] = ["firstComment", "secondComment", "thirdComment"];

fn setup_user_and_post(b: &mut PlanBuilder, s: &Suite) {
    b.setup("createUser", s.case(|s, _| s.create_user()));
    b.setup(
        "createPost",
        s.case(|s, ctx| s.create_post(ctx.id_of("createUser")?)),
    )
    .depends_on(&["createUser"]);
}

pub(super) fn valid(b: &mut PlanBuilder, s: &Suite) {
    b.group("comments_valid")
        .feature(FEATURE, "Comment CRUD Operations");
    setup_user_and_post(b, s);

    for id in CREATED {
        b.test(id, s.case(|s, ctx| s.create_comment(ctx.id_of("createPost")?)))
            .severity(Severity::Critical);
    }

    b.test(
        "listPostComments",
        s.case(|s, ctx| {
            let post = ctx.id_of("createPost")?;
            let ids = CREATED
                .iter()
                .map(|id| ctx.id_of(id))
                .collect::<Result<Vec<_>, _>>()?;
            let response = s.send(&HttpRequest::get(format!("{POSTS}/{post}/comments")))?;
            s.verify(&response)
                .status(200)
                .field("id", Matcher::has_items(ids))
                .field("post_id", Matcher::has_item(post))
                .field("body", Matcher::has_item(s.fixtures.comment_body.as_str()))
                .finish()?;
            done()
        }),
    )
    .depends_on(&CREATED)
    .severity(Severity::Normal);

    b.teardown(
        "deleteUser",
        s.case(|s, ctx| s.delete_user(ctx.id_of("createUser")?)),
    );
}

pub(super) fn invalid(b: &mut PlanBuilder, s: &Suite) {
    b.group("comments_invalid")
        .feature(FEATURE, "Comment Validation and Error Handling");
    setup_user_and_post(b, s);

    b.test(
        "nullPostId",
        s.case(|s, _| {
            let mut payload = s.comment_payload(0, &s.fixtures.unique_email());
            payload.set_null("post_id");
            let response = s.send(&HttpRequest::post(COMMENTS).json(&payload))?;
            s.verify(&response)
                .status(422)
                .field("[0].field", Matcher::equals("post"))
                .field("[0].message", Matcher::equals("must exist"))
                .field("[1].field", Matcher::equals("post_id"))
                .field("[1].message", Matcher::equals("is not a number"))
                .finish()?;
            done()
        }),
    )
    .severity(Severity::Critical);

    let blanks = [
        ("blankName", "name", "can't be blank"),
        ("blankEmail", "email", "can't be blank, is invalid"),
        ("blankBody", "body", "can't be blank"),
    ];
    for (id, key, message) in blanks {
        b.test(
            id,
            s.case(move |s, ctx| {
                let post = ctx.id_of("createPost")?;
                let mut payload = s.comment_payload(post, &s.fixtures.unique_email());
                payload.set(key, "");
                s.expect_rejected(&HttpRequest::post(COMMENTS).json(&payload), key, message)
            }),
        )
        .severity(Severity::Critical);
    }

    b.test(
        "createWithoutToken",
        s.case(|s, ctx| {
            let post = ctx.id_of("createPost")?;
            let payload: FieldMap = s.comment_payload(post, &s.fixtures.unique_email());
            s.expect_unauthorized(HttpRequest::post(COMMENTS).json(&payload))
        }),
    )
    .severity(Severity::Critical);

    b.teardown(
        "deleteUser",
        s.case(|s, ctx| s.delete_user(ctx.id_of("createUser")?)),
    );
}
