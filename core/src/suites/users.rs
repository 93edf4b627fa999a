use super::{Suite, USERS};
use crate::assertions::Matcher;
use crate::http::HttpRequest;
use crate::payload::FieldMap;
use crate::report::Severity;
use crate::scheduler::{done, PlanBuilder};

const FEATURE: &str = "User Management";

/// Full lifecycle of one user: create, replace, rename back, read, list, delete.
pub(super) fn valid(b: &mut PlanBuilder, s: &Suite) {
    b.group("users_valid")
        .feature(FEATURE, "User CRUD Operations");

    b.test("createUser", s.case(|s, _| s.create_user()))
        .describe("create a user with every field set")
        .severity(Severity::Blocker);

    b.test(
        "putUser",
        s.case(|s, ctx| {
            let id = ctx.id_of("createUser")?;
            let email = ctx.str("createUser", "email")?;
            let f = &s.fixtures;
            let mut payload = FieldMap::new();
            payload
                .name(&f.renamed_user_name)
                .email(email)
                .gender(&f.gender)
                .status("inactive");
            let response = s.send(&HttpRequest::put(format!("{USERS}/{id}")).json(&payload))?;
            s.verify(&response)
                .status(200)
                .body_contains_all(&["id", "name", "email", "gender", "status"])
                .field("name", Matcher::equals(f.renamed_user_name.as_str()))
                .field("status", Matcher::equals("inactive"))
                .finish()?;
            done()
        }),
    )
    .depends_on(&["createUser"])
    .describe("PUT replaces the user and deactivates it")
    .severity(Severity::Blocker);

    b.test(
        "patchUser",
        s.case(|s, ctx| {
            let id = ctx.id_of("createUser")?;
            let name = s.fixtures.user_name.as_str();
            let mut payload = FieldMap::new();
            payload.name(name);
            let response = s.send(&HttpRequest::patch(format!("{USERS}/{id}")).json(&payload))?;
            s.verify(&response)
                .status(200)
                .field("name", Matcher::equals(name))
                .field("status", Matcher::equals("inactive"))
                .finish()?;
            done()
        }),
    )
    .depends_on(&["putUser"])
    .describe("PATCH changes only the name")
    .severity(Severity::Normal);

    b.test(
        "getUser",
        s.case(|s, ctx| {
            let id = ctx.id_of("createUser")?;
            let email = ctx.str("createUser", "email")?;
            let response = s.send(&HttpRequest::get(format!("{USERS}/{id}")))?;
            s.verify(&response)
                .status(200)
                .field("id", Matcher::equals(id))
                .field("name", Matcher::equals(s.fixtures.user_name.as_str()))
                .field("email", Matcher::equals(email))
                .field("gender", Matcher::equals(s.fixtures.gender.as_str()))
                .field("status", Matcher::equals("inactive"))
                .finish()?;
            done()
        }),
    )
    .depends_on(&["patchUser"])
    .describe("the user reads back with both updates applied")
    .severity(Severity::Minor);

    b.test(
        "listUsers",
        s.case(|s, _| {
            let response = s.send(&HttpRequest::get(format!("{USERS}?page=1")))?;
            s.verify(&response)
                .status(200)
                .body_contains_all(&["id", "name", "email", "gender", "status"])
                .finish()?;
            done()
        }),
    )
    .depends_on(&["getUser"])
    .describe("the paged user listing answers")
    .severity(Severity::Minor);

    b.test(
        "deleteUser",
        s.case(|s, ctx| s.delete_user(ctx.id_of("createUser")?)),
    )
    .depends_on(&["listUsers"])
    .severity(Severity::Critical);

    b.test(
        "getDeletedUser",
        s.case(|s, ctx| s.expect_gone(ctx.id_of("createUser")?)),
    )
    .depends_on(&["deleteUser"])
    .severity(Severity::Normal);
}

/// A user payload with `key` blanked out.
fn with_blank(s: &Suite, key: &str) -> FieldMap {
    let mut payload = s.user_payload();
    payload.set(key, "");
    payload
}

/// Rejected user creations.
pub(super) fn invalid(b: &mut PlanBuilder, s: &Suite) {
    b.group("users_invalid")
        .feature(FEATURE, "User Validation and Error Handling");

    // Owns the email the duplicate check reuses.
    b.setup("createUser", s.case(|s, _| s.create_user()));

    let blanks = [
        ("blankName", "name", "can't be blank"),
        ("blankEmail", "email", "can't be blank"),
        ("blankGender", "gender", "can't be blank, can be male of female"),
        ("blankStatus", "status", "can't be blank"),
    ];
    for (id, key, message) in blanks {
        b.test(
            id,
            s.case(move |s, _| {
                let payload = with_blank(s, key);
                s.expect_rejected(&HttpRequest::post(USERS).json(&payload), key, message)
            }),
        )
        .describe(format!("blank {key} is rejected"))
        .severity(Severity::Critical);
    }

    b.test(
        "duplicateEmail",
        s.case(|s, ctx| {
            let email = ctx.str("createUser", "email")?;
            let mut payload = s.user_payload();
            payload.email(email);
            s.expect_rejected(
                &HttpRequest::post(USERS).json(&payload),
                "email",
                "has already been taken",
            )
        }),
    )
    .severity(Severity::Blocker);

    b.test(
        "createWithoutToken",
        s.case(|s, _| s.expect_unauthorized(HttpRequest::post(USERS).json(&s.user_payload()))),
    )
    .severity(Severity::Critical);

    b.test(
        "deleteWithoutToken",
        s.case(|s, ctx| {
            let id = ctx.id_of("createUser")?;
            s.expect_unauthorized(HttpRequest::delete(format!("{USERS}/{id}")))?;
            // Still there.
            let response = s.send(&HttpRequest::get(format!("{USERS}/{id}")))?;
            s.verify(&response).status(200).finish()?;
            done()
        }),
    )
    .severity(Severity::Critical);

    b.teardown(
        "deleteUser",
        s.case(|s, ctx| s.delete_user(ctx.id_of("createUser")?)),
    );
}
