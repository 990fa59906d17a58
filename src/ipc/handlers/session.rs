use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request, Session};
use crate::roles::Role;
use rusqlite::OptionalExtension;
use serde_json::json;

use super::brands::theme_for_brand;

fn session_json(session: &Session) -> serde_json::Value {
    json!({
        "userId": session.user_id,
        "email": session.email,
        "displayName": session.display_name,
        "role": session.role.as_str(),
        "brandId": session.brand_id,
    })
}

// The desktop shell owns authentication; the sidecar trusts its email
// assertion and only decides what that account is allowed to do.
fn handle_session_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let email = match required_str(req, "email") {
        Ok(v) => v.to_ascii_lowercase(),
        Err(e) => return e,
    };

    let looked_up = {
        let conn = match db_conn(state, req) {
            Ok(c) => c,
            Err(e) => return e,
        };
        let row = conn
            .query_row(
                "SELECT id, email, display_name, role, brand_id, active
                 FROM users WHERE email = ?",
                [&email],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, Option<String>>(4)?,
                        r.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional();
        match row {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    let Some((user_id, email, display_name, role_raw, brand_id, active)) = looked_up else {
        return err(&req.id, "not_found", "no account for that email", None);
    };
    if active == 0 {
        return err(&req.id, "forbidden", "account is deactivated", None);
    }
    let Some(role) = Role::parse(&role_raw) else {
        return err(
            &req.id,
            "db_query_failed",
            format!("unknown role stored for user: {}", role_raw),
            None,
        );
    };

    let theme = {
        let conn = match db_conn(state, req) {
            Ok(c) => c,
            Err(e) => return e,
        };
        match theme_for_brand(conn, brand_id.as_deref()) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    let session = Session {
        user_id,
        email,
        display_name,
        role,
        brand_id,
    };
    let response = json!({ "user": session_json(&session), "theme": theme });
    state.session = Some(session);
    ok(&req.id, response)
}

fn handle_session_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.session = None;
    ok(&req.id, json!({ "signedIn": false }))
}

fn handle_session_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    match &state.session {
        Some(session) => ok(
            &req.id,
            json!({ "signedIn": true, "user": session_json(session) }),
        ),
        None => ok(&req.id, json!({ "signedIn": false })),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.open" => Some(handle_session_open(state, req)),
        "session.close" => Some(handle_session_close(state, req)),
        "session.current" => Some(handle_session_current(state, req)),
        _ => None,
    }
}
