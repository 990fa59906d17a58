use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, now_ts, opt_str, require_capability, required_str};
use crate::ipc::types::{AppState, Request};
use crate::roles::{Capability, Role};
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

fn user_row_json(row: &Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "brandId": row.get::<_, Option<String>>(1)?,
        "email": row.get::<_, String>(2)?,
        "displayName": row.get::<_, String>(3)?,
        "role": row.get::<_, String>(4)?,
        "active": row.get::<_, i64>(5)? != 0,
        "inviteExpiresAt": row.get::<_, Option<String>>(6)?,
        "createdAt": row.get::<_, String>(7)?,
    }))
}

const USER_COLUMNS: &str =
    "id, brand_id, email, display_name, role, active, invite_expires_at, created_at";

// Invite knobs from workspace setup, with hard fallbacks when unset.
fn invite_defaults(conn: &Connection) -> (Role, i64) {
    let obj = db::settings_get_json(conn, "setup.users")
        .ok()
        .flatten()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    let role = obj
        .get("defaultInviteRole")
        .and_then(|v| v.as_str())
        .and_then(Role::parse)
        .unwrap_or(Role::Staff);
    let days = obj
        .get("inviteExpiryDays")
        .and_then(|v| v.as_i64())
        .filter(|d| (1..=90).contains(d))
        .unwrap_or(14);
    (role, days)
}

fn handle_users_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match require_capability(state, req, Capability::ManageUsers) {
        Ok(s) => s.clone(),
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    // Brand staff see their own brand; platform admins see everything
    // unless they narrow with brandId.
    let brand_filter = match &session.brand_id {
        Some(b) => Some(b.clone()),
        None => opt_str(req, "brandId"),
    };

    let rows = match &brand_filter {
        Some(brand) => {
            let sql = format!(
                "SELECT {} FROM users WHERE brand_id = ? ORDER BY email",
                USER_COLUMNS
            );
            conn.prepare(&sql).and_then(|mut stmt| {
                stmt.query_map([brand], user_row_json)
                    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            })
        }
        None => {
            let sql = format!("SELECT {} FROM users ORDER BY email", USER_COLUMNS);
            conn.prepare(&sql).and_then(|mut stmt| {
                stmt.query_map([], user_row_json)
                    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            })
        }
    };

    match rows {
        Ok(users) => ok(&req.id, json!({ "users": users })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_users_invite(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match require_capability(state, req, Capability::ManageUsers) {
        Ok(s) => s.clone(),
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let email = match required_str(req, "email") {
        Ok(v) => v.to_ascii_lowercase(),
        Err(e) => return e,
    };
    if !email.contains('@') {
        return err(&req.id, "bad_params", "email must be an email address", None);
    }
    let display_name = match required_str(req, "displayName") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let (default_role, expiry_days) = invite_defaults(conn);
    let role = match opt_str(req, "role") {
        Some(s) => match Role::parse(&s) {
            Some(r) => r,
            None => return err(&req.id, "bad_params", format!("unknown role: {}", s), None),
        },
        None => default_role,
    };
    if !session.role.can_assign(role) {
        return err(
            &req.id,
            "forbidden",
            format!("role {} cannot invite a {}", session.role.as_str(), role.as_str()),
            None,
        );
    }

    // Platform accounts have no brand; everyone else lands in one.
    let brand_id = if role.is_platform() {
        None
    } else {
        match &session.brand_id {
            Some(b) => Some(b.clone()),
            None => match opt_str(req, "brandId") {
                Some(b) => Some(b),
                None => return err(&req.id, "bad_params", "missing brandId", None),
            },
        }
    };
    if let Some(b) = &brand_id {
        let exists = match conn
            .query_row("SELECT 1 FROM brands WHERE id = ?", [b], |_r| Ok(()))
            .optional()
        {
            Ok(v) => v.is_some(),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if !exists {
            return err(&req.id, "not_found", "brand not found", None);
        }
    }

    let email_used = match conn
        .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |_r| Ok(()))
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if email_used {
        return err(&req.id, "email_in_use", "an account with that email already exists", None);
    }

    let user_id = Uuid::new_v4().to_string();
    let ts = now_ts();
    let invite_expires_at = (chrono::Utc::now() + chrono::Duration::days(expiry_days))
        .format("%Y-%m-%d")
        .to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO users(id, brand_id, email, display_name, role, active, invite_expires_at, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, 1, ?, ?, ?)",
        rusqlite::params![user_id, brand_id, email, display_name, role.as_str(), invite_expires_at, ts, ts],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "users" })),
        );
    }

    ok(
        &req.id,
        json!({ "userId": user_id, "role": role.as_str(), "inviteExpiresAt": invite_expires_at }),
    )
}

// Target row a management call is allowed to see. Brand sessions only
// reach users of their own brand, so cross-brand ids read as missing.
fn load_target(
    conn: &Connection,
    session_brand: Option<&str>,
    user_id: &str,
) -> rusqlite::Result<Option<(Option<String>, Role)>> {
    let row = conn
        .query_row(
            "SELECT brand_id, role FROM users WHERE id = ?",
            [user_id],
            |r| {
                Ok((
                    r.get::<_, Option<String>>(0)?,
                    r.get::<_, String>(1)?,
                ))
            },
        )
        .optional()?;
    let Some((brand_id, role_str)) = row else {
        return Ok(None);
    };
    if let Some(scope) = session_brand {
        if brand_id.as_deref() != Some(scope) {
            return Ok(None);
        }
    }
    let Some(role) = Role::parse(&role_str) else {
        return Ok(None);
    };
    Ok(Some((brand_id, role)))
}

fn handle_users_update_role(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match require_capability(state, req, Capability::ManageUsers) {
        Ok(s) => s.clone(),
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if user_id == session.user_id {
        return err(&req.id, "bad_params", "cannot change your own role", None);
    }
    let new_role = match required_str(req, "role") {
        Ok(s) => match Role::parse(&s) {
            Some(r) => r,
            None => return err(&req.id, "bad_params", format!("unknown role: {}", s), None),
        },
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let target = match load_target(conn, session.brand_id.as_deref(), &user_id) {
        Ok(Some(t)) => t,
        Ok(None) => return err(&req.id, "not_found", "user not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let (target_brand, target_role) = target;

    if !session.role.can_assign(target_role) || !session.role.can_assign(new_role) {
        return err(
            &req.id,
            "forbidden",
            format!(
                "role {} cannot change a {} into a {}",
                session.role.as_str(),
                target_role.as_str(),
                new_role.as_str()
            ),
            None,
        );
    }
    if new_role.is_platform() != target_brand.is_none() {
        return err(
            &req.id,
            "bad_params",
            "cannot move a user between platform and brand scope",
            None,
        );
    }

    if let Err(e) = conn.execute(
        "UPDATE users SET role = ?, updated_at = ? WHERE id = ?",
        rusqlite::params![new_role.as_str(), now_ts(), user_id],
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "userId": user_id, "role": new_role.as_str() }))
}

fn handle_users_deactivate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match require_capability(state, req, Capability::ManageUsers) {
        Ok(s) => s.clone(),
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if user_id == session.user_id {
        return err(&req.id, "bad_params", "cannot deactivate your own account", None);
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let target = match load_target(conn, session.brand_id.as_deref(), &user_id) {
        Ok(Some(t)) => t,
        Ok(None) => return err(&req.id, "not_found", "user not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let (_, target_role) = target;
    if !session.role.can_assign(target_role) {
        return err(
            &req.id,
            "forbidden",
            format!(
                "role {} cannot deactivate a {}",
                session.role.as_str(),
                target_role.as_str()
            ),
            None,
        );
    }

    if let Err(e) = conn.execute(
        "UPDATE users SET active = 0, updated_at = ? WHERE id = ?",
        rusqlite::params![now_ts(), user_id],
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "userId": user_id, "active": false }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.list" => Some(handle_users_list(state, req)),
        "users.invite" => Some(handle_users_invite(state, req)),
        "users.updateRole" => Some(handle_users_update_role(state, req)),
        "users.deactivate" => Some(handle_users_deactivate(state, req)),
        _ => None,
    }
}
