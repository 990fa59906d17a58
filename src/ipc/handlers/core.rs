use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::now_ts;
use crate::ipc::types::{AppState, Request};
use crate::roles::Role;
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "signedIn": state.session.is_some()
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            // A brand-new workspace has nobody who could sign in; the caller
            // may hand us the first platform account to create here.
            let seeded = match seed_super_admin(&conn, req) {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_insert_failed", e.to_string(), None),
            };
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            state.session = None;
            tracing::info!("workspace selected: {}", path.display());
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "seededAdminUserId": seeded
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn seed_super_admin(conn: &rusqlite::Connection, req: &Request) -> anyhow::Result<Option<String>> {
    let Some(email) = req.params.get("adminEmail").and_then(|v| v.as_str()) else {
        return Ok(None);
    };
    let user_count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
    if user_count > 0 {
        return Ok(None);
    }

    let email = email.trim().to_ascii_lowercase();
    if !email.contains('@') {
        anyhow::bail!("adminEmail must be an email address");
    }
    let display_name = req
        .params
        .get("adminName")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Platform Admin".to_string());

    let user_id = Uuid::new_v4().to_string();
    let ts = now_ts();
    conn.execute(
        "INSERT INTO users(id, brand_id, email, display_name, role, active, created_at, updated_at)
         VALUES(?, NULL, ?, ?, ?, 1, ?, ?)",
        rusqlite::params![user_id, email, display_name, Role::SuperAdmin.as_str(), ts, ts],
    )?;
    tracing::info!("seeded first platform account for {}", email);
    Ok(Some(user_id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
