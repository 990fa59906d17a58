use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, now_ts, opt_str, require_capability, require_session, required_str};
use crate::ipc::types::{AppState, Request};
use crate::roles::{Capability, Role};
use crate::theme::{self, BrandTheme};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

// Per-brand colors win; the workspace branding defaults fill the gaps.
pub fn theme_for_brand(conn: &Connection, brand_id: Option<&str>) -> anyhow::Result<BrandTheme> {
    let (default_primary, default_accent) = branding_defaults(conn);
    let (brand_primary, brand_accent) = match brand_id {
        Some(id) => conn
            .query_row(
                "SELECT primary_color, accent_color FROM brands WHERE id = ?",
                [id],
                |r| {
                    Ok((
                        r.get::<_, Option<String>>(0)?,
                        r.get::<_, Option<String>>(1)?,
                    ))
                },
            )
            .optional()?
            .unwrap_or((None, None)),
        None => (None, None),
    };
    let primary = brand_primary.or(default_primary);
    let accent = brand_accent.or(default_accent);
    Ok(theme::derive_theme(primary.as_deref(), accent.as_deref()))
}

fn branding_defaults(conn: &Connection) -> (Option<String>, Option<String>) {
    let obj = db::settings_get_json(conn, "setup.branding")
        .ok()
        .flatten()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    let primary = obj
        .get("defaultPrimaryColor")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let accent = obj
        .get("defaultAccentColor")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    (primary, accent)
}

pub fn validate_color(v: &serde_json::Value, key: &str) -> Result<Option<String>, String> {
    if v.is_null() {
        return Ok(None);
    }
    let s = v
        .as_str()
        .ok_or_else(|| format!("{} must be string or null", key))?
        .trim()
        .to_string();
    if s.is_empty() {
        return Ok(None);
    }
    if theme::parse_hex_color(&s).is_none() {
        return Err(format!("{} must be a hex color like #rrggbb", key));
    }
    Ok(Some(s))
}

fn handle_brands_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::ManageBrands) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    // Counts via correlated subqueries so joins cannot double-count.
    let mut stmt = match conn.prepare(
        "SELECT
           b.id,
           b.name,
           b.primary_color,
           b.accent_color,
           b.created_at,
           (SELECT COUNT(*) FROM users u WHERE u.brand_id = b.id) AS user_count,
           (SELECT COUNT(*) FROM courses c WHERE c.brand_id = b.id) AS course_count
         FROM brands b
         ORDER BY b.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "primaryColor": row.get::<_, Option<String>>(2)?,
                "accentColor": row.get::<_, Option<String>>(3)?,
                "createdAt": row.get::<_, String>(4)?,
                "userCount": row.get::<_, i64>(5)?,
                "courseCount": row.get::<_, i64>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(brands) => ok(&req.id, json!({ "brands": brands })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_brands_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::ManageBrands) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let primary_color = match req.params.get("primaryColor") {
        Some(v) => match validate_color(v, "primaryColor") {
            Ok(c) => c,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        },
        None => None,
    };
    let accent_color = match req.params.get("accentColor") {
        Some(v) => match validate_color(v, "accentColor") {
            Ok(c) => c,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        },
        None => None,
    };

    let taken = match conn
        .query_row("SELECT 1 FROM brands WHERE name = ?", [&name], |_r| Ok(()))
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if taken {
        return err(&req.id, "name_in_use", "a brand with that name already exists", None);
    }

    let brand_id = Uuid::new_v4().to_string();
    let ts = now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO brands(id, name, primary_color, accent_color, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        rusqlite::params![brand_id, name, primary_color, accent_color, ts, ts],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "brands" })),
        );
    }

    ok(&req.id, json!({ "brandId": brand_id }))
}

fn handle_brands_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match require_session(state, req) {
        Ok(s) => s.clone(),
        Err(e) => return e,
    };
    let brand_id = match required_str(req, "brandId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    // Platform admins touch any brand; an owner may restyle their own.
    let own_brand = session.brand_id.as_deref() == Some(brand_id.as_str());
    if !session.role.can(Capability::ManageBrands) && !(own_brand && session.role == Role::Owner) {
        return err(&req.id, "forbidden", "not allowed to update this brand", None);
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let exists = match conn
        .query_row("SELECT 1 FROM brands WHERE id = ?", [&brand_id], |_r| Ok(()))
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !exists {
        return err(&req.id, "not_found", "brand not found", None);
    }

    let mut fields: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    for (k, v) in patch {
        match k.as_str() {
            "name" => {
                let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                    return err(&req.id, "bad_params", "patch.name must not be empty", None);
                };
                let taken = match conn
                    .query_row(
                        "SELECT 1 FROM brands WHERE name = ? AND id != ?",
                        rusqlite::params![s, brand_id],
                        |_r| Ok(()),
                    )
                    .optional()
                {
                    Ok(v) => v.is_some(),
                    Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
                };
                if taken {
                    return err(&req.id, "name_in_use", "a brand with that name already exists", None);
                }
                fields.push("name = ?".to_string());
                values.push(Value::Text(s.to_string()));
            }
            "primaryColor" => {
                let color = match validate_color(v, "patch.primaryColor") {
                    Ok(c) => c,
                    Err(msg) => return err(&req.id, "bad_params", msg, None),
                };
                fields.push("primary_color = ?".to_string());
                values.push(color.map(Value::Text).unwrap_or(Value::Null));
            }
            "accentColor" => {
                let color = match validate_color(v, "patch.accentColor") {
                    Ok(c) => c,
                    Err(msg) => return err(&req.id, "bad_params", msg, None),
                };
                fields.push("accent_color = ?".to_string());
                values.push(color.map(Value::Text).unwrap_or(Value::Null));
            }
            _ => return err(&req.id, "bad_params", format!("unknown patch field: {}", k), None),
        }
    }
    if fields.is_empty() {
        return err(&req.id, "bad_params", "patch must set at least one field", None);
    }

    fields.push("updated_at = ?".to_string());
    values.push(Value::Text(now_ts()));
    values.push(Value::Text(brand_id.clone()));
    let sql = format!("UPDATE brands SET {} WHERE id = ?", fields.join(", "));
    if let Err(e) = conn.execute(&sql, params_from_iter(values)) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    let theme = match theme_for_brand(conn, Some(&brand_id)) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "brandId": brand_id, "theme": theme }))
}

fn handle_brands_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::ManageBrands) {
        return e;
    }
    let brand_id = match required_str(req, "brandId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    {
        let conn = match db_conn(state, req) {
            Ok(c) => c,
            Err(e) => return e,
        };

        let exists = match conn
            .query_row("SELECT 1 FROM brands WHERE id = ?", [&brand_id], |_r| Ok(()))
            .optional()
        {
            Ok(v) => v.is_some(),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if !exists {
            return err(&req.id, "not_found", "brand not found", None);
        }

        let tx = match conn.unchecked_transaction() {
            Ok(t) => t,
            Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
        };

        // Children first; brands has no ON DELETE CASCADE.
        if let Err(e) = tx.execute("DELETE FROM courses WHERE brand_id = ?", [&brand_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "courses" })),
            );
        }
        if let Err(e) = tx.execute("DELETE FROM quizzes WHERE brand_id = ?", [&brand_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "quizzes" })),
            );
        }
        if let Err(e) = tx.execute("DELETE FROM lessons WHERE brand_id = ?", [&brand_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "lessons" })),
            );
        }
        if let Err(e) = tx.execute("DELETE FROM users WHERE brand_id = ?", [&brand_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "users" })),
            );
        }
        if let Err(e) = tx.execute("DELETE FROM brands WHERE id = ?", [&brand_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "brands" })),
            );
        }
        if let Err(e) = tx.commit() {
            return err(&req.id, "db_commit_failed", e.to_string(), None);
        }
    }

    // Anyone signed in under the deleted brand no longer exists.
    let stale_session = state
        .session
        .as_ref()
        .map(|s| s.brand_id.as_deref() == Some(brand_id.as_str()))
        .unwrap_or(false);
    if stale_session {
        state.session = None;
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_brands_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match require_session(state, req) {
        Ok(s) => s.clone(),
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    // Brand members open their own brand; platform roles name any via brandId.
    let brand_id = match &session.brand_id {
        Some(b) => b.clone(),
        None => match opt_str(req, "brandId") {
            Some(b) => b,
            None => return err(&req.id, "bad_params", "missing brandId", None),
        },
    };

    let row = conn
        .query_row(
            "SELECT id, name, primary_color, accent_color, created_at, updated_at
             FROM brands WHERE id = ?",
            [&brand_id],
            |row| {
                Ok(json!({
                    "id": row.get::<_, String>(0)?,
                    "name": row.get::<_, String>(1)?,
                    "primaryColor": row.get::<_, Option<String>>(2)?,
                    "accentColor": row.get::<_, Option<String>>(3)?,
                    "createdAt": row.get::<_, String>(4)?,
                    "updatedAt": row.get::<_, String>(5)?,
                }))
            },
        )
        .optional();

    let brand = match row {
        Ok(Some(b)) => b,
        Ok(None) => return err(&req.id, "not_found", "brand not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let theme = match theme_for_brand(conn, Some(&brand_id)) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "brand": brand, "theme": theme }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "brands.list" => Some(handle_brands_list(state, req)),
        "brands.create" => Some(handle_brands_create(state, req)),
        "brands.update" => Some(handle_brands_update(state, req)),
        "brands.delete" => Some(handle_brands_delete(state, req)),
        "brands.open" => Some(handle_brands_open(state, req)),
        _ => None,
    }
}
