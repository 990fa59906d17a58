use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, effective_brand_id, now_ts, require_capability, required_str};
use crate::ipc::types::{AppState, Request};
use crate::roles::Capability;
use rusqlite::{params_from_iter, types::Value, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn handle_lessons_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::AuthorContent) {
        return e;
    }
    let brand_id = match effective_brand_id(state, req) {
        Ok(b) => b,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let rows = conn
        .prepare(
            "SELECT id, title, free_preview, duration_minutes, updated_at
             FROM lessons WHERE brand_id = ? ORDER BY title",
        )
        .and_then(|mut stmt| {
            stmt.query_map([&brand_id], |row| {
                Ok(json!({
                    "id": row.get::<_, String>(0)?,
                    "title": row.get::<_, String>(1)?,
                    "freePreview": row.get::<_, i64>(2)? != 0,
                    "durationMinutes": row.get::<_, Option<i64>>(3)?,
                    "updatedAt": row.get::<_, String>(4)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        });

    match rows {
        Ok(lessons) => ok(&req.id, json!({ "lessons": lessons })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_lessons_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::AuthorContent) {
        return e;
    }
    let brand_id = match effective_brand_id(state, req) {
        Ok(b) => b,
        Err(e) => return e,
    };
    let lesson_id = match required_str(req, "lessonId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let row = conn
        .query_row(
            "SELECT id, title, summary, free_preview, duration_minutes, created_at, updated_at
             FROM lessons WHERE id = ? AND brand_id = ?",
            rusqlite::params![lesson_id, brand_id],
            |row| {
                Ok(json!({
                    "id": row.get::<_, String>(0)?,
                    "title": row.get::<_, String>(1)?,
                    "summary": row.get::<_, String>(2)?,
                    "freePreview": row.get::<_, i64>(3)? != 0,
                    "durationMinutes": row.get::<_, Option<i64>>(4)?,
                    "createdAt": row.get::<_, String>(5)?,
                    "updatedAt": row.get::<_, String>(6)?,
                }))
            },
        )
        .optional();

    match row {
        Ok(Some(lesson)) => ok(&req.id, json!({ "lesson": lesson })),
        Ok(None) => err(&req.id, "not_found", "lesson not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_lessons_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::AuthorContent) {
        return e;
    }
    let brand_id = match effective_brand_id(state, req) {
        Ok(b) => b,
        Err(e) => return e,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let summary = req
        .params
        .get("summary")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let free_preview = req
        .params
        .get("freePreview")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let duration_minutes = match req.params.get("durationMinutes") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_i64().filter(|n| *n >= 0) {
            Some(n) => Some(n),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "durationMinutes must be a non-negative integer or null",
                    None,
                )
            }
        },
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let lesson_id = Uuid::new_v4().to_string();
    let ts = now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO lessons(id, brand_id, title, summary, free_preview, duration_minutes, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            lesson_id,
            brand_id,
            title,
            summary,
            free_preview as i64,
            duration_minutes,
            ts,
            ts
        ],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "lessons" })),
        );
    }
    ok(&req.id, json!({ "lessonId": lesson_id }))
}

fn handle_lessons_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::AuthorContent) {
        return e;
    }
    let brand_id = match effective_brand_id(state, req) {
        Ok(b) => b,
        Err(e) => return e,
    };
    let lesson_id = match required_str(req, "lessonId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let exists = match conn
        .query_row(
            "SELECT 1 FROM lessons WHERE id = ? AND brand_id = ?",
            rusqlite::params![lesson_id, brand_id],
            |_r| Ok(()),
        )
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !exists {
        return err(&req.id, "not_found", "lesson not found", None);
    }

    let mut fields: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    for (k, v) in patch {
        match k.as_str() {
            "title" => {
                let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                    return err(&req.id, "bad_params", "patch.title must not be empty", None);
                };
                fields.push("title = ?".to_string());
                values.push(Value::Text(s.to_string()));
            }
            "summary" => {
                let Some(s) = v.as_str() else {
                    return err(&req.id, "bad_params", "patch.summary must be string", None);
                };
                fields.push("summary = ?".to_string());
                values.push(Value::Text(s.to_string()));
            }
            "freePreview" => {
                let Some(b) = v.as_bool() else {
                    return err(&req.id, "bad_params", "patch.freePreview must be boolean", None);
                };
                fields.push("free_preview = ?".to_string());
                values.push(Value::Integer(b as i64));
            }
            "durationMinutes" => {
                if v.is_null() {
                    fields.push("duration_minutes = ?".to_string());
                    values.push(Value::Null);
                } else {
                    let Some(n) = v.as_i64().filter(|n| *n >= 0) else {
                        return err(
                            &req.id,
                            "bad_params",
                            "patch.durationMinutes must be a non-negative integer or null",
                            None,
                        );
                    };
                    fields.push("duration_minutes = ?".to_string());
                    values.push(Value::Integer(n));
                }
            }
            _ => return err(&req.id, "bad_params", format!("unknown patch field: {}", k), None),
        }
    }
    if fields.is_empty() {
        return err(&req.id, "bad_params", "patch must set at least one field", None);
    }

    fields.push("updated_at = ?".to_string());
    values.push(Value::Text(now_ts()));
    values.push(Value::Text(lesson_id.clone()));
    values.push(Value::Text(brand_id));
    let sql = format!(
        "UPDATE lessons SET {} WHERE id = ? AND brand_id = ?",
        fields.join(", ")
    );
    if let Err(e) = conn.execute(&sql, params_from_iter(values)) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "lessonId": lesson_id }))
}

fn handle_lessons_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::AuthorContent) {
        return e;
    }
    let brand_id = match effective_brand_id(state, req) {
        Ok(b) => b,
        Err(e) => return e,
    };
    let lesson_id = match required_str(req, "lessonId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    // Course curricula may still reference the id; the resolver drops
    // dangling entries at read time, so no cleanup sweep here.
    let affected = match conn.execute(
        "DELETE FROM lessons WHERE id = ? AND brand_id = ?",
        rusqlite::params![lesson_id, brand_id],
    ) {
        Ok(n) => n,
        Err(e) => {
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "lessons" })),
            )
        }
    };
    if affected == 0 {
        return err(&req.id, "not_found", "lesson not found", None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "lessons.list" => Some(handle_lessons_list(state, req)),
        "lessons.open" => Some(handle_lessons_open(state, req)),
        "lessons.create" => Some(handle_lessons_create(state, req)),
        "lessons.update" => Some(handle_lessons_update(state, req)),
        "lessons.delete" => Some(handle_lessons_delete(state, req)),
        _ => None,
    }
}
