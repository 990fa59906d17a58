use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, effective_brand_id, now_ts, require_capability, required_str};
use crate::ipc::types::{AppState, Request};
use crate::roles::Capability;
use rusqlite::{params_from_iter, types::Value, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn json_array_len(raw: &str) -> usize {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|v| v.as_array().map(|a| a.len()))
        .unwrap_or(0)
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::AuthorContent) {
        return e;
    }
    let brand_id = match effective_brand_id(state, req) {
        Ok(b) => b,
        Err(e) => return e,
    };
    let include_archived = req
        .params
        .get("includeArchived")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let mut sql = String::from(
        "SELECT id, title, description, status, curriculum_json, module_names_json, updated_at
         FROM courses WHERE brand_id = ?",
    );
    if !include_archived {
        sql.push_str(" AND status != 'archived'");
    }
    sql.push_str(" ORDER BY title");

    let rows = conn.prepare(&sql).and_then(|mut stmt| {
        stmt.query_map([&brand_id], |row| {
            let curriculum_json: String = row.get(4)?;
            let module_names_json: String = row.get(5)?;
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "title": row.get::<_, String>(1)?,
                "description": row.get::<_, String>(2)?,
                "status": row.get::<_, String>(3)?,
                "itemCount": json_array_len(&curriculum_json),
                "moduleCount": json_array_len(&module_names_json),
                "updatedAt": row.get::<_, String>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    });

    match rows {
        Ok(courses) => ok(&req.id, json!({ "courses": courses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let description = req
        .params
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let course_id = Uuid::new_v4().to_string();
    let ts = now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO courses(id, brand_id, title, description, status, curriculum_json, module_names_json, module_assignments_json, created_at, updated_at)
         VALUES(?, ?, ?, ?, 'draft', '[]', '[]', '{}', ?, ?)",
        rusqlite::params![course_id, brand_id, title, description, ts, ts],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        );
    }
    ok(&req.id, json!({ "courseId": course_id, "status": "draft" }))
}

fn handle_courses_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::AuthorContent) {
        return e;
    }
    let brand_id = match effective_brand_id(state, req) {
        Ok(b) => b,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
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
            "SELECT 1 FROM courses WHERE id = ? AND brand_id = ?",
            rusqlite::params![course_id, brand_id],
            |_r| Ok(()),
        )
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !exists {
        return err(&req.id, "not_found", "course not found", None);
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
            "description" => {
                let Some(s) = v.as_str() else {
                    return err(&req.id, "bad_params", "patch.description must be string", None);
                };
                fields.push("description = ?".to_string());
                values.push(Value::Text(s.to_string()));
            }
            "status" => {
                let Some(s) = v.as_str() else {
                    return err(&req.id, "bad_params", "patch.status must be string", None);
                };
                if !matches!(s, "draft" | "published" | "archived") {
                    return err(
                        &req.id,
                        "bad_params",
                        "patch.status must be one of: draft, published, archived",
                        None,
                    );
                }
                fields.push("status = ?".to_string());
                values.push(Value::Text(s.to_string()));
            }
            _ => return err(&req.id, "bad_params", format!("unknown patch field: {}", k), None),
        }
    }
    if fields.is_empty() {
        return err(&req.id, "bad_params", "patch must set at least one field", None);
    }

    fields.push("updated_at = ?".to_string());
    values.push(Value::Text(now_ts()));
    values.push(Value::Text(course_id.clone()));
    values.push(Value::Text(brand_id));
    let sql = format!(
        "UPDATE courses SET {} WHERE id = ? AND brand_id = ?",
        fields.join(", ")
    );
    if let Err(e) = conn.execute(&sql, params_from_iter(values)) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "courseId": course_id }))
}

fn handle_courses_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::AuthorContent) {
        return e;
    }
    let brand_id = match effective_brand_id(state, req) {
        Ok(b) => b,
        Err(e) => return e,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    // Curriculum, module names and assignments live inside the course row,
    // so a single delete removes the whole board.
    let affected = match conn.execute(
        "DELETE FROM courses WHERE id = ? AND brand_id = ?",
        rusqlite::params![course_id, brand_id],
    ) {
        Ok(n) => n,
        Err(e) => {
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "courses" })),
            )
        }
    };
    if affected == 0 {
        return err(&req.id, "not_found", "course not found", None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(handle_courses_list(state, req)),
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.update" => Some(handle_courses_update(state, req)),
        "courses.delete" => Some(handle_courses_delete(state, req)),
        // The authoring UI opens a course straight onto its curriculum board.
        "courses.open" => Some(super::curriculum::handle_open(state, req)),
        _ => None,
    }
}
