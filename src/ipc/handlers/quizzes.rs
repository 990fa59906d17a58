use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, effective_brand_id, now_ts, require_capability, required_str};
use crate::ipc::types::{AppState, Request};
use crate::roles::Capability;
use rusqlite::{params_from_iter, types::Value, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

// Validates a questions payload. Each question needs a prompt, at least
// two non-empty choices, and an answerIndex inside the choice range.
fn parse_questions(v: &serde_json::Value) -> Result<Vec<serde_json::Value>, String> {
    let Some(items) = v.as_array() else {
        return Err("questions must be an array".to_string());
    };
    for (i, q) in items.iter().enumerate() {
        let Some(obj) = q.as_object() else {
            return Err(format!("questions[{}] must be an object", i));
        };
        let prompt_ok = obj
            .get("prompt")
            .and_then(|p| p.as_str())
            .map(|p| !p.trim().is_empty())
            .unwrap_or(false);
        if !prompt_ok {
            return Err(format!("questions[{}].prompt must not be empty", i));
        }
        let Some(choices) = obj.get("choices").and_then(|c| c.as_array()) else {
            return Err(format!("questions[{}].choices must be an array", i));
        };
        if choices.len() < 2 {
            return Err(format!("questions[{}] needs at least two choices", i));
        }
        if choices
            .iter()
            .any(|c| c.as_str().map(|s| s.trim().is_empty()).unwrap_or(true))
        {
            return Err(format!("questions[{}].choices must be non-empty strings", i));
        }
        let answer_ok = obj
            .get("answerIndex")
            .and_then(|a| a.as_u64())
            .map(|a| (a as usize) < choices.len())
            .unwrap_or(false);
        if !answer_ok {
            return Err(format!("questions[{}].answerIndex must point at a choice", i));
        }
    }
    Ok(items.clone())
}

fn handle_quizzes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
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
            "SELECT id, title, questions_json, pass_percent, updated_at
             FROM quizzes WHERE brand_id = ? ORDER BY title",
        )
        .and_then(|mut stmt| {
            stmt.query_map([&brand_id], |row| {
                let questions_json: String = row.get(2)?;
                let count = serde_json::from_str::<serde_json::Value>(&questions_json)
                    .ok()
                    .and_then(|v| v.as_array().map(|a| a.len()))
                    .unwrap_or(0);
                Ok(json!({
                    "id": row.get::<_, String>(0)?,
                    "title": row.get::<_, String>(1)?,
                    "questionCount": count,
                    "passPercent": row.get::<_, i64>(3)?,
                    "updatedAt": row.get::<_, String>(4)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        });

    match rows {
        Ok(quizzes) => ok(&req.id, json!({ "quizzes": quizzes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_quizzes_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::AuthorContent) {
        return e;
    }
    let brand_id = match effective_brand_id(state, req) {
        Ok(b) => b,
        Err(e) => return e,
    };
    let quiz_id = match required_str(req, "quizId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let row = conn
        .query_row(
            "SELECT id, title, questions_json, pass_percent, created_at, updated_at
             FROM quizzes WHERE id = ? AND brand_id = ?",
            rusqlite::params![quiz_id, brand_id],
            |row| {
                let questions_json: String = row.get(2)?;
                let questions = serde_json::from_str::<serde_json::Value>(&questions_json)
                    .unwrap_or_else(|_| json!([]));
                Ok(json!({
                    "id": row.get::<_, String>(0)?,
                    "title": row.get::<_, String>(1)?,
                    "questions": questions,
                    "passPercent": row.get::<_, i64>(3)?,
                    "createdAt": row.get::<_, String>(4)?,
                    "updatedAt": row.get::<_, String>(5)?,
                }))
            },
        )
        .optional();

    match row {
        Ok(Some(quiz)) => ok(&req.id, json!({ "quiz": quiz })),
        Ok(None) => err(&req.id, "not_found", "quiz not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_quizzes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let questions = match req.params.get("questions") {
        Some(v) => match parse_questions(v) {
            Ok(q) => q,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        },
        None => Vec::new(),
    };
    let pass_percent = match req.params.get("passPercent") {
        None => 70,
        Some(v) => match v.as_i64().filter(|n| (0..=100).contains(n)) {
            Some(n) => n,
            None => {
                return err(&req.id, "bad_params", "passPercent must be 0 to 100", None)
            }
        },
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let quiz_id = Uuid::new_v4().to_string();
    let ts = now_ts();
    let questions_json = serde_json::Value::Array(questions).to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO quizzes(id, brand_id, title, questions_json, pass_percent, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![quiz_id, brand_id, title, questions_json, pass_percent, ts, ts],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "quizzes" })),
        );
    }
    ok(&req.id, json!({ "quizId": quiz_id }))
}

fn handle_quizzes_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::AuthorContent) {
        return e;
    }
    let brand_id = match effective_brand_id(state, req) {
        Ok(b) => b,
        Err(e) => return e,
    };
    let quiz_id = match required_str(req, "quizId") {
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
            "SELECT 1 FROM quizzes WHERE id = ? AND brand_id = ?",
            rusqlite::params![quiz_id, brand_id],
            |_r| Ok(()),
        )
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !exists {
        return err(&req.id, "not_found", "quiz not found", None);
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
            "questions" => {
                let questions = match parse_questions(v) {
                    Ok(q) => q,
                    Err(msg) => return err(&req.id, "bad_params", msg, None),
                };
                fields.push("questions_json = ?".to_string());
                values.push(Value::Text(serde_json::Value::Array(questions).to_string()));
            }
            "passPercent" => {
                let Some(n) = v.as_i64().filter(|n| (0..=100).contains(n)) else {
                    return err(&req.id, "bad_params", "patch.passPercent must be 0 to 100", None);
                };
                fields.push("pass_percent = ?".to_string());
                values.push(Value::Integer(n));
            }
            _ => return err(&req.id, "bad_params", format!("unknown patch field: {}", k), None),
        }
    }
    if fields.is_empty() {
        return err(&req.id, "bad_params", "patch must set at least one field", None);
    }

    fields.push("updated_at = ?".to_string());
    values.push(Value::Text(now_ts()));
    values.push(Value::Text(quiz_id.clone()));
    values.push(Value::Text(brand_id));
    let sql = format!(
        "UPDATE quizzes SET {} WHERE id = ? AND brand_id = ?",
        fields.join(", ")
    );
    if let Err(e) = conn.execute(&sql, params_from_iter(values)) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "quizId": quiz_id }))
}

fn handle_quizzes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::AuthorContent) {
        return e;
    }
    let brand_id = match effective_brand_id(state, req) {
        Ok(b) => b,
        Err(e) => return e,
    };
    let quiz_id = match required_str(req, "quizId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let affected = match conn.execute(
        "DELETE FROM quizzes WHERE id = ? AND brand_id = ?",
        rusqlite::params![quiz_id, brand_id],
    ) {
        Ok(n) => n,
        Err(e) => {
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "quizzes" })),
            )
        }
    };
    if affected == 0 {
        return err(&req.id, "not_found", "quiz not found", None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "quizzes.list" => Some(handle_quizzes_list(state, req)),
        "quizzes.open" => Some(handle_quizzes_open(state, req)),
        "quizzes.create" => Some(handle_quizzes_create(state, req)),
        "quizzes.update" => Some(handle_quizzes_update(state, req)),
        "quizzes.delete" => Some(handle_quizzes_delete(state, req)),
        _ => None,
    }
}
