use crate::curriculum::resolve;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, effective_brand_id, require_capability, required_str};
use crate::ipc::types::{AppState, Request};
use crate::roles::Capability;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use super::brands::theme_for_brand;

fn platform_name(conn: &Connection) -> String {
    db::settings_get_json(conn, "setup.branding")
        .ok()
        .flatten()
        .and_then(|v| {
            v.get("platformName")
                .and_then(|p| p.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "CourseLoft".to_string())
}

fn show_empty_modules(conn: &Connection) -> bool {
    db::settings_get_json(conn, "setup.curriculum")
        .ok()
        .flatten()
        .and_then(|v| v.get("showEmptyModules").and_then(|b| b.as_bool()))
        .unwrap_or(false)
}

// Branded home screen: the brand, its derived palette, and every published
// course. Counts are resolved counts, so a course does not advertise items
// whose library records are gone.
fn handle_dashboard(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::ViewCourses) {
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

    let brand = match conn
        .query_row(
            "SELECT id, name FROM brands WHERE id = ?",
            [&brand_id],
            |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                }))
            },
        )
        .optional()
    {
        Ok(Some(b)) => b,
        Ok(None) => return err(&req.id, "not_found", "brand not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let lessons = match db::lesson_summaries(conn, &brand_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let quizzes = match db::quiz_summaries(conn, &brand_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = conn
        .prepare(
            "SELECT id, title, description, curriculum_json, module_names_json
             FROM courses WHERE brand_id = ? AND status = 'published' ORDER BY title",
        )
        .and_then(|mut stmt| {
            stmt.query_map([&brand_id], |row| {
                let order_raw: String = row.get(3)?;
                let names_raw: String = row.get(4)?;
                let order: Vec<String> = serde_json::from_str(&order_raw).unwrap_or_default();
                let names: Vec<String> = serde_json::from_str(&names_raw).unwrap_or_default();
                Ok(json!({
                    "id": row.get::<_, String>(0)?,
                    "title": row.get::<_, String>(1)?,
                    "description": row.get::<_, String>(2)?,
                    "itemCount": resolve(&order, &lessons, &quizzes).len(),
                    "moduleCount": names.len(),
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        });
    let courses = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let theme = match theme_for_brand(conn, Some(&brand_id)) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "brand": brand,
            "platformName": platform_name(conn),
            "theme": theme,
            "courses": courses,
        }),
    )
}

// The outline a learner sees: module groups of a published course. Drafts
// and archived courses read as missing from this surface.
fn handle_course_outline(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::ViewCourses) {
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

    let course = match conn
        .query_row(
            "SELECT id, title, description FROM courses
             WHERE id = ? AND brand_id = ? AND status = 'published'",
            rusqlite::params![course_id, brand_id],
            |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "title": r.get::<_, String>(1)?,
                    "description": r.get::<_, String>(2)?,
                }))
            },
        )
        .optional()
    {
        Ok(Some(c)) => c,
        Ok(None) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let curriculum = match db::load_course_curriculum(conn, &brand_id, &course_id) {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let lessons = match db::lesson_summaries(conn, &brand_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let quizzes = match db::quiz_summaries(conn, &brand_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut partition = curriculum.partition(&lessons, &quizzes);
    if !show_empty_modules(conn) {
        partition.modules.retain(|m| !m.items.is_empty());
    }

    let theme = match theme_for_brand(conn, Some(&brand_id)) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "course": course,
            "theme": theme,
            "modules": partition.modules,
            "unassigned": partition.unassigned,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "learner.dashboard" => Some(handle_dashboard(state, req)),
        "learner.courseOutline" => Some(handle_course_outline(state, req)),
        _ => None,
    }
}
