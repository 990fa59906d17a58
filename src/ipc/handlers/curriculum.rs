use std::collections::HashSet;

use crate::curriculum::{
    lesson_item_id, quiz_item_id, split_item_id, CourseCurriculum, CurriculumError, ItemKind,
    ListRef, Partition,
};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, effective_brand_id, now_ts, opt_str, require_capability, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::roles::Capability;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

struct CourseRef {
    id: String,
    title: String,
    status: String,
}

fn load_course(
    conn: &Connection,
    req: &Request,
    brand_id: &str,
    course_id: &str,
) -> Result<(CourseRef, CourseCurriculum), serde_json::Value> {
    let course = conn
        .query_row(
            "SELECT id, title, status FROM courses WHERE id = ? AND brand_id = ?",
            rusqlite::params![course_id, brand_id],
            |r| {
                Ok(CourseRef {
                    id: r.get(0)?,
                    title: r.get(1)?,
                    status: r.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    let Some(course) = course else {
        return Err(err(&req.id, "not_found", "course not found", None));
    };
    let curriculum = db::load_course_curriculum(conn, brand_id, course_id)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?
        .unwrap_or_default();
    Ok((course, curriculum))
}

fn load_libraries(
    conn: &Connection,
    req: &Request,
    brand_id: &str,
) -> Result<(Vec<crate::curriculum::LessonSummary>, Vec<crate::curriculum::QuizSummary>), serde_json::Value>
{
    let lessons = db::lesson_summaries(conn, brand_id)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    let quizzes = db::quiz_summaries(conn, brand_id)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    Ok((lessons, quizzes))
}

// Every curriculum response carries the whole board so the UI can render
// the new state without a second round trip.
fn board_json(course: &CourseRef, partition: &Partition) -> serde_json::Value {
    json!({
        "course": {
            "id": course.id,
            "title": course.title,
            "status": course.status,
        },
        "modules": partition.modules,
        "unassigned": partition.unassigned,
    })
}

fn curriculum_err(req: &Request, e: &CurriculumError) -> serde_json::Value {
    let details = match e {
        CurriculumError::IndexOutOfRange { list, index, len } => {
            Some(json!({ "list": list, "index": index, "len": len }))
        }
        _ => None,
    };
    err(&req.id, e.code(), e.to_string(), details)
}

fn persist_items(
    conn: &Connection,
    req: &Request,
    brand_id: &str,
    course_id: &str,
    next: &CourseCurriculum,
) -> Result<(), serde_json::Value> {
    match db::update_course_items(conn, brand_id, course_id, next, &now_ts()) {
        Ok(true) => Ok(()),
        Ok(false) => Err(err(&req.id, "not_found", "course not found", None)),
        Err(e) => {
            tracing::warn!("curriculum write failed for course {}: {}", course_id, e);
            Err(err(&req.id, "db_update_failed", e.to_string(), None))
        }
    }
}

fn persist_modules(
    conn: &Connection,
    req: &Request,
    brand_id: &str,
    course_id: &str,
    next: &CourseCurriculum,
) -> Result<(), serde_json::Value> {
    match db::update_course_modules(conn, brand_id, course_id, next, &now_ts()) {
        Ok(true) => Ok(()),
        Ok(false) => Err(err(&req.id, "not_found", "course not found", None)),
        Err(e) => {
            tracing::warn!("module write failed for course {}: {}", course_id, e);
            Err(err(&req.id, "db_update_failed", e.to_string(), None))
        }
    }
}

// Drag payloads name a module or, when the item sits in the pool, omit it.
fn list_ref_param(req: &Request, key: &str) -> ListRef {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(name) if !name.trim().is_empty() => ListRef::Module(name.trim().to_string()),
        _ => ListRef::Unassigned,
    }
}

fn required_index(req: &Request, key: &str) -> Result<usize, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub(super) fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let (course, curriculum) = match load_course(conn, req, &brand_id, &course_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (lessons, quizzes) = match load_libraries(conn, req, &brand_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let partition = curriculum.partition(&lessons, &quizzes);
    ok(&req.id, board_json(&course, &partition))
}

fn handle_available(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let (_, curriculum) = match load_course(conn, req, &brand_id, &course_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (lessons, quizzes) = match load_libraries(conn, req, &brand_id) {
        Ok(v) => v,
        Err(e) => return e,
    };

    // The add dialog only offers what the course does not hold yet.
    let mut present: HashSet<&str> = curriculum
        .curriculum_order
        .iter()
        .map(String::as_str)
        .collect();
    for ids in curriculum.module_assignments.values() {
        present.extend(ids.iter().map(String::as_str));
    }

    let lessons: Vec<serde_json::Value> = lessons
        .iter()
        .filter(|l| !present.contains(lesson_item_id(&l.id).as_str()))
        .map(|l| {
            json!({
                "itemId": lesson_item_id(&l.id),
                "title": l.title,
                "freePreview": l.free_preview,
            })
        })
        .collect();
    let quizzes: Vec<serde_json::Value> = quizzes
        .iter()
        .filter(|q| !present.contains(quiz_item_id(&q.id).as_str()))
        .map(|q| {
            json!({
                "itemId": quiz_item_id(&q.id),
                "title": q.title,
                "questionCount": q.question_count,
            })
        })
        .collect();

    ok(&req.id, json!({ "lessons": lessons, "quizzes": quizzes }))
}

fn handle_add_item(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let item_id = match required_str(req, "itemId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    // The reference must point at a live library record of this brand.
    let Some((kind, library_id)) = split_item_id(&item_id) else {
        return err(
            &req.id,
            "bad_params",
            "itemId must start with lesson- or quiz-",
            None,
        );
    };
    let (table, label) = match kind {
        ItemKind::Lesson => ("lessons", "lesson"),
        ItemKind::Quiz => ("quizzes", "quiz"),
    };
    let sql = format!("SELECT 1 FROM {} WHERE id = ? AND brand_id = ?", table);
    let found = match conn
        .query_row(&sql, rusqlite::params![library_id, brand_id], |_r| Ok(()))
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !found {
        return err(&req.id, "not_found", format!("{} not found", label), None);
    }

    let (course, curriculum) = match load_course(conn, req, &brand_id, &course_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let next = match curriculum.add_item(&item_id) {
        Ok(v) => v,
        Err(e) => return curriculum_err(req, &e),
    };
    if let Err(e) = persist_items(conn, req, &brand_id, &course_id, &next) {
        return e;
    }

    let (lessons, quizzes) = match load_libraries(conn, req, &brand_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let partition = next.partition(&lessons, &quizzes);
    ok(&req.id, board_json(&course, &partition))
}

fn handle_remove_item(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let item_id = match required_str(req, "itemId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let (course, curriculum) = match load_course(conn, req, &brand_id, &course_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let next = match curriculum.remove_item(&item_id) {
        Ok(v) => v,
        Err(e) => return curriculum_err(req, &e),
    };
    if let Err(e) = persist_items(conn, req, &brand_id, &course_id, &next) {
        return e;
    }

    let (lessons, quizzes) = match load_libraries(conn, req, &brand_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let partition = next.partition(&lessons, &quizzes);
    ok(&req.id, board_json(&course, &partition))
}

fn handle_move(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let source = list_ref_param(req, "sourceModule");
    let dest = list_ref_param(req, "destModule");
    let source_index = match required_index(req, "sourceIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let dest_index = match required_index(req, "destIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let (course, curriculum) = match load_course(conn, req, &brand_id, &course_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (lessons, quizzes) = match load_libraries(conn, req, &brand_id) {
        Ok(v) => v,
        Err(e) => return e,
    };

    // Drag indices address the resolved board, so partition first, move on
    // the board, then write back the reconstructed order.
    let partition = curriculum.partition(&lessons, &quizzes);
    let moved = match partition.move_item(&source, source_index, &dest, dest_index) {
        Ok(v) => v,
        Err(e) => return curriculum_err(req, &e),
    };
    let next = moved.to_course();
    if let Err(e) = persist_items(conn, req, &brand_id, &course_id, &next) {
        return e;
    }

    ok(&req.id, board_json(&course, &moved))
}

fn default_module_name(conn: &Connection, curriculum: &CourseCurriculum) -> String {
    let prefix = db::settings_get_json(conn, "setup.curriculum")
        .ok()
        .flatten()
        .and_then(|v| {
            v.get("defaultModuleTitlePrefix")
                .and_then(|p| p.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "Module".to_string());
    let mut n = curriculum.module_names.len() + 1;
    loop {
        let candidate = format!("{} {}", prefix, n);
        if !curriculum.module_names.iter().any(|m| *m == candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn handle_modules_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let (course, curriculum) = match load_course(conn, req, &brand_id, &course_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match opt_str(req, "name") {
        Some(v) => v,
        None => default_module_name(conn, &curriculum),
    };
    let next = match curriculum.add_module(&name) {
        Ok(v) => v,
        Err(e) => return curriculum_err(req, &e),
    };
    if let Err(e) = persist_modules(conn, req, &brand_id, &course_id, &next) {
        return e;
    }

    let (lessons, quizzes) = match load_libraries(conn, req, &brand_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let partition = next.partition(&lessons, &quizzes);
    ok(&req.id, board_json(&course, &partition))
}

fn handle_modules_rename(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let from = match required_str(req, "from") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let to = match required_str(req, "to") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let (course, curriculum) = match load_course(conn, req, &brand_id, &course_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let next = match curriculum.rename_module(&from, &to) {
        Ok(v) => v,
        Err(e) => return curriculum_err(req, &e),
    };
    // Names and assignments land in one UPDATE; a rename can never be half
    // visible to a re-fetch.
    if let Err(e) = persist_modules(conn, req, &brand_id, &course_id, &next) {
        return e;
    }

    let (lessons, quizzes) = match load_libraries(conn, req, &brand_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let partition = next.partition(&lessons, &quizzes);
    ok(&req.id, board_json(&course, &partition))
}

fn handle_modules_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let (course, curriculum) = match load_course(conn, req, &brand_id, &course_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let next = match curriculum.remove_module(&name) {
        Ok(v) => v,
        Err(e) => return curriculum_err(req, &e),
    };
    if let Err(e) = persist_modules(conn, req, &brand_id, &course_id, &next) {
        return e;
    }

    let (lessons, quizzes) = match load_libraries(conn, req, &brand_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let partition = next.partition(&lessons, &quizzes);
    ok(&req.id, board_json(&course, &partition))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "curriculum.open" => Some(handle_open(state, req)),
        "curriculum.available" => Some(handle_available(state, req)),
        "curriculum.addItem" => Some(handle_add_item(state, req)),
        "curriculum.removeItem" => Some(handle_remove_item(state, req)),
        "curriculum.move" => Some(handle_move(state, req)),
        "curriculum.modules.create" => Some(handle_modules_create(state, req)),
        "curriculum.modules.rename" => Some(handle_modules_rename(state, req)),
        "curriculum.modules.delete" => Some(handle_modules_delete(state, req)),
        _ => None,
    }
}
